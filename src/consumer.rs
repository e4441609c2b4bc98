// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Per-Delivery Processing
//!
//! One worker drains one broker subscription. Every delivery is handed to
//! the user handler inside a panic boundary, and the handler's
//! [`DeliveryOutcome`] is translated into exactly one acknowledgment call
//! when the subscription runs in manual-ack mode. Ack transport failures
//! are logged, never propagated: the outcome was already decided.

use crate::{
    handler::{ConsumerHandler, DeliveryOutcome},
    otel,
};
use futures_util::{FutureExt, StreamExt};
use lapin::{
    message::Delivery,
    options::{BasicAckOptions, BasicNackOptions},
    Consumer,
};
use opentelemetry::{
    global::BoxedTracer,
    trace::{Span, Status},
};
use std::{borrow::Cow, panic::AssertUnwindSafe, sync::Arc};
use tracing::{debug, error, warn};

/// Pulls deliveries until the subscription closes, which happens when the
/// channel or connection goes away.
pub(crate) async fn run_worker(
    mut consumer: Consumer,
    handler: Arc<dyn ConsumerHandler>,
    manual_ack: bool,
) {
    let tracer = opentelemetry::global::tracer("amqp consumer");

    while let Some(result) = consumer.next().await {
        match result {
            Ok(delivery) => {
                process_delivery(&tracer, &delivery, handler.as_ref(), manual_ack).await
            }
            Err(err) => error!(error = err.to_string(), "error receiving delivery"),
        }
    }

    debug!("subscription closed, worker finished");
}

pub(crate) async fn process_delivery(
    tracer: &BoxedTracer,
    delivery: &Delivery,
    handler: &dyn ConsumerHandler,
    manual_ack: bool,
) {
    let (_ctx, mut span) = otel::new_span(&delivery.properties, tracer, delivery.routing_key.as_str());

    debug!(
        "received delivery - exchange: {} - routing key: {}",
        delivery.exchange, delivery.routing_key
    );

    let outcome = invoke_handler(handler, &delivery.data).await;

    // Auto-ack subscriptions never issue explicit acknowledgments.
    if !manual_ack {
        span.set_status(Status::Ok);
        return;
    }

    let ack_result = match outcome.requeue_flag() {
        None => delivery.ack(BasicAckOptions { multiple: false }).await,
        Some(requeue) => {
            warn!(requeue, "delivery rejected by handler");
            delivery
                .nack(BasicNackOptions {
                    multiple: false,
                    requeue,
                })
                .await
        }
    };

    match ack_result {
        Ok(()) => span.set_status(Status::Ok),
        Err(err) => {
            error!(error = err.to_string(), "error acknowledging delivery");
            span.record_error(&err);
            span.set_status(Status::Error {
                description: Cow::from("error to ack msg"),
            });
        }
    }
}

/// Invokes the handler inside a panic boundary. A panicking handler must
/// not kill its worker, so the fault becomes a requeue rejection.
pub(crate) async fn invoke_handler(
    handler: &dyn ConsumerHandler,
    payload: &[u8],
) -> DeliveryOutcome {
    match AssertUnwindSafe(handler.handle(payload)).catch_unwind().await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("handler panicked, requeueing delivery");
            DeliveryOutcome::Requeue
        }
    }
}
