// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Supervised Consumer Pool
//!
//! Runs N concurrent workers against one queue. Each worker holds its own
//! broker subscription; the pool sets a prefetch of one so a worker never
//! holds more than one unacknowledged delivery, which keeps ack decisions
//! in delivery order per worker (there is no ordering across workers).
//!
//! The pool supervises the workers: while the client is disconnected it
//! waits and rechecks; once connected it registers the subscriptions, spawns
//! the workers and waits for all of them to finish - which happens when the
//! subscriptions close on a disconnect - and then starts the next cycle.
//! `stop` and client shutdown both end the supervision after the current
//! cycle instead of leaving an unreachable return.

use crate::{
    client::{RabbitMQClient, CONNECT_WAIT_DELAY},
    consumer::run_worker,
    errors::AmqpError,
    handler::ConsumerHandler,
};
use futures_util::future::join_all;
use lapin::{
    options::{BasicConsumeOptions, BasicQosOptions},
    types::{AMQPValue, FieldTable, ShortString},
    Channel, Consumer,
};
use std::{collections::BTreeMap, sync::Arc};
use tokio::{sync::watch, time::sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// One unacknowledged delivery per worker at a time
const PREFETCH_COUNT: u16 = 1;

/// Source queue and subscription flags for a consumer pool.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumeDefinition {
    pub(crate) queue: String,
    pub(crate) auto_ack: bool,
    pub(crate) exclusive: bool,
    pub(crate) no_local: bool,
    pub(crate) no_wait: bool,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
}

impl ConsumeDefinition {
    /// Creates a manual-ack, non-exclusive subscription definition for the
    /// given queue.
    pub fn new(queue: &str) -> ConsumeDefinition {
        ConsumeDefinition {
            queue: queue.to_owned(),
            auto_ack: false,
            exclusive: false,
            no_local: false,
            no_wait: false,
            params: BTreeMap::default(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }

    /// Let the broker acknowledge deliveries implicitly. The pool then
    /// performs no explicit ack/nack calls.
    pub fn auto_ack(mut self) -> Self {
        self.auto_ack = true;
        self
    }

    /// Restrict the queue to this consumer.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Do not deliver messages published on this connection.
    pub fn no_local(mut self) -> Self {
        self.no_local = true;
        self
    }

    /// Register without waiting for broker confirmation.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Adds a single extra subscription argument.
    pub fn param(mut self, key: ShortString, value: AMQPValue) -> Self {
        self.params.insert(key, value);
        self
    }
}

/// RabbitMQ consumer pool with a fixed worker count.
pub struct RabbitMQConsumerPool {
    client: Arc<RabbitMQClient>,
    workers: usize,
    definition: ConsumeDefinition,
    handler: Arc<dyn ConsumerHandler>,
    stop: watch::Sender<bool>,
}

impl RabbitMQConsumerPool {
    pub fn new(
        client: Arc<RabbitMQClient>,
        workers: usize,
        definition: ConsumeDefinition,
        handler: Arc<dyn ConsumerHandler>,
    ) -> RabbitMQConsumerPool {
        RabbitMQConsumerPool {
            client,
            workers,
            definition,
            handler,
            stop: watch::Sender::new(false),
        }
    }

    /// Makes [`run`](Self::run) return after the current consume cycle.
    pub fn stop(&self) {
        self.stop.send_replace(true);
    }

    /// Runs the supervision loop until [`stop`](Self::stop) is called or
    /// the client shuts down.
    ///
    /// Each cycle: wait for connectivity, set the prefetch, open one
    /// subscription per worker (a failed registration is skipped this
    /// cycle), then wait for every worker to finish. A disconnect closes
    /// the subscriptions, ends the workers, and triggers a full
    /// re-subscription once reconnected.
    pub async fn run(&self) -> Result<(), AmqpError> {
        let mut stop_rx = self.stop.subscribe();
        let mut shutdown_rx = self.client.subscribe_shutdown();

        loop {
            if *stop_rx.borrow() || *shutdown_rx.borrow() {
                info!("consumer pool stopped");
                return Ok(());
            }

            if !self.client.is_connected() {
                debug!("waiting for connection before consuming");
                tokio::select! {
                    _ = stop_rx.changed() => {}
                    _ = shutdown_rx.changed() => {}
                    _ = sleep(CONNECT_WAIT_DELAY) => {}
                }
                continue;
            }

            let channel = match self.client.current_channel().await {
                Ok(channel) => channel,
                Err(err) => {
                    error!(error = err.to_string(), "no channel available for consuming");
                    continue;
                }
            };

            if let Err(err) = self.configure_qos(&channel).await {
                warn!(error = err.to_string(), "consume cycle aborted");
                tokio::select! {
                    _ = stop_rx.changed() => {}
                    _ = shutdown_rx.changed() => {}
                    _ = sleep(CONNECT_WAIT_DELAY) => {}
                }
                continue;
            }

            // Independent registrations: one broker-side consumer per worker.
            let cycle = Uuid::new_v4().to_string();
            let mut workers = vec![];
            for n in 0..self.workers {
                let tag = worker_tag(self.definition.queue(), &cycle, n);

                match self.register_worker(&channel, &tag).await {
                    Ok(consumer) => {
                        workers.push(tokio::spawn(run_worker(
                            consumer,
                            self.handler.clone(),
                            !self.definition.auto_ack,
                        )));
                    }
                    Err(err) => {
                        warn!(error = err.to_string(), "skipping worker this cycle");
                    }
                }
            }

            if workers.is_empty() {
                warn!(
                    queue = self.definition.queue(),
                    "no consumer registration succeeded this cycle"
                );
                tokio::select! {
                    _ = stop_rx.changed() => {}
                    _ = shutdown_rx.changed() => {}
                    _ = sleep(CONNECT_WAIT_DELAY) => {}
                }
                continue;
            }

            info!(
                count = workers.len(),
                queue = self.definition.queue(),
                "consumer workers running"
            );

            for res in join_all(workers).await {
                if let Err(err) = res {
                    error!(error = err.to_string(), "worker task failed");
                }
            }

            debug!("all workers finished, restarting consume cycle");
        }
    }

    /// Limits every worker on this channel to one unacknowledged delivery.
    async fn configure_qos(&self, channel: &Channel) -> Result<(), AmqpError> {
        match channel
            .basic_qos(PREFETCH_COUNT, BasicQosOptions::default())
            .await
        {
            Err(err) => {
                error!(
                    error = err.to_string(),
                    queue = self.definition.queue(),
                    "failure to configure qos"
                );
                Err(AmqpError::QosDeclarationError(self.definition.queue.clone()))
            }
            _ => Ok(()),
        }
    }

    /// Registers one broker-side consumer under the given tag.
    async fn register_worker(&self, channel: &Channel, tag: &str) -> Result<Consumer, AmqpError> {
        match channel
            .basic_consume(
                self.definition.queue(),
                tag,
                BasicConsumeOptions {
                    no_local: self.definition.no_local,
                    no_ack: self.definition.auto_ack,
                    exclusive: self.definition.exclusive,
                    nowait: self.definition.no_wait,
                },
                FieldTable::from(self.definition.params.clone()),
            )
            .await
        {
            Ok(consumer) => Ok(consumer),
            Err(err) => {
                error!(
                    error = err.to_string(),
                    consumer = tag,
                    "failure to create consumer"
                );
                Err(AmqpError::CreateConsumerError(tag.to_owned()))
            }
        }
    }
}

fn worker_tag(queue: &str, cycle: &str, n: usize) -> String {
    format!("{}-{}-worker-{}", queue, cycle, n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::MockConsumerHandler;
    use std::time::Duration;
    use tokio::time::timeout;

    #[test]
    fn definition_defaults_to_manual_ack() {
        let def = ConsumeDefinition::new("orders-q");

        assert_eq!(def.queue(), "orders-q");
        assert!(!def.auto_ack);
        assert!(!def.exclusive);
        assert!(!def.no_local);
        assert!(!def.no_wait);
        assert!(def.params.is_empty());
    }

    #[test]
    fn definition_builder_flags_accumulate() {
        let def = ConsumeDefinition::new("orders-q")
            .auto_ack()
            .exclusive()
            .param(ShortString::from("x-priority"), AMQPValue::LongInt(5));

        assert!(def.auto_ack);
        assert!(def.exclusive);
        assert_eq!(def.params.len(), 1);
    }

    #[tokio::test]
    async fn run_returns_when_stopped_while_disconnected() {
        let client = RabbitMQClient::detached("amqp://127.0.0.1:9/");
        let pool = Arc::new(RabbitMQConsumerPool::new(
            client,
            3,
            ConsumeDefinition::new("orders-q"),
            Arc::new(MockConsumerHandler::new()),
        ));

        let runner = tokio::spawn({
            let pool = pool.clone();
            async move { pool.run().await }
        });
        pool.stop();

        timeout(Duration::from_secs(10), runner)
            .await
            .expect("run should return promptly after stop")
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn run_returns_when_client_shuts_down() {
        let client = RabbitMQClient::detached("amqp://127.0.0.1:9/");
        let pool = Arc::new(RabbitMQConsumerPool::new(
            client.clone(),
            1,
            ConsumeDefinition::new("orders-q"),
            Arc::new(MockConsumerHandler::new()),
        ));

        let runner = tokio::spawn({
            let pool = pool.clone();
            async move { pool.run().await }
        });
        client.close().await;

        timeout(Duration::from_secs(10), runner)
            .await
            .expect("run should return promptly after client shutdown")
            .unwrap()
            .unwrap();
    }

    #[test]
    fn worker_tags_are_unique_per_worker_and_cycle() {
        let a = worker_tag("orders-q", "cycle-1", 0);
        let b = worker_tag("orders-q", "cycle-1", 1);
        let c = worker_tag("orders-q", "cycle-2", 0);

        assert_eq!(a, "orders-q-cycle-1-worker-0");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }
}
