// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Consumer Handler Contract
//!
//! This module defines the contract between the consumer pool and user code.
//! A handler receives the raw delivery payload and returns a
//! [`DeliveryOutcome`] that the pool translates into the acknowledgment call
//! for that delivery. Handlers never ack or nack directly.

use async_trait::async_trait;

/// The acknowledgment decision produced by a handler for one delivery.
///
/// Modeled as an explicit three-way enum so there is no ambiguity between
/// "rejected and dropped" and "rejected for redelivery".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The message was processed, acknowledge it.
    Accept,
    /// The message failed and must not be redelivered. The broker drops it
    /// or routes it to a dead-letter exchange per queue policy.
    Discard,
    /// The message failed and should be requeued for redelivery.
    Requeue,
}

impl DeliveryOutcome {
    /// The requeue flag to pass to `basic_nack`, or `None` when the
    /// delivery is acknowledged instead of rejected.
    pub(crate) fn requeue_flag(self) -> Option<bool> {
        match self {
            DeliveryOutcome::Accept => None,
            DeliveryOutcome::Discard => Some(false),
            DeliveryOutcome::Requeue => Some(true),
        }
    }
}

/// Processes deliveries pulled by the consumer pool.
///
/// Implementations must be pure with respect to the broker: the pool owns
/// every ack/nack call. A handler that panics is treated as if it had
/// returned [`DeliveryOutcome::Requeue`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConsumerHandler: Send + Sync {
    async fn handle(&self, payload: &[u8]) -> DeliveryOutcome;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_maps_to_ack_or_requeue_flag() {
        assert_eq!(DeliveryOutcome::Accept.requeue_flag(), None);
        assert_eq!(DeliveryOutcome::Discard.requeue_flag(), Some(false));
        assert_eq!(DeliveryOutcome::Requeue.requeue_flag(), Some(true));
    }
}
