// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Queue Definitions
//!
//! Types and builders for declaring RabbitMQ queues and binding them to
//! exchanges. A `QueueDefinition` carries its own routing key so a queue can
//! be bound to an exchange without a separately constructed binding.

use lapin::types::{AMQPValue, LongInt, ShortString};
use std::collections::BTreeMap;

/// Header field used to specify message TTL
pub const AMQP_HEADERS_MESSAGE_TTL: &str = "x-message-ttl";
/// Header field used to specify maximum queue length
pub const AMQP_HEADERS_MAX_LENGTH: &str = "x-max-length";
/// Header field used to specify maximum queue size in bytes
pub const AMQP_HEADERS_MAX_LENGTH_BYTES: &str = "x-max-length-bytes";

/// Definition of a RabbitMQ queue with its declaration parameters.
///
/// Built with the builder pattern; immutable once handed to the topology
/// declarer.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueueDefinition {
    pub(crate) name: String,
    pub(crate) routing_key: String,
    pub(crate) durable: bool,
    pub(crate) delete: bool,
    pub(crate) exclusive: bool,
    pub(crate) passive: bool,
    pub(crate) no_wait: bool,
    pub(crate) ttl: Option<i32>,
    pub(crate) max_length: Option<i32>,
    pub(crate) max_length_bytes: Option<i32>,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
}

impl QueueDefinition {
    /// Creates a queue definition with the given name and default settings.
    pub fn new(name: &str) -> QueueDefinition {
        QueueDefinition {
            name: name.to_owned(),
            ..QueueDefinition::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the routing key used when binding this queue to an exchange.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }

    /// Persist the queue across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Auto-delete the queue when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Restrict the queue to the declaring connection.
    pub fn exclusive(mut self) -> Self {
        self.exclusive = true;
        self
    }

    /// Check for existence without creating.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    /// Declare without waiting for broker confirmation.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }

    /// Message Time-To-Live in milliseconds.
    pub fn ttl(mut self, ttl: i32) -> Self {
        self.ttl = Some(ttl);
        self
    }

    /// Maximum number of messages the queue can hold.
    pub fn max_length(mut self, max: i32) -> Self {
        self.max_length = Some(max);
        self
    }

    /// Maximum queue size in bytes.
    pub fn max_length_bytes(mut self, max_bytes: i32) -> Self {
        self.max_length_bytes = Some(max_bytes);
        self
    }

    /// Adds a single extra declaration argument.
    pub fn param(mut self, key: ShortString, value: AMQPValue) -> Self {
        self.params.insert(key, value);
        self
    }

    /// The full declaration argument table: extra params plus the
    /// TTL/length limits expressed as `x-*` arguments.
    pub(crate) fn declare_args(&self) -> BTreeMap<ShortString, AMQPValue> {
        let mut args = self.params.clone();

        if let Some(ttl) = self.ttl {
            args.insert(
                ShortString::from(AMQP_HEADERS_MESSAGE_TTL),
                AMQPValue::LongInt(LongInt::from(ttl)),
            );
        }

        if let Some(max) = self.max_length {
            args.insert(
                ShortString::from(AMQP_HEADERS_MAX_LENGTH),
                AMQPValue::LongInt(LongInt::from(max)),
            );
        }

        if let Some(max_bytes) = self.max_length_bytes {
            args.insert(
                ShortString::from(AMQP_HEADERS_MAX_LENGTH_BYTES),
                AMQPValue::LongInt(LongInt::from(max_bytes)),
            );
        }

        args
    }
}

/// Configuration for binding a queue to an exchange via a routing key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueBinding {
    pub(crate) queue_name: String,
    pub(crate) exchange_name: String,
    pub(crate) routing_key: String,
}

impl QueueBinding {
    /// Creates a binding for the given queue; exchange and routing key are
    /// set with the builder methods.
    pub fn new(queue: &str) -> QueueBinding {
        QueueBinding {
            queue_name: queue.to_owned(),
            ..QueueBinding::default()
        }
    }

    /// Derives the binding described by a queue definition's routing key.
    pub fn from_definition(def: &QueueDefinition, exchange: &str) -> QueueBinding {
        QueueBinding {
            queue_name: def.name.clone(),
            exchange_name: exchange.to_owned(),
            routing_key: def.routing_key.clone(),
        }
    }

    /// Sets the exchange to bind the queue to.
    pub fn exchange(mut self, exchange: &str) -> Self {
        self.exchange_name = exchange.to_owned();
        self
    }

    /// Sets the routing key for the binding.
    pub fn routing_key(mut self, key: &str) -> Self {
        self.routing_key = key.to_owned();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_transient_and_unbound() {
        let def = QueueDefinition::new("orders-q");

        assert_eq!(def.name(), "orders-q");
        assert_eq!(def.routing_key, "");
        assert!(!def.durable);
        assert!(!def.exclusive);
        assert!(def.declare_args().is_empty());
    }

    #[test]
    fn limits_become_x_arguments() {
        let def = QueueDefinition::new("orders-q")
            .ttl(30_000)
            .max_length(1_000)
            .max_length_bytes(1_048_576);

        let args = def.declare_args();
        assert_eq!(
            args.get(&ShortString::from(AMQP_HEADERS_MESSAGE_TTL)),
            Some(&AMQPValue::LongInt(LongInt::from(30_000)))
        );
        assert_eq!(
            args.get(&ShortString::from(AMQP_HEADERS_MAX_LENGTH)),
            Some(&AMQPValue::LongInt(LongInt::from(1_000)))
        );
        assert_eq!(
            args.get(&ShortString::from(AMQP_HEADERS_MAX_LENGTH_BYTES)),
            Some(&AMQPValue::LongInt(LongInt::from(1_048_576)))
        );
    }

    #[test]
    fn binding_derived_from_definition_uses_its_routing_key() {
        let def = QueueDefinition::new("orders-q").routing_key("new");
        let binding = QueueBinding::from_definition(&def, "orders");

        assert_eq!(binding.queue_name, "orders-q");
        assert_eq!(binding.exchange_name, "orders");
        assert_eq!(binding.routing_key, "new");
    }
}
