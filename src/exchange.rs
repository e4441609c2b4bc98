// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Exchange Definitions
//!
//! Types and builders for declaring RabbitMQ exchanges. An
//! `ExchangeDefinition` captures everything the topology declarer needs to
//! issue an `exchange_declare`: the kind, durability flags and any extra
//! broker arguments.

use lapin::types::{AMQPValue, ShortString};
use std::collections::BTreeMap;

/// The exchange kinds supported by the client.
///
/// - Direct: routes on an exact routing-key match
/// - Fanout: broadcasts to every bound queue
/// - Topic: routes on wildcard routing-key patterns
/// - Headers: routes on message header values
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ExchangeKind {
    #[default]
    Direct,
    Fanout,
    Topic,
    Headers,
}

impl From<ExchangeKind> for lapin::ExchangeKind {
    fn from(kind: ExchangeKind) -> lapin::ExchangeKind {
        match kind {
            ExchangeKind::Direct => lapin::ExchangeKind::Direct,
            ExchangeKind::Fanout => lapin::ExchangeKind::Fanout,
            ExchangeKind::Topic => lapin::ExchangeKind::Topic,
            ExchangeKind::Headers => lapin::ExchangeKind::Headers,
        }
    }
}

/// Definition of a RabbitMQ exchange with its declaration parameters.
///
/// Built with the builder pattern; immutable once handed to the topology
/// declarer. Redeclaring an identical definition is a broker no-op,
/// redeclaring with conflicting flags is a broker-reported error.
#[derive(Debug, Clone)]
pub struct ExchangeDefinition {
    pub(crate) name: String,
    pub(crate) kind: ExchangeKind,
    pub(crate) delete: bool,
    pub(crate) durable: bool,
    pub(crate) passive: bool,
    pub(crate) internal: bool,
    pub(crate) no_wait: bool,
    pub(crate) params: BTreeMap<ShortString, AMQPValue>,
}

impl ExchangeDefinition {
    /// Creates a direct, non-durable exchange definition with the given name.
    pub fn new(name: &str) -> ExchangeDefinition {
        ExchangeDefinition {
            name: name.to_owned(),
            kind: ExchangeKind::Direct,
            delete: false,
            durable: false,
            passive: false,
            internal: false,
            no_wait: false,
            params: BTreeMap::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the exchange kind.
    pub fn kind(mut self, kind: ExchangeKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn direct(mut self) -> Self {
        self.kind = ExchangeKind::Direct;
        self
    }

    pub fn fanout(mut self) -> Self {
        self.kind = ExchangeKind::Fanout;
        self
    }

    pub fn topic(mut self) -> Self {
        self.kind = ExchangeKind::Topic;
        self
    }

    pub fn headers(mut self) -> Self {
        self.kind = ExchangeKind::Headers;
        self
    }

    /// Replaces the extra declaration arguments.
    pub fn params(mut self, params: BTreeMap<ShortString, AMQPValue>) -> Self {
        self.params = params;
        self
    }

    /// Adds a single extra declaration argument.
    pub fn param(mut self, key: ShortString, value: AMQPValue) -> Self {
        self.params.insert(key, value);
        self
    }

    /// Auto-delete the exchange when no longer used.
    pub fn delete(mut self) -> Self {
        self.delete = true;
        self
    }

    /// Persist the exchange across broker restarts.
    pub fn durable(mut self) -> Self {
        self.durable = true;
        self
    }

    /// Check for existence without creating.
    pub fn passive(mut self) -> Self {
        self.passive = true;
        self
    }

    /// Prevent direct publishing to the exchange.
    pub fn internal(mut self) -> Self {
        self.internal = true;
        self
    }

    /// Declare without waiting for broker confirmation.
    pub fn no_wait(mut self) -> Self {
        self.no_wait = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_direct_and_transient() {
        let def = ExchangeDefinition::new("orders");

        assert_eq!(def.name(), "orders");
        assert_eq!(def.kind, ExchangeKind::Direct);
        assert!(!def.durable);
        assert!(!def.delete);
        assert!(!def.internal);
        assert!(def.params.is_empty());
    }

    #[test]
    fn builder_flags_accumulate() {
        let def = ExchangeDefinition::new("orders")
            .topic()
            .durable()
            .internal()
            .param(ShortString::from("alternate-exchange"), AMQPValue::LongString("fallback".into()));

        assert_eq!(def.kind, ExchangeKind::Topic);
        assert!(def.durable);
        assert!(def.internal);
        assert_eq!(def.params.len(), 1);
    }

    #[test]
    fn kinds_convert_to_lapin() {
        assert_eq!(lapin::ExchangeKind::from(ExchangeKind::Direct), lapin::ExchangeKind::Direct);
        assert_eq!(lapin::ExchangeKind::from(ExchangeKind::Fanout), lapin::ExchangeKind::Fanout);
        assert_eq!(lapin::ExchangeKind::from(ExchangeKind::Topic), lapin::ExchangeKind::Topic);
        assert_eq!(lapin::ExchangeKind::from(ExchangeKind::Headers), lapin::ExchangeKind::Headers);
    }
}
