// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # RabbitMQ Topology Management
//!
//! This module declares exchanges, queues, and the bindings between them.
//! Declarations are idempotent on the broker side: redeclaring an identical
//! entity is a no-op, redeclaring with conflicting properties is a
//! broker-reported error.
//!
//! Every step of an installation is attempted independently. A failed
//! exchange declaration does not prevent the queue declaration or binding
//! from being tried; the first error is reported at the end, so a non-`Ok`
//! result means "topology not guaranteed" rather than "nothing was done".

use crate::{
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
};
use async_trait::async_trait;
use lapin::{
    options::{ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions},
    types::FieldTable,
    Channel,
};
use tracing::{debug, error};

/// Interface for topology registration and installation.
#[async_trait]
pub trait Topology<'tp> {
    /// Adds an exchange definition to the topology.
    fn exchange(self, def: &'tp ExchangeDefinition) -> Self;

    /// Adds a queue definition to the topology.
    fn queue(self, def: &'tp QueueDefinition) -> Self;

    /// Adds a queue-to-exchange binding to the topology.
    fn queue_binding(self, binding: &'tp QueueBinding) -> Self;

    /// Installs the registered topology on the broker.
    ///
    /// Attempts every declaration and binding even when earlier steps fail;
    /// returns the first error encountered, if any.
    async fn install(&self) -> Result<(), AmqpError>;
}

/// RabbitMQ implementation of the [`Topology`] trait.
pub struct AmqpTopology<'tp> {
    channel: Channel,
    pub(crate) exchanges: Vec<&'tp ExchangeDefinition>,
    pub(crate) queues: Vec<&'tp QueueDefinition>,
    pub(crate) queues_binding: Vec<&'tp QueueBinding>,
}

impl<'tp> AmqpTopology<'tp> {
    pub fn new(channel: Channel) -> AmqpTopology<'tp> {
        AmqpTopology {
            channel,
            exchanges: vec![],
            queues: vec![],
            queues_binding: vec![],
        }
    }
}

#[async_trait]
impl<'tp> Topology<'tp> for AmqpTopology<'tp> {
    fn exchange(mut self, def: &'tp ExchangeDefinition) -> Self {
        self.exchanges.push(def);
        self
    }

    fn queue(mut self, def: &'tp QueueDefinition) -> Self {
        self.queues.push(def);
        self
    }

    fn queue_binding(mut self, binding: &'tp QueueBinding) -> Self {
        self.queues_binding.push(binding);
        self
    }

    async fn install(&self) -> Result<(), AmqpError> {
        let mut first_err: Option<AmqpError> = None;

        record(&mut first_err, self.install_exchanges().await);
        record(&mut first_err, self.install_queues().await);
        record(&mut first_err, self.bind_queues().await);

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn record(first_err: &mut Option<AmqpError>, result: Result<(), AmqpError>) {
    if let Err(err) = result {
        first_err.get_or_insert(err);
    }
}

impl<'tp> AmqpTopology<'tp> {
    async fn install_exchanges(&self) -> Result<(), AmqpError> {
        let mut first_err = None;

        for exch in &self.exchanges {
            debug!("creating exchange: {}", exch.name);

            match self
                .channel
                .exchange_declare(
                    &exch.name,
                    exch.kind.clone().into(),
                    ExchangeDeclareOptions {
                        passive: exch.passive,
                        durable: exch.durable,
                        auto_delete: exch.delete,
                        internal: exch.internal,
                        nowait: exch.no_wait,
                    },
                    FieldTable::from(exch.params.clone()),
                )
                .await
            {
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        name = exch.name,
                        "error to declare the exchange"
                    );
                    first_err.get_or_insert(AmqpError::DeclareExchangeError(exch.name.clone()));
                }
                _ => debug!("exchange: {} was created", exch.name),
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn install_queues(&self) -> Result<(), AmqpError> {
        let mut first_err = None;

        for def in &self.queues {
            debug!("creating queue: {}", def.name());

            match self
                .channel
                .queue_declare(
                    def.name(),
                    QueueDeclareOptions {
                        passive: def.passive,
                        durable: def.durable,
                        exclusive: def.exclusive,
                        auto_delete: def.delete,
                        nowait: def.no_wait,
                    },
                    FieldTable::from(def.declare_args()),
                )
                .await
            {
                Err(err) => {
                    error!(
                        error = err.to_string(),
                        name = def.name(),
                        "error to declare the queue"
                    );
                    first_err.get_or_insert(AmqpError::DeclareQueueError(def.name().to_owned()));
                }
                _ => debug!("queue: {} was created", def.name()),
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn bind_queues(&self) -> Result<(), AmqpError> {
        let mut first_err = None;

        for binding in &self.queues_binding {
            debug!(
                "binding queue: {} to the exchange: {} with the key: {}",
                binding.queue_name, binding.exchange_name, binding.routing_key
            );

            match self
                .channel
                .queue_bind(
                    &binding.queue_name,
                    &binding.exchange_name,
                    &binding.routing_key,
                    QueueBindOptions { nowait: false },
                    FieldTable::default(),
                )
                .await
            {
                Err(err) => {
                    error!(error = err.to_string(), "error to bind queue to exchange");
                    first_err.get_or_insert(AmqpError::BindQueueError(
                        binding.queue_name.clone(),
                        binding.exchange_name.clone(),
                    ));
                }
                _ => debug!("queue: {} was bound", binding.queue_name),
            }
        }

        match first_err {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_keeps_only_the_first_error() {
        let mut first_err = None;

        record(&mut first_err, Ok(()));
        assert_eq!(first_err, None);

        record(
            &mut first_err,
            Err(AmqpError::DeclareExchangeError("orders".to_owned())),
        );
        record(
            &mut first_err,
            Err(AmqpError::DeclareQueueError("orders-q".to_owned())),
        );

        assert_eq!(
            first_err,
            Some(AmqpError::DeclareExchangeError("orders".to_owned()))
        );
    }
}
