// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Resilient RabbitMQ Client
//!
//! This module owns the broker connection and its logical channel. A client
//! is constructed against an ordered list of dial targets; the first target
//! that connects becomes the sticky target for every later reconnect. A
//! background task watches the connection and re-establishes it with a fixed
//! retry delay whenever it drops, so a mid-life disconnect is recovered
//! internally and never surfaced to callers.
//!
//! The reconnect task is the sole writer of the connection/channel handles
//! and the connected flag; every other component only reads them. Stale
//! handles are intentionally kept in place between a disconnect and the next
//! successful reconnect, so a publish in that window fails with the broker's
//! channel error instead of a lock or a panic.

use crate::{
    channel,
    config::{ConfigSource, ConnectionConfig},
    errors::AmqpError,
    exchange::ExchangeDefinition,
    queue::{QueueBinding, QueueDefinition},
    topology::{AmqpTopology, Topology},
};
use lapin::{Channel, Connection};
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{watch, Mutex, Notify, RwLock},
    task::JoinHandle,
    time::sleep,
};
use tracing::{debug, error, info, warn};

/// Delay between reconnect attempts while the broker is unreachable
pub(crate) const RECONNECT_RETRY_DELAY: Duration = Duration::from_secs(5);
/// Delay between liveness polls of the connection and channel status
pub(crate) const LIVENESS_POLL_DELAY: Duration = Duration::from_secs(5);
/// Delay between connection rechecks while a consumer pool is waiting
pub(crate) const CONNECT_WAIT_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug)]
struct Handles {
    connection: Connection,
    channel: Channel,
}

/// Shared connection state. The reconnect task is its only writer.
#[derive(Debug)]
pub(crate) struct ClientState {
    uri: String,
    connection_name: String,
    handles: RwLock<Option<Handles>>,
    connected: watch::Sender<bool>,
    closure: Arc<Notify>,
    shutdown: watch::Sender<bool>,
}

impl ClientState {
    fn new(uri: String, connection_name: String) -> ClientState {
        ClientState {
            uri,
            connection_name,
            handles: RwLock::new(None),
            connected: watch::Sender::new(false),
            closure: Arc::new(Notify::new()),
            shutdown: watch::Sender::new(false),
        }
    }

    /// One dial attempt against the sticky target.
    async fn establish(&self) -> Result<(), AmqpError> {
        let (connection, channel) = channel::open(&self.uri, &self.connection_name).await?;
        self.adopt(connection, channel).await;
        Ok(())
    }

    /// Installs fresh handles, registers the closure notification and marks
    /// the client connected.
    async fn adopt(&self, connection: Connection, channel: Channel) {
        let closure = self.closure.clone();
        connection.on_error(move |err| {
            error!(error = err.to_string(), "connection errored");
            closure.notify_one();
        });

        *self.handles.write().await = Some(Handles {
            connection,
            channel,
        });
        self.connected.send_replace(true);
    }

    async fn handles_alive(&self) -> bool {
        match self.handles.read().await.as_ref() {
            Some(handles) => {
                handles.connection.status().connected() && handles.channel.status().connected()
            }
            None => false,
        }
    }
}

/// Background recovery task: while connected it waits for a closure signal
/// (or notices a dead handle on the liveness poll), and while disconnected
/// it redials the sticky target until one attempt succeeds. A shutdown
/// signal makes it exit at the next suspension point.
async fn reconnect_loop(state: Arc<ClientState>) {
    let mut shutdown = state.shutdown.subscribe();

    loop {
        if *shutdown.borrow() {
            return;
        }

        if !*state.connected.borrow() {
            loop {
                if *shutdown.borrow() {
                    return;
                }

                match state.establish().await {
                    Ok(()) => {
                        info!("amqp connection re-established");
                        break;
                    }
                    Err(err) => {
                        warn!(error = err.to_string(), "reconnect attempt failed");
                        tokio::select! {
                            _ = shutdown.changed() => return,
                            _ = sleep(RECONNECT_RETRY_DELAY) => {}
                        }
                    }
                }
            }
        }

        tokio::select! {
            _ = shutdown.changed() => return,
            _ = state.closure.notified() => {
                warn!("closure notification received, marking disconnected");
                state.connected.send_replace(false);
            }
            _ = sleep(LIVENESS_POLL_DELAY) => {
                if *state.connected.borrow() && !state.handles_alive().await {
                    warn!("connection or channel no longer open, marking disconnected");
                    state.connected.send_replace(false);
                }
            }
        }
    }
}

/// A RabbitMQ client that survives connection loss.
///
/// Construction is fatal when no dial target is reachable; afterwards the
/// background reconnect task keeps a live connection and channel available
/// for the topology declarer, the publisher and the consumer pool.
#[derive(Debug)]
pub struct RabbitMQClient {
    state: Arc<ClientState>,
    reconnect_handle: Mutex<Option<JoinHandle<()>>>,
    closing: AtomicBool,
}

impl RabbitMQClient {
    /// Connects to the first reachable dial target and starts the
    /// background reconnect task.
    ///
    /// # Returns
    /// An error listing every attempted target when none is reachable.
    pub async fn new(config: ConnectionConfig) -> Result<Arc<RabbitMQClient>, AmqpError> {
        let connection_name = env!("CARGO_PKG_NAME");

        let mut picked = None;
        for target in config.targets() {
            match channel::open(target, connection_name).await {
                Ok(handles) => {
                    picked = Some((target.clone(), handles));
                    break;
                }
                Err(err) => {
                    warn!(
                        uri = target.as_str(),
                        error = err.to_string(),
                        "dial target unreachable"
                    );
                }
            }
        }

        let Some((uri, (connection, chan))) = picked else {
            return Err(AmqpError::UnreachableTargets(config.joined_targets()));
        };

        let state = Arc::new(ClientState::new(uri, connection_name.to_owned()));
        state.adopt(connection, chan).await;

        let handle = tokio::spawn(reconnect_loop(state.clone()));

        Ok(Arc::new(RabbitMQClient {
            state,
            reconnect_handle: Mutex::new(Some(handle)),
            closing: AtomicBool::new(false),
        }))
    }

    /// Resolves connection parameters from a named configuration entry and
    /// connects.
    pub async fn from_source(
        source: &dyn ConfigSource,
        key: &str,
    ) -> Result<Arc<RabbitMQClient>, AmqpError> {
        let config = ConnectionConfig::from_source(source, key)?;
        RabbitMQClient::new(config).await
    }

    /// Whether the client currently holds a live connection and channel.
    pub fn is_connected(&self) -> bool {
        *self.state.connected.borrow()
    }

    /// A receiver that observes connected/disconnected transitions.
    pub fn subscribe_connected(&self) -> watch::Receiver<bool> {
        self.state.connected.subscribe()
    }

    pub(crate) fn subscribe_shutdown(&self) -> watch::Receiver<bool> {
        self.state.shutdown.subscribe()
    }

    /// A clone of the current channel.
    ///
    /// No connectivity check is made: after a disconnect and before the
    /// reconnect task swaps in a new channel, the returned handle is stale
    /// and operations on it fail with the broker's channel error.
    pub async fn current_channel(&self) -> Result<Channel, AmqpError> {
        match self.state.handles.read().await.as_ref() {
            Some(handles) => Ok(handles.channel.clone()),
            None => Err(AmqpError::MissingChannel),
        }
    }

    /// Declares the exchange and the queue, then binds the queue using its
    /// routing key.
    ///
    /// The three broker calls are attempted independently; the first error
    /// is returned after every step was tried, and means the topology is
    /// not guaranteed.
    pub async fn declare_topology(
        &self,
        exchange: &ExchangeDefinition,
        queue: &QueueDefinition,
    ) -> Result<String, AmqpError> {
        let chan = self.current_channel().await?;
        let binding = QueueBinding::from_definition(queue, exchange.name());

        AmqpTopology::new(chan)
            .exchange(exchange)
            .queue(queue)
            .queue_binding(&binding)
            .install()
            .await?;

        Ok(queue.name().to_owned())
    }

    /// Shuts the client down.
    ///
    /// Signals shutdown exactly once (terminating the reconnect task and
    /// any consumer pools), then closes channel and connection if currently
    /// connected. Calling `close` again is a no-op; resources are never
    /// double-closed.
    pub async fn close(&self) {
        if self.closing.swap(true, Ordering::SeqCst) {
            debug!("client already closing");
            return;
        }

        info!("closing rabbitmq client");
        self.state.shutdown.send_replace(true);

        // The reconnect task is the sole writer of the handles. Joining it
        // first means a dial that was in flight when shutdown was signaled
        // has either been adopted or abandoned by now, so the handles
        // closed below are the final ones.
        if let Some(handle) = self.reconnect_handle.lock().await.take() {
            if let Err(err) = handle.await {
                error!(error = err.to_string(), "reconnect task join failed");
            }
        }

        let guard = self.state.handles.read().await;
        if let Some(handles) = guard.as_ref() {
            if handles.connection.status().connected() {
                if let Err(err) = handles.channel.close(200, "client closing").await {
                    error!(error = err.to_string(), "error closing channel");
                }
                if let Err(err) = handles.connection.close(200, "client closing").await {
                    error!(error = err.to_string(), "error closing connection");
                }
            }
        }
        drop(guard);
        self.state.connected.send_replace(false);
    }

    /// A client with no connection and no reconnect task, for exercising
    /// code paths that do not need a broker.
    #[cfg(test)]
    pub(crate) fn detached(uri: &str) -> Arc<RabbitMQClient> {
        Arc::new(RabbitMQClient {
            state: Arc::new(ClientState::new(uri.to_owned(), "test".to_owned())),
            reconnect_handle: Mutex::new(None),
            closing: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    // Loopback discard port: the dial is refused immediately.
    const UNREACHABLE: &str = "amqp://127.0.0.1:9/";

    #[tokio::test]
    async fn construction_fails_listing_all_unreachable_targets() {
        let config =
            ConnectionConfig::from_targets([UNREACHABLE, "amqp://127.0.0.1:10/"]);

        let err = RabbitMQClient::new(config).await.unwrap_err();
        assert_eq!(
            err,
            AmqpError::UnreachableTargets(
                "amqp://127.0.0.1:9/,amqp://127.0.0.1:10/".to_owned()
            )
        );
    }

    #[tokio::test]
    async fn reconnect_loop_exits_on_shutdown_signal() {
        let state = Arc::new(ClientState::new(
            UNREACHABLE.to_owned(),
            "test".to_owned(),
        ));

        let handle = tokio::spawn(reconnect_loop(state.clone()));
        state.shutdown.send_replace(true);

        timeout(Duration::from_secs(10), handle)
            .await
            .expect("reconnect loop should exit promptly after shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let state = Arc::new(ClientState::new(
            UNREACHABLE.to_owned(),
            "test".to_owned(),
        ));
        let client = RabbitMQClient {
            state: state.clone(),
            reconnect_handle: Mutex::new(None),
            closing: AtomicBool::new(false),
        };

        client.close().await;
        assert!(*state.shutdown.borrow());
        assert!(client.closing.load(Ordering::SeqCst));

        // Second close returns without touching anything.
        client.close().await;
        assert!(!client.is_connected());
    }

    #[tokio::test]
    async fn close_marks_disconnected_after_late_reconnect() {
        let state = Arc::new(ClientState::new(
            UNREACHABLE.to_owned(),
            "test".to_owned(),
        ));
        let handle = tokio::spawn(reconnect_loop(state.clone()));
        let client = RabbitMQClient {
            state: state.clone(),
            reconnect_handle: Mutex::new(Some(handle)),
            closing: AtomicBool::new(false),
        };

        // A dial attempt that completes while close is in flight flips the
        // flag after close already inspected it. Close must still leave the
        // client marked disconnected once the reconnect task is joined.
        state.connected.send_replace(true);

        timeout(Duration::from_secs(10), client.close())
            .await
            .expect("close should finish promptly after shutdown");
        assert!(!client.is_connected());
        assert!(client.reconnect_handle.lock().await.is_none());
    }

    #[tokio::test]
    async fn channel_is_missing_before_first_connect() {
        let state = Arc::new(ClientState::new(
            UNREACHABLE.to_owned(),
            "test".to_owned(),
        ));
        let client = RabbitMQClient {
            state,
            reconnect_handle: Mutex::new(None),
            closing: AtomicBool::new(false),
        };

        assert!(!client.is_connected());
        assert_eq!(
            client.current_channel().await.unwrap_err(),
            AmqpError::MissingChannel
        );
    }
}
