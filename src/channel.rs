// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # AMQP Connection and Channel Opening
//!
//! This module performs one dial attempt: it establishes a connection to a
//! RabbitMQ server from an explicit AMQP URI and opens the logical channel
//! used for every subsequent broker operation. Target selection, retry and
//! recovery live in [`crate::client`].

use crate::errors::AmqpError;
use lapin::{types::LongString, Channel, Connection, ConnectionProperties};
use tracing::{debug, error};

/// Opens a connection and a channel against a single dial target.
///
/// # Parameters
/// * `uri` - The AMQP URI to dial
/// * `connection_name` - Name the broker shows for this connection
///
/// # Returns
/// * `Result<(Connection, Channel), AmqpError>` - the live handles on
///   success, or an error when either the dial or the channel open fails.
pub async fn open(uri: &str, connection_name: &str) -> Result<(Connection, Channel), AmqpError> {
    debug!("creating amqp connection...");
    let options =
        ConnectionProperties::default().with_connection_name(LongString::from(connection_name));

    let conn = match Connection::connect(uri, options).await {
        Ok(c) => Ok(c),
        Err(err) => {
            error!(error = err.to_string(), "failure to connect");
            Err(AmqpError::ConnectionError)
        }
    }?;
    debug!("amqp connected");

    debug!("creating amqp channel...");
    match conn.create_channel().await {
        Ok(c) => {
            debug!("channel created");
            Ok((conn, c))
        }
        Err(err) => {
            error!(error = err.to_string(), "error to create the channel");
            Err(AmqpError::ChannelError)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_fails_against_unreachable_target() {
        // Nothing listens on the loopback discard port, the dial is refused.
        let err = open("amqp://127.0.0.1:9/", "test").await.unwrap_err();
        assert_eq!(err, AmqpError::ConnectionError);
    }
}
