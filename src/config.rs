// Copyright (c) 2025, The Ruskit Authors
// MIT License
// All rights reserved.

//! # Connection Configuration
//!
//! This module resolves the dial targets a client will try at construction
//! time. Targets come either from a literal list of AMQP URIs (tried in
//! order) or from an external configuration lookup keyed by name. The lookup
//! itself lives behind the `ConfigSource` trait so the surrounding
//! application keeps ownership of how configuration is loaded and reloaded.

use crate::errors::AmqpError;
use std::collections::HashMap;

/// External configuration lookup.
///
/// Given a key, returns a flat string-to-string mapping containing at least
/// `host`, and optionally `login` and `password`. Implemented by whatever
/// configuration layer the embedding application uses.
#[cfg_attr(test, mockall::automock)]
pub trait ConfigSource: Send + Sync {
    fn lookup(&self, key: &str) -> Option<HashMap<String, String>>;
}

/// Ordered list of dial targets, immutable after construction.
///
/// The first target that connects successfully at construction time becomes
/// the single sticky target for every later reconnect attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    targets: Vec<String>,
}

impl ConnectionConfig {
    /// Builds a configuration from literal AMQP URIs, tried in order.
    /// Empty entries are skipped.
    pub fn from_targets<I, S>(targets: I) -> ConnectionConfig
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ConnectionConfig {
            targets: targets
                .into_iter()
                .map(Into::into)
                .filter(|t| !t.is_empty())
                .collect(),
        }
    }

    /// Resolves a single dial target from a named configuration entry.
    ///
    /// The entry must contain `host`; `login` and `password` are optional
    /// and omitted from the URI when absent. A missing key or missing host
    /// is a construction-time error.
    pub fn from_source(source: &dyn ConfigSource, key: &str) -> Result<ConnectionConfig, AmqpError> {
        let Some(entry) = source.lookup(key) else {
            return Err(AmqpError::ConfigKeyNotFound(key.to_owned()));
        };

        let Some(host) = entry.get("host").filter(|h| !h.is_empty()) else {
            return Err(AmqpError::MissingConfigField(
                key.to_owned(),
                "host".to_owned(),
            ));
        };

        let uri = match entry.get("login").filter(|l| !l.is_empty()) {
            Some(login) => {
                let password = entry.get("password").map(String::as_str).unwrap_or_default();
                format!("amqp://{}:{}@{}/", login, password, host)
            }
            None => format!("amqp://{}/", host),
        };

        Ok(ConnectionConfig {
            targets: vec![uri],
        })
    }

    /// The dial targets in the order they will be attempted.
    pub fn targets(&self) -> &[String] {
        &self.targets
    }

    /// The comma-joined target list, used in construction-failure errors.
    pub(crate) fn joined_targets(&self) -> String {
        self.targets.join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source_with(key: &str, fields: &[(&str, &str)]) -> MockConfigSource {
        let key = key.to_owned();
        let entry: HashMap<String, String> = fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();

        let mut source = MockConfigSource::new();
        source
            .expect_lookup()
            .returning(move |k| if k == key { Some(entry.clone()) } else { None });
        source
    }

    #[test]
    fn literal_targets_keep_order_and_drop_empty_entries() {
        let cfg = ConnectionConfig::from_targets(["amqp://bad-host/", "", "amqp://good-host/"]);
        assert_eq!(cfg.targets(), ["amqp://bad-host/", "amqp://good-host/"]);
        assert_eq!(cfg.joined_targets(), "amqp://bad-host/,amqp://good-host/");
    }

    #[test]
    fn source_entry_with_credentials_builds_full_uri() {
        let source = source_with("broker", &[("host", "mq:5672"), ("login", "app"), ("password", "s3cr3t")]);

        let cfg = ConnectionConfig::from_source(&source, "broker").unwrap();
        assert_eq!(cfg.targets(), ["amqp://app:s3cr3t@mq:5672/"]);
    }

    #[test]
    fn source_entry_without_credentials_builds_plain_uri() {
        let source = source_with("broker", &[("host", "mq:5672")]);

        let cfg = ConnectionConfig::from_source(&source, "broker").unwrap();
        assert_eq!(cfg.targets(), ["amqp://mq:5672/"]);
    }

    #[test]
    fn missing_key_is_a_construction_error() {
        let source = source_with("broker", &[("host", "mq:5672")]);

        let err = ConnectionConfig::from_source(&source, "other").unwrap_err();
        assert_eq!(err, AmqpError::ConfigKeyNotFound("other".to_owned()));
    }

    #[test]
    fn missing_host_is_a_construction_error() {
        let source = source_with("broker", &[("login", "app")]);

        let err = ConnectionConfig::from_source(&source, "broker").unwrap_err();
        assert_eq!(
            err,
            AmqpError::MissingConfigField("broker".to_owned(), "host".to_owned())
        );
    }
}
