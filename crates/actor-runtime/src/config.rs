//! # Runtime Configuration
//!
//! [`RuntimeConfig`] carries every tunable of a runtime instance. It can be
//! built in code with the `with_*` methods, deserialized with serde (missing
//! fields take their defaults), or read from the environment:
//!
//! | Variable | Field | Default |
//! |----------|-------|---------|
//! | `ACTOR_NODE_NAME` | `node_name` | `local` |
//! | `ACTOR_MAILBOX_CAPACITY` | `mailbox_capacity` | `32` |
//! | `ACTOR_REQUEST_TIMEOUT_SECS` | `request_timeout` | `120` |
//! | `ACTOR_IDLE_TIMEOUT_SECS` | `idle_timeout` | unset (never) |
//! | `ACTOR_ACTIVATION_FAILURE` | `activation_failure` | `fail` |

use crate::error::ConfigurationError;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// What an aggregate does when its stream cannot be read at activation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActivationFailurePolicy {
    /// Fail the activation and the message that triggered it.
    #[default]
    Fail,
    /// Log a warning and start from an empty stream at version -1. The first
    /// save still appends with expected version -1, so it conflicts if the
    /// stream actually exists.
    StartEmpty,
}

impl FromStr for ActivationFailurePolicy {
    type Err = ConfigurationError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "start-empty" | "start_empty" => Ok(Self::StartEmpty),
            _ => Err(ConfigurationError::InvalidSetting {
                name: "ACTOR_ACTIVATION_FAILURE",
                value: value.to_string(),
                reason: "expected `fail` or `start-empty`".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Name of this node in logs and in cluster routing.
    pub node_name: String,
    /// Bound of each actor's mailbox. Senders wait when it is full.
    pub mailbox_capacity: usize,
    /// How long a remote send waits before reporting an unknown outcome.
    pub request_timeout: Duration,
    /// Deactivate an actor after this long without messages.
    pub idle_timeout: Option<Duration>,
    pub activation_failure: ActivationFailurePolicy,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            node_name: "local".to_string(),
            mailbox_capacity: 32,
            request_timeout: Duration::from_secs(120),
            idle_timeout: None,
            activation_failure: ActivationFailurePolicy::Fail,
        }
    }
}

impl RuntimeConfig {
    /// Reads the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads the configuration through `lookup`, which maps a variable name to
    /// its value. Unset variables keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();
        if let Some(name) = lookup("ACTOR_NODE_NAME") {
            config.node_name = name;
        }
        if let Some(value) = lookup("ACTOR_MAILBOX_CAPACITY") {
            config.mailbox_capacity = parse_number("ACTOR_MAILBOX_CAPACITY", &value)?;
        }
        if let Some(value) = lookup("ACTOR_REQUEST_TIMEOUT_SECS") {
            config.request_timeout =
                Duration::from_secs(parse_number("ACTOR_REQUEST_TIMEOUT_SECS", &value)?);
        }
        if let Some(value) = lookup("ACTOR_IDLE_TIMEOUT_SECS") {
            config.idle_timeout = Some(Duration::from_secs(parse_number(
                "ACTOR_IDLE_TIMEOUT_SECS",
                &value,
            )?));
        }
        if let Some(value) = lookup("ACTOR_ACTIVATION_FAILURE") {
            config.activation_failure = value.parse()?;
        }
        config.validate()?;
        Ok(config)
    }

    pub fn with_node_name(mut self, node_name: impl Into<String>) -> Self {
        self.node_name = node_name.into();
        self
    }

    pub fn with_mailbox_capacity(mut self, capacity: usize) -> Self {
        self.mailbox_capacity = capacity;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn with_activation_failure(mut self, policy: ActivationFailurePolicy) -> Self {
        self.activation_failure = policy;
        self
    }

    /// Rejects values the runtime cannot operate with.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.mailbox_capacity == 0 {
            return Err(ConfigurationError::InvalidSetting {
                name: "mailbox_capacity",
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.request_timeout.is_zero() {
            return Err(ConfigurationError::InvalidSetting {
                name: "request_timeout",
                value: "0s".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.idle_timeout.is_some_and(|idle| idle.is_zero()) {
            return Err(ConfigurationError::InvalidSetting {
                name: "idle_timeout",
                value: "0s".to_string(),
                reason: "must be positive when set".to_string(),
            });
        }
        Ok(())
    }
}

fn parse_number<T: FromStr>(name: &'static str, value: &str) -> Result<T, ConfigurationError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e: T::Err| ConfigurationError::InvalidSetting {
            name,
            value: value.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn empty_environment_gives_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, RuntimeConfig::default());
        assert_eq!(config.request_timeout, Duration::from_secs(120));
        assert_eq!(config.activation_failure, ActivationFailurePolicy::Fail);
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = RuntimeConfig::from_lookup(lookup(&[
            ("ACTOR_NODE_NAME", "node-b"),
            ("ACTOR_MAILBOX_CAPACITY", "8"),
            ("ACTOR_REQUEST_TIMEOUT_SECS", "5"),
            ("ACTOR_IDLE_TIMEOUT_SECS", "600"),
            ("ACTOR_ACTIVATION_FAILURE", "start-empty"),
        ]))
        .unwrap();
        assert_eq!(config.node_name, "node-b");
        assert_eq!(config.mailbox_capacity, 8);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.idle_timeout, Some(Duration::from_secs(600)));
        assert_eq!(
            config.activation_failure,
            ActivationFailurePolicy::StartEmpty
        );
    }

    #[test]
    fn invalid_values_are_reported_by_name() {
        let error = RuntimeConfig::from_lookup(lookup(&[("ACTOR_MAILBOX_CAPACITY", "lots")]))
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigurationError::InvalidSetting {
                name: "ACTOR_MAILBOX_CAPACITY",
                ..
            }
        ));

        let error = RuntimeConfig::from_lookup(lookup(&[("ACTOR_MAILBOX_CAPACITY", "0")]))
            .unwrap_err();
        assert!(matches!(
            error,
            ConfigurationError::InvalidSetting {
                name: "mailbox_capacity",
                ..
            }
        ));

        assert!("sometimes".parse::<ActivationFailurePolicy>().is_err());
    }

    #[test]
    fn partial_serde_input_keeps_defaults() {
        let config: RuntimeConfig =
            serde_json::from_str(r#"{"node_name":"node-a","activation_failure":"start-empty"}"#)
                .unwrap();
        assert_eq!(config.node_name, "node-a");
        assert_eq!(config.mailbox_capacity, 32);
        assert_eq!(
            config.activation_failure,
            ActivationFailurePolicy::StartEmpty
        );
    }
}
