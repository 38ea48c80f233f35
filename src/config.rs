//! Webhook configuration, read once from the environment at startup.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::webhooks::policies::InfrastructurePolicy;

/// Default webhook server port
pub const DEFAULT_WEBHOOK_PORT: u16 = 9443;
/// Default health server port
pub const DEFAULT_HEALTH_PORT: u16 = 8080;
/// Default path to webhook TLS certificate
pub const DEFAULT_CERT_PATH: &str = "/etc/webhook/certs/tls.crt";
/// Default path to webhook TLS private key
pub const DEFAULT_KEY_PATH: &str = "/etc/webhook/certs/tls.key";
/// Default budget for pod lookups within one admission request
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_millis(5000);
const DEFAULT_LOOKUP_RETRIES: u32 = 2;
const DEFAULT_LOOKUP_BACKOFF: Duration = Duration::from_millis(200);

/// Errors from reading configuration
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {name}: {reason}")]
    InvalidValue {
        name: &'static str,
        value: String,
        reason: String,
    },
}

/// Runtime configuration of the webhook binary
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookConfig {
    pub webhook_port: u16,
    pub health_port: u16,
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
    /// Deadline applied to each admission request's pod lookups
    pub lookup_timeout: Duration,
    pub infrastructure_policy: InfrastructurePolicy,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            webhook_port: DEFAULT_WEBHOOK_PORT,
            health_port: DEFAULT_HEALTH_PORT,
            cert_path: PathBuf::from(DEFAULT_CERT_PATH),
            key_path: PathBuf::from(DEFAULT_KEY_PATH),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            infrastructure_policy: InfrastructurePolicy::Deny,
        }
    }
}

impl WebhookConfig {
    /// Read configuration from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(|name| std::env::var(name).ok())
    }

    /// Read configuration through `lookup`, falling back to defaults for unset variables
    pub fn from_vars(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let webhook_port = parse_var(&lookup, "WEBHOOK_PORT")?.unwrap_or(defaults.webhook_port);
        let health_port = parse_var(&lookup, "HEALTH_PORT")?.unwrap_or(defaults.health_port);
        let cert_path = lookup("WEBHOOK_CERT_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.cert_path);
        let key_path = lookup("WEBHOOK_KEY_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.key_path);
        let lookup_timeout = parse_var::<u64>(&lookup, "POD_LOOKUP_TIMEOUT_MS")?
            .map(Duration::from_millis)
            .unwrap_or(defaults.lookup_timeout);

        let infrastructure_policy = match lookup("POD_LOOKUP_POLICY").as_deref() {
            None | Some("deny") => InfrastructurePolicy::Deny,
            Some("retry") => InfrastructurePolicy::Retry {
                attempts: parse_var(&lookup, "POD_LOOKUP_RETRIES")?
                    .unwrap_or(DEFAULT_LOOKUP_RETRIES),
                backoff: parse_var::<u64>(&lookup, "POD_LOOKUP_BACKOFF_MS")?
                    .map(Duration::from_millis)
                    .unwrap_or(DEFAULT_LOOKUP_BACKOFF),
            },
            Some(other) => {
                return Err(ConfigError::InvalidValue {
                    name: "POD_LOOKUP_POLICY",
                    value: other.to_string(),
                    reason: "expected \"deny\" or \"retry\"".to_string(),
                });
            }
        };

        Ok(Self {
            webhook_port,
            health_port,
            cert_path,
            key_path,
            lookup_timeout,
            infrastructure_policy,
        })
    }
}

fn parse_var<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(name)
        .map(|value| {
            value.trim().parse::<T>().map_err(|e| ConfigError::InvalidValue {
                name,
                reason: e.to_string(),
                value,
            })
        })
        .transpose()
}
