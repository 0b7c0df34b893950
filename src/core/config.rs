use crate::core::types::{EngineIoVersion, ReconnectPolicy, RequestIdPolicy};
use base64::engine::general_purpose;
use base64::Engine;
use secrecy::{ExposeSecret, Secret};
use serde::{Serialize, Serializer};
use std::env;
use std::time::Duration;

pub const DEFAULT_STREAM_URL: &str = "https://stream.falconx.io";
pub const DEFAULT_NAMESPACE: &str = "/streaming";

/// Immutable client configuration, loaded once at startup
#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub passphrase: Secret<String>,
    pub url: String,
    pub namespace: String,
    pub reconnect: ReconnectPolicy,
    pub request_ids: RequestIdPolicy,
    pub engine_io: EngineIoVersion,
}

// Custom Serialize implementation - never expose secrets in serialization
impl Serialize for StreamConfig {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("StreamConfig", 5)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("passphrase", "[REDACTED]")?;
        state.serialize_field("url", &self.url)?;
        state.serialize_field("namespace", &self.namespace)?;
        state.end()
    }
}

impl StreamConfig {
    /// Create a new configuration with API credentials and default endpoints
    #[must_use]
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: Secret::new(passphrase),
            url: DEFAULT_STREAM_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            reconnect: ReconnectPolicy::default(),
            request_ids: RequestIdPolicy::default(),
            engine_io: EngineIoVersion::default(),
        }
    }

    /// Create configuration from environment variables
    ///
    /// Expected environment variables:
    /// - `{PREFIX}_API_KEY`, `{PREFIX}_SECRET_KEY`, `{PREFIX}_PASSPHRASE`
    /// - `{PREFIX}_STREAM_URL` (optional)
    /// - `{PREFIX}_NAMESPACE` (optional)
    /// - `{PREFIX}_RECONNECT` (optional, `fixed` or `exponential`)
    /// - `{PREFIX}_RECONNECT_DELAY_SECS` (optional)
    /// - `{PREFIX}_RECONNECT_MAX_DELAY_SECS` (optional, exponential only)
    /// - `{PREFIX}_REQUEST_IDS` (optional, `stable` or `per-connection`)
    /// - `{PREFIX}_ENGINE_IO` (optional, `3` or `4`)
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        let prefix = prefix.to_uppercase();
        let var = |name: &str| format!("{}_{}", prefix, name);
        let required = |name: &str| {
            let key = var(name);
            env::var(&key).map_err(|_| ConfigError::MissingEnvironmentVariable(key))
        };

        let mut config = Self::new(
            required("API_KEY")?,
            required("SECRET_KEY")?,
            required("PASSPHRASE")?,
        );

        if let Ok(url) = env::var(var("STREAM_URL")) {
            config.url = url;
        }
        if let Ok(namespace) = env::var(var("NAMESPACE")) {
            config.namespace = namespace;
        }
        if let Ok(policy) = env::var(var("REQUEST_IDS")) {
            config.request_ids = policy
                .parse()
                .map_err(|e| ConfigError::InvalidConfiguration(format!("{}", e)))?;
        }
        if let Ok(version) = env::var(var("ENGINE_IO")) {
            config.engine_io = version
                .parse()
                .map_err(|e| ConfigError::InvalidConfiguration(format!("{}", e)))?;
        }

        let delay = read_secs(&var("RECONNECT_DELAY_SECS"))?;
        let max_delay = read_secs(&var("RECONNECT_MAX_DELAY_SECS"))?;
        config.reconnect = match env::var(var("RECONNECT"))
            .unwrap_or_else(|_| "fixed".to_string())
            .to_ascii_lowercase()
            .as_str()
        {
            "fixed" => ReconnectPolicy::Fixed(delay.unwrap_or(Duration::from_secs(5))),
            "exponential" => ReconnectPolicy::Exponential {
                initial: delay.unwrap_or(Duration::from_secs(1)),
                max: max_delay.unwrap_or(Duration::from_secs(60)),
            },
            other => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Unknown reconnect policy: {}",
                    other
                )))
            }
        };

        Ok(config)
    }

    /// Create configuration from .env file and environment variables
    ///
    /// **Security Warning**: Never commit .env files to version control!
    #[cfg(feature = "env-file")]
    pub fn from_env_file(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_env_file_with_path(prefix, ".env")
    }

    /// Create configuration from a specific .env file path
    #[cfg(feature = "env-file")]
    pub fn from_env_file_with_path(prefix: &str, env_file_path: &str) -> Result<Self, ConfigError> {
        match dotenv::from_path(env_file_path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // No .env file, fall back to the process environment
            }
            Err(e) => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Failed to load .env file '{}': {}",
                    env_file_path, e
                )));
            }
        }

        Self::from_env(prefix)
    }

    /// Set the stream service URL
    #[must_use]
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    /// Set the Socket.IO namespace
    #[must_use]
    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    #[must_use]
    pub fn reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    #[must_use]
    pub const fn request_id_policy(mut self, policy: RequestIdPolicy) -> Self {
        self.request_ids = policy;
        self
    }

    #[must_use]
    pub const fn engine_io_version(mut self, version: EngineIoVersion) -> Self {
        self.engine_io = version;
        self
    }

    /// Check if this configuration carries all three credentials
    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty()
            && !self.secret_key.expose_secret().is_empty()
            && !self.passphrase.expose_secret().is_empty()
    }

    /// Reject configurations that could never authenticate
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.has_credentials() {
            return Err(ConfigError::InvalidConfiguration(
                "API key, secret key and passphrase are all required".to_string(),
            ));
        }

        general_purpose::STANDARD
            .decode(self.secret_key.expose_secret())
            .map_err(|e| {
                ConfigError::InvalidConfiguration(format!("Secret key is not valid base64: {}", e))
            })?;

        if !self.url.starts_with("http://")
            && !self.url.starts_with("https://")
            && !self.url.starts_with("ws://")
            && !self.url.starts_with("wss://")
        {
            return Err(ConfigError::InvalidConfiguration(format!(
                "Unsupported stream URL scheme: {}",
                self.url
            )));
        }

        match &self.reconnect {
            ReconnectPolicy::Fixed(delay) if delay.is_zero() => {
                return Err(ConfigError::InvalidConfiguration(
                    "Reconnect delay must be greater than zero".to_string(),
                ));
            }
            ReconnectPolicy::Exponential { initial, max } if initial.is_zero() || max < initial => {
                return Err(ConfigError::InvalidConfiguration(format!(
                    "Exponential reconnect needs 0 < initial <= max, got {:?} and {:?}",
                    initial, max
                )));
            }
            _ => {}
        }

        if !self.namespace.starts_with('/') {
            return Err(ConfigError::InvalidConfiguration(format!(
                "Namespace must start with '/': {}",
                self.namespace
            )));
        }

        Ok(())
    }

    /// Get API key (use carefully - exposes secret)
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    /// Get secret key (use carefully - exposes secret)
    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }

    /// Get passphrase (use carefully - exposes secret)
    pub fn passphrase(&self) -> &str {
        self.passphrase.expose_secret()
    }
}

fn read_secs(key: &str) -> Result<Option<Duration>, ConfigError> {
    env::var(key)
        .ok()
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| {
                    ConfigError::InvalidConfiguration(format!(
                        "{} must be a whole number of seconds, got '{}'",
                        key, raw
                    ))
                })
        })
        .transpose()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing environment variable: {0}")]
    MissingEnvironmentVariable(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
