use thiserror::Error;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("Invalid base64 secret: {0}")]
    DecodeError(#[from] base64::DecodeError),

    #[error("Signing error: {0}")]
    CryptoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    /// Malformed Engine.IO / Socket.IO traffic from the server
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    #[error("Transport error: {0}")]
    TransportError(String),

    #[error("Connection timeout: {0}")]
    ConnectionTimeout(String),

    #[error("Authentication rejected: {0}")]
    AuthRejected(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(#[from] crate::core::config::ConfigError),
}

impl StreamError {
    /// Whether retrying can never succeed without operator intervention.
    ///
    /// Credential and configuration problems stop the reconnect loop instead
    /// of turning into a fast-fail retry storm. Everything that happens on the
    /// wire is retryable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::DecodeError(_)
                | Self::CryptoError(_)
                | Self::ParseError(_)
                | Self::AuthRejected(_)
                | Self::ConfigError(_)
        )
    }
}
