use crate::core::errors::StreamError;
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

pub const HEADER_SIGN: &str = "FX-ACCESS-SIGN";
pub const HEADER_TIMESTAMP: &str = "FX-ACCESS-TIMESTAMP";
pub const HEADER_KEY: &str = "FX-ACCESS-KEY";
pub const HEADER_PASSPHRASE: &str = "FX-ACCESS-PASSPHRASE";
pub const HEADER_CONTENT_TYPE: &str = "Content-Type";

/// Handshake headers proving possession of the API secret.
///
/// Built fresh for every connection attempt: the timestamp is part of the
/// signed message, so a set of headers is only valid for the attempt it was
/// created for.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub signature: String,
    pub timestamp: String,
    pub key: String,
    pub passphrase: String,
    pub content_type: String,
}

impl AuthHeaders {
    /// Look up a header value by its wire name
    pub fn get(&self, name: &str) -> Option<&str> {
        self.iter()
            .find(|(header, _)| header.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    }

    /// Iterate over `(header name, value)` pairs in a fixed order
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        [
            (HEADER_SIGN, self.signature.as_str()),
            (HEADER_TIMESTAMP, self.timestamp.as_str()),
            (HEADER_KEY, self.key.as_str()),
            (HEADER_PASSPHRASE, self.passphrase.as_str()),
            (HEADER_CONTENT_TYPE, self.content_type.as_str()),
        ]
        .into_iter()
    }
}

// Never expose the signature or passphrase through Debug output
impl fmt::Debug for AuthHeaders {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthHeaders")
            .field("signature", &"[REDACTED]")
            .field("timestamp", &self.timestamp)
            .field("key", &self.key)
            .field("passphrase", &"[REDACTED]")
            .field("content_type", &self.content_type)
            .finish()
    }
}

/// A traded instrument such as `BTC/USD`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InstrumentPair {
    #[serde(rename = "base_token")]
    pub base: String,
    #[serde(rename = "quote_token")]
    pub quote: String,
}

impl InstrumentPair {
    /// Parse a `BASE/QUOTE` literal, splitting on the first `/`
    pub fn parse(literal: &str) -> Result<Self, StreamError> {
        let (base, quote) = literal.split_once('/').ok_or_else(|| {
            StreamError::ParseError(format!(
                "Instrument pair '{}' is missing the '/' delimiter",
                literal
            ))
        })?;

        let base = base.trim();
        let quote = quote.trim();
        if base.is_empty() || quote.is_empty() {
            return Err(StreamError::ParseError(format!(
                "Instrument pair '{}' has an empty base or quote token",
                literal
            )));
        }

        Ok(Self {
            base: base.to_string(),
            quote: quote.to_string(),
        })
    }
}

impl fmt::Display for InstrumentPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.quote)
    }
}

/// Payload of one outbound `subscribe` event
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubscriptionRequest {
    #[serde(rename = "token_pair")]
    pub pair: InstrumentPair,
    #[serde(rename = "quantity")]
    pub depth_levels: Vec<u32>,
    pub quantity_token: String,
    #[serde(rename = "client_request_id")]
    pub request_id: Uuid,
    pub echo_id: bool,
}

impl SubscriptionRequest {
    pub fn new(pair: InstrumentPair, depth_levels: Vec<u32>) -> Self {
        let quantity_token = pair.base.clone();
        Self {
            pair,
            depth_levels,
            quantity_token,
            request_id: Uuid::new_v4(),
            echo_id: true,
        }
    }

    /// Same request with a newly generated client request id
    pub fn with_fresh_id(&self) -> Self {
        Self {
            request_id: Uuid::new_v4(),
            ..self.clone()
        }
    }
}

/// Lifecycle of a single transport session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Open => "open",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// How client request ids behave across reconnects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestIdPolicy {
    /// Ids are generated once per process and replayed on every reconnect
    #[default]
    Stable,
    /// Every connection attempt subscribes with newly generated ids
    PerConnection,
}

impl std::str::FromStr for RequestIdPolicy {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "stable" => Ok(Self::Stable),
            "per-connection" | "per_connection" | "fresh" => Ok(Self::PerConnection),
            other => Err(StreamError::ParseError(format!(
                "Unknown request id policy: {}",
                other
            ))),
        }
    }
}

/// Engine.IO protocol revision spoken by the server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EngineIoVersion {
    /// Client drives the heartbeat
    V3,
    /// Server drives the heartbeat
    #[default]
    V4,
}

impl EngineIoVersion {
    pub const fn as_query_value(self) -> &'static str {
        match self {
            Self::V3 => "3",
            Self::V4 => "4",
        }
    }
}

impl std::str::FromStr for EngineIoVersion {
    type Err = StreamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "3" | "v3" => Ok(Self::V3),
            "4" | "v4" => Ok(Self::V4),
            other => Err(StreamError::ParseError(format!(
                "Unsupported Engine.IO version: {}",
                other
            ))),
        }
    }
}

/// Wait applied between a closed session and the next attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Same cool-down before every attempt
    Fixed(Duration),
    /// Doubling delay with jitter, capped at `max`, reset after a session opens
    Exponential { initial: Duration, max: Duration },
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self::Fixed(Duration::from_secs(5))
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// Transport reported a disconnect
    Disconnected(String),
    /// Server refused to join the namespace
    ConnectRefused(String),
    /// Event stream ended without an explicit disconnect
    StreamEnded,
    /// Shutdown was requested locally
    Cancelled,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected(reason) => write!(f, "disconnected ({})", reason),
            Self::ConnectRefused(payload) => write!(f, "connect refused ({})", payload),
            Self::StreamEnded => f.write_str("stream ended"),
            Self::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Outcome of one connection from open to close
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub subscriptions_sent: usize,
    pub events_received: u64,
    /// Whether the transport ever reported `connect`
    pub reached_open: bool,
    pub close_reason: CloseReason,
}
