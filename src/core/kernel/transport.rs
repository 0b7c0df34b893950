use crate::core::errors::StreamError;
use crate::core::types::AuthHeaders;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// Options applied when a transport opens its connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Socket.IO namespace to join once the engine is open
    pub namespace: String,
    /// Whether the transport may reconnect on its own
    ///
    /// A transport-driven reconnect would replay the original headers, whose
    /// timestamp is stale by then, so sessions always pass `false`.
    pub reconnect: bool,
}

impl ConnectOptions {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            reconnect: false,
        }
    }
}

/// Typed inbound event posted by a transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Namespace joined, the session may subscribe
    Connected,
    /// Connection is gone; no further events follow
    Disconnected(String),
    /// Server refused the namespace connection
    ConnectError(Value),
    /// Subscription acknowledgement
    Response(Value),
    /// Market-data update
    Stream(Value),
    /// Server-side error report
    Error(Value),
    /// Any other named event
    Other { event: String, payload: Value },
}

impl TransportEvent {
    /// Map a Socket.IO event name and its arguments onto a typed event
    pub fn from_socket_event(event: &str, mut args: Vec<Value>) -> Self {
        let payload = match args.len() {
            0 => Value::Null,
            1 => args.remove(0),
            _ => Value::Array(args),
        };

        match event {
            "response" => Self::Response(payload),
            "stream" => Self::Stream(payload),
            "error" => Self::Error(payload),
            "connect_error" => Self::ConnectError(payload),
            other => Self::Other {
                event: other.to_string(),
                payload,
            },
        }
    }

    /// Socket.IO event name this variant corresponds to
    pub fn name(&self) -> &str {
        match self {
            Self::Connected => "connect",
            Self::Disconnected(_) => "disconnect",
            Self::ConnectError(_) => "connect_error",
            Self::Response(_) => "response",
            Self::Stream(_) => "stream",
            Self::Error(_) => "error",
            Self::Other { event, .. } => event,
        }
    }
}

impl fmt::Display for TransportEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => f.write_str("connect"),
            Self::Disconnected(reason) => write!(f, "disconnect: {}", reason),
            Self::ConnectError(payload)
            | Self::Response(payload)
            | Self::Stream(payload)
            | Self::Error(payload)
            | Self::Other { payload, .. } => write!(f, "{}: {}", self.name(), payload),
        }
    }
}

/// Event-addressable bidirectional channel to the stream service
///
/// Implementations post inbound events in arrival order and never reconnect
/// on their own. `next_event` returns `None` once the connection is fully
/// torn down.
#[async_trait]
pub trait Transport: Send {
    /// Open the connection, attaching `headers` to the handshake
    async fn connect(
        &mut self,
        url: &str,
        headers: &AuthHeaders,
        options: &ConnectOptions,
    ) -> Result<(), StreamError>;

    /// Send a named event with a JSON payload
    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), StreamError>;

    /// Receive the next inbound event
    async fn next_event(&mut self) -> Option<TransportEvent>;

    /// Close the connection and wait until it is fully shut down
    async fn close(&mut self) -> Result<(), StreamError>;
}

/// Creates one fresh transport per connection attempt
pub trait TransportFactory: Send + Sync {
    type Transport: Transport + 'static;

    fn create(&self) -> Self::Transport;
}

impl<F, T> TransportFactory for F
where
    F: Fn() -> T + Send + Sync,
    T: Transport + 'static,
{
    type Transport = T;

    fn create(&self) -> T {
        self()
    }
}
