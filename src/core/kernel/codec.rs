use crate::core::errors::StreamError;
use serde_json::Value;
use tokio_tungstenite::tungstenite::Message;
use tracing::warn;

/// Codec trait for turning typed frames into WebSocket messages and back
///
/// Control frames (ping, pong, close) of the WebSocket layer itself are
/// handled by the transport and never reach the codec.
pub trait WsCodec: Send + Sync + 'static {
    /// The type representing parsed inbound frames
    type Message: Send + Sync;

    /// Encode a named event carrying a JSON payload
    fn encode_event(&self, event: &str, payload: &Value) -> Result<Message, StreamError>;

    /// Decode a raw WebSocket message
    ///
    /// # Returns
    /// - `Ok(Some(message))` - Successfully decoded message
    /// - `Ok(None)` - Message was ignored/filtered by codec
    /// - `Err(error)` - Failed to decode message
    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, StreamError>;
}

/// Session parameters announced by the server in the Engine.IO open packet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineHandshake {
    pub sid: String,
    pub ping_interval_ms: u64,
    pub ping_timeout_ms: u64,
}

impl EngineHandshake {
    fn from_json(text: &str) -> Result<Self, StreamError> {
        let value: Value = serde_json::from_str(text)?;
        let sid = value
            .get("sid")
            .and_then(Value::as_str)
            .ok_or_else(|| StreamError::ProtocolError("Open packet without sid".to_string()))?
            .to_string();

        Ok(Self {
            sid,
            ping_interval_ms: value
                .get("pingInterval")
                .and_then(Value::as_u64)
                .unwrap_or(25_000),
            ping_timeout_ms: value
                .get("pingTimeout")
                .and_then(Value::as_u64)
                .unwrap_or(20_000),
        })
    }
}

/// Engine.IO transport-level packet
#[derive(Debug, Clone, PartialEq)]
pub enum EnginePacket {
    Open(EngineHandshake),
    Close,
    Ping(String),
    Pong(String),
    Message(SocketPacket),
    Upgrade,
    Noop,
}

/// Socket.IO packet carried inside an Engine.IO message
#[derive(Debug, Clone, PartialEq)]
pub enum SocketPacket {
    Connect {
        namespace: String,
        data: Option<Value>,
    },
    Disconnect {
        namespace: String,
    },
    Event {
        namespace: String,
        id: Option<u64>,
        event: String,
        args: Vec<Value>,
    },
    Ack {
        namespace: String,
        id: u64,
        args: Vec<Value>,
    },
    ConnectError {
        namespace: String,
        data: Value,
    },
}

/// Engine.IO + Socket.IO text framing bound to one namespace
#[derive(Debug, Clone)]
pub struct SocketIoCodec {
    namespace: String,
}

impl SocketIoCodec {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Namespace prefix as it appears on the wire; the root namespace is implicit
    fn namespace_prefix(&self) -> String {
        if self.namespace == "/" {
            String::new()
        } else {
            format!("{},", self.namespace)
        }
    }

    /// Request to join the namespace
    pub fn encode_connect(&self) -> Message {
        Message::Text(format!("40{}", self.namespace_prefix()))
    }

    /// Leave the namespace
    pub fn encode_disconnect(&self) -> Message {
        Message::Text(format!("41{}", self.namespace_prefix()))
    }

    /// Engine.IO heartbeat probe (sent by the client under v3)
    pub fn encode_ping() -> Message {
        Message::Text("2".to_string())
    }

    /// Engine.IO heartbeat answer (sent by the client under v4)
    pub fn encode_pong(data: &str) -> Message {
        Message::Text(format!("3{}", data))
    }

    /// Parse a single Engine.IO text packet
    pub fn decode_packet(text: &str) -> Result<EnginePacket, StreamError> {
        let mut chars = text.chars();
        let kind = chars
            .next()
            .ok_or_else(|| StreamError::ProtocolError("Empty Engine.IO packet".to_string()))?;
        let rest = chars.as_str();

        match kind {
            '0' => Ok(EnginePacket::Open(EngineHandshake::from_json(rest)?)),
            '1' => Ok(EnginePacket::Close),
            '2' => Ok(EnginePacket::Ping(rest.to_string())),
            '3' => Ok(EnginePacket::Pong(rest.to_string())),
            '4' => Ok(EnginePacket::Message(decode_socket_packet(rest)?)),
            '5' => Ok(EnginePacket::Upgrade),
            '6' => Ok(EnginePacket::Noop),
            other => Err(StreamError::ProtocolError(format!(
                "Unknown Engine.IO packet type '{}'",
                other
            ))),
        }
    }
}

impl WsCodec for SocketIoCodec {
    type Message = EnginePacket;

    fn encode_event(&self, event: &str, payload: &Value) -> Result<Message, StreamError> {
        let body = serde_json::to_string(&Value::Array(vec![
            Value::String(event.to_string()),
            payload.clone(),
        ]))?;
        Ok(Message::Text(format!("42{}{}", self.namespace_prefix(), body)))
    }

    fn decode_message(&self, message: Message) -> Result<Option<Self::Message>, StreamError> {
        let text = match message {
            Message::Text(text) => text,
            Message::Binary(data) => {
                warn!(bytes = data.len(), "Binary Socket.IO frames are not supported");
                return Ok(None);
            }
            _ => return Ok(None),
        };

        Self::decode_packet(&text).map(Some)
    }
}

fn decode_socket_packet(text: &str) -> Result<SocketPacket, StreamError> {
    let mut chars = text.chars();
    let kind = chars
        .next()
        .ok_or_else(|| StreamError::ProtocolError("Empty Socket.IO packet".to_string()))?;
    let mut rest = chars.as_str();

    if matches!(kind, '5' | '6') {
        return Err(StreamError::ProtocolError(
            "Binary Socket.IO packets are not supported".to_string(),
        ));
    }

    // Optional namespace, terminated by ',' (or the end of the packet)
    let namespace = if rest.starts_with('/') {
        let end = rest.find(',').unwrap_or(rest.len());
        let namespace = rest[..end].to_string();
        rest = rest.get(end + 1..).unwrap_or("");
        namespace
    } else {
        "/".to_string()
    };

    // Optional ack id
    let digits = rest.chars().take_while(char::is_ascii_digit).count();
    let id = if digits > 0 {
        let id = rest[..digits]
            .parse::<u64>()
            .map_err(|e| StreamError::ProtocolError(format!("Invalid ack id: {}", e)))?;
        rest = &rest[digits..];
        Some(id)
    } else {
        None
    };

    let data = if rest.is_empty() {
        None
    } else {
        Some(serde_json::from_str::<Value>(rest)?)
    };

    match kind {
        '0' => Ok(SocketPacket::Connect { namespace, data }),
        '1' => Ok(SocketPacket::Disconnect { namespace }),
        '2' => {
            let mut args = match data {
                Some(Value::Array(args)) => args,
                _ => {
                    return Err(StreamError::ProtocolError(
                        "Event packet payload must be an array".to_string(),
                    ))
                }
            };
            if args.is_empty() {
                return Err(StreamError::ProtocolError(
                    "Event packet without an event name".to_string(),
                ));
            }
            let event = match args.remove(0) {
                Value::String(event) => event,
                other => {
                    return Err(StreamError::ProtocolError(format!(
                        "Event name must be a string, got {}",
                        other
                    )))
                }
            };
            Ok(SocketPacket::Event {
                namespace,
                id,
                event,
                args,
            })
        }
        '3' => {
            let id = id.ok_or_else(|| {
                StreamError::ProtocolError("Ack packet without an id".to_string())
            })?;
            let args = match data {
                Some(Value::Array(args)) => args,
                Some(other) => vec![other],
                None => Vec::new(),
            };
            Ok(SocketPacket::Ack { namespace, id, args })
        }
        // ERROR in Socket.IO protocol v4, CONNECT_ERROR in v5
        '4' => Ok(SocketPacket::ConnectError {
            namespace,
            data: data.unwrap_or(Value::Null),
        }),
        other => Err(StreamError::ProtocolError(format!(
            "Unknown Socket.IO packet type '{}'",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_decode_open() {
        let packet = SocketIoCodec::decode_packet(
            r#"0{"sid":"abc","upgrades":[],"pingInterval":25000,"pingTimeout":5000}"#,
        )
        .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Open(EngineHandshake {
                sid: "abc".to_string(),
                ping_interval_ms: 25_000,
                ping_timeout_ms: 5_000,
            })
        );
    }

    #[test]
    fn test_malformed_open_is_retryable() {
        let err = SocketIoCodec::decode_packet(r#"0{"pingInterval":25000}"#).unwrap_err();
        assert!(matches!(err, StreamError::ProtocolError(_)));
        assert!(!err.is_fatal());

        let err = SocketIoCodec::decode_packet("9").unwrap_err();
        assert!(!err.is_fatal());
    }

    #[test]
    fn test_decode_ping_and_close() {
        assert_eq!(
            SocketIoCodec::decode_packet("2").unwrap(),
            EnginePacket::Ping(String::new())
        );
        assert_eq!(
            SocketIoCodec::decode_packet("3probe").unwrap(),
            EnginePacket::Pong("probe".to_string())
        );
        assert_eq!(SocketIoCodec::decode_packet("1").unwrap(), EnginePacket::Close);
        assert!(SocketIoCodec::decode_packet("").is_err());
    }

    #[test]
    fn test_decode_namespace_connect() {
        let packet = SocketIoCodec::decode_packet(r#"40/streaming,{"sid":"xyz"}"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Connect {
                namespace: "/streaming".to_string(),
                data: Some(json!({"sid": "xyz"})),
            })
        );

        // Engine.IO v3 servers acknowledge without a payload or trailing comma
        let packet = SocketIoCodec::decode_packet("40/streaming").unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Connect {
                namespace: "/streaming".to_string(),
                data: None,
            })
        );
    }

    #[test]
    fn test_decode_event() {
        let packet = SocketIoCodec::decode_packet(
            r#"42/streaming,["stream",{"base_token":"BTC","sell_price":1.5}]"#,
        )
        .unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                namespace: "/streaming".to_string(),
                id: None,
                event: "stream".to_string(),
                args: vec![json!({"base_token": "BTC", "sell_price": 1.5})],
            })
        );
    }

    #[test]
    fn test_decode_event_with_ack_id_on_root_namespace() {
        let packet = SocketIoCodec::decode_packet(r#"4217["response","ok"]"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::Event {
                namespace: "/".to_string(),
                id: Some(17),
                event: "response".to_string(),
                args: vec![json!("ok")],
            })
        );
    }

    #[test]
    fn test_decode_connect_error() {
        let packet =
            SocketIoCodec::decode_packet(r#"44/streaming,{"message":"Not authorized"}"#).unwrap();
        assert_eq!(
            packet,
            EnginePacket::Message(SocketPacket::ConnectError {
                namespace: "/streaming".to_string(),
                data: json!({"message": "Not authorized"}),
            })
        );
    }

    #[test]
    fn test_decode_rejects_malformed_event() {
        assert!(SocketIoCodec::decode_packet(r#"42/streaming,{"not":"array"}"#).is_err());
        assert!(SocketIoCodec::decode_packet(r#"42/streaming,[]"#).is_err());
        assert!(SocketIoCodec::decode_packet(r#"42/streaming,[1,2]"#).is_err());
        assert!(SocketIoCodec::decode_packet("9").is_err());
    }

    #[test]
    fn test_encode_event() {
        let codec = SocketIoCodec::new("/streaming");
        let message = codec
            .encode_event("subscribe", &json!({"echo_id": true}))
            .unwrap();
        assert_eq!(
            message,
            Message::Text(r#"42/streaming,["subscribe",{"echo_id":true}]"#.to_string())
        );
    }

    #[test]
    fn test_encode_namespace_frames() {
        let codec = SocketIoCodec::new("/streaming");
        assert_eq!(codec.encode_connect(), Message::Text("40/streaming,".to_string()));
        assert_eq!(
            codec.encode_disconnect(),
            Message::Text("41/streaming,".to_string())
        );

        let root = SocketIoCodec::new("/");
        assert_eq!(root.encode_connect(), Message::Text("40".to_string()));
    }

    #[test]
    fn test_binary_frames_are_skipped() {
        let codec = SocketIoCodec::new("/streaming");
        assert_eq!(codec.decode_message(Message::Binary(vec![1, 2])).unwrap(), None);
    }
}
