use crate::core::errors::StreamError;
use crate::core::kernel::codec::{EngineHandshake, EnginePacket, SocketIoCodec, SocketPacket, WsCodec};
use crate::core::kernel::transport::{ConnectOptions, Transport, TransportEvent};
use crate::core::types::{AuthHeaders, EngineIoVersion};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep_until, Instant};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderName, HeaderValue, StatusCode};
use tokio_tungstenite::tungstenite::{protocol::Message, Error as WsError};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument, warn};

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// WebSocket transport configuration
#[derive(Debug, Clone)]
pub struct WsConfig {
    /// Connection timeout in milliseconds, covering the upgrade and the Engine.IO open packet
    pub connect_timeout_ms: u64,
    /// Capacity of the inbound event and outbound frame queues
    pub event_buffer_size: usize,
    /// Engine.IO revision spoken by the server
    pub engine_io: EngineIoVersion,
}

impl Default for WsConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000, // 10 seconds
            event_buffer_size: 1024,
            engine_io: EngineIoVersion::V4,
        }
    }
}

/// Build the Engine.IO WebSocket endpoint for a service base URL
///
/// `https://host` becomes `wss://host/socket.io/?EIO=4&transport=websocket`.
pub fn engine_io_url(base_url: &str, version: EngineIoVersion) -> Result<String, StreamError> {
    let (scheme, rest) = base_url.split_once("://").ok_or_else(|| {
        StreamError::ParseError(format!("Stream URL without a scheme: {}", base_url))
    })?;

    let ws_scheme = match scheme {
        "https" | "wss" => "wss",
        "http" | "ws" => "ws",
        other => {
            return Err(StreamError::ParseError(format!(
                "Unsupported stream URL scheme: {}",
                other
            )))
        }
    };

    let host = rest.trim_end_matches('/');
    if host.is_empty() {
        return Err(StreamError::ParseError(format!(
            "Stream URL without a host: {}",
            base_url
        )));
    }

    Ok(format!(
        "{}://{}/socket.io/?EIO={}&transport=websocket",
        ws_scheme,
        host,
        version.as_query_value()
    ))
}

fn map_handshake_error(error: WsError) -> StreamError {
    match error {
        WsError::Http(response) => {
            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                StreamError::AuthRejected(format!("handshake refused with HTTP {}", status))
            } else {
                StreamError::TransportError(format!("handshake failed with HTTP {}", status))
            }
        }
        other => StreamError::TransportError(format!("WebSocket connection failed: {}", other)),
    }
}

enum Outbound {
    Frame(Message),
    Close,
}

/// Socket.IO client transport over tokio-tungstenite
///
/// One I/O task owns the socket: it answers heartbeats, writes queued
/// frames and posts typed events in arrival order.
pub struct SocketIoWs {
    config: WsConfig,
    codec: Option<SocketIoCodec>,
    outbound: Option<mpsc::Sender<Outbound>>,
    events: Option<mpsc::Receiver<TransportEvent>>,
    io_task: Option<JoinHandle<()>>,
}

impl SocketIoWs {
    pub fn new(config: WsConfig) -> Self {
        Self {
            config,
            codec: None,
            outbound: None,
            events: None,
            io_task: None,
        }
    }

    async fn read_open(
        stream: &mut WsStream,
        codec: &SocketIoCodec,
    ) -> Result<EngineHandshake, StreamError> {
        while let Some(frame) = stream.next().await {
            let frame = frame
                .map_err(|e| StreamError::TransportError(format!("WebSocket error: {}", e)))?;
            if let Some(EnginePacket::Open(handshake)) = codec.decode_message(frame)? {
                return Ok(handshake);
            }
        }

        Err(StreamError::TransportError(
            "Connection closed before the Engine.IO handshake".to_string(),
        ))
    }
}

impl Default for SocketIoWs {
    fn default() -> Self {
        Self::new(WsConfig::default())
    }
}

#[async_trait]
impl Transport for SocketIoWs {
    #[instrument(skip(self, headers, options), fields(url = %url, namespace = %options.namespace))]
    async fn connect(
        &mut self,
        url: &str,
        headers: &AuthHeaders,
        options: &ConnectOptions,
    ) -> Result<(), StreamError> {
        if options.reconnect {
            warn!("Transport-level reconnection is not supported and stays disabled");
        }

        let endpoint = engine_io_url(url, self.config.engine_io)?;
        let mut request = endpoint
            .as_str()
            .into_client_request()
            .map_err(|e| StreamError::TransportError(format!("Invalid request: {}", e)))?;

        for (name, value) in headers.iter() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| StreamError::TransportError(format!("Invalid header name: {}", e)))?;
            let value = HeaderValue::from_str(value).map_err(|e| {
                StreamError::TransportError(format!("Invalid value for header {}: {}", name, e))
            })?;
            request.headers_mut().insert(name, value);
        }

        let connect_timeout = Duration::from_millis(self.config.connect_timeout_ms);
        let (mut stream, _) = tokio::time::timeout(connect_timeout, connect_async(request))
            .await
            .map_err(|_| {
                StreamError::ConnectionTimeout("WebSocket connection timeout".to_string())
            })?
            .map_err(map_handshake_error)?;

        let codec = SocketIoCodec::new(options.namespace.clone());
        let handshake = tokio::time::timeout(connect_timeout, Self::read_open(&mut stream, &codec))
            .await
            .map_err(|_| {
                StreamError::ConnectionTimeout("No Engine.IO open packet received".to_string())
            })??;
        debug!(sid = %handshake.sid, ping_interval_ms = handshake.ping_interval_ms, "Engine.IO session open");

        stream.send(codec.encode_connect()).await.map_err(|e| {
            StreamError::TransportError(format!("Failed to join namespace: {}", e))
        })?;

        let (outbound_tx, outbound_rx) = mpsc::channel(self.config.event_buffer_size);
        let (event_tx, event_rx) = mpsc::channel(self.config.event_buffer_size);

        let io = IoLoop {
            stream,
            codec: codec.clone(),
            handshake,
            engine_io: self.config.engine_io,
            outbound: outbound_rx,
            events: event_tx,
        };
        self.io_task = Some(tokio::spawn(io.run()));
        self.outbound = Some(outbound_tx);
        self.events = Some(event_rx);
        self.codec = Some(codec);

        Ok(())
    }

    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), StreamError> {
        let (codec, outbound) = match (self.codec.as_ref(), self.outbound.as_ref()) {
            (Some(codec), Some(outbound)) => (codec, outbound),
            _ => {
                return Err(StreamError::TransportError(
                    "WebSocket not connected".to_string(),
                ))
            }
        };

        let frame = codec.encode_event(event, &payload)?;
        outbound
            .send(Outbound::Frame(frame))
            .await
            .map_err(|_| StreamError::TransportError("WebSocket connection closed".to_string()))
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.events.as_mut()?.recv().await
    }

    #[instrument(skip(self))]
    async fn close(&mut self) -> Result<(), StreamError> {
        // Dropping the receiver first keeps the I/O task from blocking on a full queue
        self.events = None;
        if let Some(outbound) = self.outbound.take() {
            let _ = outbound.send(Outbound::Close).await;
        }
        if let Some(task) = self.io_task.take() {
            task.await
                .map_err(|e| StreamError::TransportError(format!("I/O task failed: {}", e)))?;
        }
        self.codec = None;
        Ok(())
    }
}

enum PacketAction {
    Continue,
    Reply(Message),
    Post(TransportEvent),
    PostAndClose(TransportEvent, &'static str),
    Close(&'static str),
}

struct IoLoop {
    stream: WsStream,
    codec: SocketIoCodec,
    handshake: EngineHandshake,
    engine_io: EngineIoVersion,
    outbound: mpsc::Receiver<Outbound>,
    events: mpsc::Sender<TransportEvent>,
}

impl IoLoop {
    async fn run(self) {
        let Self {
            mut stream,
            codec,
            handshake,
            engine_io,
            mut outbound,
            events,
        } = self;

        let ping_interval = Duration::from_millis(handshake.ping_interval_ms);
        let liveness = ping_interval + Duration::from_millis(handshake.ping_timeout_ms);
        let mut deadline = Instant::now() + liveness;
        let mut heartbeat = interval_at(Instant::now() + ping_interval, ping_interval);

        let reason = loop {
            tokio::select! {
                command = outbound.recv() => match command {
                    Some(Outbound::Frame(frame)) => {
                        if let Err(e) = stream.send(frame).await {
                            break format!("send failed: {}", e);
                        }
                    }
                    Some(Outbound::Close) | None => {
                        let _ = stream.send(codec.encode_disconnect()).await;
                        let _ = stream.close(None).await;
                        break "io client disconnect".to_string();
                    }
                },
                frame = stream.next() => match frame {
                    Some(Ok(Message::Close(_))) | None => break "transport close".to_string(),
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = stream.send(Message::Pong(data)).await {
                            warn!("Failed to send pong response: {}", e);
                        }
                    }
                    Some(Ok(message)) => match codec.decode_message(message) {
                        Ok(Some(packet)) => {
                            deadline = Instant::now() + liveness;
                            match handle_packet(&codec, packet) {
                                PacketAction::Continue => {}
                                PacketAction::Reply(frame) => {
                                    if let Err(e) = stream.send(frame).await {
                                        break format!("send failed: {}", e);
                                    }
                                }
                                PacketAction::Post(event) => {
                                    if events.send(event).await.is_err() {
                                        break "event receiver dropped".to_string();
                                    }
                                }
                                PacketAction::PostAndClose(event, reason) => {
                                    let _ = events.send(event).await;
                                    let _ = stream.close(None).await;
                                    break reason.to_string();
                                }
                                PacketAction::Close(reason) => {
                                    let _ = stream.close(None).await;
                                    break reason.to_string();
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(e) => warn!("Dropping undecodable frame: {}", e),
                    },
                    Some(Err(e)) => break format!("transport error: {}", e),
                },
                _ = heartbeat.tick(), if engine_io == EngineIoVersion::V3 => {
                    if let Err(e) = stream.send(SocketIoCodec::encode_ping()).await {
                        break format!("send failed: {}", e);
                    }
                },
                () = sleep_until(deadline) => break "ping timeout".to_string(),
            }
        };

        info!(reason = %reason, "Socket.IO transport closed");
        let _ = events.send(TransportEvent::Disconnected(reason)).await;
    }
}

fn handle_packet(codec: &SocketIoCodec, packet: EnginePacket) -> PacketAction {
    let ours = |namespace: &str| namespace == codec.namespace();

    match packet {
        EnginePacket::Close => PacketAction::Close("transport close"),
        EnginePacket::Ping(data) => PacketAction::Reply(SocketIoCodec::encode_pong(&data)),
        EnginePacket::Open(_) | EnginePacket::Pong(_) | EnginePacket::Upgrade | EnginePacket::Noop => {
            PacketAction::Continue
        }
        EnginePacket::Message(packet) => match packet {
            SocketPacket::Connect { namespace, .. } if ours(&namespace) => {
                PacketAction::Post(TransportEvent::Connected)
            }
            SocketPacket::Disconnect { namespace } if ours(&namespace) => {
                PacketAction::Close("io server disconnect")
            }
            SocketPacket::ConnectError { namespace, data } if ours(&namespace) => {
                PacketAction::PostAndClose(TransportEvent::ConnectError(data), "connect error")
            }
            SocketPacket::Event {
                namespace,
                event,
                args,
                ..
            } if ours(&namespace) => {
                PacketAction::Post(TransportEvent::from_socket_event(&event, args))
            }
            SocketPacket::Ack { id, .. } => {
                debug!(id, "Ignoring unsolicited ack");
                PacketAction::Continue
            }
            other => {
                debug!(packet = ?other, "Ignoring packet for another namespace");
                PacketAction::Continue
            }
        },
    }
}
