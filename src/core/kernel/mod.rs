/// Kernel - transport and authentication layer for the stream client
///
/// The kernel contains everything needed to reach the service and nothing
/// about what to do once connected: signing, Socket.IO framing and the
/// WebSocket transport itself.
///
/// # Architecture
///
/// ## Authentication
/// - `Signer`: pluggable handshake signing interface
/// - `HmacSigner`: HMAC-SHA256 over `timestamp + "GET/socket.io/"`
/// - `Clock`: injectable time source (`SystemClock`, `FixedClock`)
///
/// ## Message Handling
/// - `WsCodec`: encoding/decoding of WebSocket frames
/// - `SocketIoCodec`: Engine.IO + Socket.IO text packets for one namespace
///
/// ## Transport Layer
/// - `Transport`: event-addressable channel (`connect`/`emit`/`next_event`/`close`)
/// - `SocketIoWs`: tokio-tungstenite implementation, never reconnects by itself
/// - `TransportFactory`: one fresh transport per connection attempt
///
/// # Signing a handshake
/// ```rust,no_run
/// use fxstream::core::kernel::*;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), fxstream::StreamError> {
/// let signer = HmacSigner::new("api_key".to_string(), "c2VjcmV0", "passphrase".to_string())?
///     .with_clock(Arc::new(FixedClock(Duration::from_secs(1_700_000_000))));
/// let headers = signer.sign_handshake()?;
/// assert_eq!(headers.timestamp, "1700000000.000000");
/// # Ok(())
/// # }
/// ```
///
/// # Opening a transport
/// ```rust,no_run
/// use fxstream::core::kernel::*;
///
/// # async fn example() -> Result<(), fxstream::StreamError> {
/// let headers = create_headers("api_key", "c2VjcmV0", "passphrase")?;
/// let mut ws = SocketIoWs::new(WsConfig::default());
/// ws.connect("https://stream.falconx.io", &headers, &ConnectOptions::new("/streaming"))
///     .await?;
/// while let Some(event) = ws.next_event().await {
///     println!("{}", event);
/// }
/// # Ok(())
/// # }
/// ```
pub mod codec;
pub mod signer;
pub mod transport;
pub mod ws;

// Re-export key types for convenience
pub use codec::{EngineHandshake, EnginePacket, SocketIoCodec, SocketPacket, WsCodec};
pub use signer::{
    create_headers, create_headers_at, format_timestamp, Clock, FixedClock, HmacSigner, Signer,
    SystemClock,
};
pub use transport::{ConnectOptions, Transport, TransportEvent, TransportFactory};
pub use ws::{engine_io_url, SocketIoWs, WsConfig};
