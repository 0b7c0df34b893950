use crate::client::driver::ReconnectDriver;
use crate::client::session::StreamConnector;
use crate::client::subscription::SubscriptionSet;
use crate::core::config::StreamConfig;
use crate::core::errors::StreamError;
use crate::core::kernel::{HmacSigner, Signer, SocketIoWs, WsConfig};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_TOKEN_PAIR: &str = "BTC/USD";
pub const DEFAULT_DEPTH_LEVEL: u32 = 30;

/// Transport factory produced by the builder
pub type WsFactory = Box<dyn Fn() -> SocketIoWs + Send + Sync>;

/// Fully wired driver for the live service
pub type StreamClient = ReconnectDriver<StreamConnector<WsFactory>>;

/// Builder for the streaming client
///
/// Wires configuration into a signer, a WebSocket transport factory, a
/// session connector and finally the reconnect driver.
pub struct StreamClientBuilder {
    config: StreamConfig,
    token_pairs: Vec<String>,
    depth_levels: Vec<u32>,
    ws_config: WsConfig,
    signer: Option<Arc<dyn Signer>>,
    cancel: Option<CancellationToken>,
}

impl StreamClientBuilder {
    /// Create a builder for the default `BTC/USD` depth-30 subscription
    pub fn new(config: StreamConfig) -> Self {
        let ws_config = WsConfig {
            engine_io: config.engine_io,
            ..WsConfig::default()
        };
        Self {
            config,
            token_pairs: vec![DEFAULT_TOKEN_PAIR.to_string()],
            depth_levels: vec![DEFAULT_DEPTH_LEVEL],
            ws_config,
            signer: None,
            cancel: None,
        }
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: StreamConfig) -> Self {
        self.ws_config.engine_io = config.engine_io;
        self.config = config;
        self
    }

    /// Instrument pairs as `BASE/QUOTE` literals
    pub fn with_pairs<S: AsRef<str>>(mut self, pairs: &[S]) -> Self {
        self.token_pairs = pairs.iter().map(|p| p.as_ref().to_string()).collect();
        self
    }

    /// Depth levels shared by every subscription
    pub fn with_levels(mut self, levels: &[u32]) -> Self {
        self.depth_levels = levels.to_vec();
        self
    }

    /// Set the WebSocket connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.ws_config.connect_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Set the capacity of the transport event queue
    pub fn with_event_buffer_size(mut self, size: usize) -> Self {
        self.ws_config.event_buffer_size = size;
        self
    }

    /// Use a custom handshake signer instead of HMAC over the configured secret
    pub fn with_signer(mut self, signer: Arc<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    /// Stop the client when this token is cancelled
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Validate everything and build the reconnect driver
    ///
    /// Configuration, secret and instrument errors are reported here, before
    /// any connection attempt.
    pub fn build(self) -> Result<StreamClient, StreamError> {
        self.config.validate()?;

        let signer = match self.signer {
            Some(signer) => signer,
            None => Arc::new(HmacSigner::from_config(&self.config)?),
        };

        let subscriptions = SubscriptionSet::build(
            &self.token_pairs,
            &self.depth_levels,
            self.config.request_ids,
        )?;

        let ws_config = self.ws_config;
        let factory: WsFactory = Box::new(move || SocketIoWs::new(ws_config.clone()));
        let connector = StreamConnector::new(
            factory,
            signer,
            self.config.url.clone(),
            self.config.namespace.clone(),
        );

        let driver = ReconnectDriver::new(connector, subscriptions, self.config.reconnect.clone());
        Ok(match self.cancel {
            Some(cancel) => driver.with_cancellation(cancel),
            None => driver,
        })
    }
}
