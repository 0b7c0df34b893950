use crate::core::errors::StreamError;
use crate::core::kernel::signer::Signer;
use crate::core::kernel::transport::{ConnectOptions, Transport, TransportEvent, TransportFactory};
use crate::core::traits::SessionConnector;
use crate::core::types::{CloseReason, SessionState, SessionSummary, SubscriptionRequest};
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

pub const SUBSCRIBE_EVENT: &str = "subscribe";

/// Owns one transport connection from handshake to close
///
/// State moves `Idle -> Connecting -> Open -> Closed`; a `connect_error`
/// closes the session from any state. On every `connect` event the
/// subscription requests are emitted in order, before the next inbound
/// event is looked at.
pub struct SessionManager<T: Transport> {
    transport: T,
    signer: Arc<dyn Signer>,
    url: String,
    options: ConnectOptions,
    requests: Arc<[SubscriptionRequest]>,
}

impl<T: Transport + 'static> SessionManager<T> {
    pub fn new(
        transport: T,
        signer: Arc<dyn Signer>,
        url: impl Into<String>,
        namespace: impl Into<String>,
        requests: Arc<[SubscriptionRequest]>,
    ) -> Self {
        Self {
            transport,
            signer,
            url: url.into(),
            options: ConnectOptions::new(namespace),
            requests,
        }
    }

    /// Sign and open the connection, returning a handle to the running session
    ///
    /// Headers are signed immediately before the handshake, so each attempt
    /// carries its own timestamp. A signing failure surfaces here before any
    /// network I/O happens.
    #[instrument(skip(self, cancel), fields(url = %self.url, namespace = %self.options.namespace))]
    pub async fn open(mut self, cancel: CancellationToken) -> Result<SessionHandle, StreamError> {
        let (state_tx, state_rx) = watch::channel(SessionState::Idle);
        state_tx.send_replace(SessionState::Connecting);

        let connected = match self.signer.sign_handshake() {
            Ok(headers) => {
                self.transport
                    .connect(&self.url, &headers, &self.options)
                    .await
            }
            Err(e) => Err(e),
        };
        if let Err(e) = connected {
            state_tx.send_replace(SessionState::Closed);
            return Err(e);
        }

        let cancel = cancel.child_token();
        let task = tokio::spawn(self.run(state_tx, cancel.clone()));

        Ok(SessionHandle {
            state: state_rx,
            task,
            cancel,
        })
    }

    /// Open the session and block until it closes for any reason
    pub async fn connect(self, cancel: CancellationToken) -> Result<SessionSummary, StreamError> {
        self.open(cancel).await?.wait_closed().await
    }

    async fn run(
        mut self,
        state: watch::Sender<SessionState>,
        cancel: CancellationToken,
    ) -> SessionSummary {
        let mut summary = SessionSummary {
            subscriptions_sent: 0,
            events_received: 0,
            reached_open: false,
            close_reason: CloseReason::StreamEnded,
        };

        summary.close_reason = loop {
            let event = tokio::select! {
                biased;
                () = cancel.cancelled() => break CloseReason::Cancelled,
                event = self.transport.next_event() => event,
            };
            let Some(event) = event else {
                break CloseReason::StreamEnded;
            };
            summary.events_received += 1;

            match event {
                TransportEvent::Connected => {
                    info!("Server connected");
                    state.send_replace(SessionState::Open);
                    summary.reached_open = true;
                    summary.subscriptions_sent += self.subscribe_all().await;
                    info!(count = summary.subscriptions_sent, "Finished subscribing");
                }
                TransportEvent::Disconnected(reason) => {
                    info!(reason = %reason, "Server disconnected");
                    break CloseReason::Disconnected(reason);
                }
                TransportEvent::ConnectError(payload) => {
                    warn!(payload = %payload, "Cannot connect to the server");
                    break CloseReason::ConnectRefused(payload.to_string());
                }
                TransportEvent::Response(payload) => {
                    info!(payload = %payload, "Client received response");
                }
                TransportEvent::Stream(payload) => {
                    info!(payload = %payload, "Streaming update");
                }
                TransportEvent::Error(payload) => {
                    error!(payload = %payload, "Server error");
                }
                TransportEvent::Other { event, payload } => {
                    debug!(event = %event, payload = %payload, "Unhandled event");
                }
            }
        };

        if let Err(e) = self.transport.close().await {
            warn!("Failed to close transport cleanly: {}", e);
        }
        state.send_replace(SessionState::Closed);
        info!(reason = %summary.close_reason, "Session closed");

        summary
    }

    /// Emit every request in builder order; stops at the first failed send
    async fn subscribe_all(&mut self) -> usize {
        let requests = Arc::clone(&self.requests);
        let mut sent = 0;

        for request in requests.iter() {
            let payload = match serde_json::to_value(request) {
                Ok(payload) => payload,
                Err(e) => {
                    error!(pair = %request.pair, "Failed to encode subscription: {}", e);
                    continue;
                }
            };

            if let Err(e) = self.transport.emit(SUBSCRIBE_EVENT, payload).await {
                warn!(pair = %request.pair, "Failed to send subscription: {}", e);
                break;
            }
            debug!(pair = %request.pair, request_id = %request.request_id, "Subscription sent");
            sent += 1;
        }

        sent
    }
}

/// Handle to a running session
pub struct SessionHandle {
    state: watch::Receiver<SessionState>,
    task: JoinHandle<SessionSummary>,
    cancel: CancellationToken,
}

impl SessionHandle {
    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Subscribe to state transitions
    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.state.clone()
    }

    /// Ask the session to close; `wait_closed` returns once it has
    pub fn close(&self) {
        self.cancel.cancel();
    }

    /// Wait until the transport is fully closed
    pub async fn wait_closed(self) -> Result<SessionSummary, StreamError> {
        self.task
            .await
            .map_err(|e| StreamError::TransportError(format!("Session task failed: {}", e)))
    }
}

/// Builds a fresh `SessionManager` per attempt from a transport factory
pub struct StreamConnector<F: TransportFactory> {
    factory: F,
    signer: Arc<dyn Signer>,
    url: String,
    namespace: String,
}

impl<F: TransportFactory> StreamConnector<F> {
    pub fn new(
        factory: F,
        signer: Arc<dyn Signer>,
        url: impl Into<String>,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            factory,
            signer,
            url: url.into(),
            namespace: namespace.into(),
        }
    }
}

#[async_trait]
impl<F: TransportFactory> SessionConnector for StreamConnector<F> {
    async fn run_session(
        &self,
        requests: Arc<[SubscriptionRequest]>,
        cancel: CancellationToken,
    ) -> Result<SessionSummary, StreamError> {
        SessionManager::new(
            self.factory.create(),
            Arc::clone(&self.signer),
            self.url.clone(),
            self.namespace.clone(),
            requests,
        )
        .connect(cancel)
        .await
    }
}
