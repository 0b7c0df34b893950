#![allow(dead_code)]

use async_trait::async_trait;
use fxstream::core::kernel::{ConnectOptions, Signer, Transport, TransportEvent};
use fxstream::{AuthHeaders, StreamError};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// Everything a session did to its transport, in call order
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Connect {
        url: String,
        namespace: String,
        reconnect: bool,
        timestamp: String,
        signature: String,
    },
    Emit {
        event: String,
        payload: Value,
    },
    Poll,
    Close,
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn new_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

pub fn snapshot(log: &CallLog) -> Vec<Call> {
    log.lock().unwrap().clone()
}

/// In-memory transport driven by a channel of scripted events
pub struct FakeTransport {
    log: CallLog,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    connect_error: Option<StreamError>,
    failing_emits: VecDeque<bool>,
}

impl FakeTransport {
    /// Transport plus the sender that feeds its inbound events
    pub fn new(log: CallLog) -> (Self, mpsc::UnboundedSender<TransportEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                log,
                events: rx,
                connect_error: None,
                failing_emits: VecDeque::new(),
            },
            tx,
        )
    }

    /// Transport whose event stream is exactly `events`, then ends
    pub fn scripted(log: CallLog, events: Vec<TransportEvent>) -> Self {
        let (transport, tx) = Self::new(log);
        for event in events {
            tx.send(event).unwrap();
        }
        transport
    }

    pub fn failing_connect(mut self, error: StreamError) -> Self {
        self.connect_error = Some(error);
        self
    }

    /// Fail the emit at position `index` (0-based)
    pub fn failing_emit_at(mut self, index: usize) -> Self {
        self.failing_emits = (0..=index).map(|i| i == index).collect();
        self
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn connect(
        &mut self,
        url: &str,
        headers: &AuthHeaders,
        options: &ConnectOptions,
    ) -> Result<(), StreamError> {
        self.log.lock().unwrap().push(Call::Connect {
            url: url.to_string(),
            namespace: options.namespace.clone(),
            reconnect: options.reconnect,
            timestamp: headers.timestamp.clone(),
            signature: headers.signature.clone(),
        });
        match self.connect_error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn emit(&mut self, event: &str, payload: Value) -> Result<(), StreamError> {
        if self.failing_emits.pop_front().unwrap_or(false) {
            return Err(StreamError::TransportError("socket closed".to_string()));
        }
        self.log.lock().unwrap().push(Call::Emit {
            event: event.to_string(),
            payload,
        });
        Ok(())
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        self.log.lock().unwrap().push(Call::Poll);
        self.events.recv().await
    }

    async fn close(&mut self) -> Result<(), StreamError> {
        self.log.lock().unwrap().push(Call::Close);
        self.events.close();
        Ok(())
    }
}

/// Signer that always fails, as a corrupted secret would
pub struct FailingSigner;

impl Signer for FailingSigner {
    fn sign_handshake(&self) -> Result<AuthHeaders, StreamError> {
        Err(StreamError::CryptoError("key rejected".to_string()))
    }
}
