use crate::core::{
    errors::StreamError,
    types::{SessionSummary, SubscriptionRequest},
};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Runs one complete streaming session per call
///
/// The reconnect driver only depends on this seam, so it can be exercised
/// against a fake that closes instantly.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Sign, connect, replay `requests` on open and return once the session closes
    ///
    /// Returns `Err` only when the session could not be established at all.
    async fn run_session(
        &self,
        requests: Arc<[SubscriptionRequest]>,
        cancel: CancellationToken,
    ) -> Result<SessionSummary, StreamError>;
}
