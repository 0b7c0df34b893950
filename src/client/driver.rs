use crate::client::subscription::SubscriptionSet;
use crate::core::errors::StreamError;
use crate::core::traits::SessionConnector;
use crate::core::types::ReconnectPolicy;
use std::time::Duration;
use tokio::time::sleep;
use tokio_retry::strategy::{jitter, ExponentialBackoff, FixedInterval};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

const FALLBACK_DELAY: Duration = Duration::from_secs(5);

impl ReconnectPolicy {
    /// A fresh sequence of waits, one per failed or closed session
    pub fn delays(&self) -> Box<dyn Iterator<Item = Duration> + Send> {
        match self {
            Self::Fixed(delay) => Box::new(FixedInterval::new(*delay)),
            Self::Exponential { initial, max } => {
                // tokio-retry yields base^n * factor, so base 2 starts at `initial`
                let factor = (initial.as_millis() as u64 / 2).max(1);
                let max = *max;
                Box::new(
                    ExponentialBackoff::from_millis(2)
                        .factor(factor)
                        .max_delay(max)
                        // Half fixed, half random: spreads clients without ever dropping to zero
                        .map(|delay| delay / 2 + jitter(delay / 2)),
                )
            }
        }
    }
}

/// Outer loop that keeps exactly one session alive at a time
///
/// Each iteration runs a full session, then waits according to the
/// reconnect policy. Credential and configuration errors end the loop;
/// every transport-level failure is retried.
pub struct ReconnectDriver<C: SessionConnector> {
    connector: C,
    subscriptions: SubscriptionSet,
    policy: ReconnectPolicy,
    cancel: CancellationToken,
    attempts: u64,
}

impl<C: SessionConnector> ReconnectDriver<C> {
    pub fn new(connector: C, subscriptions: SubscriptionSet, policy: ReconnectPolicy) -> Self {
        Self {
            connector,
            subscriptions,
            policy,
            cancel: CancellationToken::new(),
            attempts: 0,
        }
    }

    /// Use an externally owned cancellation token
    #[must_use]
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that stops the driver (and the running session) when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of sessions started so far
    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    /// Run until cancelled (`Ok`) or until an unrecoverable error (`Err`)
    pub async fn run(&mut self) -> Result<(), StreamError> {
        let mut delays = self.policy.delays();

        loop {
            if self.cancel.is_cancelled() {
                info!("Shutdown requested, not reconnecting");
                return Ok(());
            }

            self.attempts += 1;
            let requests = self.subscriptions.for_attempt();
            info!(
                attempt = self.attempts,
                subscriptions = requests.len(),
                "Starting stream session"
            );

            match self
                .connector
                .run_session(requests, self.cancel.clone())
                .await
            {
                Ok(summary) => {
                    info!(
                        reason = %summary.close_reason,
                        events = summary.events_received,
                        subscriptions = summary.subscriptions_sent,
                        "Session ended"
                    );
                    if summary.reached_open {
                        delays = self.policy.delays();
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!("Unrecoverable error, giving up: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    warn!("Connection attempt failed: {}", e);
                }
            }

            let delay = delays.next().unwrap_or(FALLBACK_DELAY);
            info!("Waiting {:?} before reconnecting", delay);
            tokio::select! {
                () = self.cancel.cancelled() => {
                    info!("Shutdown requested during cool-down");
                    return Ok(());
                }
                () = sleep(delay) => {}
            }
        }
    }
}
