use crate::core::config::StreamConfig;
use crate::core::errors::StreamError;
use crate::core::types::AuthHeaders;
use base64::engine::general_purpose;
use base64::Engine;
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretVec};
use sha2::Sha256;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

type HmacSha256 = Hmac<Sha256>;

/// Request line covered by the handshake signature
pub const HANDSHAKE_PREHASH_SUFFIX: &str = "GET/socket.io/";

/// Source of wall-clock time for timestamps
pub trait Clock: Send + Sync {
    /// Time elapsed since the Unix epoch
    fn now(&self) -> Duration;
}

/// Wall-clock time with strictly increasing microsecond readings.
///
/// Two reads inside the same microsecond (or a clock step backwards) would
/// otherwise yield the same timestamp, and with it the same signature.
#[derive(Debug, Default)]
pub struct SystemClock {
    last_micros: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        let wall = u64::try_from(chrono::Utc::now().timestamp_micros()).unwrap_or_default();
        let mut previous = self.last_micros.load(Ordering::Relaxed);
        loop {
            let next = wall.max(previous + 1);
            match self.last_micros.compare_exchange_weak(
                previous,
                next,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Duration::from_micros(next),
                Err(actual) => previous = actual,
            }
        }
    }
}

/// Clock frozen at one instant, for reproducible signatures
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub Duration);

impl Clock for FixedClock {
    fn now(&self) -> Duration {
        self.0
    }
}

/// Format seconds since epoch with exactly six fractional digits.
///
/// Built from integer parts so the output never depends on locale or
/// floating-point rounding.
pub fn format_timestamp(since_epoch: Duration) -> String {
    format!(
        "{}.{:06}",
        since_epoch.as_secs(),
        since_epoch.subsec_micros()
    )
}

/// Produces the authentication headers for one connection attempt
pub trait Signer: Send + Sync {
    fn sign_handshake(&self) -> Result<AuthHeaders, StreamError>;
}

/// HMAC-SHA256 signer for the Socket.IO handshake
pub struct HmacSigner {
    api_key: String,
    secret: SecretVec<u8>,
    passphrase: String,
    clock: Arc<dyn Clock>,
}

impl HmacSigner {
    /// Create a new signer, decoding the base64 secret up front
    ///
    /// # Arguments
    /// * `api_key` - API key issued by the service
    /// * `secret_key` - Standard base64 encoded secret
    /// * `passphrase` - Passphrase chosen when the key was created
    pub fn new(api_key: String, secret_key: &str, passphrase: String) -> Result<Self, StreamError> {
        let decoded = general_purpose::STANDARD.decode(secret_key.trim())?;
        Ok(Self {
            api_key,
            secret: SecretVec::new(decoded),
            passphrase,
            clock: Arc::new(SystemClock::new()),
        })
    }

    pub fn from_config(config: &StreamConfig) -> Result<Self, StreamError> {
        Self::new(
            config.api_key().to_string(),
            config.secret_key(),
            config.passphrase().to_string(),
        )
    }

    /// Replace the time source (tests inject a `FixedClock`)
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sign the handshake for an explicit timestamp
    pub fn sign_at(&self, timestamp: &str) -> Result<AuthHeaders, StreamError> {
        let signature = sign_message(
            self.secret.expose_secret(),
            &format!("{}{}", timestamp, HANDSHAKE_PREHASH_SUFFIX),
        )?;

        Ok(AuthHeaders {
            signature,
            timestamp: timestamp.to_string(),
            key: self.api_key.clone(),
            passphrase: self.passphrase.clone(),
            content_type: "application/json".to_string(),
        })
    }
}

impl Signer for HmacSigner {
    fn sign_handshake(&self) -> Result<AuthHeaders, StreamError> {
        let timestamp = format_timestamp(self.clock.now());
        self.sign_at(&timestamp)
    }
}

/// HMAC-SHA256 over `message`, base64 encoded without line wrapping
pub fn sign_message(key: &[u8], message: &str) -> Result<String, StreamError> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| StreamError::CryptoError(format!("Failed to create HMAC: {}", e)))?;
    mac.update(message.as_bytes());
    Ok(general_purpose::STANDARD.encode(mac.finalize().into_bytes()))
}

/// Build handshake headers using the current wall-clock time
pub fn create_headers(
    api_key: &str,
    secret_key: &str,
    passphrase: &str,
) -> Result<AuthHeaders, StreamError> {
    HmacSigner::new(api_key.to_string(), secret_key, passphrase.to_string())?.sign_handshake()
}

/// Build handshake headers for a caller-supplied timestamp
pub fn create_headers_at(
    api_key: &str,
    secret_key: &str,
    passphrase: &str,
    timestamp: &str,
) -> Result<AuthHeaders, StreamError> {
    HmacSigner::new(api_key.to_string(), secret_key, passphrase.to_string())?.sign_at(timestamp)
}
