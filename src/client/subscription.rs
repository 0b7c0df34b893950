use crate::core::errors::StreamError;
use crate::core::types::{InstrumentPair, RequestIdPolicy, SubscriptionRequest};
use std::sync::Arc;

/// Build one subscription request per `BASE/QUOTE` literal, in input order
///
/// Every request shares `depth_levels`, quotes quantities in its own base
/// token and carries a newly generated client request id.
pub fn build(
    token_pairs: &[impl AsRef<str>],
    depth_levels: &[u32],
) -> Result<Vec<SubscriptionRequest>, StreamError> {
    token_pairs
        .iter()
        .map(|literal| {
            let pair = InstrumentPair::parse(literal.as_ref())?;
            Ok(SubscriptionRequest::new(pair, depth_levels.to_vec()))
        })
        .collect()
}

/// Split a comma separated list of instrument pairs (`BTC/USD,ETH/USD`)
pub fn parse_token_pairs(raw: &str) -> Result<Vec<String>, StreamError> {
    let pairs: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .map(str::to_string)
        .collect();

    if pairs.is_empty() {
        return Err(StreamError::ParseError(
            "At least one instrument pair is required".to_string(),
        ));
    }

    Ok(pairs)
}

/// Parse a comma separated list of integer depth levels (`1,5,30`)
pub fn parse_depth_levels(raw: &str) -> Result<Vec<u32>, StreamError> {
    raw.split(',')
        .map(str::trim)
        .filter(|level| !level.is_empty())
        .map(|level| {
            level.parse::<u32>().map_err(|e| {
                StreamError::ParseError(format!("Invalid depth level '{}': {}", level, e))
            })
        })
        .collect::<Result<Vec<_>, _>>()
        .and_then(|levels| {
            if levels.is_empty() {
                Err(StreamError::ParseError(
                    "At least one depth level is required".to_string(),
                ))
            } else {
                Ok(levels)
            }
        })
}

/// The subscriptions replayed on every successful connect
#[derive(Debug, Clone)]
pub struct SubscriptionSet {
    requests: Arc<[SubscriptionRequest]>,
    policy: RequestIdPolicy,
}

impl SubscriptionSet {
    pub fn new(requests: Vec<SubscriptionRequest>, policy: RequestIdPolicy) -> Self {
        Self {
            requests: requests.into(),
            policy,
        }
    }

    pub fn build(
        token_pairs: &[impl AsRef<str>],
        depth_levels: &[u32],
        policy: RequestIdPolicy,
    ) -> Result<Self, StreamError> {
        Ok(Self::new(build(token_pairs, depth_levels)?, policy))
    }

    pub fn policy(&self) -> RequestIdPolicy {
        self.policy
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Requests to replay for the next connection attempt
    ///
    /// `Stable` hands out the same requests every time; `PerConnection`
    /// regenerates the client request ids, keeping everything else.
    pub fn for_attempt(&mut self) -> Arc<[SubscriptionRequest]> {
        if self.policy == RequestIdPolicy::PerConnection {
            self.requests = self
                .requests
                .iter()
                .map(SubscriptionRequest::with_fresh_id)
                .collect();
        }
        Arc::clone(&self.requests)
    }
}
