pub mod client;
pub mod core;

pub use crate::client::{
    ReconnectDriver, SessionHandle, SessionManager, StreamClient, StreamClientBuilder,
    StreamConnector, SubscriptionSet,
};
pub use crate::core::{
    config::StreamConfig, errors::StreamError, traits::SessionConnector, types::*,
};
