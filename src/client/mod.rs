//! Streaming client: subscription building, session lifecycle and reconnection
pub mod builder;
pub mod driver;
pub mod session;
pub mod subscription;

pub use builder::{StreamClient, StreamClientBuilder, WsFactory};
pub use driver::ReconnectDriver;
pub use session::{SessionHandle, SessionManager, StreamConnector, SUBSCRIBE_EVENT};
pub use subscription::{parse_depth_levels, parse_token_pairs, SubscriptionSet};
