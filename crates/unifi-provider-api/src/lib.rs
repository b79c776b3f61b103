// unifi-provider-api: Async UniFi controller client with shared sessions and retrying REST calls

pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod rest;
pub mod retry;
pub mod session;
pub mod transport;

pub use auth::{ControllerPlatform, Credentials};
pub use client::{ControllerClient, RequestOptions};
pub use error::Error;
pub use retry::{Jitter, RetryPolicy};
pub use session::Session;
pub use transport::{TlsMode, TransportConfig};
