//! JSON-RPC access layer for the event mirror.
//!
//! Three pieces:
//! - [`EndpointPool`]: the ordered list of configured node URLs.
//! - [`EthRpcClient`]: an HTTP JSON-RPC client bound to one endpoint,
//!   implementing the scanner's [`poolscan_core::ChainClient`] seam.
//! - [`ConnectionManager`]: walks the pool with a fixed backoff until a
//!   dial succeeds, tagging each connection with an epoch.

pub mod client;
pub mod endpoint;
pub mod manager;
pub mod request;

pub use client::EthRpcClient;
pub use endpoint::{Endpoint, EndpointPool};
pub use manager::{ConnectionManager, Dialer, HttpDialer, DIAL_BACKOFF, REQUEST_TIMEOUT};
pub use request::{JsonRpcError, JsonRpcRequest, JsonRpcResponse};
