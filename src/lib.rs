//! relaygate - forward-proxy gateway
//!
//! Authenticates client requests, relays each one through a backend
//! instance chosen by an instance manager, streams the response back and
//! keeps rolling traffic statistics.

pub mod config;
pub mod error;
pub mod http;
pub mod proxy;
pub mod server;
pub mod stats;

pub use error::GatewayError;
pub use server::GatewayServer;
