//! Inbound listener and gateway lifecycle.

pub mod listener;

pub use listener::GatewayServer;
