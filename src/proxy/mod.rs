//! Forward-proxy functionality
//!
//! This module implements the request pipeline: credential check, backend
//! instance resolution and the relay through the chosen instance.

pub mod agent;
pub mod auth;
pub mod counting;
pub mod instance;
pub mod pipeline;
pub mod relay;
pub mod resolver;
pub mod target;

pub use agent::ProxyAgent;
pub use auth::AuthGate;
pub use instance::{BackendInstance, InstanceManager, InstanceQuery, ProxyParameters, StaticInstanceManager};
pub use pipeline::{Disposition, Pipeline};
pub use relay::{RelayEngine, RelayState};
pub use resolver::{BackendResolver, DomainResolver, SuffixDomainResolver, INSTANCE_HEADER};
pub use target::ProxyTarget;
