//! Backend instances and the manager that hands them out
//!
//! The gateway only relies on the two traits below. [`StaticInstanceManager`]
//! is the config-driven implementation the binary uses; deployments that
//! scale instances dynamically plug in their own manager.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::config::{InstanceConfig, SelectionPolicy};
use crate::http::headers::HeaderMap;
use crate::proxy::auth::basic_token;

/// Upper bound on remembered domain assignments for `sticky_domain`.
const MAX_STICKY_DOMAINS: usize = 4096;

/// How to reach an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyParameters {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyParameters {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            username: None,
            password: None,
        }
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    /// `host:port`, also used as the connection pool key
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// `Proxy-Authorization` value for this hop, when credentials are set.
    pub fn proxy_authorization(&self) -> Option<String> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some(basic_token(user, pass)),
            (Some(user), None) => Some(basic_token(user, "")),
            _ => None,
        }
    }
}

/// A backend relay endpoint.
pub trait BackendInstance: Send + Sync {
    fn name(&self) -> &str;

    fn proxy_parameters(&self) -> ProxyParameters;

    /// Lets the instance add or rewrite headers of an outbound request.
    fn update_headers(&self, headers: &mut HeaderMap);
}

/// What the resolver knows about a request when it asks for an instance.
#[derive(Debug, Clone, Copy)]
pub struct InstanceQuery<'a> {
    /// Instance name forced by the client, if any
    pub forced_name: Option<&'a str>,
    /// Canonical target URI
    pub uri: &'a str,
    /// Base domain of the target, when one could be derived
    pub base_domain: Option<&'a str>,
}

/// Owner of instance lifecycle and selection policy.
#[async_trait]
pub trait InstanceManager: Send + Sync {
    async fn select_instance(&self, query: InstanceQuery<'_>) -> Option<Arc<dyn BackendInstance>>;

    /// Signals that a request is about to be relayed (used for scaling).
    fn request_received(&self);
}

/// Instance defined in the configuration file.
#[derive(Debug, Clone)]
pub struct StaticInstance {
    name: String,
    parameters: ProxyParameters,
    headers: BTreeMap<String, String>,
}

impl StaticInstance {
    pub fn new(config: InstanceConfig) -> Self {
        Self {
            name: config.name,
            parameters: ProxyParameters {
                host: config.host,
                port: config.port,
                username: config.username,
                password: config.password,
            },
            headers: config.headers,
        }
    }
}

impl BackendInstance for StaticInstance {
    fn name(&self) -> &str {
        &self.name
    }

    fn proxy_parameters(&self) -> ProxyParameters {
        self.parameters.clone()
    }

    fn update_headers(&self, headers: &mut HeaderMap) {
        for (k, v) in &self.headers {
            headers.insert(k.as_str(), v.as_str());
        }
    }
}

/// Fixed set of instances with a configurable selection policy.
pub struct StaticInstanceManager {
    instances: Vec<Arc<StaticInstance>>,
    policy: SelectionPolicy,
    current_index: AtomicUsize,
    sticky: Mutex<HashMap<String, usize>>,
    received: AtomicU64,
}

impl StaticInstanceManager {
    pub fn new(configs: Vec<InstanceConfig>, policy: SelectionPolicy) -> Self {
        let instances = configs
            .into_iter()
            .map(|c| Arc::new(StaticInstance::new(c)))
            .collect();

        Self {
            instances,
            policy,
            current_index: AtomicUsize::new(0),
            sticky: Mutex::new(HashMap::new()),
            received: AtomicU64::new(0),
        }
    }

    /// Number of `request_received` notifications so far.
    pub fn requests_received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn next_index(&self) -> usize {
        self.current_index.fetch_add(1, Ordering::Relaxed) % self.instances.len()
    }

    fn pick(&self, query: &InstanceQuery<'_>) -> Option<usize> {
        if self.instances.is_empty() {
            return None;
        }

        match self.policy {
            SelectionPolicy::FirstAvailable => Some(0),
            SelectionPolicy::RoundRobin => Some(self.next_index()),
            SelectionPolicy::StickyDomain => {
                let Some(domain) = query.base_domain else {
                    return Some(self.next_index());
                };
                let mut sticky = match self.sticky.lock() {
                    Ok(guard) => guard,
                    Err(poisoned) => poisoned.into_inner(),
                };
                if let Some(&idx) = sticky.get(domain) {
                    return Some(idx);
                }
                // full table: forget an arbitrary domain, it is reassigned on its next request
                if sticky.len() >= MAX_STICKY_DOMAINS {
                    if let Some(evicted) = sticky.keys().next().cloned() {
                        sticky.remove(&evicted);
                    }
                }
                let idx = self.next_index();
                sticky.insert(domain.to_string(), idx);
                Some(idx)
            }
        }
    }
}

#[async_trait]
impl InstanceManager for StaticInstanceManager {
    async fn select_instance(&self, query: InstanceQuery<'_>) -> Option<Arc<dyn BackendInstance>> {
        if let Some(name) = query.forced_name {
            let found = self.instances.iter().find(|i| i.name == name);
            if found.is_none() {
                tracing::debug!(instance = name, "Forced instance is not configured");
            }
            return found.map(|i| i.clone() as Arc<dyn BackendInstance>);
        }

        let idx = self.pick(&query)?;
        Some(self.instances[idx].clone() as Arc<dyn BackendInstance>)
    }

    fn request_received(&self) {
        let total = self.received.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::trace!(total, "Request received");
    }
}
