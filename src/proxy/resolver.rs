//! Request to backend instance resolution

use std::net::IpAddr;
use std::sync::Arc;

use url::Url;

use crate::error::GatewayError;
use crate::http::request::RequestHead;
use crate::proxy::instance::{BackendInstance, InstanceManager, InstanceQuery};
use crate::proxy::target::ProxyTarget;

/// Request header naming the instance a client wants to go through. The
/// same name is returned on responses to tell which instance served them.
pub const INSTANCE_HEADER: &str = "x-cache-proxyname";

/// Derives the base domain of a URI.
pub trait DomainResolver: Send + Sync {
    fn base_domain(&self, uri: &str) -> Option<String>;
}

/// Keeps the registrable-looking suffix of a host name: the last two labels,
/// or three for `example.co.uk` style names.
#[derive(Debug, Clone, Copy, Default)]
pub struct SuffixDomainResolver;

const GENERIC_SECOND_LEVEL: &[&str] = &["co", "com", "net", "org", "gov", "edu", "ac"];

impl DomainResolver for SuffixDomainResolver {
    fn base_domain(&self, uri: &str) -> Option<String> {
        let url = Url::parse(uri).ok()?;
        let host = url.host_str()?.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return None;
        }

        let bare = host.trim_start_matches('[').trim_end_matches(']');
        if bare.parse::<IpAddr>().is_ok() {
            return Some(host);
        }

        let labels: Vec<&str> = host.split('.').collect();
        let keep = match labels.as_slice() {
            [.., sld, tld]
                if labels.len() >= 3
                    && tld.len() == 2
                    && GENERIC_SECOND_LEVEL.contains(sld) =>
            {
                3
            }
            _ => 2,
        };

        let start = labels.len().saturating_sub(keep);
        Some(labels[start..].join("."))
    }
}

/// Asks the instance manager for an instance to relay a request through.
pub struct BackendResolver {
    manager: Arc<dyn InstanceManager>,
    domains: Arc<dyn DomainResolver>,
}

impl BackendResolver {
    pub fn new(manager: Arc<dyn InstanceManager>, domains: Arc<dyn DomainResolver>) -> Self {
        Self { manager, domains }
    }

    /// Picks an instance, notifying the manager on success.
    ///
    /// No notification is sent when nothing can serve the request.
    pub async fn resolve(
        &self,
        request: &RequestHead,
        target: &ProxyTarget,
    ) -> Result<Arc<dyn BackendInstance>, GatewayError> {
        let uri = target.absolute_uri();
        let base_domain = self.domains.base_domain(&uri);
        let forced_name = request
            .header(INSTANCE_HEADER)
            .map(str::trim)
            .filter(|n| !n.is_empty());

        let query = InstanceQuery {
            forced_name,
            uri: &uri,
            base_domain: base_domain.as_deref(),
        };

        let Some(instance) = self.manager.select_instance(query).await else {
            tracing::warn!(
                uri = %uri,
                forced = forced_name.unwrap_or("-"),
                "No running instance found"
            );
            return Err(GatewayError::NoBackendAvailable);
        };

        self.manager.request_received();

        tracing::debug!(
            instance = instance.name(),
            uri = %uri,
            base_domain = base_domain.as_deref().unwrap_or("-"),
            "Resolved backend instance"
        );

        Ok(instance)
    }
}
