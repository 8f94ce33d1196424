//! Relay target derived from the inbound request.

use url::Url;

use crate::error::GatewayError;
use crate::http::request::RequestHead;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheme::Http => "http",
            Scheme::Https => "https",
        }
    }

    pub fn default_port(&self) -> u16 {
        match self {
            Scheme::Http => 80,
            Scheme::Https => 443,
        }
    }
}

/// Where a request is headed.
///
/// The port is always resolved: when the URL names none, it comes from the
/// scheme (80 for `http`, 443 for `https`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyTarget {
    pub scheme: Scheme,
    pub host: String,
    pub port: u16,
    /// Path plus query string, never empty
    pub path: String,
}

impl ProxyTarget {
    /// Parses an absolute `http`/`https` URL.
    pub fn parse(uri: &str) -> Result<Self, GatewayError> {
        let url = Url::parse(uri).map_err(|e| GatewayError::BadRequest(format!("{uri}: {e}")))?;

        let scheme = match url.scheme() {
            "http" => Scheme::Http,
            "https" => Scheme::Https,
            other => {
                return Err(GatewayError::BadRequest(format!(
                    "unsupported scheme {other}"
                )));
            }
        };

        let host = url
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| GatewayError::BadRequest(format!("{uri}: missing host")))?
            .to_string();

        let port = url.port().unwrap_or(scheme.default_port());
        let path = raw_path_and_query(uri);

        Ok(Self {
            scheme,
            host,
            port,
            path,
        })
    }

    /// Derives the target of a forward-proxy request: either its absolute
    /// request target, or `Host` plus an origin-form path.
    pub fn from_request(request: &RequestHead) -> Result<Self, GatewayError> {
        let target = request.target.as_str();
        let lower = target.get(..8).unwrap_or(target).to_ascii_lowercase();

        if lower.starts_with("http://") || lower.starts_with("https://") {
            return Self::parse(target);
        }

        if target.starts_with('/') {
            let host = request
                .header("Host")
                .filter(|h| !h.trim().is_empty())
                .ok_or_else(|| GatewayError::BadRequest("missing Host header".to_string()))?;
            return Self::parse(&format!("http://{}{}", host.trim(), target));
        }

        Err(GatewayError::BadRequest(format!(
            "unsupported request target {target}"
        )))
    }

    pub fn is_default_port(&self) -> bool {
        self.port == self.scheme.default_port()
    }

    /// `host` or `host:port` when the port is not the scheme default.
    pub fn authority(&self) -> String {
        if self.is_default_port() {
            self.host.clone()
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Canonical absolute URI, used as the outbound request target.
    pub fn absolute_uri(&self) -> String {
        format!("{}://{}{}", self.scheme.as_str(), self.authority(), self.path)
    }
}

/// Path and query exactly as the client wrote them. Dot segments and
/// percent-encoding are left alone; only the fragment is dropped.
fn raw_path_and_query(uri: &str) -> String {
    let after_scheme = uri.split_once("://").map_or(uri, |(_, rest)| rest);
    let rest = after_scheme
        .find(['/', '?', '#'])
        .map_or("", |idx| &after_scheme[idx..]);
    let rest = rest.split_once('#').map_or(rest, |(before, _)| before);

    if rest.starts_with('/') {
        rest.to_string()
    } else {
        format!("/{rest}")
    }
}
