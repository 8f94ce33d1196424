use std::net::SocketAddr;

use crate::http::body::BodyFraming;
use crate::http::headers::HeaderMap;

/// HTTP request methods.
///
/// The gateway is a pass-through relay, so anything that looks like a method
/// token is accepted; only `CONNECT` is refused later in the pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET, the response never carries a body
    HEAD,
    OPTIONS,
    PATCH,
    /// CONNECT - Tunnel request, refused with 405
    CONNECT,
    TRACE,
    /// Any other upper-case method token (WebDAV and friends)
    Extension(String),
}

/// The head of an inbound request.
///
/// The body is not part of the head: it stays on the connection and is
/// streamed to the backend according to [`RequestHead::body_framing`].
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// Request target as received: absolute URL or origin-form path
    pub target: String,
    /// HTTP version (`HTTP/1.1` or `HTTP/1.0`)
    pub version: String,
    /// Request headers, case preserved
    pub headers: HeaderMap,
    /// Address of the client that sent the request
    pub remote_addr: Option<SocketAddr>,
}

/// Builder for constructing request heads, mostly used by tests.
///
/// # Example
///
/// ```
/// # use relaygate::http::request::{Method, RequestBuilder};
/// let request = RequestBuilder::new()
///     .method(Method::GET)
///     .target("http://example.com/index.html")
///     .header("Host", "example.com")
///     .build()
///     .unwrap();
///
/// assert_eq!(request.version, "HTTP/1.1");
/// assert_eq!(request.header("host"), Some("example.com"));
/// ```
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Option<String>,
    headers: HeaderMap,
    remote_addr: Option<SocketAddr>,
}

impl Method {
    /// Parses a method token from a request line.
    ///
    /// Method tokens are case-sensitive. Unknown upper-case tokens become
    /// [`Method::Extension`].
    ///
    /// # Example
    ///
    /// ```
    /// # use relaygate::http::request::Method;
    /// assert_eq!(Method::from_str("PROPFIND"), Some(Method::Extension("PROPFIND".into())));
    /// assert_eq!(Method::from_str("get"), None);
    /// ```
    pub fn from_str(s: &str) -> Option<Self> {
        let method = match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            "CONNECT" => Method::CONNECT,
            "TRACE" => Method::TRACE,
            other => {
                let is_token = !other.is_empty()
                    && other
                        .bytes()
                        .all(|b| b.is_ascii_uppercase() || b == b'-' || b == b'_');
                if !is_token {
                    return None;
                }
                Method::Extension(other.to_string())
            }
        };
        Some(method)
    }

    /// Returns the method token as it appears on the wire.
    ///
    /// # Example
    ///
    /// ```
    /// # use relaygate::http::request::Method;
    /// assert_eq!(Method::POST.as_str(), "POST");
    /// assert_eq!(Method::Extension("MKCOL".into()).as_str(), "MKCOL");
    /// ```
    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::CONNECT => "CONNECT",
            Method::TRACE => "TRACE",
            Method::Extension(m) => m,
        }
    }
}

impl RequestBuilder {
    /// Creates a builder with no method and no target set.
    pub fn new() -> Self {
        Self {
            method: None,
            target: None,
            version: None,
            headers: HeaderMap::new(),
            remote_addr: None,
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    /// Adds a header. Repeated names are kept as separate entries.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn remote_addr(mut self, addr: SocketAddr) -> Self {
        self.remote_addr = Some(addr);
        self
    }

    /// Builds the request head.
    ///
    /// # Errors
    ///
    /// Returns an error if the method or the target is missing. The version
    /// defaults to `HTTP/1.1`.
    pub fn build(self) -> Result<RequestHead, &'static str> {
        Ok(RequestHead {
            method: self.method.ok_or("method missing")?,
            target: self.target.ok_or("target missing")?,
            version: self.version.unwrap_or_else(|| "HTTP/1.1".to_string()),
            headers: self.headers,
            remote_addr: self.remote_addr,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestHead {
    /// Retrieves a header value by name (case-insensitive).
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// Determines whether the client connection may serve another request.
    ///
    /// HTTP/1.1 defaults to keep-alive unless `close` is given; HTTP/1.0
    /// needs an explicit `keep-alive`. `Proxy-Connection` is honoured too
    /// since forward-proxy clients still send it.
    ///
    /// # Example
    ///
    /// ```
    /// # use relaygate::http::request::{Method, RequestBuilder};
    /// let request = RequestBuilder::new()
    ///     .method(Method::GET)
    ///     .target("http://example.com/")
    ///     .version("HTTP/1.0")
    ///     .header("Proxy-Connection", "keep-alive")
    ///     .build()
    ///     .unwrap();
    /// assert!(request.keep_alive());
    /// ```
    pub fn keep_alive(&self) -> bool {
        let close = self.headers.has_token("Connection", "close")
            || self.headers.has_token("Proxy-Connection", "close");
        if close {
            return false;
        }
        if self.version.eq_ignore_ascii_case("HTTP/1.0") {
            return self.headers.has_token("Connection", "keep-alive")
                || self.headers.has_token("Proxy-Connection", "keep-alive");
        }
        true
    }

    /// Body framing declared by the request headers.
    ///
    /// # Errors
    ///
    /// Fails when the length cannot be known: a transfer coding that does
    /// not end in `chunked`, or a missing, malformed or conflicting
    /// `Content-Length`.
    ///
    /// # Example
    ///
    /// ```
    /// # use relaygate::http::body::BodyFraming;
    /// # use relaygate::http::request::{Method, RequestBuilder};
    /// let request = RequestBuilder::new()
    ///     .method(Method::POST)
    ///     .target("http://example.com/upload")
    ///     .header("Content-Length", "11")
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(request.body_framing(), Ok(BodyFraming::Length(11)));
    /// ```
    pub fn body_framing(&self) -> Result<BodyFraming, &'static str> {
        BodyFraming::for_request(&self.headers)
    }
}
