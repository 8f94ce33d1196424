use crate::http::body::BodyFraming;
use crate::http::headers::HeaderMap;
use crate::http::request::Method;

/// Statuses of the responses the gateway generates itself.
///
/// Upstream statuses are relayed as raw numbers through [`ResponseHead`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCode {
    /// 400 Bad Request
    BadRequest,
    /// 405 Method Not Allowed
    MethodNotAllowed,
    /// 407 Proxy Authentication Required
    ProxyAuthenticationRequired,
    /// 500 Internal Server Error
    InternalServerError,
}

impl StatusCode {
    /// Returns the numeric HTTP status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use relaygate::http::response::StatusCode;
    /// assert_eq!(StatusCode::ProxyAuthenticationRequired.as_u16(), 407);
    /// assert_eq!(StatusCode::BadRequest.as_u16(), 400);
    /// ```
    pub fn as_u16(&self) -> u16 {
        match self {
            StatusCode::BadRequest => 400,
            StatusCode::MethodNotAllowed => 405,
            StatusCode::ProxyAuthenticationRequired => 407,
            StatusCode::InternalServerError => 500,
        }
    }

    /// Returns the standard HTTP reason phrase for this status code.
    ///
    /// # Example
    ///
    /// ```
    /// # use relaygate::http::response::StatusCode;
    /// assert_eq!(StatusCode::MethodNotAllowed.reason_phrase(), "Method Not Allowed");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self {
            StatusCode::BadRequest => "Bad Request",
            StatusCode::MethodNotAllowed => "Method Not Allowed",
            StatusCode::ProxyAuthenticationRequired => "Proxy Authentication Required",
            StatusCode::InternalServerError => "Internal Server Error",
        }
    }
}

/// A rejection generated by the gateway, sent whole.
///
/// Contains the status code, headers, and a small plain-text body.
#[derive(Debug)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// Response headers, `Content-Length` included
    pub headers: HeaderMap,
    /// Response body as raw bytes
    pub body: Vec<u8>,
}

/// Builder for constructing [`Response`] objects.
///
/// # Example
///
/// ```
/// # use relaygate::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::ProxyAuthenticationRequired)
///     .header("Proxy-Authenticate", "Basic realm=\"gateway\"")
///     .body(b"Proxy authentication required".to_vec())
///     .build();
///
/// assert_eq!(response.status.as_u16(), 407);
/// assert_eq!(response.headers.get("content-length"), Some("29"));
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    headers: HeaderMap,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Creates a builder with the given status, no headers and an empty body.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Vec::new(),
        }
    }

    /// Sets a header, replacing any earlier value of the same name.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key, value);
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = body;
        self
    }

    /// Adds `Content-Length` unless one was set explicitly.
    pub fn build(mut self) -> Response {
        if !self.headers.contains("Content-Length") {
            self.headers
                .insert("Content-Length", self.body.len().to_string());
        }

        Response {
            status: self.status,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// Status line and headers of a response received from a backend instance.
#[derive(Debug, Clone)]
pub struct ResponseHead {
    /// HTTP version of the status line
    pub version: String,
    /// Status code, relayed as received
    pub status: u16,
    /// Reason phrase, possibly empty
    pub reason: String,
    /// Response headers in wire order, case and duplicates preserved
    pub headers: HeaderMap,
}

impl ResponseHead {
    /// Body framing of this response, given the method of the request it answers.
    ///
    /// Responses to `HEAD` and `1xx`/`204`/`304` responses have no body. A
    /// response without a length runs until the instance closes.
    ///
    /// # Example
    ///
    /// ```
    /// # use relaygate::http::body::BodyFraming;
    /// # use relaygate::http::headers::HeaderMap;
    /// # use relaygate::http::request::Method;
    /// # use relaygate::http::response::ResponseHead;
    /// let mut headers = HeaderMap::new();
    /// headers.append("Content-Length", "5");
    /// let head = ResponseHead {
    ///     version: "HTTP/1.1".to_string(),
    ///     status: 200,
    ///     reason: "OK".to_string(),
    ///     headers,
    /// };
    ///
    /// assert_eq!(head.body_framing(&Method::GET), Ok(BodyFraming::Length(5)));
    /// assert_eq!(head.body_framing(&Method::HEAD), Ok(BodyFraming::Empty));
    /// ```
    pub fn body_framing(&self, request_method: &Method) -> Result<BodyFraming, &'static str> {
        BodyFraming::for_response(request_method, self.status, &self.headers)
    }

    /// Whether the backend connection may carry another request afterwards.
    pub fn keep_alive(&self) -> bool {
        if self.headers.has_token("Connection", "close") {
            return false;
        }
        if self.version.eq_ignore_ascii_case("HTTP/1.0") {
            return self.headers.has_token("Connection", "keep-alive");
        }
        true
    }
}
