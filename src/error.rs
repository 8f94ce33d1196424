//! Gateway error taxonomy
//!
//! Every error is scoped to a single request or connection. Errors raised
//! before response headers reach the client map to a short plain-text
//! rejection; errors raised afterwards can only be logged.

use std::io;
use std::net::SocketAddr;

use thiserror::Error;

use crate::http::response::{Response, ResponseBuilder, StatusCode};

pub const AUTH_REJECTED_BODY: &str = "Wrong proxy credentials";
pub const NO_BACKEND_BODY: &str = "No running instance found";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("proxy credentials missing or invalid")]
    AuthRejected,

    #[error("no running instance available")]
    NoBackendAvailable,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("method {0} not allowed")]
    MethodNotAllowed(String),

    #[error("upstream request failed: {0}")]
    UpstreamConnect(#[source] io::Error),

    #[error("upstream response stream failed: {0}")]
    UpstreamStream(#[source] io::Error),

    #[error("client connection failed: {0}")]
    Client(#[source] io::Error),

    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    #[error("server already listening on {0}")]
    AlreadyListening(SocketAddr),
}

impl GatewayError {
    /// Response sent to the client for errors raised before the response
    /// headers were committed. `None` means the error can only be logged.
    pub fn rejection(&self) -> Option<Response> {
        let (status, body) = match self {
            GatewayError::AuthRejected => {
                let response = ResponseBuilder::new(StatusCode::ProxyAuthenticationRequired)
                    .header("Proxy-Authenticate", "Basic realm=\"relaygate\"")
                    .header("Content-Type", "text/plain")
                    .body(AUTH_REJECTED_BODY.as_bytes().to_vec())
                    .build();
                return Some(response);
            }
            GatewayError::NoBackendAvailable => (
                StatusCode::ProxyAuthenticationRequired,
                NO_BACKEND_BODY.to_string(),
            ),
            GatewayError::BadRequest(reason) => {
                (StatusCode::BadRequest, format!("Bad request: {reason}"))
            }
            GatewayError::MethodNotAllowed(method) => (
                StatusCode::MethodNotAllowed,
                format!("Method {method} not allowed"),
            ),
            GatewayError::UpstreamConnect(e) => {
                (StatusCode::InternalServerError, format!("Proxy error: {e}"))
            }
            _ => return None,
        };

        Some(
            ResponseBuilder::new(status)
                .header("Content-Type", "text/plain")
                .body(body.into_bytes())
                .build(),
        )
    }
}
