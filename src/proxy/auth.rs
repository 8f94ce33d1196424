//! Static proxy credential check

use base64::Engine as _;
use base64::engine::general_purpose;

use crate::config::AuthConfig;
use crate::error::GatewayError;
use crate::http::request::RequestHead;

pub const PROXY_AUTHORIZATION: &str = "Proxy-Authorization";

/// Builds a `Basic` credential token for `username:password`.
pub fn basic_token(username: &str, password: &str) -> String {
    let encoded = general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}

/// Validates the `Proxy-Authorization` header against a single configured
/// credential. Without a configured credential every request passes.
#[derive(Debug, Clone, Default)]
pub struct AuthGate {
    expected: Option<String>,
}

impl AuthGate {
    pub fn new(config: Option<&AuthConfig>) -> Self {
        Self {
            expected: config.map(|c| basic_token(&c.username, &c.password)),
        }
    }

    pub fn check(&self, request: &RequestHead) -> Result<(), GatewayError> {
        let Some(expected) = &self.expected else {
            return Ok(());
        };

        match request.header(PROXY_AUTHORIZATION) {
            Some(given)
                if constant_time_eq::constant_time_eq(given.trim().as_bytes(), expected.as_bytes()) =>
            {
                Ok(())
            }
            _ => Err(GatewayError::AuthRejected),
        }
    }
}
