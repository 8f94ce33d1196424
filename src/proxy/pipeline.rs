//! Per-request pipeline: AuthGate → BackendResolver → RelayEngine

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};

use crate::config::Config;
use crate::error::GatewayError;
use crate::http::body::HttpReader;
use crate::http::request::{Method, RequestHead};
use crate::http::writer::ResponseWriter;
use crate::proxy::agent::ProxyAgent;
use crate::proxy::auth::AuthGate;
use crate::proxy::instance::InstanceManager;
use crate::proxy::relay::{RelayEngine, RelayFailure, RelayOutcome, RelayState, RelayTracker};
use crate::proxy::resolver::{BackendResolver, DomainResolver};
use crate::proxy::target::ProxyTarget;
use crate::stats::StatsCounter;

/// What the connection should do once a request has been handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    KeepAlive,
    Close,
}

pub struct Pipeline {
    auth: AuthGate,
    resolver: BackendResolver,
    relay: RelayEngine,
}

impl Pipeline {
    pub fn new(auth: AuthGate, resolver: BackendResolver, relay: RelayEngine) -> Self {
        Self {
            auth,
            resolver,
            relay,
        }
    }

    pub fn from_config(
        config: &Config,
        manager: Arc<dyn InstanceManager>,
        domains: Arc<dyn DomainResolver>,
        stats: Arc<StatsCounter>,
    ) -> Self {
        let agent = Arc::new(ProxyAgent::new(&config.agent));
        Self::new(
            AuthGate::new(config.auth.as_ref()),
            BackendResolver::new(manager, domains),
            RelayEngine::new(agent, stats),
        )
    }

    /// Handles one request whose head was just read from the client.
    ///
    /// Failures never escape: they are answered (when nothing was sent yet)
    /// or logged, and the connection is closed.
    pub async fn handle<R, W>(
        &self,
        request: RequestHead,
        client_reader: &mut HttpReader<R>,
        client_writer: &mut W,
    ) -> Disposition
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut tracker = RelayTracker::new();

        match self
            .process(&mut tracker, &request, client_reader, client_writer)
            .await
        {
            Ok(outcome) if outcome.client_reusable && request.keep_alive() => Disposition::KeepAlive,
            Ok(_) => Disposition::Close,
            Err(failure) => {
                if tracker.state() != RelayState::Error {
                    log_rejection(&tracker, &request, &failure.error);
                }
                if !failure.committed {
                    if let Some(response) = failure.error.rejection() {
                        let mut writer = ResponseWriter::new(&response);
                        if let Err(e) = writer.write_to_stream(client_writer).await {
                            tracing::debug!(
                                request_id = tracker.id(),
                                error = %e,
                                "Failed to send error response"
                            );
                        }
                    }
                }
                Disposition::Close
            }
        }
    }

    async fn process<R, W>(
        &self,
        tracker: &mut RelayTracker,
        request: &RequestHead,
        client_reader: &mut HttpReader<R>,
        client_writer: &mut W,
    ) -> Result<RelayOutcome, RelayFailure>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.auth.check(request)?;
        tracker.advance(RelayState::Authorized);

        if request.method == Method::CONNECT {
            return Err(GatewayError::MethodNotAllowed(request.method.as_str().to_string()).into());
        }
        let framing = request
            .body_framing()
            .map_err(|e| GatewayError::BadRequest(e.to_string()))?;
        let target = ProxyTarget::from_request(request)?;

        let instance = self.resolver.resolve(request, &target).await?;
        tracker.advance(RelayState::Resolved);

        self.relay
            .relay(
                tracker,
                request,
                framing,
                &target,
                instance.as_ref(),
                client_reader,
                client_writer,
            )
            .await
    }
}

fn log_rejection(tracker: &RelayTracker, request: &RequestHead, error: &GatewayError) {
    let peer = request
        .remote_addr
        .map(|a| a.to_string())
        .unwrap_or_else(|| "-".to_string());

    match error {
        GatewayError::AuthRejected => tracing::info!(
            request_id = tracker.id(),
            peer = %peer,
            target = %request.target,
            "Rejected proxy credentials"
        ),
        GatewayError::NoBackendAvailable => tracing::info!(
            request_id = tracker.id(),
            peer = %peer,
            target = %request.target,
            "No instance to relay request"
        ),
        _ => tracing::debug!(
            request_id = tracker.id(),
            peer = %peer,
            target = %request.target,
            error = %error,
            "Rejected request"
        ),
    }
}
