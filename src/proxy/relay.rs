//! Request/response forwarding through a backend instance
//!
//! One relay moves through these states:
//!
//! ```text
//! Received ─▶ Authorized ─▶ Resolved ─▶ Requesting ─▶ StreamingResponse ─▶ Done
//!                                          │                  │
//!                                          └──────▶ Error ◀───┘
//! ```
//!
//! While `Requesting`, the request body is pumped to the instance and the
//! response head is awaited at the same time. Both halves run inside one
//! future, so a failure on either side (or the client going away) drops the
//! outbound socket and ends the relay.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::time::Instant;

use crate::error::GatewayError;
use crate::http::body::{BodyFraming, CopyError, HttpReader};
use crate::http::parser::{ParseError, parse_response_head};
use crate::http::request::RequestHead;
use crate::http::response::ResponseHead;
use crate::http::writer::{serialize_request_head, serialize_response_head};
use crate::proxy::agent::ProxyAgent;
use crate::proxy::auth::PROXY_AUTHORIZATION;
use crate::proxy::counting::CountingStream;
use crate::proxy::instance::BackendInstance;
use crate::proxy::resolver::INSTANCE_HEADER;
use crate::proxy::target::ProxyTarget;
use crate::stats::StatsCounter;

static NEXT_REQUEST_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Received,
    Authorized,
    Resolved,
    Requesting,
    StreamingResponse,
    Done,
    Error,
}

/// Current state of one relay, with every transition logged.
#[derive(Debug)]
pub struct RelayTracker {
    id: u64,
    state: RelayState,
}

impl RelayTracker {
    pub fn new() -> Self {
        Self {
            id: NEXT_REQUEST_ID.fetch_add(1, Ordering::Relaxed),
            state: RelayState::Received,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> RelayState {
        self.state
    }

    pub fn advance(&mut self, next: RelayState) {
        tracing::trace!(request_id = self.id, from = ?self.state, to = ?next, "Relay state");
        self.state = next;
    }
}

impl Default for RelayTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// A finished relay.
#[derive(Debug, Clone, Copy)]
pub struct RelayOutcome {
    pub status: u16,
    /// The client connection is positioned at the next request
    pub client_reusable: bool,
}

/// A failed relay. `committed` tells whether response bytes already reached
/// the client, in which case no error response can be sent anymore.
#[derive(Debug)]
pub struct RelayFailure {
    pub error: GatewayError,
    pub committed: bool,
}

impl RelayFailure {
    pub fn before_commit(error: GatewayError) -> Self {
        Self {
            error,
            committed: false,
        }
    }
}

impl From<GatewayError> for RelayFailure {
    fn from(error: GatewayError) -> Self {
        Self::before_commit(error)
    }
}

pub struct RelayEngine {
    agent: Arc<ProxyAgent>,
    stats: Arc<StatsCounter>,
}

impl RelayEngine {
    pub fn new(agent: Arc<ProxyAgent>, stats: Arc<StatsCounter>) -> Self {
        Self { agent, stats }
    }

    /// Relays one request through `instance` and streams the response back.
    ///
    /// The request head has been read from `client_reader`; its body is still
    /// on the connection and is consumed according to `framing`.
    #[allow(clippy::too_many_arguments)]
    pub async fn relay<R, W>(
        &self,
        tracker: &mut RelayTracker,
        request: &RequestHead,
        framing: BodyFraming,
        target: &ProxyTarget,
        instance: &dyn BackendInstance,
        client_reader: &mut HttpReader<R>,
        client_writer: &mut W,
    ) -> Result<RelayOutcome, RelayFailure>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        tracker.advance(RelayState::Requesting);

        let params = instance.proxy_parameters();
        let uri = target.absolute_uri();

        let mut headers = request.headers.clone();
        if !headers.contains("Host") {
            headers.insert("Host", target.authority());
        }
        instance.update_headers(&mut headers);
        if !headers.contains(PROXY_AUTHORIZATION) {
            if let Some(token) = params.proxy_authorization() {
                headers.append(PROXY_AUTHORIZATION, token);
            }
        }
        let request_head = serialize_request_head(&request.method, &uri, &request.version, &headers);

        let started = Instant::now();

        let stream = match self.agent.checkout(&params).await {
            Ok(stream) => stream,
            Err(e) => {
                tracker.advance(RelayState::Error);
                tracing::warn!(
                    request_id = tracker.id(),
                    instance = instance.name(),
                    addr = %params.address(),
                    error = %e,
                    "Failed to connect to instance"
                );
                return Err(RelayFailure::before_commit(GatewayError::UpstreamConnect(e)));
            }
        };

        let upstream = CountingStream::new(stream);
        let counters = upstream.counters();
        let (upstream_read, mut upstream_write) = tokio::io::split(upstream);
        let mut upstream_reader = HttpReader::new(upstream_read);

        let committed = AtomicBool::new(false);
        let body_sent = AtomicBool::new(false);

        let result = {
            let pump = pump_request(
                &request_head,
                framing,
                client_reader,
                &mut upstream_write,
                &body_sent,
            );
            let respond = respond(
                tracker,
                request,
                instance.name(),
                &mut upstream_reader,
                client_writer,
                &committed,
            );
            tokio::pin!(pump, respond);

            tokio::select! {
                biased;
                res = &mut respond => res,
                err = &mut pump => Err(err),
            }
        };

        let committed = committed.load(Ordering::Acquire);

        let head = match result {
            Ok(head) => head,
            Err(error) => {
                tracker.advance(RelayState::Error);
                let error = match error {
                    GatewayError::UpstreamConnect(e) if committed => GatewayError::UpstreamStream(e),
                    other => other,
                };
                log_failure(tracker.id(), instance.name(), &uri, &error, committed);
                return Err(RelayFailure { error, committed });
            }
        };

        let elapsed = started.elapsed();
        tracker.advance(RelayState::Done);
        self.stats
            .record(elapsed, counters.sent(), counters.received());

        let framing = head
            .body_framing(&request.method)
            .unwrap_or(BodyFraming::UntilClose);
        let clean = body_sent.load(Ordering::Acquire)
            && framing.is_self_delimiting()
            && head.keep_alive()
            && head.status != 101;

        if clean && upstream_reader.buffer().is_empty() {
            let (upstream_read, _) = upstream_reader.into_parts();
            let stream = upstream_read.unsplit(upstream_write).into_inner();
            self.agent.checkin(&params, stream);
        }

        tracing::info!(
            request_id = tracker.id(),
            instance = instance.name(),
            method = request.method.as_str(),
            uri = %uri,
            status = head.status,
            elapsed_ms = elapsed.as_millis() as u64,
            sent = counters.sent(),
            received = counters.received(),
            "Request relayed"
        );

        Ok(RelayOutcome {
            status: head.status,
            client_reusable: clean,
        })
    }
}

/// Sends the request head and body upstream, then watches the client for an
/// early close. Only ever finishes with an error.
async fn pump_request<R, U>(
    request_head: &[u8],
    framing: BodyFraming,
    client_reader: &mut HttpReader<R>,
    upstream: &mut U,
    body_sent: &AtomicBool,
) -> GatewayError
where
    R: AsyncRead + Unpin,
    U: AsyncWrite + Unpin,
{
    if let Err(e) = upstream.write_all(request_head).await {
        return GatewayError::UpstreamConnect(e);
    }

    match client_reader.copy_body(upstream, framing).await {
        Ok(_) => body_sent.store(true, Ordering::Release),
        Err(CopyError::Read(e)) => return GatewayError::Client(e),
        Err(CopyError::Write(e)) => return GatewayError::UpstreamConnect(e),
    }

    loop {
        match client_reader.fill().await {
            Ok(0) => {
                return GatewayError::Client(io::Error::new(
                    io::ErrorKind::ConnectionAborted,
                    "client closed the connection before the response completed",
                ));
            }
            // pipelined request, left in the buffer for later
            Ok(_) => std::future::pending::<()>().await,
            Err(e) => return GatewayError::Client(e),
        }
    }
}

/// Reads the response head, forwards it with the instance marker, then
/// streams the body.
async fn respond<U, W>(
    tracker: &mut RelayTracker,
    request: &RequestHead,
    instance_name: &str,
    upstream: &mut HttpReader<U>,
    client: &mut W,
    committed: &AtomicBool,
) -> Result<ResponseHead, GatewayError>
where
    U: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let head = loop {
        let head = read_response_head(upstream).await?;
        if (100..200).contains(&head.status) && head.status != 101 {
            // interim response, e.g. 100 Continue
            client
                .write_all(&serialize_response_head(&head))
                .await
                .map_err(GatewayError::Client)?;
            continue;
        }
        break head;
    };

    tracker.advance(RelayState::StreamingResponse);

    let framing = head.body_framing(&request.method).map_err(|e| {
        GatewayError::UpstreamConnect(io::Error::new(io::ErrorKind::InvalidData, e))
    })?;

    let mut client_head = head.clone();
    client_head.headers.append(INSTANCE_HEADER, instance_name);

    committed.store(true, Ordering::Release);
    client
        .write_all(&serialize_response_head(&client_head))
        .await
        .map_err(GatewayError::Client)?;

    match upstream.copy_body(client, framing).await {
        Ok(_) => {}
        Err(CopyError::Read(e)) => return Err(GatewayError::UpstreamStream(e)),
        Err(CopyError::Write(e)) => return Err(GatewayError::Client(e)),
    }

    Ok(head)
}

async fn read_response_head<U>(upstream: &mut HttpReader<U>) -> Result<ResponseHead, GatewayError>
where
    U: AsyncRead + Unpin,
{
    loop {
        match parse_response_head(upstream.buffer()) {
            Ok((head, consumed)) => {
                upstream.consume(consumed);
                return Ok(head);
            }
            Err(ParseError::Incomplete) => {}
            Err(e) => {
                return Err(GatewayError::UpstreamConnect(io::Error::new(
                    io::ErrorKind::InvalidData,
                    e.describe(),
                )));
            }
        }

        let n = upstream.fill().await.map_err(GatewayError::UpstreamConnect)?;
        if n == 0 {
            return Err(GatewayError::UpstreamConnect(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "instance closed the connection before responding",
            )));
        }
    }
}

fn log_failure(request_id: u64, instance: &str, uri: &str, error: &GatewayError, committed: bool) {
    match error {
        GatewayError::UpstreamStream(_) => tracing::warn!(
            request_id,
            instance,
            uri,
            error = %error,
            "Response stream failed after headers were sent"
        ),
        GatewayError::Client(_) => tracing::debug!(
            request_id,
            instance,
            uri,
            error = %error,
            committed,
            "Client connection failed during relay"
        ),
        _ => tracing::warn!(
            request_id,
            instance,
            uri,
            error = %error,
            committed,
            "Relay failed"
        ),
    }
}
