use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};

use crate::error::GatewayError;
use crate::http::body::HttpReader;
use crate::http::parser::{ParseError, parse_request_head};
use crate::http::request::RequestHead;
use crate::http::writer::ResponseWriter;
use crate::proxy::pipeline::{Disposition, Pipeline};

pub struct Connection {
    reader: HttpReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: SocketAddr,
    pipeline: Arc<Pipeline>,
    state: ConnectionState,
}

pub enum ConnectionState {
    Reading,
    Processing(RequestHead),
    Closed,
}

impl Connection {
    pub fn new(stream: TcpStream, peer: SocketAddr, pipeline: Arc<Pipeline>) -> Self {
        let (read_half, write_half) = stream.into_split();
        Self {
            reader: HttpReader::new(read_half),
            writer: write_half,
            peer,
            pipeline,
            state: ConnectionState::Reading,
        }
    }

    pub async fn run(&mut self) -> Result<(), GatewayError> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::Reading => match self.read_request().await? {
                    Some(mut req) => {
                        req.remote_addr = Some(self.peer);
                        self.state = ConnectionState::Processing(req);
                    }
                    None => {
                        self.state = ConnectionState::Closed;
                    }
                },

                ConnectionState::Processing(req) => {
                    let disposition = self
                        .pipeline
                        .handle(req, &mut self.reader, &mut self.writer)
                        .await;

                    self.state = match disposition {
                        Disposition::KeepAlive => ConnectionState::Reading,
                        Disposition::Close => ConnectionState::Closed,
                    };
                }

                ConnectionState::Closed => {
                    break;
                }
            }
        }

        Ok(())
    }

    pub async fn read_request(&mut self) -> Result<Option<RequestHead>, GatewayError> {
        loop {
            // Try parsing whatever we already have
            match parse_request_head(self.reader.buffer()) {
                Ok((request, consumed)) => {
                    self.reader.consume(consumed);
                    return Ok(Some(request));
                }

                Err(ParseError::Incomplete) => {
                    // Need more data → fall through to read
                }

                Err(e) => {
                    let error = GatewayError::BadRequest(e.describe().to_string());
                    self.reject(&error).await;
                    return Err(error);
                }
            }

            let n = self
                .reader
                .fill()
                .await
                .map_err(GatewayError::Client)?;

            if n == 0 {
                if self.reader.buffer().is_empty() {
                    // Client closed connection between requests
                    return Ok(None);
                }
                return Err(GatewayError::Client(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "connection closed in the middle of a request head",
                )));
            }
        }
    }

    async fn reject(&mut self, error: &GatewayError) {
        let Some(response) = error.rejection() else {
            return;
        };
        let mut writer = ResponseWriter::new(&response);
        if let Err(e) = writer.write_to_stream(&mut self.writer).await {
            tracing::debug!(peer = %self.peer, error = %e, "Failed to send error response");
        }
    }
}
