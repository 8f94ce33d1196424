use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::headers::HeaderMap;
use crate::http::request::Method;
use crate::http::response::{Response, ResponseHead};

const HTTP_VERSION: &str = "HTTP/1.1";

fn write_headers(buf: &mut Vec<u8>, headers: &HeaderMap) {
    for (k, v) in headers.iter() {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
}

fn serialize_response(resp: &Response) -> Vec<u8> {
    let mut buf = Vec::with_capacity(128 + resp.body.len());

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    write_headers(&mut buf, &resp.headers);

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf.extend_from_slice(&resp.body);

    buf
}

/// Serializes a relayed response head. The body follows separately.
pub fn serialize_response_head(head: &ResponseHead) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    let status_line = if head.reason.is_empty() {
        format!("{} {}\r\n", head.version, head.status)
    } else {
        format!("{} {} {}\r\n", head.version, head.status, head.reason)
    };
    buf.extend_from_slice(status_line.as_bytes());
    write_headers(&mut buf, &head.headers);
    buf.extend_from_slice(b"\r\n");

    buf
}

/// Serializes an outbound request head in absolute form.
pub fn serialize_request_head(
    method: &Method,
    target: &str,
    version: &str,
    headers: &HeaderMap,
) -> Vec<u8> {
    let mut buf = Vec::with_capacity(256);

    buf.extend_from_slice(format!("{} {} {}\r\n", method.as_str(), target, version).as_bytes());
    write_headers(&mut buf, headers);
    buf.extend_from_slice(b"\r\n");

    buf
}

pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    pub async fn write_to_stream<W>(&mut self, stream: &mut W) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin,
    {
        while self.written < self.buffer.len() {
            let n = stream.write(&self.buffer[self.written..]).await?;

            if n == 0 {
                return Err(anyhow::anyhow!("connection closed while writing"));
            }

            self.written += n;
        }
        stream.flush().await?;

        Ok(())
    }
}
