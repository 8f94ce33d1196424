//! Message body framing and verbatim body relaying.
//!
//! Bodies are never decoded: chunked bodies are copied with their chunk
//! framing intact, so the relayed message keeps the headers it was sent with.
//! The chunk structure is parsed only to find where the body ends.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::http::headers::HeaderMap;
use crate::http::request::Method;

const READ_CHUNK: usize = 8192;
const MAX_LINE: usize = 8192;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    Empty,
    Length(u64),
    Chunked,
    /// Delimited by the sender closing the connection (responses only)
    UntilClose,
}

impl BodyFraming {
    /// A request whose transfer coding does not end in `chunked` has no
    /// knowable length and is refused.
    pub fn for_request(headers: &HeaderMap) -> Result<Self, &'static str> {
        if headers.contains("Transfer-Encoding") {
            if is_chunked(headers) {
                return Ok(BodyFraming::Chunked);
            }
            return Err("unsupported transfer coding");
        }
        match content_length(headers)? {
            Some(0) | None => Ok(BodyFraming::Empty),
            Some(n) => Ok(BodyFraming::Length(n)),
        }
    }

    pub fn for_response(
        request_method: &Method,
        status: u16,
        headers: &HeaderMap,
    ) -> Result<Self, &'static str> {
        if *request_method == Method::HEAD
            || (100..200).contains(&status)
            || status == 204
            || status == 304
        {
            return Ok(BodyFraming::Empty);
        }
        if headers.contains("Transfer-Encoding") {
            if is_chunked(headers) {
                return Ok(BodyFraming::Chunked);
            }
            return Ok(BodyFraming::UntilClose);
        }
        match content_length(headers)? {
            Some(0) => Ok(BodyFraming::Empty),
            Some(n) => Ok(BodyFraming::Length(n)),
            None => Ok(BodyFraming::UntilClose),
        }
    }

    /// True when the end of the body is known without closing the connection.
    pub fn is_self_delimiting(&self) -> bool {
        !matches!(self, BodyFraming::UntilClose)
    }
}

fn is_chunked(headers: &HeaderMap) -> bool {
    headers
        .get_all("Transfer-Encoding")
        .flat_map(|v| v.split(','))
        .last()
        .is_some_and(|coding| coding.trim().eq_ignore_ascii_case("chunked"))
}

fn content_length(headers: &HeaderMap) -> Result<Option<u64>, &'static str> {
    let mut found: Option<u64> = None;
    for value in headers.get_all("Content-Length") {
        let value = value.trim();
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err("invalid Content-Length");
        }
        let n = value.parse::<u64>().map_err(|_| "invalid Content-Length")?;
        if found.is_some_and(|prev| prev != n) {
            return Err("conflicting Content-Length headers");
        }
        found = Some(n);
    }
    Ok(found)
}

/// Failure while relaying a body, attributed to the side that caused it.
#[derive(Debug)]
pub enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

/// A reader with a carry-over buffer, used for both the client side and the
/// backend side of a relay. Bytes read past the end of a message stay in the
/// buffer for the next one.
pub struct HttpReader<R> {
    inner: R,
    buf: BytesMut,
}

impl<R> HttpReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: BytesMut::with_capacity(READ_CHUNK),
        }
    }

    pub fn buffer(&self) -> &[u8] {
        &self.buf
    }

    pub fn consume(&mut self, n: usize) {
        let _ = self.buf.split_to(n);
    }

    pub fn into_parts(self) -> (R, BytesMut) {
        (self.inner, self.buf)
    }

    /// Reads more bytes into the buffer. `Ok(0)` means end of stream.
    pub async fn fill(&mut self) -> io::Result<usize> {
        self.buf.reserve(READ_CHUNK);
        self.inner.read_buf(&mut self.buf).await
    }

    /// Copies one message body to `writer` exactly as framed on the wire,
    /// returning the number of bytes written.
    pub async fn copy_body<W>(&mut self, writer: &mut W, framing: BodyFraming) -> Result<u64, CopyError>
    where
        W: AsyncWrite + Unpin,
    {
        let copied = match framing {
            BodyFraming::Empty => 0,
            BodyFraming::Length(n) => self.copy_exact(writer, n).await?,
            BodyFraming::Chunked => self.copy_chunked(writer).await?,
            BodyFraming::UntilClose => self.copy_until_close(writer).await?,
        };
        writer.flush().await.map_err(CopyError::Write)?;
        Ok(copied)
    }

    async fn copy_exact<W>(&mut self, writer: &mut W, len: u64) -> Result<u64, CopyError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut remaining = len;
        while remaining > 0 {
            if self.buf.is_empty() {
                let n = self.fill().await.map_err(CopyError::Read)?;
                if n == 0 {
                    return Err(CopyError::Read(unexpected_eof("body ended early")));
                }
            }
            let take = self.buf.len().min(remaining as usize);
            let chunk = self.buf.split_to(take);
            writer.write_all(&chunk).await.map_err(CopyError::Write)?;
            remaining -= take as u64;
        }
        Ok(len)
    }

    async fn copy_chunked<W>(&mut self, writer: &mut W) -> Result<u64, CopyError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut copied = 0u64;
        loop {
            let line = self.read_line().await?;
            let size = parse_chunk_size(&line).map_err(CopyError::Read)?;
            writer.write_all(&line).await.map_err(CopyError::Write)?;
            copied += line.len() as u64;

            if size == 0 {
                // trailer section, terminated by an empty line
                loop {
                    let trailer = self.read_line().await?;
                    writer.write_all(&trailer).await.map_err(CopyError::Write)?;
                    copied += trailer.len() as u64;
                    if &trailer[..] == b"\r\n" || &trailer[..] == b"\n" {
                        return Ok(copied);
                    }
                }
            }

            // chunk data plus its CRLF
            let framed = size
                .checked_add(2)
                .ok_or_else(|| CopyError::Read(invalid_data("chunk size too large")))?;
            copied += self.copy_exact(writer, framed).await?;
        }
    }

    async fn copy_until_close<W>(&mut self, writer: &mut W) -> Result<u64, CopyError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut copied = 0u64;
        loop {
            if !self.buf.is_empty() {
                let chunk = self.buf.split();
                writer.write_all(&chunk).await.map_err(CopyError::Write)?;
                copied += chunk.len() as u64;
            }
            let n = self.fill().await.map_err(CopyError::Read)?;
            if n == 0 {
                return Ok(copied);
            }
        }
    }

    /// Reads one line including its terminator.
    async fn read_line(&mut self) -> Result<BytesMut, CopyError> {
        loop {
            if let Some(pos) = self.buf.iter().position(|b| *b == b'\n') {
                return Ok(self.buf.split_to(pos + 1));
            }
            if self.buf.len() > MAX_LINE {
                return Err(CopyError::Read(invalid_data("chunk line too long")));
            }
            let n = self.fill().await.map_err(CopyError::Read)?;
            if n == 0 {
                return Err(CopyError::Read(unexpected_eof("chunked body ended early")));
            }
        }
    }
}

fn parse_chunk_size(line: &[u8]) -> io::Result<u64> {
    let line = std::str::from_utf8(line).map_err(|_| invalid_data("chunk size is not UTF-8"))?;
    let size = line
        .split(';')
        .next()
        .map(str::trim)
        .unwrap_or_default();
    u64::from_str_radix(size, 16).map_err(|_| invalid_data("invalid chunk size"))
}

fn unexpected_eof(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, msg)
}

fn invalid_data(msg: &'static str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg)
}
