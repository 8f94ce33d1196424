use crate::http::headers::HeaderMap;
use crate::http::request::{Method, RequestHead};
use crate::http::response::ResponseHead;

/// Upper bound for a request or response head.
pub const MAX_HEAD_SIZE: usize = 64 * 1024;

#[derive(Debug, PartialEq, Eq)]
pub enum ParseError {
    InvalidRequest,
    InvalidMethod,
    InvalidHeader,
    InvalidStatus,
    HeadTooLarge,
    Incomplete,
}

impl ParseError {
    pub fn describe(&self) -> &'static str {
        match self {
            ParseError::InvalidRequest => "malformed request line",
            ParseError::InvalidMethod => "invalid method",
            ParseError::InvalidHeader => "malformed header line",
            ParseError::InvalidStatus => "malformed status line",
            ParseError::HeadTooLarge => "message head too large",
            ParseError::Incomplete => "incomplete message head",
        }
    }
}

/// Parses a request head from the start of `buf`.
///
/// Returns the head and the number of bytes it occupied; the body (if any)
/// starts right after and is left for the caller to stream.
pub fn parse_request_head(buf: &[u8]) -> Result<(RequestHead, usize), ParseError> {
    let (head_str, consumed) = split_head(buf)?;

    let mut lines = head_str.split("\r\n");

    // Request line
    let request_line = lines.next().ok_or(ParseError::InvalidRequest)?;
    let mut parts = request_line.split_whitespace();

    let method_str = parts.next().ok_or(ParseError::InvalidRequest)?;
    let target = parts.next().ok_or(ParseError::InvalidRequest)?;
    let version = parts.next().ok_or(ParseError::InvalidRequest)?;

    if parts.next().is_some() || !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidRequest);
    }

    let method = Method::from_str(method_str).ok_or(ParseError::InvalidMethod)?;
    let headers = parse_header_lines(lines)?;

    let request = RequestHead {
        method,
        target: target.to_string(),
        version: version.to_string(),
        headers,
        remote_addr: None,
    };

    Ok((request, consumed))
}

/// Parses a response head from the start of `buf`.
pub fn parse_response_head(buf: &[u8]) -> Result<(ResponseHead, usize), ParseError> {
    let (head_str, consumed) = split_head(buf)?;

    let mut lines = head_str.split("\r\n");

    let status_line = lines.next().ok_or(ParseError::InvalidStatus)?;
    let mut parts = status_line.splitn(3, ' ');

    let version = parts.next().ok_or(ParseError::InvalidStatus)?;
    if !version.starts_with("HTTP/1.") {
        return Err(ParseError::InvalidStatus);
    }
    let status = parts
        .next()
        .and_then(|s| s.parse::<u16>().ok())
        .filter(|s| (100..1000).contains(s))
        .ok_or(ParseError::InvalidStatus)?;
    let reason = parts.next().unwrap_or("").to_string();

    let headers = parse_header_lines(lines)?;

    Ok((
        ResponseHead {
            version: version.to_string(),
            status,
            reason,
            headers,
        },
        consumed,
    ))
}

fn split_head(buf: &[u8]) -> Result<(&str, usize), ParseError> {
    // Look for header/body separator
    let Some(headers_end) = find_headers_end(buf) else {
        if buf.len() > MAX_HEAD_SIZE {
            return Err(ParseError::HeadTooLarge);
        }
        return Err(ParseError::Incomplete);
    };
    if headers_end > MAX_HEAD_SIZE {
        return Err(ParseError::HeadTooLarge);
    }

    let head = std::str::from_utf8(&buf[..headers_end]).map_err(|_| ParseError::InvalidRequest)?;
    Ok((head, headers_end + 4))
}

fn parse_header_lines<'a>(lines: impl Iterator<Item = &'a str>) -> Result<HeaderMap, ParseError> {
    let mut headers = HeaderMap::new();

    for line in lines {
        if line.is_empty() {
            continue;
        }

        let (key, value) = line.split_once(':').ok_or(ParseError::InvalidHeader)?;
        let key = key.trim();
        if key.is_empty() || key.contains(char::is_whitespace) {
            return Err(ParseError::InvalidHeader);
        }

        headers.append(key, value.trim());
    }

    Ok(headers)
}

fn find_headers_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n")
}
