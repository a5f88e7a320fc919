use crate::network::Endpoint;

use ::http::{Method, StatusCode, Version};
use bytes::{Buf, BufMut, BytesMut};
use std::io;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Path served by the echo route
pub const ECHO_PATH: &str = "/echo";
/// Body of every successful echo response
pub const RECEIVED_BODY: &[u8] = b"received\n";
/// Interim response sent to clients that ask for `Expect: 100-continue`
pub const CONTINUE_RESPONSE: &[u8] = b"HTTP/1.1 100 Continue\r\n\r\n";
/// Header slots available to the head parser
pub const MAX_HEADERS: usize = 64;

#[derive(Debug, thiserror::Error)]
pub enum HttpProtocolError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTTP parsing error: {0}")]
    HttpParse(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Header section larger than {0} bytes")]
    HeadersTooLarge(usize),
    #[error("More than {0} header fields")]
    TooManyHeaders(usize),
    #[error("Invalid chunk: {0}")]
    InvalidChunk(String),
    #[error("Connection closed before the message head was complete")]
    IncompleteHead,
    #[error("Connection closed before the message body was complete")]
    IncompleteBody,
}

impl HttpProtocolError {
    /// Status to answer with when a request head is rejected
    ///
    /// `None` means the connection is unusable and is dropped silently.
    pub fn rejection_status(&self) -> Option<StatusCode> {
        match self {
            HttpProtocolError::HttpParse(_) | HttpProtocolError::InvalidRequest(_) => {
                Some(StatusCode::BAD_REQUEST)
            }
            HttpProtocolError::HeadersTooLarge(_) | HttpProtocolError::TooManyHeaders(_) => {
                Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE)
            }
            _ => None,
        }
    }
}

/// How the end of a message body is found on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyFraming {
    /// Exactly this many bytes follow the head
    Length(u64),
    /// `Transfer-Encoding: chunked`
    Chunked,
    /// The body runs until the peer closes the connection (responses only)
    UntilClose,
}

/// Parsed request line and the headers the server acts on
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestHead {
    pub method: Method,
    pub target: String,
    pub version: Version,
    pub framing: BodyFraming,
    pub keep_alive: bool,
    pub expect_continue: bool,
}

impl RequestHead {
    /// Parses a request head from the start of `buf`
    ///
    /// Returns `Ok(None)` while the head is still incomplete, otherwise the
    /// head and the number of bytes it occupied.
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, HttpProtocolError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut req = httparse::Request::new(&mut headers);

        let parsed_len = match req.parse(buf) {
            Ok(httparse::Status::Complete(parsed_len)) => parsed_len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(httparse::Error::TooManyHeaders) => {
                return Err(HttpProtocolError::TooManyHeaders(MAX_HEADERS));
            }
            Err(e) => {
                return Err(HttpProtocolError::HttpParse(format!(
                    "Failed to parse request head: {e}"
                )));
            }
        };

        let method = req
            .method
            .ok_or_else(|| HttpProtocolError::HttpParse("Missing method".to_string()))?;
        let method = Method::from_bytes(method.as_bytes())
            .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid method {method}: {e}")))?;
        let target = req
            .path
            .ok_or_else(|| HttpProtocolError::HttpParse("Missing request target".to_string()))?
            .to_string();
        let version = parse_version(req.version)?;
        let headers = &*req.headers;

        let framing = body_framing(headers, true)?;
        // Transfer-Encoding next to Content-Length, or on HTTP/1.0, leaves the
        // end of the body in doubt: answer, then close
        let ambiguous_framing = has_header(headers, "transfer-encoding")
            && (has_header(headers, "content-length") || version == Version::HTTP_10);
        let keep_alive = !ambiguous_framing && wants_keep_alive(version, headers);
        let expect_continue = version == Version::HTTP_11
            && header_tokens(headers, "expect").any(|v| v.eq_ignore_ascii_case("100-continue"));

        Ok(Some((
            Self {
                method,
                target,
                version,
                framing,
                keep_alive,
                expect_continue,
            },
            parsed_len,
        )))
    }
}

/// Parsed status line and the framing of the body that follows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseHead {
    pub status: StatusCode,
    pub version: Version,
    pub framing: BodyFraming,
}

impl ResponseHead {
    /// Parses a response head from the start of `buf`
    pub fn parse(buf: &[u8]) -> Result<Option<(Self, usize)>, HttpProtocolError> {
        let mut headers = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut res = httparse::Response::new(&mut headers);

        let parsed_len = match res.parse(buf) {
            Ok(httparse::Status::Complete(parsed_len)) => parsed_len,
            Ok(httparse::Status::Partial) => return Ok(None),
            Err(httparse::Error::TooManyHeaders) => {
                return Err(HttpProtocolError::TooManyHeaders(MAX_HEADERS));
            }
            Err(e) => {
                return Err(HttpProtocolError::HttpParse(format!(
                    "Failed to parse response head: {e}"
                )));
            }
        };

        let code = res
            .code
            .ok_or_else(|| HttpProtocolError::HttpParse("Missing status code".to_string()))?;
        let status = StatusCode::from_u16(code)
            .map_err(|e| HttpProtocolError::HttpParse(format!("Invalid status {code}: {e}")))?;
        let version = parse_version(res.version)?;

        let framing = if status.is_informational()
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED
        {
            BodyFraming::Length(0)
        } else {
            body_framing(&*res.headers, false)?
        };

        Ok(Some((
            Self {
                status,
                version,
                framing,
            },
            parsed_len,
        )))
    }
}

/// What the server does with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// `POST /echo`: relay the body, answer 200 `received\n`
    Echo,
    /// Anything else: discard the body, answer 404
    NotFound,
}

impl Route {
    pub fn for_request(head: &RequestHead) -> Self {
        if head.method == Method::POST && head.target == ECHO_PATH {
            Route::Echo
        } else {
            Route::NotFound
        }
    }
}

/// Reads from `reader` into `buf` until `parse` yields a complete head
///
/// The head's bytes are consumed from `buf`; anything after them (body
/// bytes, pipelined requests) stays buffered. Returns `Ok(None)` if the
/// peer closed the connection before sending anything.
pub async fn read_head<R, T, F>(
    reader: &mut R,
    buf: &mut BytesMut,
    max_header_size: usize,
    parse: F,
) -> Result<Option<T>, HttpProtocolError>
where
    R: AsyncRead + Unpin,
    F: Fn(&[u8]) -> Result<Option<(T, usize)>, HttpProtocolError>,
{
    loop {
        if !buf.is_empty() {
            if let Some((head, parsed_len)) = parse(&buf[..])? {
                if parsed_len > max_header_size {
                    return Err(HttpProtocolError::HeadersTooLarge(max_header_size));
                }
                buf.advance(parsed_len);
                return Ok(Some(head));
            }
            if buf.len() > max_header_size {
                return Err(HttpProtocolError::HeadersTooLarge(max_header_size));
            }
        }

        if reader.read_buf(buf).await? == 0 {
            return if buf.is_empty() {
                Ok(None)
            } else {
                Err(HttpProtocolError::IncompleteHead)
            };
        }
    }
}

/// Serializes a complete response with a fixed-length body
pub fn encode_response(status: StatusCode, body: &[u8], keep_alive: bool, dst: &mut BytesMut) {
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nConnection: {}\r\n\r\n",
        status.as_u16(),
        status.canonical_reason().unwrap_or(""),
        body.len(),
        if keep_alive { "keep-alive" } else { "close" },
    );
    dst.reserve(head.len() + body.len());
    dst.put_slice(head.as_bytes());
    dst.put_slice(body);
}

/// Serializes the head of the client's `POST /echo` request
///
/// The body is sent with chunked transfer coding since its length is not
/// known until the input ends.
pub fn encode_echo_request_head(endpoint: &Endpoint, dst: &mut BytesMut) {
    let head = format!(
        "POST {ECHO_PATH} HTTP/1.1\r\nHost: {}\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n",
        endpoint.authority(),
    );
    dst.put_slice(head.as_bytes());
}

fn parse_version(version: Option<u8>) -> Result<Version, HttpProtocolError> {
    match version {
        Some(0) => Ok(Version::HTTP_10),
        Some(1) => Ok(Version::HTTP_11),
        other => Err(HttpProtocolError::HttpParse(format!(
            "Unsupported HTTP version: {other:?}"
        ))),
    }
}

/// Comma-separated tokens of every header named `name`
fn header_tokens<'a>(
    headers: &'a [httparse::Header<'a>],
    name: &'a str,
) -> impl Iterator<Item = &'a str> + 'a {
    headers
        .iter()
        .filter(move |h| h.name.eq_ignore_ascii_case(name))
        .filter_map(|h| std::str::from_utf8(h.value).ok())
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

fn has_header(headers: &[httparse::Header<'_>], name: &str) -> bool {
    headers.iter().any(|h| h.name.eq_ignore_ascii_case(name))
}

fn wants_keep_alive(version: Version, headers: &[httparse::Header<'_>]) -> bool {
    let mut close = false;
    let mut keep_alive = false;
    for token in header_tokens(headers, "connection") {
        if token.eq_ignore_ascii_case("close") {
            close = true;
        } else if token.eq_ignore_ascii_case("keep-alive") {
            keep_alive = true;
        }
    }

    if close {
        false
    } else {
        version == Version::HTTP_11 || keep_alive
    }
}

fn body_framing(
    headers: &[httparse::Header<'_>],
    is_request: bool,
) -> Result<BodyFraming, HttpProtocolError> {
    if has_header(headers, "transfer-encoding") {
        let last = header_tokens(headers, "transfer-encoding").last();
        return match last {
            Some(coding) if coding.eq_ignore_ascii_case("chunked") => Ok(BodyFraming::Chunked),
            _ if is_request => Err(HttpProtocolError::InvalidRequest(
                "Unsupported Transfer-Encoding".to_string(),
            )),
            _ => Ok(BodyFraming::UntilClose),
        };
    }

    let mut length: Option<u64> = None;
    for h in headers
        .iter()
        .filter(|h| h.name.eq_ignore_ascii_case("content-length"))
    {
        let value = std::str::from_utf8(h.value)
            .map_err(|_| HttpProtocolError::InvalidRequest("Non-ASCII Content-Length".to_string()))?;
        for token in value.split(',').map(str::trim) {
            if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
                return Err(HttpProtocolError::InvalidRequest(format!(
                    "Invalid Content-Length: {value}"
                )));
            }
            let parsed = token.parse::<u64>().map_err(|e| {
                HttpProtocolError::InvalidRequest(format!("Invalid Content-Length {token}: {e}"))
            })?;
            match length {
                Some(existing) if existing != parsed => {
                    return Err(HttpProtocolError::InvalidRequest(
                        "Conflicting Content-Length values".to_string(),
                    ));
                }
                _ => length = Some(parsed),
            }
        }
    }

    Ok(match length {
        Some(n) => BodyFraming::Length(n),
        None if is_request => BodyFraming::Length(0),
        None => BodyFraming::UntilClose,
    })
}
