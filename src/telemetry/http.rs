//! Minimal HTTP/1.1 over a [`SocketPort`].
//!
//! One request per socket: open, send, poll-receive until the response is
//! complete (by `Content-Length`, chunked terminator or timeout), close.
//! The receive loop pets the watchdog on every idle poll.

use log::{debug, info, warn};

use crate::app::ports::{SocketPort, WatchdogPort};
use crate::error::TelemetryError;

const RECV_CHUNK: usize = 512;
const RECV_POLL_MS: u32 = 100;

/// Wait applied before reporting a missing status line, so an immediate
/// caller retry does not hammer a half-open link.
pub const NO_STATUS_BACKOFF_MS: u32 = 10_000;

/// Upper bound on a buffered response.
const MAX_RESPONSE: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub method: Method,
    pub host: String,
    pub port: u16,
    pub secure: bool,
    /// Path including any query string.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl Request {
    pub fn get(host: &str, port: u16, secure: bool, path: String) -> Self {
        Self {
            method: Method::Get,
            host: host.to_owned(),
            port,
            secure,
            path,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn post(host: &str, port: u16, secure: bool, path: &str, content_type: &str, body: Vec<u8>) -> Self {
        Self {
            method: Method::Post,
            host: host.to_owned(),
            port,
            secure,
            path: path.to_owned(),
            headers: vec![("Content-Type".to_owned(), content_type.to_owned())],
            body,
        }
    }

    pub fn header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_owned(), value.to_owned()));
        self
    }

    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Serialise to wire bytes.
    pub fn encode(&self, keep_alive: bool) -> Vec<u8> {
        let mut head = format!(
            "{} {} HTTP/1.1\r\nHost: {}\r\nUser-Agent: waterpal/{}\r\nConnection: {}\r\n",
            self.method.as_str(),
            self.path,
            self.host,
            env!("CARGO_PKG_VERSION"),
            if keep_alive { "keep-alive" } else { "close" },
        );
        for (name, value) in &self.headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        if self.method == Method::Post || !self.body.is_empty() {
            head.push_str(&format!("Content-Length: {}\r\n", self.body.len()));
        }
        head.push_str("\r\n");

        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub content_length: Option<usize>,
    pub chunked: bool,
    pub body: Vec<u8>,
}

impl Response {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseError {
    /// More bytes are needed.
    Incomplete,
    /// Not an HTTP response.
    Malformed,
}

/// Status code from the first line, if it is there yet.
pub fn parse_status_line(raw: &[u8]) -> Option<u16> {
    let end = raw.windows(2).position(|w| w == b"\r\n")?;
    let line = core::str::from_utf8(&raw[..end]).ok()?;
    let mut parts = line.split_ascii_whitespace();
    if !parts.next()?.starts_with("HTTP/") {
        return None;
    }
    let code = parts.next()?;
    if code.len() != 3 {
        return None;
    }
    code.parse().ok().filter(|c| (100..=599).contains(c))
}

/// Parse a complete response.  `Incomplete` means the body is not all
/// there yet according to its framing.
pub fn parse_response(raw: &[u8]) -> Result<Response, ParseError> {
    let head_end = match raw.windows(4).position(|w| w == b"\r\n\r\n") {
        Some(i) => i,
        None if raw.len() > MAX_RESPONSE => return Err(ParseError::Malformed),
        None => return Err(ParseError::Incomplete),
    };
    let head = core::str::from_utf8(&raw[..head_end]).map_err(|_| ParseError::Malformed)?;
    let mut lines = head.split("\r\n");
    let status = lines
        .next()
        .and_then(|l| parse_status_line(format!("{l}\r\n").as_bytes()))
        .ok_or(ParseError::Malformed)?;

    let mut headers = Vec::new();
    for line in lines {
        let (name, value) = line.split_once(':').ok_or(ParseError::Malformed)?;
        headers.push((name.trim().to_owned(), value.trim().to_owned()));
    }

    let find = |n: &str| {
        headers
            .iter()
            .find(|(h, _)| h.eq_ignore_ascii_case(n))
            .map(|(_, v)| v.as_str())
    };
    let chunked = find("Transfer-Encoding").is_some_and(|v| v.eq_ignore_ascii_case("chunked"));
    let content_length = match find("Content-Length") {
        Some(v) => Some(v.parse::<usize>().map_err(|_| ParseError::Malformed)?),
        None => None,
    };

    let rest = &raw[head_end + 4..];
    let body = if chunked {
        decode_chunked(rest)?
    } else if let Some(len) = content_length {
        if rest.len() < len {
            return Err(ParseError::Incomplete);
        }
        rest[..len].to_vec()
    } else {
        // Framed by connection close; whatever has arrived is the body.
        rest.to_vec()
    };

    Ok(Response {
        status,
        headers,
        content_length,
        chunked,
        body,
    })
}

fn decode_chunked(mut rest: &[u8]) -> Result<Vec<u8>, ParseError> {
    let mut body = Vec::new();
    loop {
        let line_end = rest
            .windows(2)
            .position(|w| w == b"\r\n")
            .ok_or(ParseError::Incomplete)?;
        let size_line = core::str::from_utf8(&rest[..line_end]).map_err(|_| ParseError::Malformed)?;
        let size_hex = size_line.split(';').next().unwrap_or("").trim();
        let size = usize::from_str_radix(size_hex, 16).map_err(|_| ParseError::Malformed)?;
        rest = &rest[line_end + 2..];
        if size == 0 {
            return Ok(body);
        }
        if size > MAX_RESPONSE {
            return Err(ParseError::Malformed);
        }
        if rest.len() < size + 2 {
            return Err(ParseError::Incomplete);
        }
        body.extend_from_slice(&rest[..size]);
        if &rest[size..size + 2] != b"\r\n" {
            return Err(ParseError::Malformed);
        }
        rest = &rest[size + 2..];
    }
}

/// Run one request on a fresh socket and return the response.
///
/// A response without a usable status line becomes
/// [`TelemetryError::NoStatus`] after [`NO_STATUS_BACKOFF_MS`].
pub fn exchange<S, W>(
    sock: &mut S,
    watchdog: &mut W,
    request: &Request,
    keep_alive: bool,
    timeout_ms: u32,
) -> Result<Response, TelemetryError>
where
    S: SocketPort + ?Sized,
    W: WatchdogPort + ?Sized,
{
    info!(
        "HTTP: {} {}:{}{}",
        request.method.as_str(),
        request.host,
        request.port,
        request.path
    );
    sock.open(&request.host, request.port, request.secure)?;
    if let Err(e) = sock.send(&request.encode(keep_alive)) {
        sock.close();
        return Err(e.into());
    }

    let mut raw = Vec::new();
    let mut idle_ms = 0;
    let parsed = loop {
        match sock.recv(RECV_CHUNK) {
            Ok(data) if !data.is_empty() => {
                raw.extend_from_slice(&data);
                idle_ms = 0;
                match parse_response(&raw) {
                    Err(ParseError::Incomplete) if raw.len() <= MAX_RESPONSE => continue,
                    other => break other,
                }
            }
            Ok(_) => {}
            Err(e) => {
                warn!("HTTP: receive failed: {}", e);
                break parse_response(&raw);
            }
        }
        if idle_ms >= timeout_ms {
            break parse_response(&raw);
        }
        sock.idle(RECV_POLL_MS);
        watchdog.pet();
        idle_ms += RECV_POLL_MS;
    };
    sock.close();
    debug!("HTTP: socket closed");

    let response = match parsed {
        Ok(r) => r,
        Err(_) => {
            warn!("HTTP: no status code received ({} bytes)", raw.len());
            sock.idle(NO_STATUS_BACKOFF_MS);
            watchdog.pet();
            return Err(TelemetryError::NoStatus);
        }
    };

    info!("HTTP: status {}", response.status);
    for (name, value) in &response.headers {
        debug!("    {} : {}", name, value);
    }
    if let Some(len) = response.content_length {
        debug!("HTTP: content length {}", len);
    }
    if response.chunked {
        debug!("HTTP: response is chunked");
    }
    debug!("HTTP: body length {}", response.body.len());
    Ok(response)
}
