//! Outbound HTTP/1.1 client built on the same connection-oriented
//! primitives as the server side: a per-host [`pool::ConnectionPool`]
//! instead of one dial per request, and a bounded [`UrlCache`] so
//! repeated requests to the same URL skip re-parsing it.
pub mod pool;

use crate::http::body::decode_in_place;
use crate::limits::{ClientPoolLimits, DialLimits};
use crate::Method;
use pool::{AcquireError, ConnectionPool, Dial, TcpDial};
use std::error;
use std::fmt;
use std::io;
use std::sync::Mutex;
use std::time::Instant;
use tokio::io::{AsyncReadExt, AsyncWriteExt};

/// Errors raised while issuing a client request.
#[derive(Debug)]
pub enum Error {
    /// The request or cached URL wasn't a valid `scheme://host[:port]/path`.
    InvalidUrl,
    /// Dialing or writing to the upstream connection failed.
    Io(io::Error),
    /// The upstream's response didn't parse as HTTP/1.1.
    MalformedResponse,
    /// The connection pool for this host is at capacity and dialing a
    /// fresh connection also failed.
    PoolExhausted,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl error::Error for Error {}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<AcquireError> for Error {
    fn from(err: AcquireError) -> Self {
        match err {
            AcquireError::Io(err) => Error::Io(err),
            AcquireError::PoolExhausted => Error::PoolExhausted,
        }
    }
}

/// A URL split into the parts a client needs to dial and frame a
/// request, cached so the same URL isn't re-parsed on every call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedUrl {
    host_port: Box<str>,
    path: Box<str>,
}

impl ParsedUrl {
    /// Parses `scheme://host[:port]/path`. Only `http://` is
    /// supported; TLS termination is a concern for the caller's [`pool::Dial`]
    /// implementation, not URL parsing.
    pub fn parse(url: &str) -> Result<Self, Error> {
        let rest = url.strip_prefix("http://").ok_or(Error::InvalidUrl)?;
        let (authority, path) = match rest.find('/') {
            Some(idx) => (&rest[..idx], &rest[idx..]),
            None => (rest, "/"),
        };
        if authority.is_empty() {
            return Err(Error::InvalidUrl);
        }

        let host_port = if authority.contains(':') {
            authority.to_string()
        } else {
            format!("{authority}:80")
        };

        Ok(ParsedUrl {
            host_port: host_port.into(),
            path: path.into(),
        })
    }

    /// The `host:port` this URL dials.
    pub fn host_port(&self) -> &str {
        &self.host_port
    }

    /// The request-target path (and query, if any).
    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Bounded LRU cache of parsed URLs, avoiding repeated string parsing
/// for clients that hammer the same small set of endpoints.
pub struct UrlCache {
    cache: lru::LruCache<Box<str>, ParsedUrl>,
}

impl UrlCache {
    /// Builds a cache holding at most `capacity` entries.
    pub fn new(capacity: std::num::NonZeroUsize) -> Self {
        UrlCache {
            cache: lru::LruCache::new(capacity),
        }
    }

    /// Returns the parsed form of `url`, parsing and caching it on a
    /// miss.
    pub fn get_or_parse(&mut self, url: &str) -> Result<ParsedUrl, Error> {
        if let Some(parsed) = self.cache.get(url) {
            return Ok(parsed.clone());
        }
        let parsed = ParsedUrl::parse(url)?;
        self.cache.put(url.into(), parsed.clone());
        Ok(parsed)
    }
}

/// A request to issue through [`Client::do_request`].
pub struct ClientRequest<'a> {
    pub method: Method,
    pub url: &'a str,
    pub headers: Vec<(&'a [u8], &'a [u8])>,
    pub body: &'a [u8],
}

/// Builder for [`ClientRequest`], mirroring the server-side
/// [`crate::Response`] builder's fluent style.
pub struct RequestBuilder<'a> {
    request: ClientRequest<'a>,
}

impl<'a> RequestBuilder<'a> {
    /// Starts building a request for `method url`.
    pub fn new(method: Method, url: &'a str) -> Self {
        RequestBuilder {
            request: ClientRequest {
                method,
                url,
                headers: Vec::new(),
                body: &[],
            },
        }
    }

    /// Appends a header. Duplicate names are sent as separate header
    /// lines, same as the server side's multi-value headers.
    pub fn header(mut self, name: &'a [u8], value: &'a [u8]) -> Self {
        self.request.headers.push((name, value));
        self
    }

    /// Sets the request body. `Content-Length` is added automatically
    /// at send time; don't also set it via [`Self::header`].
    pub fn body(mut self, body: &'a [u8]) -> Self {
        self.request.body = body;
        self
    }

    /// Finalizes the request.
    pub fn build(self) -> ClientRequest<'a> {
        self.request
    }
}

/// A parsed upstream response.
#[derive(Debug)]
pub struct ClientResponse {
    pub status: u16,
    pub headers: Vec<(Box<[u8]>, Box<[u8]>)>,
    pub body: Vec<u8>,
}

/// The client request engine: a connection pool plus a URL cache,
/// issuing one request per acquired connection and returning it to the
/// pool once the response is fully read.
///
/// Generic over [`Dial`] so a caller can substitute a TLS-terminating
/// dialer; [`Client::new`] defaults to plain [`TcpDial`].
pub struct Client<D: Dial = TcpDial> {
    pool: ConnectionPool<D>,
    url_cache: Mutex<UrlCache>,
}

impl Client<TcpDial> {
    /// Builds a client with the given pool and dial limits, and a URL
    /// cache sized to `url_cache_capacity`.
    pub fn new(
        pool_limits: ClientPoolLimits,
        dial_limits: DialLimits,
        url_cache_capacity: std::num::NonZeroUsize,
    ) -> Self {
        Client {
            pool: ConnectionPool::new(pool_limits, TcpDial::new(dial_limits)),
            url_cache: Mutex::new(UrlCache::new(url_cache_capacity)),
        }
    }
}

impl<D: Dial> Client<D> {
    /// Builds a client dialing through a caller-supplied [`Dial`]
    /// implementation, e.g. one that terminates TLS before returning
    /// the stream.
    pub fn with_dial(
        pool_limits: ClientPoolLimits,
        dial: D,
        url_cache_capacity: std::num::NonZeroUsize,
    ) -> Self {
        Client {
            pool: ConnectionPool::new(pool_limits, dial),
            url_cache: Mutex::new(UrlCache::new(url_cache_capacity)),
        }
    }

    /// Issues `request`, acquiring a pooled connection to its host,
    /// writing the request line/headers/body, and parsing the
    /// response. The connection is released back to the pool
    /// afterward unless the response asked for `Connection: close`.
    pub async fn do_request(&self, request: ClientRequest<'_>) -> Result<ClientResponse, Error> {
        let parsed = {
            let mut cache = self.url_cache.lock().unwrap();
            cache.get_or_parse(request.url)?
        };

        let mut stream = self.pool.acquire(parsed.host_port()).await?;
        let dialed_at = Instant::now();

        let mut buf = Vec::with_capacity(256 + request.body.len());
        write_request_line(&mut buf, request.method, parsed.path());
        write_request_headers(&mut buf, &request.headers, request.body.len());
        buf.extend_from_slice(request.body);
        stream.write_all(&buf).await?;

        let (response, keep_alive) = read_response(&mut stream).await?;

        if keep_alive {
            self.pool.release(parsed.host_port(), stream, dialed_at);
        }

        Ok(response)
    }
}

fn write_request_line(buf: &mut Vec<u8>, method: Method, path: &str) {
    buf.extend_from_slice(method.as_bytes());
    buf.push(b' ');
    buf.extend_from_slice(path.as_bytes());
    buf.extend_from_slice(b" HTTP/1.1\r\n");
}

fn write_request_headers(buf: &mut Vec<u8>, headers: &[(&[u8], &[u8])], body_len: usize) {
    for (name, value) in headers {
        buf.extend_from_slice(name);
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(value);
        buf.extend_from_slice(b"\r\n");
    }
    if body_len > 0 {
        buf.extend_from_slice(b"content-length: ");
        buf.extend_from_slice(body_len.to_string().as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"\r\n");
}

/// Reads and parses one HTTP/1.1 response (status line, headers,
/// framed body) from `stream`. Returns whether the connection is
/// eligible to go back into the pool.
async fn read_response(stream: &mut tokio::net::TcpStream) -> Result<(ClientResponse, bool), Error> {
    let mut buf = Vec::with_capacity(4096);
    let head_end = loop {
        let mut chunk = [0u8; 4096];
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Err(Error::MalformedResponse);
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(pos) = find_header_end(&buf) {
            break pos;
        }
        if buf.len() > 64 * 1024 {
            return Err(Error::MalformedResponse);
        }
    };

    let (status, headers, keep_alive, content_length, chunked) = parse_head(&buf[..head_end])?;
    let mut body = buf[head_end..].to_vec();

    if chunked {
        while find_chunked_end(&body).is_none() {
            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::MalformedResponse);
            }
            body.extend_from_slice(&chunk[..n]);
        }
        let (len, _) = decode_in_place(&mut body).map_err(|_| Error::MalformedResponse)?;
        body.truncate(len);
    } else if let Some(len) = content_length {
        while body.len() < len {
            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(Error::MalformedResponse);
            }
            body.extend_from_slice(&chunk[..n]);
        }
        body.truncate(len);
    } else {
        // close-delimited: read until EOF.
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            body.extend_from_slice(&chunk[..n]);
        }
    }

    Ok((
        ClientResponse {
            status,
            headers,
            body,
        },
        keep_alive,
    ))
}

fn find_header_end(buf: &[u8]) -> Option<usize> {
    buf.windows(4).position(|w| w == b"\r\n\r\n").map(|pos| pos + 4)
}

fn find_chunked_end(buf: &[u8]) -> Option<usize> {
    buf.windows(5).position(|w| w == b"0\r\n\r\n")
}

type ParsedHead = (u16, Vec<(Box<[u8]>, Box<[u8]>)>, bool, Option<usize>, bool);

fn parse_head(head: &[u8]) -> Result<ParsedHead, Error> {
    let mut lines = head.split(|&b| b == b'\n').map(|line| {
        line.strip_suffix(b"\r").unwrap_or(line)
    });

    let status_line = lines.next().ok_or(Error::MalformedResponse)?;
    let status = parse_status_line(status_line)?;

    let mut headers = Vec::new();
    let mut keep_alive = true;
    let mut content_length = None;
    let mut chunked = false;

    for line in lines {
        if line.is_empty() {
            continue;
        }
        let colon = line.iter().position(|&b| b == b':').ok_or(Error::MalformedResponse)?;
        let name = &line[..colon];
        let value = line[colon + 1..].iter().position(|&b| b != b' ').map_or(&line[colon + 1..], |skip| &line[colon + 1 + skip..]);

        if name.eq_ignore_ascii_case(b"content-length") {
            content_length = std::str::from_utf8(value).ok().and_then(|v| v.parse().ok());
        } else if name.eq_ignore_ascii_case(b"transfer-encoding")
            && value.eq_ignore_ascii_case(b"chunked")
        {
            chunked = true;
        } else if name.eq_ignore_ascii_case(b"connection") && value.eq_ignore_ascii_case(b"close") {
            keep_alive = false;
        }

        headers.push((name.into(), value.into()));
    }

    Ok((status, headers, keep_alive, content_length, chunked))
}

fn parse_status_line(line: &[u8]) -> Result<u16, Error> {
    let mut parts = line.splitn(3, |&b| b == b' ');
    let _version = parts.next().ok_or(Error::MalformedResponse)?;
    let status = parts.next().ok_or(Error::MalformedResponse)?;
    std::str::from_utf8(status)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or(Error::MalformedResponse)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_url_with_default_port() {
        let parsed = ParsedUrl::parse("http://example.com/a/b").unwrap();
        assert_eq!(parsed.host_port(), "example.com:80");
        assert_eq!(parsed.path(), "/a/b");
    }

    #[test]
    fn parses_url_with_explicit_port_and_no_path() {
        let parsed = ParsedUrl::parse("http://example.com:8080").unwrap();
        assert_eq!(parsed.host_port(), "example.com:8080");
        assert_eq!(parsed.path(), "/");
    }

    #[test]
    fn rejects_non_http_scheme() {
        assert!(matches!(ParsedUrl::parse("ftp://example.com"), Err(Error::InvalidUrl)));
    }

    #[test]
    fn url_cache_returns_same_parse_on_hit() {
        let mut cache = UrlCache::new(std::num::NonZeroUsize::new(4).unwrap());
        let a = cache.get_or_parse("http://example.com/x").unwrap();
        let b = cache.get_or_parse("http://example.com/x").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn parses_status_line() {
        assert_eq!(parse_status_line(b"HTTP/1.1 200 OK").unwrap(), 200);
    }

    #[test]
    fn parses_head_extracts_content_length_and_keep_alive() {
        let head = b"HTTP/1.1 200 OK\r\ncontent-length: 5\r\n\r\n";
        let (status, headers, keep_alive, content_length, chunked) = parse_head(head).unwrap();
        assert_eq!(status, 200);
        assert_eq!(headers.len(), 1);
        assert!(keep_alive);
        assert_eq!(content_length, Some(5));
        assert!(!chunked);
    }

    #[test]
    fn parses_head_detects_connection_close() {
        let head = b"HTTP/1.1 200 OK\r\nconnection: close\r\n\r\n";
        let (_, _, keep_alive, _, _) = parse_head(head).unwrap();
        assert!(!keep_alive);
    }

    #[test]
    fn request_builder_collects_headers_and_body() {
        let request = RequestBuilder::new(Method::Post, "http://example.com/")
            .header(b"x-trace", b"1")
            .body(b"payload")
            .build();
        assert_eq!(request.headers, vec![(b"x-trace".as_slice(), b"1".as_slice())]);
        assert_eq!(request.body, b"payload");
    }
}
