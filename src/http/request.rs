//! Requests as the router sees them.

use bytes::Bytes;
use thiserror::Error;

use super::{Headers, Method};

const MAX_HEADERS: usize = 64;

#[derive(Debug, Error)]
pub enum RequestError {
    #[error("request head is incomplete")]
    Incomplete,

    #[error("malformed request head: {0}")]
    Parse(#[from] httparse::Error),

    #[error("request line has no {field}")]
    MissingField { field: &'static str },
}

/// Method, target, headers and body of one request.
///
/// Hosts with their own HTTP stack build one with [`Request::new`]; hosts
/// reading raw HTTP/1.x use [`Request::parse`]. The router rewrites the path
/// when it strips a language prefix or hands a request to a file server, but
/// the query string always travels along.
///
/// ```
/// use pathwise::http::Request;
///
/// let raw = b"GET /en/docs?page=2 HTTP/1.1\r\nAccept-Language: en\r\n\r\n";
/// let (request, _) = Request::parse(raw).unwrap();
///
/// assert_eq!(request.path(), "/en/docs");
/// assert_eq!(request.query_param("page"), Some("2"));
/// assert_eq!(request.headers().get("accept-language"), Some("en"));
/// ```
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    query: Option<String>,
    headers: Headers,
    body: Bytes,
}

impl Request {
    /// HTTP/1.1 request for a target like `/search?q=rust` or `*`.
    ///
    /// Percent escapes in the path are decoded, so `/files/a%20b` is routed
    /// and captured as `/files/a b`. A path whose escapes do not decode to
    /// UTF-8 is kept as sent. The query string is never decoded.
    pub fn new(method: impl Into<Method>, target: &str) -> Self {
        let (path, query) = split_target(target);
        Self {
            method: method.into(),
            path,
            query,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    /// Parses a request head from `buf`.
    ///
    /// Returns the request and the offset where its body starts; whatever
    /// follows that offset in `buf` becomes the body. Header values that are
    /// not UTF-8 are skipped.
    pub fn parse(buf: &[u8]) -> Result<(Self, usize), RequestError> {
        let mut slots = [httparse::EMPTY_HEADER; MAX_HEADERS];
        let mut head = httparse::Request::new(&mut slots);

        let httparse::Status::Complete(body_start) = head.parse(buf)? else {
            return Err(RequestError::Incomplete);
        };

        let method = head.method.ok_or(RequestError::MissingField { field: "method" })?;
        let target = head.path.ok_or(RequestError::MissingField { field: "target" })?;
        if head.version.is_none() {
            return Err(RequestError::MissingField { field: "version" });
        }

        let mut request = Self::new(method, target);
        request.headers = Headers::with_capacity(head.headers.len());
        for field in head.headers.iter() {
            if let Ok(value) = std::str::from_utf8(field.value) {
                request.headers.insert(field.name, value);
            }
        }
        request.body = Bytes::copy_from_slice(&buf[body_start..]);

        Ok((request, body_start))
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Decoded path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn set_path(&mut self, path: impl Into<String>) {
        self.path = path.into();
    }

    /// Decoded path followed by the raw query string.
    pub fn target(&self) -> String {
        target_with_query(&self.path, self.query.as_deref())
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// First value of `key` in the query string.
    ///
    /// Only exact keys match; neither `+` nor percent escapes are decoded.
    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.query
            .as_deref()?
            .split('&')
            .map(|pair| pair.split_once('=').unwrap_or((pair, "")))
            .find(|(name, _)| *name == key)
            .map(|(_, value)| value)
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }
}

pub(crate) fn target_with_query(path: &str, query: Option<&str>) -> String {
    match query {
        Some(query) => format!("{path}?{query}"),
        None => path.to_owned(),
    }
}

fn split_target(target: &str) -> (String, Option<String>) {
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query.to_owned())),
        None => (target, None),
    };
    let path = urlencoding::decode(path).map_or_else(|_| path.to_owned(), |decoded| decoded.into_owned());
    (path, query)
}
