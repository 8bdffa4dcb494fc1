//! The HTTP vocabulary the router works in.
//!
//! Hosts hand the router a [`Request`] (parsed with [`Request::parse`] or
//! built directly) and get a [`Response`] back. Handlers write into a
//! [`ResponseBuffer`] that is only copied out once they finish.

use std::fmt;

pub mod buffer;
pub mod headers;
pub mod request;
pub mod response;

pub use buffer::ResponseBuffer;
pub use headers::Headers;
pub use request::Request;
pub use response::Response;

/// Response status.
///
/// Covers the codes the router produces itself plus the ones handlers commonly
/// reach for. `Display` renders the status line fragment, e.g. `404 Not Found`.
///
/// ```
/// use pathwise::http::StatusCode;
///
/// assert_eq!(StatusCode::PermanentRedirect.as_u16(), 308);
/// assert!(StatusCode::PermanentRedirect.is_redirection());
/// assert_eq!(StatusCode::MethodNotAllowed.to_string(), "405 Method Not Allowed");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u16)]
pub enum StatusCode {
    Ok = 200,
    Created = 201,
    Accepted = 202,
    NoContent = 204,

    MovedPermanently = 301,
    Found = 302,
    SeeOther = 303,
    NotModified = 304,
    TemporaryRedirect = 307,
    PermanentRedirect = 308,

    BadRequest = 400,
    Unauthorized = 401,
    Forbidden = 403,
    NotFound = 404,
    MethodNotAllowed = 405,
    NotAcceptable = 406,
    RequestTimeout = 408,
    Conflict = 409,
    Gone = 410,
    UnsupportedMediaType = 415,
    ImATeapot = 418,
    UnprocessableEntity = 422,
    TooManyRequests = 429,

    InternalServerError = 500,
    NotImplemented = 501,
    ServiceUnavailable = 503,
}

impl StatusCode {
    pub fn as_u16(self) -> u16 {
        self as u16
    }

    pub fn is_success(self) -> bool {
        self.as_u16() / 100 == 2
    }

    pub fn is_redirection(self) -> bool {
        self.as_u16() / 100 == 3
    }

    pub fn is_client_error(self) -> bool {
        self.as_u16() / 100 == 4
    }

    pub fn canonical_reason(self) -> &'static str {
        use StatusCode::*;
        match self {
            Ok => "OK",
            Created => "Created",
            Accepted => "Accepted",
            NoContent => "No Content",
            MovedPermanently => "Moved Permanently",
            Found => "Found",
            SeeOther => "See Other",
            NotModified => "Not Modified",
            TemporaryRedirect => "Temporary Redirect",
            PermanentRedirect => "Permanent Redirect",
            BadRequest => "Bad Request",
            Unauthorized => "Unauthorized",
            Forbidden => "Forbidden",
            NotFound => "Not Found",
            MethodNotAllowed => "Method Not Allowed",
            NotAcceptable => "Not Acceptable",
            RequestTimeout => "Request Timeout",
            Conflict => "Conflict",
            Gone => "Gone",
            UnsupportedMediaType => "Unsupported Media Type",
            ImATeapot => "I'm a teapot",
            UnprocessableEntity => "Unprocessable Entity",
            TooManyRequests => "Too Many Requests",
            InternalServerError => "Internal Server Error",
            NotImplemented => "Not Implemented",
            ServiceUnavailable => "Service Unavailable",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.as_u16(), self.canonical_reason())
    }
}

impl From<StatusCode> for u16 {
    fn from(code: StatusCode) -> u16 {
        code.as_u16()
    }
}

/// Request method. Route trees are kept per method, so anything outside the
/// registered set still routes through [`Method::Custom`].
///
/// ```
/// use pathwise::http::Method;
///
/// assert_eq!(Method::from("PATCH"), Method::Patch);
/// assert_eq!(Method::from("PURGE").as_str(), "PURGE");
/// assert!(Method::Head.is_safe());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
    Head,
    Options,
    Patch,
    Connect,
    Trace,
    Custom(String),
}

const STANDARD_METHODS: [(Method, &str); 9] = [
    (Method::Get, "GET"),
    (Method::Post, "POST"),
    (Method::Put, "PUT"),
    (Method::Delete, "DELETE"),
    (Method::Head, "HEAD"),
    (Method::Options, "OPTIONS"),
    (Method::Patch, "PATCH"),
    (Method::Connect, "CONNECT"),
    (Method::Trace, "TRACE"),
];

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Custom(token) => token.as_str(),
            standard => STANDARD_METHODS
                .iter()
                .find(|(method, _)| method == standard)
                .map_or("", |(_, token)| *token),
        }
    }

    /// GET, HEAD, OPTIONS and TRACE.
    pub fn is_safe(&self) -> bool {
        matches!(self, Self::Get | Self::Head | Self::Options | Self::Trace)
    }

    /// Safe methods plus PUT and DELETE.
    pub fn is_idempotent(&self) -> bool {
        self.is_safe() || matches!(self, Self::Put | Self::Delete)
    }

    /// CONNECT targets an authority, not a path, so it is never redirected.
    pub fn is_tunnel(&self) -> bool {
        matches!(self, Self::Connect)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Method {
    type Err = std::convert::Infallible;

    /// Tokens are case-sensitive; `get` is a custom method.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(STANDARD_METHODS
            .into_iter()
            .find_map(|(method, token)| (token == s).then_some(method))
            .unwrap_or_else(|| Self::Custom(s.to_owned())))
    }
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(method) => method,
            Err(never) => match never {},
        }
    }
}

impl AsRef<str> for Method {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}
