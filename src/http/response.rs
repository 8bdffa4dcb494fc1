//! Finished responses.
//!
//! Handlers may return one of these directly; the router also produces one
//! from every committed [`ResponseBuffer`](super::ResponseBuffer).

use bytes::{BufMut, BytesMut};

use super::{Headers, StatusCode};

/// Status, headers and body of a response.
///
/// ```
/// use pathwise::http::{Response, StatusCode};
///
/// let wire = Response::new(StatusCode::Created)
///     .header("Location", "/users/7")
///     .body("{}")
///     .into_bytes();
///
/// let text = std::str::from_utf8(&wire).unwrap();
/// assert!(text.starts_with("HTTP/1.1 201 Created\r\nLocation: /users/7\r\n"));
/// assert!(text.ends_with("Content-Length: 2\r\n\r\n{}"));
/// ```
#[derive(Debug)]
pub struct Response {
    status: StatusCode,
    headers: Headers,
    body: Vec<u8>,
}

impl Response {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// `message` plus a newline as `text/plain`, with `nosniff`. The router's
    /// own 404, 405, 408 and 500 answers look like this.
    pub fn text(status: StatusCode, message: &str) -> Self {
        Self::new(status)
            .header("Content-Type", "text/plain; charset=utf-8")
            .header("X-Content-Type-Options", "nosniff")
            .body(format!("{message}\n"))
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn add_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    #[must_use]
    pub fn body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into().into_bytes();
        self
    }

    #[must_use]
    pub fn body_bytes(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn content(&self) -> &[u8] {
        &self.body
    }

    /// Body as text; `None` unless it is UTF-8.
    pub fn text_content(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    pub fn into_parts(self) -> (StatusCode, Headers, Vec<u8>) {
        (self.status, self.headers, self.body)
    }

    /// HTTP/1.1 wire form.
    ///
    /// Adds a plain-text `Content-Type` to bodies that lack one and writes
    /// `Content-Length` as the final header. Connection management stays with
    /// the host, so no `Connection` header is added.
    pub fn into_bytes(mut self) -> BytesMut {
        if !self.body.is_empty() && !self.headers.contains("content-type") {
            self.headers.insert("Content-Type", "text/plain; charset=utf-8");
        }
        self.headers.set("Content-Length", self.body.len().to_string());

        let head = format!("HTTP/1.1 {}\r\n{}\r\n", self.status, self.headers);
        let mut wire = BytesMut::with_capacity(head.len() + self.body.len());
        wire.put_slice(head.as_bytes());
        wire.put_slice(&self.body);
        wire
    }
}

impl Default for Response {
    fn default() -> Self {
        Self::new(StatusCode::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire(response: Response) -> String {
        String::from_utf8(response.into_bytes().to_vec()).unwrap()
    }

    #[test]
    fn body_gets_a_default_content_type() {
        let text = wire(Response::new(StatusCode::Ok).body("hi"));
        assert_eq!(
            text,
            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; charset=utf-8\r\n\
             Content-Length: 2\r\n\r\nhi"
        );
    }

    #[test]
    fn empty_body_stays_untyped() {
        let text = wire(Response::new(StatusCode::NoContent));
        assert_eq!(text, "HTTP/1.1 204 No Content\r\nContent-Length: 0\r\n\r\n");
    }

    #[test]
    fn connection_header_is_left_to_the_handler() {
        let text = wire(Response::new(StatusCode::Ok).header("Connection", "close"));
        assert_eq!(text.matches("Connection").count(), 1);
        assert!(text.contains("Connection: close\r\n"));
    }

    #[test]
    fn stale_length_from_a_handler_is_replaced() {
        let text = wire(Response::new(StatusCode::Ok).header("Content-Length", "99").body("abc"));
        assert_eq!(text.matches("Content-Length").count(), 1);
        assert!(text.contains("Content-Length: 3\r\n"));
    }

    #[test]
    fn router_text_answers() {
        let res = Response::text(StatusCode::MethodNotAllowed, "Method Not Allowed");
        assert_eq!(res.text_content(), Some("Method Not Allowed\n"));
        assert_eq!(res.headers().get("x-content-type-options"), Some("nosniff"));
        assert!(wire(res).starts_with("HTTP/1.1 405 Method Not Allowed\r\n"));
    }

    #[test]
    fn into_parts_hands_back_everything() {
        let (status, headers, body) = Response::new(StatusCode::Created)
            .header("Location", "/items/7")
            .body("made")
            .into_parts();
        assert_eq!(status, StatusCode::Created);
        assert_eq!(headers.get("location"), Some("/items/7"));
        assert_eq!(body, b"made");
    }
}
