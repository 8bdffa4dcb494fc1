//! In-memory response accumulator with commit-or-discard semantics.
//!
//! Handlers never write to the host directly. Their output is collected in a
//! [`ResponseBuffer`] which the router either commits into the final
//! [`Response`] or resets and replaces (cancellation, timeout, panic), so a
//! client can never observe a half-written body.

use std::io;

use bytes::{BufMut, BytesMut};

use super::{Headers, Method, Response, StatusCode};

/// Status, headers and body collected for one request.
///
/// # Examples
///
/// ```
/// use std::io::Write;
/// use pathwise::http::{ResponseBuffer, StatusCode};
///
/// let mut buffer = ResponseBuffer::new();
/// buffer.headers_mut().insert("X-Trace", "abc");
/// buffer.set_status(StatusCode::Accepted);
/// buffer.write_all(b"queued").unwrap();
///
/// let response = buffer.commit();
/// assert_eq!(response.status(), StatusCode::Accepted);
/// assert_eq!(response.content(), b"queued");
/// ```
#[derive(Debug, Default)]
pub struct ResponseBuffer {
    status: Option<StatusCode>,
    headers: Headers,
    body: BytesMut,
}

impl ResponseBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Records the status code. The last call wins.
    pub fn set_status(&mut self, status: StatusCode) {
        self.status = Some(status);
    }

    /// The status set so far, `None` if nothing set one yet.
    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    /// Appends raw bytes to the body.
    pub fn write_bytes(&mut self, data: &[u8]) {
        self.body.put_slice(data);
    }

    pub fn len(&self) -> usize {
        self.body.len()
    }

    pub fn is_empty(&self) -> bool {
        self.body.is_empty()
    }

    /// The body written so far.
    pub fn bytes(&self) -> &[u8] {
        &self.body
    }

    /// Forgets everything written: status, headers and body.
    pub fn reset(&mut self) {
        self.status = None;
        self.headers = Headers::new();
        self.body.clear();
    }

    /// Copies this buffer's state onto `dst`. Headers are appended, the status
    /// is only copied when one was set.
    pub fn copy_to(&self, dst: &mut ResponseBuffer) {
        for (name, value) in self.headers.iter() {
            dst.headers.insert(name, value);
        }
        if let Some(status) = self.status {
            dst.status = Some(status);
        }
        dst.body.put_slice(&self.body);
    }

    /// Folds a handler's returned [`Response`] into the buffer.
    pub fn absorb(&mut self, response: Response) {
        let (status, headers, body) = response.into_parts();
        self.status = Some(status);
        self.headers.extend(headers);
        self.body.put_slice(&body);
    }

    /// Replaces the body with a plain-text error message, the way the router
    /// answers 404, 405, 408 and cancelled requests.
    pub fn error(&mut self, status: StatusCode, message: &str) {
        self.headers.set("Content-Type", "text/plain; charset=utf-8");
        self.headers.set("X-Content-Type-Options", "nosniff");
        self.status = Some(status);
        self.body.clear();
        self.body.put_slice(message.as_bytes());
        self.body.put_u8(b'\n');
    }

    /// Writes a redirect to `location`. GET and HEAD requests also get a tiny
    /// HTML body with the link.
    pub fn redirect(&mut self, location: &str, status: StatusCode, method: &Method) {
        self.headers.set("Location", location);
        self.status = Some(status);
        if matches!(method, Method::Get | Method::Head) {
            self.headers.set("Content-Type", "text/html; charset=utf-8");
            if matches!(method, Method::Get) {
                self.body.clear();
                let link = format!(
                    "<a href=\"{}\">{}</a>.\n",
                    escape_html(location),
                    status.canonical_reason()
                );
                self.body.put_slice(link.as_bytes());
            }
        }
    }

    /// Turns the buffer into the response handed to the host. A buffer that
    /// never had its status set commits as `200 OK`.
    pub fn commit(self) -> Response {
        let mut response = Response::new(self.status.unwrap_or(StatusCode::Ok));
        for (name, value) in self.headers.iter() {
            response.add_header(name, value);
        }
        response.body_bytes(self.body.to_vec())
    }
}

impl io::Write for ResponseBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.write_bytes(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}
