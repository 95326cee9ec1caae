//! The outbound side of a request: the sink a finalized response is written to.
//!
//! The transport implements [`ResponseSink`] over whatever it writes to. The
//! dispatcher only ever appends headers, commits a status once, writes body
//! bytes, and optionally flushes. [`Recorder`] is the in-memory sink: tests
//! inspect it, and buffering transports serialize it to HTTP/1.1 bytes.

use std::io;
use std::sync::Arc;

use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;

use super::{Headers, StatusCode};

/// Writable response capability delivered by the transport layer.
///
/// Calls arrive in wire order: any number of [`append_header`] calls, one
/// [`write_status`], then body writes and flushes.
///
/// [`append_header`]: Self::append_header
/// [`write_status`]: Self::write_status
pub trait ResponseSink: Send {
    /// Adds a header to the pending response head.
    fn append_header(&mut self, name: &str, value: &str);

    /// Commits the status line and the accumulated headers.
    fn write_status(&mut self, status: StatusCode);

    /// Writes body bytes.
    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Pushes buffered bytes to the client. Sinks that cannot stream ignore it.
    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct Recorded {
    status: Option<StatusCode>,
    status_writes: usize,
    headers: Headers,
    body: BytesMut,
    flushes: usize,
}

/// An in-memory [`ResponseSink`].
///
/// Clones share the same buffer, so a test can hand one clone to the
/// dispatcher and read the result through another.
///
/// # Examples
///
/// ```
/// use waypoint::http::{Recorder, ResponseSink, StatusCode};
///
/// let recorder = Recorder::new();
/// let mut sink = recorder.clone();
/// sink.append_header("Content-Type", "application/json");
/// sink.write_status(StatusCode::OK);
/// sink.write_body(br#"{"status":"ok"}"#).unwrap();
///
/// let bytes = recorder.to_http_bytes();
/// let text = std::str::from_utf8(&bytes).unwrap();
/// assert!(text.starts_with("HTTP/1.1 200 OK\r\n"));
/// assert!(text.contains("Content-Length: 15\r\n"));
/// ```
#[derive(Debug, Clone, Default)]
pub struct Recorder {
    inner: Arc<Mutex<Recorded>>,
}

impl Recorder {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the committed status, if one was written.
    pub fn status(&self) -> Option<StatusCode> {
        self.inner.lock().status
    }

    /// Returns how many times a status was committed.
    pub fn status_writes(&self) -> usize {
        self.inner.lock().status_writes
    }

    /// Returns the first value of a recorded header.
    pub fn header(&self, name: &str) -> Option<String> {
        self.inner.lock().headers.get(name).map(str::to_owned)
    }

    /// Returns a copy of every recorded header.
    pub fn headers(&self) -> Headers {
        self.inner.lock().headers.clone()
    }

    /// Returns the recorded body bytes.
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.inner.lock().body)
    }

    /// Returns the recorded body as (lossy) UTF-8 text.
    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.inner.lock().body).into_owned()
    }

    /// Returns how many times the sink was flushed.
    pub fn flushes(&self) -> usize {
        self.inner.lock().flushes
    }

    /// Serializes the recorded response using HTTP/1.1 wire format.
    ///
    /// Automatically adds:
    /// - `Content-Type: text/plain; charset=utf-8` if the body is non-empty and no
    ///   `Content-Type` header was recorded.
    /// - `Content-Length: <n>` (always written).
    ///
    /// A recorder that never saw a status serializes as `200 OK`.
    pub fn to_http_bytes(&self) -> BytesMut {
        let recorded = self.inner.lock();
        let status = recorded.status.unwrap_or(StatusCode::OK);
        let content_length = recorded.body.len();

        let estimated_size = 128 + recorded.headers.len() * 64 + content_length;
        let mut buf = BytesMut::with_capacity(estimated_size);

        // Status line
        buf.put(
            format!(
                "HTTP/1.1 {} {}\r\n",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .as_bytes(),
        );

        // Headers
        for (name, value) in recorded.headers.iter() {
            buf.put(format!("{name}: {value}\r\n").as_bytes());
        }
        if content_length > 0 && !recorded.headers.contains("content-type") {
            buf.put(&b"Content-Type: text/plain; charset=utf-8\r\n"[..]);
        }

        // Content-Length is always the last header before the blank line
        buf.put(format!("Content-Length: {content_length}\r\n").as_bytes());

        // Header/body separator
        buf.put(&b"\r\n"[..]);

        // Body
        buf.put(&recorded.body[..]);

        buf
    }
}

impl ResponseSink for Recorder {
    fn append_header(&mut self, name: &str, value: &str) {
        self.inner.lock().headers.insert(name, value);
    }

    fn write_status(&mut self, status: StatusCode) {
        let mut recorded = self.inner.lock();
        recorded.status = Some(status);
        recorded.status_writes += 1;
    }

    fn write_body(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.lock().body.put(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().flushes += 1;
        Ok(())
    }
}
