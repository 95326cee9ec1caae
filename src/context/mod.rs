//! Per-request context: the request, the response under construction, and the
//! traversal state of the chain serving it.
//!
//! Units receive `&mut Context`. They read the request, bound parameters, and
//! shared values; they shape the response by setting a status, headers,
//! cookies, and a [`Body`]; and they call [`Context::next`] to hand control to
//! the rest of the chain. Nothing reaches the client until the context is
//! finalized, unless a unit streams through the [`std::io::Write`] impl.

use std::fmt;
use std::io::{self, Read};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::RouterConfig;
use crate::error::{BoxError, CONTEXT_RELEASED, Error};
use crate::http::{
    Body, Cookie, Headers, Method, MethodFilter, Redirect, Request, ResponseSink, StatusCode,
};
use crate::middleware::IntoUnits;
use crate::router::chain::{BindingNode, Chain};

pub mod cancel;
mod engine;
mod finalize;
pub mod params;
pub mod pool;
mod recover;

pub use cancel::Cancellation;
pub use params::{Params, Values};
pub use pool::ContextPool;

use cancel::Completion;

/// Turns raw request bytes into a structured value.
pub type RequestDecoder =
    Arc<dyn Fn(&[u8]) -> Result<serde_json::Value, BoxError> + Send + Sync + 'static>;

/// Turns a structured response value into bytes; may set response headers.
pub type ResponseEncoder = Arc<
    dyn Fn(&serde_json::Value, &mut Headers) -> Result<Vec<u8>, BoxError> + Send + Sync + 'static,
>;

type DoneCallback = Box<dyn FnOnce() + Send + 'static>;

/// Where a context is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Prepared; no unit has run yet.
    Idle,
    /// Units are running.
    Traversing,
    /// The root chain ran out of matching bindings.
    Exhausted,
    /// The response has been written.
    Finalized,
    /// Returned to its pool; any further use is a bug.
    Released,
}

/// Every field that shapes the response. All traversal frames of one request
/// read and write this single value.
#[derive(Debug, Default)]
pub(crate) struct ResponseState {
    pub(crate) status: Option<StatusCode>,
    pub(crate) headers: Headers,
    pub(crate) cookies: Vec<Cookie>,
    pub(crate) body: Option<Body>,
    pub(crate) error: Option<Arc<Error>>,
    pub(crate) error_trace: Option<String>,
    pub(crate) headers_written: bool,
    pub(crate) body_written: bool,
    pub(crate) inhibited: bool,
}

impl ResponseState {
    fn reset(&mut self) {
        self.status = None;
        self.headers.clear();
        self.cookies.clear();
        self.body = None;
        self.error = None;
        self.error_trace = None;
        self.headers_written = false;
        self.body_written = false;
        self.inhibited = false;
    }
}

/// A cursor into one chain. The root chain has one frame; every nested
/// dispatch pushes another.
pub(crate) struct Frame {
    pub(crate) chain: Arc<Chain>,
    pub(crate) node: usize,
    pub(crate) matched: bool,
    pub(crate) unit: usize,
    pub(crate) params: Params,
    pub(crate) parent: Option<usize>,
    pub(crate) resumed_parent: bool,
}

impl Frame {
    fn new(chain: Arc<Chain>, parent: Option<usize>) -> Self {
        Self {
            chain,
            node: 0,
            matched: false,
            unit: 0,
            params: Params::new(),
            parent,
            resumed_parent: false,
        }
    }

    fn restart(&mut self, chain: Arc<Chain>) {
        self.chain = chain;
        self.node = 0;
        self.matched = false;
        self.unit = 0;
        self.params.clear();
        self.parent = None;
        self.resumed_parent = false;
    }
}

// Stands in for the transport's sink while a context sits in the pool.
struct Detached;

impl ResponseSink for Detached {
    fn append_header(&mut self, _name: &str, _value: &str) {}

    fn write_status(&mut self, _status: StatusCode) {}

    fn write_body(&mut self, _bytes: &[u8]) -> io::Result<()> {
        Err(io::Error::other(Error::ContextReleased))
    }
}

/// The state of one request as it moves through a chain.
pub struct Context {
    lifecycle: Lifecycle,
    request: Request,
    request_body: Option<Bytes>,
    pub(crate) frames: Vec<Frame>,
    pub(crate) active: usize,
    pub(crate) response: ResponseState,
    values: Values,
    decoder: Option<RequestDecoder>,
    pub(crate) encoder: Option<ResponseEncoder>,
    pub(crate) sink: Box<dyn ResponseSink>,
    deadline: Option<Instant>,
    completion: Arc<Completion>,
    on_done: Vec<DoneCallback>,
    pub(crate) log_unit_errors: bool,
}

impl Context {
    // An unstarted context; `start` fills in the request.
    pub(crate) fn blank() -> Self {
        Self {
            lifecycle: Lifecycle::Released,
            request: Request::default(),
            request_body: None,
            frames: Vec::with_capacity(4),
            active: 0,
            response: ResponseState::default(),
            values: Values::new(),
            decoder: None,
            encoder: None,
            sink: Box::new(Detached),
            deadline: None,
            completion: Completion::new(None),
            on_done: Vec::new(),
            log_unit_errors: true,
        }
    }

    /// Resets every field for a new request over `chain`.
    pub(crate) fn start(
        &mut self,
        request: Request,
        sink: Box<dyn ResponseSink>,
        chain: Arc<Chain>,
        config: &RouterConfig,
    ) {
        self.lifecycle = Lifecycle::Idle;
        self.request = request;
        self.request_body = None;

        self.frames.truncate(1);
        match self.frames.first_mut() {
            Some(root) => root.restart(chain),
            None => self.frames.push(Frame::new(chain, None)),
        }
        self.active = 0;

        self.response.reset();
        self.values.clear();
        self.decoder = None;
        self.encoder = None;
        self.sink = sink;
        self.deadline = config.timeout().map(|timeout| Instant::now() + timeout);
        self.completion = Completion::new(self.deadline);
        self.on_done.clear();
        self.log_unit_errors = config.log_unit_errors;

        if !self.request.method().is_supported() {
            let method = self.request.method().to_string();
            self.record_error(Error::UnsupportedMethod(method), None);
        }
    }

    /// Drops per-request resources and marks the context released.
    pub(crate) fn retire(&mut self) {
        if self.lifecycle == Lifecycle::Released {
            return;
        }
        self.completion.abandon();
        self.lifecycle = Lifecycle::Released;
        self.request = Request::default();
        self.request_body = None;
        self.frames.truncate(1);
        if let Some(root) = self.frames.first_mut() {
            root.params.clear();
        }
        self.response.reset();
        self.values.clear();
        self.decoder = None;
        self.encoder = None;
        self.sink = Box::new(Detached);
        self.on_done.clear();
    }

    /// Builds a standalone context that runs `units` for any method and path.
    ///
    /// Useful for exercising a unit without a router. Call [`next`](Self::next)
    /// to run the units and [`finalize`](Self::finalize) to write the response.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypoint::{handler, Context};
    /// use waypoint::http::{Recorder, Request, StatusCode};
    ///
    /// let recorder = Recorder::new();
    /// let mut ctx = Context::with_units(
    ///     Request::new("GET", "/"),
    ///     recorder.clone(),
    ///     [handler(|ctx: &mut Context| {
    ///         ctx.set_status(StatusCode::CREATED);
    ///         Ok(())
    ///     })],
    /// );
    /// ctx.next();
    /// ctx.finalize();
    /// assert_eq!(recorder.status(), Some(StatusCode::CREATED));
    /// ```
    pub fn with_units(
        request: Request,
        sink: impl ResponseSink + 'static,
        units: impl IntoUnits,
    ) -> Self {
        let mut chain = Chain::new();
        chain.push(BindingNode::new(MethodFilter::All, None, units.into_units()));

        let mut ctx = Self::blank();
        ctx.start(request, Box::new(sink), Arc::new(chain), &RouterConfig::default());
        ctx
    }

    /// Marks a context built with [`with_units`](Self::with_units) as released.
    ///
    /// Finalizes it first if that has not happened yet.
    pub fn free(&mut self) {
        self.ensure_live();
        if self.lifecycle != Lifecycle::Finalized {
            self.finalize();
        }
        self.retire();
    }

    /// Panics if the context has been released.
    pub(crate) fn ensure_live(&self) {
        if self.lifecycle == Lifecycle::Released {
            panic!("{}", CONTEXT_RELEASED);
        }
    }

    pub(crate) fn set_lifecycle(&mut self, lifecycle: Lifecycle) {
        self.lifecycle = lifecycle;
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    // ── Request ──────────────────────────────────────────────────────────────

    pub fn request(&self) -> &Request {
        self.ensure_live();
        &self.request
    }

    pub fn method(&self) -> &Method {
        self.ensure_live();
        self.request.method()
    }

    pub fn path(&self) -> &str {
        self.ensure_live();
        self.request.path()
    }

    pub fn request_headers(&self) -> &Headers {
        self.ensure_live();
        self.request.headers()
    }

    pub fn query_param(&self, key: &str) -> Option<&str> {
        self.ensure_live();
        self.request.query_param(key)
    }

    /// Parameters bound by the binding currently running.
    pub fn params(&self) -> &Params {
        self.ensure_live();
        &self.frames[self.active].params
    }

    pub fn param(&self, name: &str) -> Option<&str> {
        self.params().get(name)
    }

    /// Binds a parameter on the current frame, mostly for tests.
    pub fn set_param(&mut self, name: &str, value: &str) {
        self.ensure_live();
        self.frames[self.active].params.insert(name, value);
    }

    pub fn remove_param(&mut self, name: &str) -> Option<String> {
        self.ensure_live();
        self.frames[self.active].params.remove(name)
    }

    /// The unread request body stream.
    ///
    /// Once [`read_body`](Self::read_body) has buffered the body this reader
    /// is empty.
    pub fn body_reader(&mut self) -> &mut (dyn Read + Send) {
        self.ensure_live();
        self.request.body_mut()
    }

    /// Reads the whole request body, caching it for later callers.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the body stream fails.
    pub fn read_body(&mut self) -> Result<Bytes, Error> {
        self.ensure_live();
        if let Some(body) = &self.request_body {
            return Ok(body.clone());
        }
        let mut buf = Vec::with_capacity(self.request.content_length().unwrap_or(0));
        self.request.body_mut().read_to_end(&mut buf)?;
        let body = Bytes::from(buf);
        self.request_body = Some(body.clone());
        Ok(body)
    }

    /// Replaces the request body, e.g. after a unit decompressed it.
    pub fn set_request_body(&mut self, body: impl Into<Bytes>) {
        self.ensure_live();
        self.request_body = Some(body.into());
        self.request.replace_body(Box::new(io::empty()));
    }

    pub fn set_request_decoder(&mut self, decoder: RequestDecoder) {
        self.ensure_live();
        self.decoder = Some(decoder);
    }

    pub fn set_response_encoder(&mut self, encoder: ResponseEncoder) {
        self.ensure_live();
        self.encoder = Some(encoder);
    }

    /// Decodes the request body into `T` using the configured decoder.
    ///
    /// # Errors
    ///
    /// - [`Error::NoDecoderConfigured`]: no body-format unit set a decoder.
    /// - [`Error::Io`]: reading the body failed.
    /// - [`Error::Decode`]: the decoder or the conversion into `T` failed.
    pub fn decode_body<T: DeserializeOwned>(&mut self) -> Result<T, Error> {
        self.ensure_live();
        let decoder = self.decoder.clone().ok_or(Error::NoDecoderConfigured)?;
        let body = self.read_body()?;
        let value = decoder(&body[..]).map_err(Error::Decode)?;
        serde_json::from_value(value).map_err(|err| Error::Decode(err.into()))
    }

    // ── Response ─────────────────────────────────────────────────────────────

    /// The status set so far, if any.
    pub fn status(&self) -> Option<StatusCode> {
        self.ensure_live();
        self.response.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.ensure_live();
        self.response.status = Some(status);
    }

    pub fn response_headers(&self) -> &Headers {
        self.ensure_live();
        &self.response.headers
    }

    pub fn headers_mut(&mut self) -> &mut Headers {
        self.ensure_live();
        &mut self.response.headers
    }

    /// Sets a response header, replacing existing values.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.ensure_live();
        self.response.headers.set(name, value);
    }

    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.ensure_live();
        self.response.cookies.push(cookie);
    }

    pub fn cookies(&self) -> &[Cookie] {
        self.ensure_live();
        &self.response.cookies
    }

    pub fn body(&self) -> Option<&Body> {
        self.ensure_live();
        self.response.body.as_ref()
    }

    pub fn set_body(&mut self, body: impl Into<Body>) {
        self.ensure_live();
        self.response.body = Some(body.into());
    }

    pub fn take_body(&mut self) -> Option<Body> {
        self.ensure_live();
        self.response.body.take()
    }

    /// Serializes `value` into a structured body for the response encoder.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Encode`] if `value` cannot be represented as JSON.
    pub fn set_json<T: Serialize + ?Sized>(&mut self, value: &T) -> Result<(), Error> {
        self.ensure_live();
        let value = serde_json::to_value(value).map_err(|err| Error::Encode(err.into()))?;
        self.response.body = Some(Body::Value(value));
        Ok(())
    }

    /// Responds with a redirect to `to`.
    pub fn redirect(&mut self, to: impl Into<String>) {
        self.set_body(Redirect::to(to));
    }

    /// Stops the finalizer from writing anything, for connections a unit has
    /// taken over.
    pub fn inhibit_response(&mut self) {
        self.ensure_live();
        self.response.inhibited = true;
    }

    pub fn headers_written(&self) -> bool {
        self.ensure_live();
        self.response.headers_written
    }

    pub fn body_written(&self) -> bool {
        self.ensure_live();
        self.response.body_written
    }

    /// The first error recorded for this request.
    pub fn error(&self) -> Option<&Error> {
        self.ensure_live();
        self.response.error.as_deref()
    }

    /// Diagnostic trace captured with the error, when the error was a panic.
    pub fn error_trace(&self) -> Option<&str> {
        self.ensure_live();
        self.response.error_trace.as_deref()
    }

    // ── Shared values ────────────────────────────────────────────────────────

    pub fn values(&self) -> &Values {
        self.ensure_live();
        &self.values
    }

    pub fn values_mut(&mut self) -> &mut Values {
        self.ensure_live();
        &mut self.values
    }

    /// Stores a value every later unit of this request can read.
    pub fn set<T: Send + Sync + 'static>(&mut self, key: impl Into<String>, value: T) {
        self.values_mut().insert(key, value);
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &str) -> Option<&T> {
        self.values().get(key)
    }

    pub fn get_mut<T: Send + Sync + 'static>(&mut self, key: &str) -> Option<&mut T> {
        self.values_mut().get_mut(key)
    }

    pub fn remove<T: Send + Sync + 'static>(&mut self, key: &str) -> Option<T> {
        self.values_mut().remove(key)
    }

    // ── Deadline and completion ──────────────────────────────────────────────

    pub fn deadline(&self) -> Option<Instant> {
        self.ensure_live();
        self.deadline
    }

    /// Sets the instant after which [`next`](Self::next) stops running units.
    pub fn set_deadline(&mut self, deadline: Instant) {
        self.ensure_live();
        self.deadline = Some(deadline);
        self.completion.set_deadline(Some(deadline));
    }

    pub fn set_timeout(&mut self, timeout: Duration) {
        self.set_deadline(Instant::now() + timeout);
    }

    pub(crate) fn deadline_passed(&self) -> bool {
        self.deadline
            .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// Registers a callback to run once the response has been finalized.
    pub fn on_done(&mut self, callback: impl FnOnce() + Send + 'static) {
        self.ensure_live();
        self.on_done.push(Box::new(callback));
    }

    /// Returns a handle that reports when this request is over.
    pub fn cancellation(&self) -> Cancellation {
        self.ensure_live();
        Cancellation::new(Arc::clone(&self.completion))
    }

    pub(crate) fn take_done_callbacks(&mut self) -> Vec<DoneCallback> {
        std::mem::take(&mut self.on_done)
    }

    pub(crate) fn completion(&self) -> &Completion {
        &self.completion
    }

    // ── Streaming ────────────────────────────────────────────────────────────

    fn check_writable(&self) -> io::Result<()> {
        match self.lifecycle {
            Lifecycle::Released => Err(io::Error::other(Error::ContextReleased)),
            Lifecycle::Finalized => Err(io::Error::other(Error::ResponseFinalized)),
            _ => Ok(()),
        }
    }

    /// Writes the status line and headers once. Later calls do nothing.
    pub(crate) fn write_head(&mut self, status: StatusCode, location: Option<&str>) {
        if self.response.headers_written {
            return;
        }
        self.response.headers_written = true;
        self.response.status = Some(status);
        if self.response.inhibited {
            return;
        }

        for (name, value) in self.response.headers.iter() {
            self.sink.append_header(name, value);
        }
        if let Some(location) = location {
            self.sink.append_header("Location", location);
        }
        for cookie in &self.response.cookies {
            self.sink.append_header("Set-Cookie", &cookie.to_string());
        }
        self.sink.write_status(status);
    }
}

impl io::Write for Context {
    /// Streams bytes straight to the client.
    ///
    /// The first write sends the head with the current status (`200` when none
    /// was set). The finalizer then skips the body value.
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.check_writable()?;
        let status = self.response.status.unwrap_or(StatusCode::OK);
        self.write_head(status, None);
        self.response.body_written = true;
        if self.response.inhibited {
            return Ok(buf.len());
        }
        self.sink.write_body(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.check_writable()?;
        self.sink.flush()
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.completion.abandon();
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("lifecycle", &self.lifecycle)
            .field("method", self.request.method())
            .field("path", &self.request.path())
            .field("depth", &self.frames.len())
            .field("status", &self.response.status)
            .field("error", &self.response.error)
            .finish_non_exhaustive()
    }
}
