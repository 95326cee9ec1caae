//! Turning the accumulated response state into bytes on the sink.

use std::io::{self, Read};

use bytes::Bytes;
use url::Url;

use crate::Error;
use crate::http::{Body, ResponseSink, StatusCode};

use super::{Context, Lifecycle, recover};

// What the body value resolved to.
enum Payload {
    None,
    Redirect(String),
    Bytes(Bytes),
    Stream(Box<dyn Read + Send>),
}

// Adapts a sink to `io::Write` so streamed bodies can use `io::copy`.
struct SinkWriter<'a>(&'a mut dyn ResponseSink);

impl io::Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write_body(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl Context {
    /// Writes the response: head first, then the body, then completion.
    ///
    /// A held error turns the response into a bare `500`. A status that was
    /// never set defaults to `302` for redirects, `404` when there is no body,
    /// and `200` otherwise. Runs once; later calls only log a warning.
    pub fn finalize(&mut self) {
        self.ensure_live();
        if self.lifecycle() == Lifecycle::Finalized {
            tracing::warn!(path = %self.request.path(), "response already finalized");
            return;
        }

        if let Some(error) = self.response.error.clone() {
            self.response.status = Some(StatusCode::INTERNAL_SERVER_ERROR);
            self.response.body = None;
            if self.log_unit_errors {
                tracing::error!(
                    method = %self.request.method(),
                    path = %self.request.path(),
                    %error,
                    trace = self.response.error_trace.as_deref().unwrap_or_default(),
                    "request failed"
                );
            }
        }

        let payload = match self.response.body.take() {
            Some(body) if !self.response.body_written => self.resolve_body(body),
            _ => Payload::None,
        };

        let status = self.response.status.unwrap_or(match payload {
            Payload::Redirect(_) => StatusCode::FOUND,
            Payload::None => StatusCode::NOT_FOUND,
            Payload::Bytes(_) | Payload::Stream(_) => StatusCode::OK,
        });

        let location = match &payload {
            Payload::Redirect(location) => Some(location.as_str()),
            _ => None,
        };
        self.write_head(status, location);

        if !self.response.inhibited {
            self.write_payload(status, payload);
        }

        self.mark_done();
    }

    fn resolve_body(&mut self, body: Body) -> Payload {
        match body {
            Body::Text(text) => Payload::Bytes(Bytes::from(text)),
            Body::Bytes(bytes) => Payload::Bytes(bytes),
            Body::Stream(reader) => Payload::Stream(reader),
            Body::Redirect(redirect) => match self.resolve_location(redirect.target()) {
                Ok(location) => Payload::Redirect(location),
                Err(err) => self.fail_body(err),
            },
            Body::Value(value) => {
                let Some(encoder) = self.encoder.clone() else {
                    return self.fail_body(Error::NoEncoderConfigured);
                };
                match encoder(&value, &mut self.response.headers) {
                    Ok(bytes) => Payload::Bytes(Bytes::from(bytes)),
                    Err(err) => self.fail_body(Error::Encode(err)),
                }
            }
        }
    }

    fn fail_body(&mut self, error: Error) -> Payload {
        if self.log_unit_errors {
            tracing::error!(path = %self.request.path(), %error, "failed to resolve response body");
        }
        self.response.status = Some(StatusCode::INTERNAL_SERVER_ERROR);
        self.record_error(error, None);
        Payload::None
    }

    // Absolute URLs pass through; relative targets resolve against the
    // directory of the request path.
    fn resolve_location(&self, to: &str) -> Result<String, Error> {
        if to.starts_with("//") {
            return Ok(to.to_owned());
        }
        match Url::parse(to) {
            Ok(_) => Ok(to.to_owned()),
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                if to.starts_with('/') {
                    return Ok(to.to_owned());
                }
                let path = self.request.path();
                let directory = path.rfind('/').map_or("/", |slash| &path[..=slash]);
                Ok(format!("{directory}{to}"))
            }
            Err(source) => Err(Error::InvalidRedirect {
                target: to.to_owned(),
                source,
            }),
        }
    }

    fn write_payload(&mut self, status: StatusCode, payload: Payload) {
        let result = match payload {
            Payload::None | Payload::Redirect(_) => return,
            _ if !status.allows_body() => {
                tracing::warn!(
                    status = status.as_u16(),
                    "response has a body but its status forbids one; dropping it"
                );
                return;
            }
            Payload::Bytes(bytes) => self.sink.write_body(&bytes),
            Payload::Stream(mut reader) => {
                io::copy(&mut reader, &mut SinkWriter(self.sink.as_mut())).map(|_| ())
            }
        };
        self.response.body_written = true;

        if let Err(err) = result {
            tracing::error!(path = %self.request.path(), error = %err, "failed to write response body");
        }
    }

    fn mark_done(&mut self) {
        self.set_lifecycle(Lifecycle::Finalized);
        self.completion().complete(
            self.response.error.clone(),
            self.response.error_trace.clone(),
        );

        for callback in self.take_done_callbacks() {
            if let Err(caught) = recover::catch(callback) {
                tracing::error!(panic = %caught.message, "completion callback panicked");
            }
        }
    }
}
