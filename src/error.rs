//! Errors produced while configuring routes and while serving a request.
//!
//! Configuration errors surface from [`Router::try_bind`] (and make
//! [`Router::bind`] panic). Per-request errors are recorded on the
//! [`Context`], stop the rest of the chain, and turn the response into a
//! `500` without leaking detail to the client.
//!
//! [`Router::try_bind`]: crate::Router::try_bind
//! [`Router::bind`]: crate::Router::bind
//! [`Context`]: crate::Context

use thiserror::Error;

use crate::router::pattern::PatternError;

/// A boxed error returned by units; any error type converts into it with `?`.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// The result every unit phase returns.
pub type HandlerResult = Result<(), BoxError>;

/// Message carried by the misuse failure raised when a released context is touched.
pub const CONTEXT_RELEASED: &str = "context cannot be used after it has been released - units must not return before every operation on the context completes";

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    MalformedPattern(#[from] PatternError),

    #[error("no units provided for `{method} {pattern}`")]
    NoUnits { method: String, pattern: String },

    #[error("unsupported http method `{0}`")]
    UnsupportedMethod(String),

    #[error("request exceeded its deadline")]
    DeadlineExceeded,

    #[error("unit panicked: {0}")]
    Panic(String),

    #[error(transparent)]
    Handler(BoxError),

    #[error("no response body encoder configured; add body encoder middleware")]
    NoEncoderConfigured,

    #[error("no request body decoder configured; add body parser middleware")]
    NoDecoderConfigured,

    #[error("failed to encode response body: {0}")]
    Encode(#[source] BoxError),

    #[error("failed to decode request body: {0}")]
    Decode(#[source] BoxError),

    #[error("invalid redirect target `{target}`: {source}")]
    InvalidRedirect {
        target: String,
        #[source]
        source: url::ParseError,
    },

    #[error("{}", CONTEXT_RELEASED)]
    ContextReleased,

    #[error("response has already been finalized")]
    ResponseFinalized,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
