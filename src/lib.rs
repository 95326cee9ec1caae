//! # waypoint
//!
//! An in-process HTTP request dispatcher: compiled route patterns, ordered
//! handler chains, middleware that wraps the rest of the chain, and routers
//! nested inside routers. Bring your own transport; waypoint takes a
//! [`Request`] and writes the response into a [`ResponseSink`].
//!
//! ## Quick Start
//!
//! ```rust
//! use waypoint::{handler, Context, Router};
//! use waypoint::http::{Recorder, Request, StatusCode};
//! use waypoint::middleware::logger;
//!
//! let mut api = Router::new();
//! api.get("/api/users/:id", [handler(|ctx: &mut Context| {
//!     let id = ctx.param("id").unwrap_or_default().to_owned();
//!     ctx.set_body(format!("user {id}"));
//!     Ok(())
//! })]);
//!
//! let mut router = Router::new();
//! router.use_all([logger()]);
//! router.use_at("/api", api);
//!
//! let recorder = Recorder::new();
//! router.serve(Request::new("GET", "/api/users/7"), recorder.clone());
//! assert_eq!(recorder.status(), Some(StatusCode::OK));
//! assert_eq!(recorder.body_text(), "user 7");
//! ```
//!
//! ## Logging
//!
//! waypoint emits [`tracing`] events and never installs a subscriber; wire up
//! your own (for example `tracing-subscriber`) to see them.

pub mod config;
pub mod context;
pub mod error;
pub mod http;
pub mod middleware;
pub mod router;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use config::{PoolConfig, RouterConfig};
pub use context::{Cancellation, Context, ContextPool, Lifecycle, Params, Values};
pub use error::{BoxError, Error, HandlerResult};
pub use http::{
    Body, Cookie, Headers, Method, MethodFilter, Recorder, Request, ResponseSink, StatusCode,
};
pub use middleware::{
    Dispatcher, Handler, IntoUnits, Transformer, Unit, handler, set_fn, set_value, transformer,
    transformer_fn,
};
pub use router::{Pattern, PatternError, RouteDescriptor, Router};
