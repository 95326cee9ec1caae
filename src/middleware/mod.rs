//! Processing units: the things a binding runs, in order.
//!
//! Every binding holds a list of [`Unit`]s. There are exactly three kinds:
//!
//! - [`Handler`]: runs once. It may respond directly, or call
//!   [`Context::next`] to let the rest of the chain run first.
//! - [`Transformer`]: wraps the rest of the chain, running `transform_request`,
//!   then everything downstream, then `transform_response`.
//! - [`Dispatcher`]: runs its own chain in a nested frame. A
//!   [`Router`](crate::Router) is the usual dispatcher; mounting one inside
//!   another builds a routing tree.
//!
//! Closures become handlers through [`handler`]; types implementing
//! [`Transformer`] become units through [`transformer`]. A few ready-made
//! units live in the submodules.
//!
//! ```
//! use waypoint::{handler, Context, Router};
//! use waypoint::middleware::logger;
//!
//! let mut router = Router::new();
//! router.use_all([logger()]);
//! router.get("/hello", [handler(|ctx: &mut Context| {
//!     ctx.set_body("Hello, World!");
//!     Ok(())
//! })]);
//! ```

use std::fmt;
use std::sync::Arc;

use crate::context::Context;
use crate::error::HandlerResult;
use crate::router::RouteDescriptor;

pub mod json;
pub mod logger;

pub use json::{JsonOptions, json, json_with};
pub use logger::logger;

/// A unit that runs once per request.
///
/// Implemented for every `Fn(&mut Context) -> HandlerResult`.
pub trait Handler: Send + Sync {
    fn handle(&self, ctx: &mut Context) -> HandlerResult;
}

impl<F> Handler for F
where
    F: Fn(&mut Context) -> HandlerResult + Send + Sync,
{
    fn handle(&self, ctx: &mut Context) -> HandlerResult {
        self(ctx)
    }
}

/// A unit that surrounds the rest of the chain.
///
/// If `transform_request` fails, the error is recorded and neither the
/// downstream units nor `transform_response` run.
pub trait Transformer: Send + Sync {
    fn transform_request(&self, _ctx: &mut Context) -> HandlerResult {
        Ok(())
    }

    fn transform_response(&self, _ctx: &mut Context) -> HandlerResult {
        Ok(())
    }
}

/// A unit that dispatches the request through a chain of its own.
pub trait Dispatcher: Send + Sync {
    fn dispatch(&self, ctx: &mut Context);

    /// Routes this dispatcher serves, relative to where it is mounted.
    fn route_descriptors(&self) -> Vec<RouteDescriptor> {
        Vec::new()
    }
}

/// Which of the three unit kinds a [`Unit`] is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Handler,
    Transformer,
    Dispatcher,
}

/// A processing unit stored in a binding.
#[derive(Clone)]
pub enum Unit {
    Handler(Arc<dyn Handler>),
    Transformer(Arc<dyn Transformer>),
    Dispatcher(Arc<dyn Dispatcher>),
}

impl Unit {
    pub fn kind(&self) -> UnitKind {
        match self {
            Self::Handler(_) => UnitKind::Handler,
            Self::Transformer(_) => UnitKind::Transformer,
            Self::Dispatcher(_) => UnitKind::Dispatcher,
        }
    }

    /// Wraps any [`Handler`] implementation.
    pub fn handler(handler: impl Handler + 'static) -> Self {
        Self::Handler(Arc::new(handler))
    }

    /// Wraps any [`Dispatcher`] implementation.
    pub fn dispatcher(dispatcher: impl Dispatcher + 'static) -> Self {
        Self::Dispatcher(Arc::new(dispatcher))
    }
}

impl fmt::Debug for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Unit::{:?}", self.kind())
    }
}

/// Turns a closure into a handler unit.
pub fn handler<F>(f: F) -> Unit
where
    F: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
{
    Unit::Handler(Arc::new(f))
}

/// Turns a [`Transformer`] into a unit.
pub fn transformer<T>(t: T) -> Unit
where
    T: Transformer + 'static,
{
    Unit::Transformer(Arc::new(t))
}

// Pairs two closures into a transformer.
struct FnTransformer<Req, Res> {
    request: Req,
    response: Res,
}

impl<Req, Res> Transformer for FnTransformer<Req, Res>
where
    Req: Fn(&mut Context) -> HandlerResult + Send + Sync,
    Res: Fn(&mut Context) -> HandlerResult + Send + Sync,
{
    fn transform_request(&self, ctx: &mut Context) -> HandlerResult {
        (self.request)(ctx)
    }

    fn transform_response(&self, ctx: &mut Context) -> HandlerResult {
        (self.response)(ctx)
    }
}

/// Builds a transformer from a request closure and a response closure.
pub fn transformer_fn<Req, Res>(request: Req, response: Res) -> Unit
where
    Req: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
    Res: Fn(&mut Context) -> HandlerResult + Send + Sync + 'static,
{
    transformer(FnTransformer { request, response })
}

/// Stores `value` under `key` in the association table, then continues.
pub fn set_value<T>(key: impl Into<String>, value: T) -> Unit
where
    T: Clone + Send + Sync + 'static,
{
    let key = key.into();
    handler(move |ctx: &mut Context| {
        ctx.set(key.clone(), value.clone());
        ctx.next();
        Ok(())
    })
}

/// Like [`set_value`], but calls `make` for a fresh value on every request.
pub fn set_fn<T, F>(key: impl Into<String>, make: F) -> Unit
where
    T: Send + Sync + 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let key = key.into();
    handler(move |ctx: &mut Context| {
        ctx.set(key.clone(), make());
        ctx.next();
        Ok(())
    })
}

/// Anything that can be bound as the unit list of a route.
pub trait IntoUnits {
    fn into_units(self) -> Vec<Unit>;
}

impl IntoUnits for Unit {
    fn into_units(self) -> Vec<Unit> {
        vec![self]
    }
}

impl IntoUnits for Vec<Unit> {
    fn into_units(self) -> Vec<Unit> {
        self
    }
}

impl<const N: usize> IntoUnits for [Unit; N] {
    fn into_units(self) -> Vec<Unit> {
        self.into()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::Router;
    use crate::http::{Recorder, Request, StatusCode};

    #[test]
    fn kinds() {
        assert_eq!(handler(|_ctx| Ok(())).kind(), UnitKind::Handler);
        assert_eq!(
            transformer_fn(|_ctx| Ok(()), |_ctx| Ok(())).kind(),
            UnitKind::Transformer
        );
        assert_eq!(Unit::from(crate::Router::new()).kind(), UnitKind::Dispatcher);
    }

    struct Teapot;

    impl Handler for Teapot {
        fn handle(&self, ctx: &mut Context) -> HandlerResult {
            ctx.set_status(StatusCode::from_u16(418).unwrap());
            ctx.set_body("short and stout");
            Ok(())
        }
    }

    #[test]
    fn struct_handler() {
        let recorder = Recorder::new();
        let mut ctx =
            Context::with_units(Request::new("GET", "/"), recorder.clone(), Unit::handler(Teapot));
        ctx.next();
        ctx.finalize();
        assert_eq!(recorder.status().map(StatusCode::as_u16), Some(418));
    }

    #[test]
    fn transformer_fn_runs_around_downstream() {
        let recorder = Recorder::new();
        let mut ctx = Context::with_units(
            Request::new("GET", "/"),
            recorder.clone(),
            [
                transformer_fn(
                    |ctx: &mut Context| {
                        ctx.set("trail", String::from("pre"));
                        Ok(())
                    },
                    |ctx: &mut Context| {
                        let trail = ctx.get::<String>("trail").cloned().unwrap_or_default();
                        ctx.set_body(format!("{trail},post"));
                        Ok(())
                    },
                ),
                handler(|ctx: &mut Context| {
                    if let Some(trail) = ctx.get_mut::<String>("trail") {
                        trail.push_str(",handler");
                    }
                    Ok(())
                }),
            ],
        );
        ctx.next();
        ctx.finalize();
        assert_eq!(recorder.body_text(), "pre,handler,post");
    }

    #[test]
    fn set_value_shares_with_later_units() {
        let recorder = Recorder::new();
        let mut ctx = Context::with_units(
            Request::new("GET", "/"),
            recorder.clone(),
            [
                set_value("greeting", "hi"),
                handler(|ctx: &mut Context| {
                    let greeting = ctx.get::<&str>("greeting").copied().unwrap_or("none");
                    ctx.set_body(greeting.to_owned());
                    Ok(())
                }),
            ],
        );
        ctx.next();
        ctx.finalize();
        assert_eq!(recorder.body_text(), "hi");
    }

    #[test]
    fn set_fn_makes_a_value_per_request() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut router = Router::new();
        router.use_all(set_fn("request_no", {
            let counter = Arc::clone(&counter);
            move || counter.fetch_add(1, Ordering::SeqCst) + 1
        }));
        router.get("/", [handler(|ctx: &mut Context| {
            let n = ctx.get::<usize>("request_no").copied().unwrap_or_default();
            ctx.set_body(n.to_string());
            Ok(())
        })]);

        let bodies: Vec<String> = (0..2)
            .map(|_| {
                let recorder = Recorder::new();
                router.serve(Request::new("GET", "/"), recorder.clone());
                recorder.body_text()
            })
            .collect();
        assert_eq!(bodies, ["1", "2"]);
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
