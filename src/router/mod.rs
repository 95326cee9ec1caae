//! Request routing: bind patterns and methods to units, then serve requests
//! through the resulting chain.
//!
//! A [`Router`] keeps an ordered chain of bindings. Every request walks that
//! chain from the top; each binding whose method filter and pattern both
//! match runs its units in order, and a unit hands control onward by calling
//! [`Context::next`](crate::Context::next). Patterns support several styles:
//!
//! | Pattern              | Example match            | Captured params           |
//! |----------------------|--------------------------|---------------------------|
//! | `/users`             | `/users`, `/users/`      | *(none)*                  |
//! | `/users/:id`         | `/users/42`              | `id → "42"`               |
//! | `/users/:id?`        | `/users`                 | `id → ""`                 |
//! | `/files/:path+`      | `/files/docs/readme.txt` | `path → "docs/readme.txt"`|
//! | `/users/:id(\d+)`    | `/users/42`              | `id → "42"`               |
//! | `/api/**`            | `/api`, `/api/v1/users`  | *(none)*                  |
//!
//! Routers are dispatchers themselves, so mounting one inside another with
//! [`Router::use_at`] builds a routing tree.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::debug;

use crate::config::RouterConfig;
use crate::context::{Context, ContextPool};
use crate::error::Error;
use crate::http::{Method, MethodFilter, Request, ResponseSink};
use crate::middleware::{Dispatcher, IntoUnits, Unit};

pub mod chain;
pub mod descriptor;
pub mod pattern;

pub use descriptor::RouteDescriptor;
pub use pattern::{Pattern, PatternError};

use chain::{BindingNode, Chain};

/// Pattern every request path matches; the pattern middleware is bound to.
const MATCH_ALL: &str = "/**";

/// Ordered request dispatcher.
///
/// Bindings are evaluated in registration order. When nothing responds, the
/// request finalizes as `404 Not Found`.
///
/// # Examples
///
/// ```
/// use waypoint::{handler, Context, Router};
/// use waypoint::http::{Recorder, Request};
///
/// let mut router = Router::new();
/// router.get("/users/:id", [handler(|ctx: &mut Context| {
///     let id = ctx.param("id").unwrap_or("unknown").to_owned();
///     ctx.set_body(id);
///     Ok(())
/// })]);
///
/// let recorder = Recorder::new();
/// router.serve(Request::new("GET", "/users/42"), recorder.clone());
/// assert_eq!(recorder.body_text(), "42");
/// ```
pub struct Router {
    chain: Arc<Chain>,
    descriptors: Vec<RouteDescriptor>,
    seen: HashSet<(MethodFilter, String)>,
    pool: ContextPool,
    config: RouterConfig,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    /// Creates an empty router with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RouterConfig::default())
    }

    /// Creates an empty router applying `config` to every request it serves.
    ///
    /// ```
    /// use std::time::Duration;
    /// use waypoint::{Router, RouterConfig};
    ///
    /// let router = Router::with_config(RouterConfig::default().with_timeout(Duration::from_secs(5)));
    /// assert_eq!(router.config().timeout(), Some(Duration::from_secs(5)));
    /// ```
    pub fn with_config(config: RouterConfig) -> Self {
        Self {
            chain: Arc::new(Chain::new()),
            descriptors: Vec::new(),
            seen: HashSet::new(),
            pool: ContextPool::new(config.pool.clone()),
            config,
        }
    }

    pub fn config(&self) -> &RouterConfig {
        &self.config
    }

    pub fn pool(&self) -> &ContextPool {
        &self.pool
    }

    /// The bindings registered so far, in evaluation order.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Number of bindings registered on this router.
    pub fn len(&self) -> usize {
        self.chain.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chain.is_empty()
    }

    /// Appends a binding.
    ///
    /// # Errors
    ///
    /// - [`Error::MalformedPattern`] if `pattern` does not compile.
    /// - [`Error::NoUnits`] if `units` is empty.
    pub fn try_bind(
        &mut self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        units: impl IntoUnits,
    ) -> Result<&mut Self, Error> {
        self.insert(method.into(), pattern, units.into_units(), false)?;
        Ok(self)
    }

    /// Like [`try_bind`](Self::try_bind), and also lists the binding in
    /// [`route_descriptors`](Self::route_descriptors).
    ///
    /// # Errors
    ///
    /// Same as [`try_bind`](Self::try_bind).
    pub fn try_public_bind(
        &mut self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        units: impl IntoUnits,
    ) -> Result<&mut Self, Error> {
        self.insert(method.into(), pattern, units.into_units(), true)?;
        Ok(self)
    }

    /// Appends a binding.
    ///
    /// # Panics
    ///
    /// Panics if `pattern` is malformed or `units` is empty. Routes are
    /// configured at startup, where a bad route should stop the program.
    pub fn bind(
        &mut self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        units: impl IntoUnits,
    ) -> &mut Self {
        let method = method.into();
        if let Err(err) = self.insert(method, pattern, units.into_units(), false) {
            panic!("invalid route `{pattern}`: {err}");
        }
        self
    }

    /// Appends a binding and lists it in the route descriptors.
    ///
    /// # Panics
    ///
    /// Same as [`bind`](Self::bind).
    pub fn public_bind(
        &mut self,
        method: impl Into<MethodFilter>,
        pattern: &str,
        units: impl IntoUnits,
    ) -> &mut Self {
        let method = method.into();
        if let Err(err) = self.insert(method, pattern, units.into_units(), true) {
            panic!("invalid route `{pattern}`: {err}");
        }
        self
    }

    fn insert(
        &mut self,
        method: MethodFilter,
        pattern: &str,
        units: Vec<Unit>,
        public: bool,
    ) -> Result<(), Error> {
        if units.is_empty() {
            return Err(Error::NoUnits {
                method: method.to_string(),
                pattern: pattern.to_owned(),
            });
        }
        let compiled = Pattern::new(pattern)?;

        let mount = pattern.strip_suffix(MATCH_ALL).unwrap_or(pattern);
        let mut mounted = Vec::new();
        let mut has_dispatcher = false;
        for unit in &units {
            if let Unit::Dispatcher(dispatcher) = unit {
                has_dispatcher = true;
                for descriptor in dispatcher.route_descriptors() {
                    let nested = Pattern::new(&format!("{mount}{}", descriptor.pattern()))?;
                    mounted.push(RouteDescriptor::new(descriptor.method().clone(), nested));
                }
            }
        }
        if public && !has_dispatcher {
            mounted.push(RouteDescriptor::new(method.clone(), compiled.clone()));
        }
        for descriptor in mounted {
            self.add_descriptor(descriptor);
        }

        debug!(%method, pattern, units = units.len(), "Router: bound");
        Arc::make_mut(&mut self.chain).push(BindingNode::new(method, Some(compiled), units));
        Ok(())
    }

    fn add_descriptor(&mut self, descriptor: RouteDescriptor) {
        if self.seen.insert(descriptor.key()) {
            self.descriptors.push(descriptor);
        }
    }

    /// Binds `units` for every method and path. Use for middleware and for
    /// mounting routers at the root.
    pub fn use_all(&mut self, units: impl IntoUnits) -> &mut Self {
        self.bind(MethodFilter::All, MATCH_ALL, units)
    }

    /// Binds `units` for every method on `mount` and everything below it.
    ///
    /// `"/api"` and `"/api/"` both become `"/api/**"`; a mount that already
    /// ends in `/**` is used as is.
    ///
    /// # Panics
    ///
    /// Same as [`bind`](Self::bind).
    pub fn use_at(&mut self, mount: &str, units: impl IntoUnits) -> &mut Self {
        let pattern = if mount.ends_with(MATCH_ALL) {
            mount.to_owned()
        } else {
            format!("{}{MATCH_ALL}", mount.trim_end_matches('/'))
        };
        self.bind(MethodFilter::All, &pattern, units)
    }

    /// Binds `units` for every method on `pattern`.
    pub fn all(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.bind(MethodFilter::All, pattern, units)
    }

    /// Binds `units` for `GET` requests matching `pattern`.
    ///
    /// # Examples
    ///
    /// ```
    /// use waypoint::{handler, Context, Router};
    ///
    /// let mut router = Router::new();
    /// router.get("/hello", [handler(|ctx: &mut Context| {
    ///     ctx.set_body("Hello, World!");
    ///     Ok(())
    /// })]);
    /// assert_eq!(router.len(), 1);
    /// ```
    pub fn get(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.bind(Method::Get, pattern, units)
    }

    pub fn post(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.bind(Method::Post, pattern, units)
    }

    pub fn put(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.bind(Method::Put, pattern, units)
    }

    pub fn patch(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.bind(Method::Patch, pattern, units)
    }

    pub fn delete(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.bind(Method::Delete, pattern, units)
    }

    pub fn options(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.bind(Method::Options, pattern, units)
    }

    pub fn head(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.bind(Method::Head, pattern, units)
    }

    /// Public counterpart of [`all`](Self::all).
    pub fn public_all(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.public_bind(MethodFilter::All, pattern, units)
    }

    /// Public counterpart of [`get`](Self::get).
    pub fn public_get(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.public_bind(Method::Get, pattern, units)
    }

    pub fn public_post(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.public_bind(Method::Post, pattern, units)
    }

    pub fn public_put(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.public_bind(Method::Put, pattern, units)
    }

    pub fn public_patch(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.public_bind(Method::Patch, pattern, units)
    }

    pub fn public_delete(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.public_bind(Method::Delete, pattern, units)
    }

    pub fn public_options(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.public_bind(Method::Options, pattern, units)
    }

    pub fn public_head(&mut self, pattern: &str, units: impl IntoUnits) -> &mut Self {
        self.public_bind(Method::Head, pattern, units)
    }

    /// Routes registered through the `public_*` helpers, plus those of
    /// mounted routers prefixed with their mount path. Each method and
    /// pattern pair appears once, in first-registration order.
    pub fn route_descriptors(&self) -> &[RouteDescriptor] {
        &self.descriptors
    }

    /// Runs `request` through the chain and writes the response to `sink`.
    ///
    /// The context comes from the router's pool and goes back to it once the
    /// response is finalized.
    pub fn serve(&self, request: Request, sink: impl ResponseSink + 'static) {
        let mut ctx = self.pool.acquire(
            request,
            Box::new(sink),
            Arc::clone(&self.chain),
            &self.config,
        );
        debug!(method = %ctx.method(), path = ctx.path(), "Router: dispatching");

        ctx.next();
        ctx.finalize();
        self.pool.release(ctx);
    }

    /// Serves `request` on Tokio's blocking pool, for async transports.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Panic`] if the dispatch task panicked outside unit
    /// code, for example inside a response sink.
    pub async fn serve_blocking(
        self: &Arc<Self>,
        request: Request,
        sink: impl ResponseSink + 'static,
    ) -> Result<(), Error> {
        let router = Arc::clone(self);
        tokio::task::spawn_blocking(move || router.serve(request, sink))
            .await
            .map_err(|err| Error::Panic(err.to_string()))
    }
}

impl Dispatcher for Router {
    fn dispatch(&self, ctx: &mut Context) {
        ctx.dispatch_nested(Arc::clone(&self.chain));
    }

    fn route_descriptors(&self) -> Vec<RouteDescriptor> {
        self.descriptors.clone()
    }
}

impl From<Router> for Unit {
    fn from(router: Router) -> Self {
        Unit::dispatcher(router)
    }
}

impl IntoUnits for Router {
    fn into_units(self) -> Vec<Unit> {
        vec![self.into()]
    }
}
