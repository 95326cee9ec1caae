//! Context pooling.
//!
//! Contexts carry a handful of collections (headers, cookies, parameter slots,
//! the association table, the frame stack). Reusing them keeps those
//! allocations warm across requests. A context is reset field by field when
//! it is acquired and retired when it is released; a retired context panics
//! on use.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::config::{PoolConfig, RouterConfig};
use crate::http::{Request, ResponseSink};
use crate::router::chain::Chain;

use super::{Context, Lifecycle};

/// A pool of reusable [`Context`]s.
pub struct ContextPool {
    config: PoolConfig,
    free: Mutex<Vec<Box<Context>>>,
}

impl ContextPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            free: Mutex::new(Vec::new()),
            config,
        }
    }

    /// Takes an idle context (or allocates one) and prepares it for `request`.
    pub(crate) fn acquire(
        &self,
        request: Request,
        sink: Box<dyn ResponseSink>,
        chain: Arc<Chain>,
        config: &RouterConfig,
    ) -> Box<Context> {
        let reused = self.free.lock().pop();
        let mut ctx = match reused {
            Some(ctx) => {
                trace!("Pool: reusing context");
                ctx
            }
            None => {
                trace!("Pool: allocating context");
                Box::new(Context::blank())
            }
        };
        ctx.start(request, sink, chain, config);
        ctx
    }

    /// Retires `ctx` and keeps it for reuse if the pool has room.
    pub(crate) fn release(&self, mut ctx: Box<Context>) {
        if ctx.lifecycle() != Lifecycle::Finalized {
            warn!(path = %ctx.path(), "releasing a context that was never finalized");
            ctx.finalize();
        }
        ctx.retire();

        let mut free = self.free.lock();
        if free.len() < self.config.max_idle {
            free.push(ctx);
        } else {
            debug!(max_idle = self.config.max_idle, "Pool: full, dropping context");
        }
    }

    /// Number of idle contexts ready for reuse.
    pub fn idle(&self) -> usize {
        self.free.lock().len()
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl Default for ContextPool {
    fn default() -> Self {
        Self::new(PoolConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{Cookie, MethodFilter, Recorder, StatusCode};
    use crate::middleware::handler;
    use crate::router::chain::BindingNode;

    fn chain() -> Arc<Chain> {
        let mut chain = Chain::new();
        chain.push(BindingNode::new(
            MethodFilter::All,
            None,
            vec![handler(|ctx: &mut Context| {
                ctx.set("seen", true);
                ctx.set_status(StatusCode::ACCEPTED);
                ctx.add_cookie(Cookie::new("a", "b"));
                ctx.set_body("ok");
                Ok(())
            })],
        ));
        Arc::new(chain)
    }

    #[test]
    fn released_context_is_reused_and_fully_reset() {
        let pool = ContextPool::default();
        let config = RouterConfig::default();

        let recorder = Recorder::new();
        let mut ctx = pool.acquire(
            Request::new("GET", "/one"),
            Box::new(recorder.clone()),
            chain(),
            &config,
        );
        ctx.next();
        ctx.finalize();
        assert_eq!(recorder.status(), Some(StatusCode::ACCEPTED));
        pool.release(ctx);
        assert_eq!(pool.idle(), 1);

        let ctx = pool.acquire(
            Request::new("POST", "/two"),
            Box::new(Recorder::new()),
            Arc::new(Chain::new()),
            &config,
        );
        assert_eq!(pool.idle(), 0);
        assert_eq!(ctx.lifecycle(), Lifecycle::Idle);
        assert_eq!(ctx.path(), "/two");
        assert_eq!(ctx.status(), None);
        assert!(ctx.body().is_none());
        assert!(ctx.cookies().is_empty());
        assert!(ctx.response_headers().is_empty());
        assert!(ctx.get::<bool>("seen").is_none());
        assert!(ctx.params().is_empty());
        assert!(ctx.error().is_none());
        assert!(!ctx.headers_written());
        assert!(!ctx.body_written());
        assert_eq!(ctx.deadline(), None);
    }

    #[test]
    fn release_finalizes_unfinished_context() {
        let pool = ContextPool::default();
        let recorder = Recorder::new();
        let mut ctx = pool.acquire(
            Request::new("GET", "/"),
            Box::new(recorder.clone()),
            chain(),
            &RouterConfig::default(),
        );
        ctx.next();
        pool.release(ctx);
        assert_eq!(recorder.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(recorder.body_text(), "ok");
    }

    #[test]
    fn idle_contexts_are_capped() {
        let pool = ContextPool::new(PoolConfig { max_idle: 1 });
        let config = RouterConfig::default();
        let first = pool.acquire(Request::new("GET", "/"), Box::new(Recorder::new()), chain(), &config);
        let second = pool.acquire(Request::new("GET", "/"), Box::new(Recorder::new()), chain(), &config);
        pool.release(first);
        pool.release(second);
        assert_eq!(pool.idle(), 1);
    }

    #[test]
    fn token_outlives_release() {
        let pool = ContextPool::default();
        let mut ctx = pool.acquire(
            Request::new("GET", "/"),
            Box::new(Recorder::new()),
            chain(),
            &RouterConfig::default(),
        );
        let token = ctx.cancellation();
        ctx.next();
        ctx.finalize();
        pool.release(ctx);

        assert!(token.is_done());
        assert!(token.err().is_none());
    }
}
