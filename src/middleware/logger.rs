//! Request logging.

use std::time::Instant;

use crate::context::Context;
use crate::error::HandlerResult;

use super::{Transformer, Unit, transformer};

const STARTED_AT: &str = "waypoint.logger.started_at";

/// Logs each request's method, path, status, and duration.
///
/// Emits one `tracing::info!` record after the downstream units return, in
/// the format:
///
/// ```text
/// METHOD /path - STATUS (duration)
/// ```
///
/// The status is the one set by the chain so far; a request that failed is
/// logged with `500`, and one that never set a status with `-`.
pub struct LoggerMiddleware;

impl Transformer for LoggerMiddleware {
    fn transform_request(&self, ctx: &mut Context) -> HandlerResult {
        ctx.set(STARTED_AT, Instant::now());
        Ok(())
    }

    fn transform_response(&self, ctx: &mut Context) -> HandlerResult {
        let duration = ctx
            .remove::<Instant>(STARTED_AT)
            .map(|started_at| started_at.elapsed())
            .unwrap_or_default();
        let status = if ctx.error().is_some() {
            "500".to_owned()
        } else {
            ctx.status()
                .map_or_else(|| "-".to_owned(), |status| status.as_u16().to_string())
        };

        tracing::info!(
            method = %ctx.method(),
            path = ctx.path(),
            status = %status,
            ?duration,
            "{} {} - {} ({:?})",
            ctx.method(),
            ctx.path(),
            status,
            duration
        );
        Ok(())
    }
}

/// The [`LoggerMiddleware`] as a unit.
pub fn logger() -> Unit {
    transformer(LoggerMiddleware)
}
