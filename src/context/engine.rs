//! Chain traversal: the `next` state machine and nested dispatch.
//!
//! Each frame walks its chain in order. A node is entered when its method
//! filter and pattern match; its units then run one per `next` call. When a
//! nested frame runs out of nodes it resumes its parent frame exactly once, so
//! middleware mounted in a sub-router can fall through to the bindings after
//! the mount point.

use std::sync::Arc;

use crate::error::{BoxError, Error};
use crate::middleware::Unit;
use crate::router::chain::Chain;

use super::{Context, Frame, Lifecycle, recover};

impl Context {
    /// Runs the next matching unit of the chain.
    ///
    /// Units call this to pass control downstream; anything after the call
    /// runs once the rest of the chain has returned. Returns immediately when
    /// an error has been recorded or the deadline has passed.
    pub fn next(&mut self) {
        self.ensure_live();
        if self.lifecycle() == Lifecycle::Idle {
            self.set_lifecycle(Lifecycle::Traversing);
        }
        self.advance(self.active);
    }

    /// Runs `chain` in a child frame of the current one.
    ///
    /// The child shares the request, the response, and the association table;
    /// it gets its own cursor and starts with a copy of the current parameters.
    pub(crate) fn dispatch_nested(&mut self, chain: Arc<Chain>) {
        let parent = self.active;
        let level = self.frames.len();

        let mut frame = Frame::new(chain, Some(parent));
        frame.params.clone_from(&self.frames[parent].params);
        self.frames.push(frame);

        self.advance(level);
        self.frames.truncate(level);
    }

    /// Records `error` unless an earlier one is already held.
    pub(crate) fn record_error(&mut self, error: Error, trace: Option<String>) {
        if self.response.error.is_some() {
            tracing::debug!(%error, "discarding error recorded after the first");
            return;
        }
        self.response.error = Some(Arc::new(error));
        self.response.error_trace = trace;
    }

    fn advance(&mut self, level: usize) {
        if self.response.error.is_some() {
            return;
        }
        if self.deadline_passed() {
            self.record_error(Error::DeadlineExceeded, None);
            return;
        }

        let Some(unit) = self.take_unit(level) else {
            self.exhaust(level);
            return;
        };

        let depth = self.frames.len();
        let previous = std::mem::replace(&mut self.active, level);
        let outcome = recover::catch(|| self.run_unit(&unit));
        self.active = previous;

        if let Err(caught) = outcome {
            // A panic inside a nested dispatch skips its frame cleanup.
            self.frames.truncate(depth);
            self.record_error(Error::Panic(caught.message), caught.trace);
        }
    }

    // Moves the frame's cursor to the next unit of a matching node.
    fn take_unit(&mut self, level: usize) -> Option<Unit> {
        let method = self.request.method();
        let path = self.request.path();
        let frame = &mut self.frames[level];

        loop {
            if !frame.matched {
                loop {
                    let node = frame.chain.node(frame.node)?;
                    if node.matches(method, path, &mut frame.params) {
                        tracing::trace!(
                            method = %node.method(),
                            pattern = node.pattern().map(|p| p.as_str()),
                            "entered binding"
                        );
                        frame.matched = true;
                        frame.unit = 0;
                        break;
                    }
                    frame.node += 1;
                }
            }

            let node = frame.chain.node(frame.node)?;
            if let Some(unit) = node.units().get(frame.unit) {
                frame.unit += 1;
                return Some(unit.clone());
            }

            frame.matched = false;
            frame.node += 1;
            frame.unit = 0;
        }
    }

    fn exhaust(&mut self, level: usize) {
        let frame = &mut self.frames[level];
        match frame.parent {
            Some(parent) if !frame.resumed_parent => {
                frame.resumed_parent = true;
                self.advance(parent);
            }
            Some(_) => {}
            None => {
                if self.lifecycle() == Lifecycle::Traversing {
                    self.set_lifecycle(Lifecycle::Exhausted);
                }
            }
        }
    }

    fn run_unit(&mut self, unit: &Unit) {
        match unit {
            Unit::Handler(handler) => {
                if let Err(err) = handler.handle(self) {
                    self.record_error(unit_error(err), None);
                }
            }
            Unit::Transformer(transformer) => {
                if let Err(err) = transformer.transform_request(self) {
                    self.record_error(unit_error(err), None);
                    return;
                }
                self.next();
                if let Err(err) = transformer.transform_response(self) {
                    self.record_error(unit_error(err), None);
                }
            }
            Unit::Dispatcher(dispatcher) => dispatcher.dispatch(self),
        }
    }
}

// Unwraps crate errors a unit propagated with `?`; wraps everything else.
fn unit_error(err: BoxError) -> Error {
    match err.downcast::<Error>() {
        Ok(err) => *err,
        Err(err) => Error::Handler(err),
    }
}
