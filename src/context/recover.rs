//! Recovery boundary around unit execution.
//!
//! A panicking unit must not take the request (or the worker thread) down with
//! it. [`catch`] runs a closure under `catch_unwind`, and a process-wide panic
//! hook captures the backtrace of panics raised inside that boundary so the
//! finalizer can log it. Panics outside any boundary go to the previously
//! installed hook untouched.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    // Number of active recovery boundaries on this thread.
    static DEPTH: Cell<usize> = const { Cell::new(0) };
    static LAST_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if DEPTH.with(Cell::get) == 0 {
                previous(info);
                return;
            }
            let trace = format!("{info}\n{}", Backtrace::force_capture());
            LAST_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
        }));
    });
}

/// A panic caught at a recovery boundary.
#[derive(Debug)]
pub(crate) struct Caught {
    pub(crate) message: String,
    pub(crate) trace: Option<String>,
}

/// Runs `f`, converting a panic into [`Caught`].
pub(crate) fn catch<R>(f: impl FnOnce() -> R) -> Result<R, Caught> {
    install_hook();

    DEPTH.with(|depth| depth.set(depth.get() + 1));
    let result = panic::catch_unwind(AssertUnwindSafe(f));
    DEPTH.with(|depth| depth.set(depth.get() - 1));

    result.map_err(|payload| Caught {
        message: panic_message(payload.as_ref()),
        trace: LAST_TRACE.with(|slot| slot.borrow_mut().take()),
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_owned()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "<non-string panic payload>".to_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn returns_value_without_panic() {
        assert_eq!(catch(|| 7).unwrap(), 7);
    }

    #[test]
    fn captures_str_panic_and_trace() {
        let caught = catch(|| panic!("boom")).unwrap_err();
        assert_eq!(caught.message, "boom");
        assert!(caught.trace.unwrap().contains("boom"));
    }

    #[test]
    fn captures_formatted_panic() {
        let caught = catch(|| panic!("code {}", 42)).unwrap_err();
        assert_eq!(caught.message, "code 42");
    }

    #[test]
    fn nested_boundaries_unwind_to_innermost() {
        let outer = catch(|| {
            let inner = catch(|| panic!("inner"));
            assert!(inner.is_err());
            "outer ok"
        });
        assert_eq!(outer.unwrap(), "outer ok");
    }
}
