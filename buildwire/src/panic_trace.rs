//! Panic containment for request handlers.
//!
//! `catch` runs a closure under `catch_unwind`. A process-wide panic hook
//! (installed once) notices when the panicking thread is inside `catch` and
//! stashes the message, location and a backtrace in a thread-local instead of
//! printing them, so the handler's error response can carry the trace.
//! Panics outside `catch` go to the previously installed hook.

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::sync::Once;

thread_local! {
    static GUARDED: Cell<bool> = const { Cell::new(false) };
    static CAPTURED: RefCell<Option<String>> = const { RefCell::new(None) };
}

static INSTALL_HOOK: Once = Once::new();

fn install_hook() {
    INSTALL_HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if !GUARDED.with(Cell::get) {
                previous(info);
                return;
            }
            let location = info
                .location()
                .map(|l| format!("at {}:{}:{}\n", l.file(), l.line(), l.column()))
                .unwrap_or_default();
            let trace = format!("{location}{}", Backtrace::force_capture());
            CAPTURED.with(|c| *c.borrow_mut() = Some(trace));
        }));
    });
}

fn payload_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}

/// Restores the previous guard state, also when unwinding.
struct Guard {
    was_guarded: bool,
}

impl Drop for Guard {
    fn drop(&mut self) {
        GUARDED.with(|g| g.set(self.was_guarded));
    }
}

/// Run `f`, turning a panic into `Err("Panic: <message>\n\n<trace>")`.
///
/// Aborting panics (`panic = "abort"`, stack overflow, OOM) are not
/// recoverable and still take the process down.
pub fn catch<T>(f: impl FnOnce() -> T) -> Result<T, String> {
    install_hook();

    let result = {
        let _guard = Guard {
            was_guarded: GUARDED.with(|g| g.replace(true)),
        };
        panic::catch_unwind(AssertUnwindSafe(f))
    };

    result.map_err(|payload| {
        let message = payload_message(payload.as_ref());
        let trace = CAPTURED.with(|c| c.borrow_mut().take()).unwrap_or_default();
        tracing::error!(panic = %message, "Request handler panicked");
        format!("Panic: {message}\n\n{trace}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn passes_through_values() {
        assert_eq!(catch(|| 7), Ok(7));
    }

    #[test]
    fn converts_str_panic() {
        let err = catch::<i32>(|| panic!("boom")).unwrap_err();
        assert!(err.starts_with("Panic: boom\n\n"), "{err}");
        assert!(err.contains("panic_trace.rs"), "{err}");
    }

    #[test]
    fn converts_formatted_panic() {
        let err = catch::<()>(|| panic!("bad index {}", 3)).unwrap_err();
        assert!(err.starts_with("Panic: bad index 3"), "{err}");
    }

    #[test]
    fn nested_catch_restores_guard() {
        let outer = catch::<()>(|| {
            let inner = catch::<()>(|| panic!("inner"));
            assert!(inner.is_err());
            panic!("outer")
        });
        assert!(outer.unwrap_err().starts_with("Panic: outer"));
        assert!(!GUARDED.with(Cell::get));
    }
}
