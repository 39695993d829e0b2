use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use thiserror::Error;

/// Where a user callback failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    SetupFunction,
    RenderFunction,
    WatchGetter,
    WatchCallback,
    WatchCleanup,
    LifecycleHook,
    ComponentUpdate,
    EventHandler,
    AppErrorHandler,
    SchedulerJob,
    SchedulerFlush,
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorCode::SetupFunction => "setup function",
            ErrorCode::RenderFunction => "render function",
            ErrorCode::WatchGetter => "watcher getter",
            ErrorCode::WatchCallback => "watcher callback",
            ErrorCode::WatchCleanup => "watcher cleanup function",
            ErrorCode::LifecycleHook => "lifecycle hook",
            ErrorCode::ComponentUpdate => "component update",
            ErrorCode::EventHandler => "event handler",
            ErrorCode::AppErrorHandler => "app error handler",
            ErrorCode::SchedulerJob => "scheduler job",
            ErrorCode::SchedulerFlush => "scheduler flush",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("unhandled error during execution of {code}: {message}")]
    Callback { code: ErrorCode, message: String },

    #[error(
        "maximum recursive updates exceeded ({limit}): a job keeps re-queueing itself, \
         likely because it mutates state it also depends on"
    )]
    RecursionLimit { limit: u32 },
}

impl RuntimeError {
    pub fn code(&self) -> Option<ErrorCode> {
        match self {
            RuntimeError::Callback { code, .. } => Some(*code),
            RuntimeError::RecursionLimit { .. } => None,
        }
    }
}

pub type ErrorHandler = Rc<dyn Fn(&RuntimeError)>;
pub type WarnHandler = Rc<dyn Fn(&str)>;

thread_local! {
    static ERROR_HANDLER: RefCell<Option<ErrorHandler>> = const { RefCell::new(None) };
    static WARN_HANDLER: RefCell<Option<WarnHandler>> = const { RefCell::new(None) };
}

/// Installs the handler that receives every caught callback failure and
/// returns the previous one.
pub fn set_error_handler(handler: Option<ErrorHandler>) -> Option<ErrorHandler> {
    ERROR_HANDLER.with(|h| std::mem::replace(&mut *h.borrow_mut(), handler))
}

pub fn set_warn_handler(handler: Option<WarnHandler>) -> Option<WarnHandler> {
    WARN_HANDLER.with(|h| std::mem::replace(&mut *h.borrow_mut(), handler))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Routes an error to the registered handler, or logs it.
pub fn handle_error(err: RuntimeError) {
    let handler = ERROR_HANDLER.with(|h| h.borrow().clone());
    match handler {
        Some(handler) => {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| handler(&err)));
            if let Err(payload) = outcome {
                tracing::error!(
                    "{}",
                    RuntimeError::Callback {
                        code: ErrorCode::AppErrorHandler,
                        message: panic_message(payload.as_ref()),
                    }
                );
                tracing::error!("{err}");
            }
        }
        None => tracing::error!("{err}"),
    }
}

/// Runs a user callback, turning a panic into a [`RuntimeError`] that is
/// handed to [`handle_error`]. Returns `None` when the callback panicked.
pub fn call_with_error_handling<R>(code: ErrorCode, f: impl FnOnce() -> R) -> Option<R> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => Some(value),
        Err(payload) => {
            handle_error(RuntimeError::Callback {
                code,
                message: panic_message(payload.as_ref()),
            });
            None
        }
    }
}

/// Advisory, non-fatal warning.
pub fn warn(message: impl fmt::Display) {
    let handler = WARN_HANDLER.with(|h| h.borrow().clone());
    let message = message.to_string();
    match handler {
        Some(handler) => handler(&message),
        None => tracing::warn!("{message}"),
    }
}
