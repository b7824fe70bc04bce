use std::any::Any;
use std::sync::Arc;

use tracing::error;

/// Details of a task that panicked inside a pool worker.
#[derive(Debug, Clone)]
pub struct PanicReport {
    pub pool: &'static str,
    pub task: String,
    pub message: String,
}

/// Callback invoked for every contained panic.
pub type PanicHandler = Arc<dyn Fn(&PanicReport) + Send + Sync>;

/// Logs the panic; the source location and backtrace come from the process
/// panic hook (`RUST_BACKTRACE`).
pub fn log_panic() -> PanicHandler {
    Arc::new(|report: &PanicReport| {
        error!(
            pool = report.pool,
            task = %report.task,
            panic = %report.message,
            "task panicked; worker recovered"
        );
    })
}

/// Renders a panic payload taken from `JoinError::into_panic`.
pub fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
