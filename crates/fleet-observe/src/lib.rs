//! Process-wide logging setup.
//!
//! Components only emit `tracing` events; the binary calls [`logger_init`]
//! once at startup to choose where they go.

use std::sync::atomic::{AtomicBool, Ordering};

mod config;
mod error;
mod format;
mod init;
mod level;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;
pub use level::LoggerLevel;

static INITIALIZED: AtomicBool = AtomicBool::new(false);

/// Installs the global subscriber described by `cfg`.
///
/// Fails with [`LoggerError::AlreadyInitialized`] after a successful call,
/// and with [`LoggerError::InitializationFailed`] when another global
/// subscriber was installed elsewhere.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    if INITIALIZED.load(Ordering::Acquire) {
        return Err(LoggerError::AlreadyInitialized);
    }
    match cfg.format {
        LoggerFormat::Text => init::text(cfg),
        LoggerFormat::Json => init::json(cfg),
        LoggerFormat::Journald => init::journald(cfg),
    }?;
    INITIALIZED.store(true, Ordering::Release);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_init_is_rejected() {
        let cfg = LoggerConfig::default().with_level(LoggerLevel::new("debug").unwrap());
        logger_init(&cfg).unwrap();
        assert!(matches!(
            logger_init(&cfg),
            Err(LoggerError::AlreadyInitialized)
        ));
        tracing::info!(test = "observe", "logger ready");
    }
}
