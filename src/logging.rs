//! Tracing setup (spec.md's ambient logging stack, SPEC_FULL.md §2.1),
//! grounded on the teacher's `tui/src/core/log/{tracing_init,tracing_config}.rs`
//! layer-composition style, simplified to this crate's single global
//! subscriber use case rather than the teacher's thread-local/global choice.

use std::path::PathBuf;
use std::sync::OnceLock;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_core::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::LoggingError;

static INIT: OnceLock<()> = OnceLock::new();

/// Where (if anywhere) to additionally roll logs to a file, alongside the
/// always-present compact stdout layer.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    pub level: LevelFilter,
    pub log_dir: Option<PathBuf>,
}

impl LoggingConfig {
    #[must_use]
    pub fn new(level: LevelFilter) -> Self {
        LoggingConfig { level, log_dir: None }
    }

    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

/// Installs the global tracing subscriber. Idempotent: a second call
/// returns `Ok(())` without altering the already-installed subscriber,
/// mirroring the teacher's `init_file_logger_once` guard in
/// `core/src/logging/proper_logging_impl.rs`.
///
/// The returned `WorkerGuard`, if any, must be kept alive for the duration
/// of the process — dropping it flushes and stops the non-blocking file
/// writer.
///
/// # Errors
/// Returns `LoggingError::LogDir` if `config.log_dir` is set but cannot be
/// created, or `LoggingError::AlreadyInitialised` if a *different* global
/// subscriber (installed outside this function) already holds the slot.
pub fn init_tracing(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    if INIT.get().is_some() {
        return Ok(None);
    }

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_string()));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(std::io::stdout);

    let (file_layer, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|source| LoggingError::LogDir {
                path: dir.display().to_string(),
                source,
            })?;
            let appender = tracing_appender::rolling::daily(dir, "reactor-mysql.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(non_blocking);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registered = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer);

    if registered.try_init().is_err() {
        return Err(LoggingError::AlreadyInitialised);
    }
    let _ = INIT.set(());
    Ok(guard)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent_second_call_is_a_noop() {
        let config = LoggingConfig::new(LevelFilter::INFO);
        let _ = init_tracing(&config);
        assert!(init_tracing(&config).unwrap().is_none());
    }
}
