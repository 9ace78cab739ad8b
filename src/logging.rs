//! Diagnostic logging setup.
//!
//! The chat view owns the terminal, so interactive sessions only log when a
//! file is given with `--log`. Non-interactive commands log warnings to
//! stderr. The filter comes from `HAI_LOG` when set.

use std::error::Error;
use std::fmt;
use std::fs::OpenOptions;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::core::constants::LOG_FILTER_ENV;

pub enum LogTarget<'a> {
    File(&'a Path),
    Stderr,
    Disabled,
}

#[derive(Debug)]
pub enum LoggingError {
    Open { path: PathBuf, source: io::Error },
    /// A global subscriber was already installed.
    Install(Box<dyn Error + Send + Sync>),
}

impl fmt::Display for LoggingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoggingError::Open { path, source } => {
                write!(f, "Unable to open log file {}: {}", path.display(), source)
            }
            LoggingError::Install(err) => write!(f, "Unable to start logging: {err}"),
        }
    }
}

impl Error for LoggingError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LoggingError::Open { source, .. } => Some(source),
            LoggingError::Install(err) => Some(err.as_ref()),
        }
    }
}

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_env(LOG_FILTER_ENV).unwrap_or_else(|_| EnvFilter::new(default_directive))
}

pub fn init(target: LogTarget<'_>) -> Result<(), LoggingError> {
    match target {
        LogTarget::File(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|source| LoggingError::Open {
                    path: path.to_path_buf(),
                    source,
                })?;
            tracing_subscriber::fmt()
                .with_env_filter(env_filter("hai=debug"))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(LoggingError::Install)
        }
        LogTarget::Stderr => tracing_subscriber::fmt()
            .with_env_filter(env_filter("hai=warn"))
            .with_target(false)
            .with_writer(io::stderr)
            .try_init()
            .map_err(LoggingError::Install),
        LogTarget::Disabled => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_install_is_reported() {
        // The first call may lose to another test in this process
        let _ = init(LogTarget::Stderr);
        let err = init(LogTarget::Stderr).unwrap_err();
        assert!(matches!(err, LoggingError::Install(_)));
        assert!(err.to_string().starts_with("Unable to start logging"));
    }

    #[test]
    fn unopenable_log_file_is_reported() {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let path = temp_dir.path().join("missing").join("hai.log");

        let err = init(LogTarget::File(&path)).unwrap_err();
        assert!(matches!(err, LoggingError::Open { .. }));
        assert!(err.to_string().contains("hai.log"));
    }

    #[test]
    fn disabled_installs_nothing() {
        assert!(init(LogTarget::Disabled).is_ok());
    }
}
