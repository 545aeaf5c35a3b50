//! Tracing subscriber setup.
//!
//! Progress goes to stderr. `RUST_LOG` overrides the configured level, and a
//! configured log file gets a second, plain-text copy.

use std::fs::OpenOptions;
use std::sync::Arc;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingSettings;
use crate::error::{CiteError, Result};

/// Installs the global subscriber.
///
/// Calling it again after a subscriber is installed is a no-op.
///
/// # Errors
///
/// Returns [`CiteError::Io`] if the log file cannot be opened.
pub fn init(settings: &LoggingSettings) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));

    let file_layer = match &settings.file {
        Some(path) => {
            if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
                std::fs::create_dir_all(dir).map_err(|e| CiteError::io(dir, e))?;
            }
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| CiteError::io(path, e))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        None => None,
    };

    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent_and_creates_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("citesync.log");
        let settings = LoggingSettings { level: "debug".into(), file: Some(path.clone()) };

        init(&settings).unwrap();
        init(&settings).unwrap();
        assert!(path.exists());
    }
}
