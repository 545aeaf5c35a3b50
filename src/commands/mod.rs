//! Command dispatch and handlers.

pub mod show;
pub mod sync;

use std::env;
use std::path::PathBuf;

use crate::adapters::live::LiveFileSystem;
use crate::cli::{Cli, Command};
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::logging;

/// Settings file used when neither `--config` nor `CITESYNC_CONFIG` is given.
pub const DEFAULT_CONFIG: &str = "citesync.yml";

/// Dispatch a parsed command to its handler.
///
/// When `CITESYNC_REPLAY` names a cassette, the clock and the providers are
/// served from it. Otherwise, when `CITESYNC_RECORD` is set to a file path,
/// their interactions are recorded to that cassette.
///
/// # Errors
///
/// Returns an error string if the settings cannot be loaded or the selected
/// command handler fails.
pub fn dispatch(cli: &Cli) -> Result<(), String> {
    let config = cli
        .config
        .clone()
        .or_else(|| env::var_os("CITESYNC_CONFIG").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG));
    let settings = Settings::load(&LiveFileSystem, &config).map_err(|e| e.to_string())?;
    logging::init(&settings.logging).map_err(|e| e.to_string())?;

    let ctx = if let Some(path) = env::var_os("CITESYNC_REPLAY") {
        tracing::info!(cassette = %PathBuf::from(&path).display(), "replaying");
        ServiceContext::replaying(&PathBuf::from(path), &settings)?
    } else if let Some(path) = env::var_os("CITESYNC_RECORD") {
        ServiceContext::recording(&PathBuf::from(path), &settings)
    } else {
        ServiceContext::live(&settings)
    };

    dispatch_with_context(&cli.command, &ctx, &settings)
}

/// Dispatch a command with the given service context.
fn dispatch_with_context(command: &Command, ctx: &ServiceContext, settings: &Settings) -> Result<(), String> {
    match command {
        Command::Sync(args) => sync::run(ctx, settings, args),
        Command::Show { code } => show::run(ctx, settings, code.as_deref()),
    }
}
