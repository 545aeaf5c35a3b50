//! `citesync sync` command.

use crate::cli::SyncArgs;
use crate::config::Settings;
use crate::context::ServiceContext;
use crate::sync::{format_actions, EntryRequest, SyncCoordinator, SyncRequest};

/// Builds the run request from the command-line arguments.
///
/// # Errors
///
/// Returns an error string naming the first identifier that is neither a
/// DOI nor an ISBN.
pub fn build_request(args: &SyncArgs) -> Result<SyncRequest, String> {
    let entries = args
        .entries
        .iter()
        .map(|(raw, base)| EntryRequest::parse(raw, base.as_deref()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    let options = &args.options;
    Ok(SyncRequest {
        entries,
        update: options.update.clone(),
        update_all: options.update_all,
        renames: options.rename_pairs().into_iter().map(|(code, base)| (code.to_string(), base.to_string())).collect(),
    })
}

/// Execute the `sync` command.
///
/// # Errors
///
/// Returns an error string if the request is invalid or the run fails. A
/// run that fails after touching files has already been rolled back.
pub fn run(ctx: &ServiceContext, settings: &Settings, args: &SyncArgs) -> Result<(), String> {
    let request = build_request(args)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("Failed to start async runtime: {e}"))?;

    let actions = runtime
        .block_on(async {
            let mut coordinator = SyncCoordinator::open(ctx, settings)?;
            coordinator.run(&request).await
        })
        .map_err(|e| {
            if e.is_reported() {
                e.to_string()
            } else {
                format!("{e}\nNo files were changed.")
            }
        })?;

    println!("Sync complete:");
    println!("{}", format_actions(&actions));
    Ok(())
}
