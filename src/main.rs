//! Binary entrypoint for the `citesync` CLI.

use std::process::ExitCode;

fn main() -> ExitCode {
    // A project-local .env may set CITESYNC_CONFIG, CITESYNC_RECORD, CITESYNC_REPLAY or RUST_LOG.
    let _ = dotenvy::dotenv();
    match citesync::run(std::env::args()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}
