//! Core library for the `citesync` CLI.
//!
//! `citesync` keeps a personal bibliography consistent across a CSV ledger,
//! one Markdown note per citation and two bibliography exports (BibTeX and
//! Hayagriva). Metadata comes from Crossref, Open Library and Google Books.

pub mod adapters;
pub mod address;
pub mod cassette;
pub mod cli;
pub mod code;
pub mod commands;
pub mod config;
pub mod context;
pub mod error;
pub mod ledger;
pub mod logging;
pub mod ports;
pub mod projection;
pub mod record;
pub mod stores;
pub mod sync;
pub mod text;

#[cfg(test)]
pub(crate) mod testing;

use clap::error::ErrorKind;
use clap::Parser;

/// Run the CLI with the provided arguments.
///
/// # Errors
///
/// Returns an error string when argument parsing fails or command execution fails.
pub fn run<I, T>(args: I) -> Result<(), String>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    let cli = match cli::Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(err) if matches!(err.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{err}");
            return Ok(());
        }
        Err(err) => return Err(err.to_string()),
    };
    commands::dispatch(&cli)
}

#[cfg(test)]
mod tests {
    use super::run;

    #[test]
    fn run_prints_help() {
        assert!(run(["citesync", "--help"]).is_ok());
    }

    #[test]
    fn run_errors_on_unknown_subcommand() {
        let result = run(["citesync", "unknown"]);
        assert!(result.is_err());
    }
}
