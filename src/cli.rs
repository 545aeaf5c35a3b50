//! CLI argument definitions.

use std::path::PathBuf;

use clap::{ArgMatches, Args, FromArgMatches, Parser, Subcommand};

/// Top-level CLI parser for `citesync`.
#[derive(Debug, Parser)]
#[command(name = "citesync", version, about = "Keep a citation ledger, its notes and bibliographies in sync")]
pub struct Cli {
    /// Settings file (YAML or JSON). Defaults to `$CITESYNC_CONFIG`, then `citesync.yml`.
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// The command to execute.
    #[command(subcommand)]
    pub command: Command,
}

/// Supported top-level subcommands.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Add, refresh and rename citations, then bring every artifact up to date.
    Sync(SyncArgs),
    /// List citation codes, or show one record and its citation links.
    Show {
        /// Citation code to show.
        code: Option<String>,
    },
}

/// Options of `citesync sync` as clap declares them.
#[derive(Debug, Default, Args)]
pub struct SyncOptions {
    /// DOIs or ISBNs to add.
    #[arg(value_name = "IDENTIFIER")]
    pub identifiers: Vec<String>,

    /// Add IDENTIFIER under a custom base code.
    #[arg(long = "setcode", num_args = 2, value_names = ["IDENTIFIER", "BASE"])]
    pub setcode: Vec<String>,

    /// Refetch the missing fields of CODE.
    #[arg(long, value_name = "CODE", conflicts_with = "update_all")]
    pub update: Vec<String>,

    /// Refetch the missing fields of every record.
    #[arg(long)]
    pub update_all: bool,

    /// Move CODE to a fresh code under NEW_BASE. If CODE is given more than
    /// once, the last NEW_BASE wins.
    #[arg(long, num_args = 2, value_names = ["CODE", "NEW_BASE"])]
    pub rename: Vec<String>,
}

impl SyncOptions {
    /// `--setcode` values as `(identifier, base)` pairs.
    #[must_use]
    pub fn setcode_pairs(&self) -> Vec<(&str, &str)> {
        pairs(&self.setcode)
    }

    /// `--rename` values as `(code, new base)` pairs.
    #[must_use]
    pub fn rename_pairs(&self) -> Vec<(&str, &str)> {
        pairs(&self.rename)
    }
}

/// Arguments of `citesync sync`.
///
/// Plain identifiers and `--setcode` pairs are kept in one list in the order
/// they appeared on the command line, which is the order codes are allocated.
#[derive(Debug, Default)]
pub struct SyncArgs {
    /// The parsed options.
    pub options: SyncOptions,
    /// `(identifier, custom base)` in command-line order.
    pub entries: Vec<(String, Option<String>)>,
}

impl SyncArgs {
    fn from_options(matches: &ArgMatches, options: SyncOptions) -> Self {
        let mut slots: Vec<(usize, String, Option<String>)> = Vec::new();
        if let Some(indices) = matches.indices_of("identifiers") {
            slots.extend(indices.zip(&options.identifiers).map(|(at, raw)| (at, raw.clone(), None)));
        }
        if let Some(indices) = matches.indices_of("setcode") {
            // Each pair sits at the index of its identifier.
            slots.extend(
                indices
                    .step_by(2)
                    .zip(options.setcode_pairs())
                    .map(|(at, (raw, base))| (at, raw.to_string(), Some(base.to_string()))),
            );
        }
        slots.sort_by_key(|(at, ..)| *at);
        let entries = slots.into_iter().map(|(_, raw, base)| (raw, base)).collect();
        Self { options, entries }
    }
}

impl FromArgMatches for SyncArgs {
    fn from_arg_matches(matches: &ArgMatches) -> Result<Self, clap::Error> {
        Ok(Self::from_options(matches, SyncOptions::from_arg_matches(matches)?))
    }

    fn update_from_arg_matches(&mut self, matches: &ArgMatches) -> Result<(), clap::Error> {
        self.options.update_from_arg_matches(matches)?;
        let options = std::mem::take(&mut self.options);
        *self = Self::from_options(matches, options);
        Ok(())
    }
}

impl Args for SyncArgs {
    fn augment_args(cmd: clap::Command) -> clap::Command {
        SyncOptions::augment_args(cmd)
    }

    fn augment_args_for_update(cmd: clap::Command) -> clap::Command {
        SyncOptions::augment_args_for_update(cmd)
    }
}

fn pairs(values: &[String]) -> Vec<(&str, &str)> {
    values.chunks_exact(2).map(|pair| (pair[0].as_str(), pair[1].as_str())).collect()
}

#[cfg(test)]
mod tests {
    use super::{Cli, Command};
    use clap::Parser;

    #[test]
    fn parses_sync_with_every_option() {
        let cli = Cli::parse_from([
            "citesync",
            "sync",
            "10.1000/a",
            "--setcode",
            "9780306406157",
            "Knuth",
            "--rename",
            "Doe2020a",
            "Doe_Smith2020",
            "--update",
            "Roe2019a",
            "--config",
            "lib/citesync.yml",
        ]);
        let Command::Sync(args) = cli.command else { panic!("expected sync") };
        assert_eq!(args.options.identifiers, ["10.1000/a"]);
        assert_eq!(args.options.setcode_pairs(), [("9780306406157", "Knuth")]);
        assert_eq!(args.options.rename_pairs(), [("Doe2020a", "Doe_Smith2020")]);
        assert_eq!(args.options.update, ["Roe2019a"]);
        assert_eq!(cli.config.unwrap().to_str(), Some("lib/citesync.yml"));
    }

    #[test]
    fn entries_keep_command_line_order() {
        let cli = Cli::parse_from([
            "citesync",
            "sync",
            "10.1000/x",
            "--setcode",
            "10.1000/y",
            "Doe2020",
            "10.1000/z",
            "--setcode",
            "10.1000/w",
            "Roe",
        ]);
        let Command::Sync(args) = cli.command else { panic!("expected sync") };
        let entries: Vec<(&str, Option<&str>)> =
            args.entries.iter().map(|(raw, base)| (raw.as_str(), base.as_deref())).collect();
        assert_eq!(
            entries,
            [("10.1000/x", None), ("10.1000/y", Some("Doe2020")), ("10.1000/z", None), ("10.1000/w", Some("Roe"))]
        );
    }

    #[test]
    fn sync_without_entries_has_empty_list() {
        let cli = Cli::parse_from(["citesync", "sync", "--update-all"]);
        let Command::Sync(args) = cli.command else { panic!("expected sync") };
        assert!(args.entries.is_empty());
        assert!(args.options.update_all);
    }

    #[test]
    fn update_conflicts_with_update_all() {
        assert!(Cli::try_parse_from(["citesync", "sync", "--update", "A2000a", "--update-all"]).is_err());
    }

    #[test]
    fn parses_show_subcommand() {
        let cli = Cli::parse_from(["citesync", "show", "Doe2020a"]);
        assert!(matches!(cli.command, Command::Show { code: Some(ref c) } if c == "Doe2020a"));
    }
}
