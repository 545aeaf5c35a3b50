//! Error taxonomy shared by every layer of the crate.
//!
//! Errors fall into two classes. *Reported* errors describe bad input
//! (a malformed address, an invalid ledger row, an unknown code) and are
//! raised before anything on disk has been touched. Everything else is
//! *fatal*: it may surface mid-run and makes the coordinator roll back.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, CiteError>;

/// Every failure the crate can produce.
#[derive(Debug, Error)]
pub enum CiteError {
    /// Bad argument to a pure helper (suffix codec, identifier parsing).
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// A ledger row carries a code that does not round-trip through the allocator.
    #[error("invalid citation code \"{code}\" (ledger line {line}): {reason}")]
    InvalidCitationCode {
        /// The offending code as found in the ledger.
        code: String,
        /// One-based line of the row in the ledger file.
        line: usize,
        /// What is wrong and how to fix it.
        reason: String,
    },

    /// The same code appears on two ledger rows.
    #[error("citation code \"{code}\" appears on ledger lines {first} and {second}")]
    DuplicateCitationCode {
        /// The repeated code.
        code: String,
        /// Line of the first occurrence.
        first: usize,
        /// Line of the repeat.
        second: usize,
    },

    /// A request referenced a code the ledger does not hold.
    #[error("citation code \"{0}\" is not in the ledger")]
    UnknownCitationCode(String),

    /// An address expression is malformed or was applied to the wrong shape of data.
    #[error("address \"{address}\": {reason}")]
    AddressFormat {
        /// The full expression.
        address: String,
        /// What went wrong.
        reason: String,
    },

    /// Settings failed validation.
    #[error("configuration error: {0}")]
    Config(String),

    /// The ledger or a bibliography file could not be parsed.
    #[error("failed to parse {path}: {message}")]
    Parse {
        /// File that failed to parse.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// A metadata provider failed with something other than a timeout.
    #[error("{provider} lookup for \"{identifier}\" failed: {message}")]
    Provider {
        /// Provider name.
        provider: String,
        /// Identifier that was looked up.
        identifier: String,
        /// Underlying error message.
        message: String,
    },

    /// Filesystem failure.
    #[error("I/O error on {path}: {message}")]
    Io {
        /// File or directory involved.
        path: PathBuf,
        /// Underlying error message.
        message: String,
    },
}

impl CiteError {
    /// Builds an [`CiteError::Io`] from a port error.
    pub fn io(path: &Path, err: impl std::fmt::Display) -> Self {
        Self::Io { path: path.to_path_buf(), message: err.to_string() }
    }

    /// Builds an [`CiteError::AddressFormat`].
    pub fn address(address: &str, reason: impl Into<String>) -> Self {
        Self::AddressFormat { address: address.to_string(), reason: reason.into() }
    }

    /// Returns `true` for input errors that are surfaced to the user as-is.
    ///
    /// Fatal errors (I/O, provider failures) return `false`.
    #[must_use]
    pub fn is_reported(&self) -> bool {
        !matches!(self, Self::Io { .. } | Self::Provider { .. })
    }
}
