//! Per-run action log.

use std::fmt;

/// What the run did for one entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    /// A record was created.
    Create {
        /// The new code.
        code: String,
        /// Identifier it was created from.
        identifier: String,
    },
    /// The identifier is already in the ledger.
    Skip {
        /// Identifier from the request.
        identifier: String,
        /// Code already holding it.
        code: String,
    },
    /// No provider had a confident match.
    NotFound {
        /// Identifier that was looked up.
        identifier: String,
    },
    /// Missing fields were refetched.
    Update {
        /// The updated code.
        code: String,
        /// Fields that received a value.
        filled: Vec<String>,
    },
    /// A record moved to a new code.
    Rename {
        /// Retired code.
        old: String,
        /// Newly issued code.
        new: String,
    },
    /// A derived entry without a ledger record was deleted.
    Prune {
        /// Store the entry was removed from.
        store: &'static str,
        /// Code of the removed entry.
        code: String,
    },
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Create { code, identifier } => write!(f, "CREATE {code}: {identifier}"),
            Self::Skip { identifier, code } => write!(f, "SKIP {identifier} (already {code})"),
            Self::NotFound { identifier } => write!(f, "NOT FOUND {identifier}"),
            Self::Update { code, filled } if filled.is_empty() => write!(f, "UPDATE {code}: nothing new"),
            Self::Update { code, filled } => write!(f, "UPDATE {code}: {}", filled.join(", ")),
            Self::Rename { old, new } => write!(f, "RENAME {old} -> {new}"),
            Self::Prune { store, code } => write!(f, "PRUNE {code} ({store})"),
        }
    }
}

/// Formats sync actions as a human-readable report.
#[must_use]
pub fn format_actions(actions: &[SyncAction]) -> String {
    if actions.is_empty() {
        return "Nothing to sync.".to_string();
    }
    actions.iter().map(|action| format!("  {action}")).collect::<Vec<_>>().join("\n")
}
