//! What one sync run is asked to do.

use crate::error::{CiteError, Result};
use crate::record::IdKind;
use crate::text::{detect_kind, format_identifier};

/// One identifier to add to the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRequest {
    /// Normalized DOI or ISBN.
    pub identifier: String,
    /// Which kind of identifier it is.
    pub kind: IdKind,
    /// Base code to use instead of the configured code format.
    pub base: Option<String>,
}

impl EntryRequest {
    /// Classifies and normalizes `raw`.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::InvalidInput`] if `raw` is neither a DOI nor an ISBN.
    pub fn parse(raw: &str, base: Option<&str>) -> Result<Self> {
        let kind = detect_kind(raw)
            .ok_or_else(|| CiteError::InvalidInput(format!("\"{raw}\" is not a DOI or an ISBN")))?;
        Ok(Self { identifier: format_identifier(raw, kind), kind, base: base.map(str::to_string) })
    }
}

/// The full set of operations for one run.
///
/// Operations run in a fixed order: updates, renames, creates, then the
/// prune of stale derived entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncRequest {
    /// Identifiers to create, in order.
    pub entries: Vec<EntryRequest>,
    /// Codes whose missing fields should be refetched.
    pub update: Vec<String>,
    /// Refetch every record with a missing field.
    pub update_all: bool,
    /// `(old code, new base)` pairs.
    pub renames: Vec<(String, String)>,
}

impl SyncRequest {
    /// The renames to apply: when a code is renamed more than once, the last
    /// pair wins and takes that pair's position.
    #[must_use]
    pub fn effective_renames(&self) -> Vec<(&str, &str)> {
        let mut pairs: Vec<(&str, &str)> = Vec::new();
        for (code, base) in &self.renames {
            pairs.retain(|(seen, _)| *seen != code.as_str());
            pairs.push((code, base));
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_doi_and_isbn() {
        let doi = EntryRequest::parse(" 10.1038/nature12373 ", None).unwrap();
        assert_eq!(doi.kind, IdKind::Doi);
        assert_eq!(doi.identifier, "10.1038/nature12373");

        let isbn = EntryRequest::parse("ISBN-13: 978-0-306-40615-7", Some("Knuth")).unwrap();
        assert_eq!(isbn.kind, IdKind::Isbn);
        assert_eq!(isbn.identifier, "9780306406157");
        assert_eq!(isbn.base.as_deref(), Some("Knuth"));
    }

    #[test]
    fn last_rename_of_a_code_wins() {
        let request = SyncRequest {
            renames: vec![
                ("Doe2020a".into(), "Doe".into()),
                ("Roe2019a".into(), "Roe".into()),
                ("Doe2020a".into(), "Smith".into()),
            ],
            ..SyncRequest::default()
        };
        assert_eq!(request.effective_renames(), [("Roe2019a", "Roe"), ("Doe2020a", "Smith")]);
    }

    #[test]
    fn rejects_other_text() {
        assert!(matches!(EntryRequest::parse("not-an-id", None), Err(CiteError::InvalidInput(_))));
    }
}
