//! The record ledger: canonical table of citations keyed by code.
//!
//! The ledger owns every [`CitationRecord`] and the per-base suffix counters.
//! Counters only move forward: renaming or pruning a record never frees its
//! suffix for reuse.

pub mod csv;

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};

use crate::code::{decode_suffix, encode_suffix, is_valid_code, normalize_base, split_code, suggest_code};
use crate::config::Settings;
use crate::error::{CiteError, Result};
use crate::ports::FileSystem;
use crate::record::{CitationRecord, Fields, IdKind, CITED_DOIS_FIELD, CODE_FIELD, DOI_FIELD};

pub use self::csv::LedgerFile;

/// Reads the ledger file named in `settings` and loads its rows.
///
/// # Errors
///
/// Returns the file errors of [`LedgerFile::open`] and the row errors of
/// [`RecordLedger::load`].
pub fn open<'a>(
    fs: &'a dyn FileSystem,
    settings: &Settings,
    now: DateTime<Utc>,
) -> Result<(LedgerFile<'a>, RecordLedger)> {
    let ledger_settings = &settings.ledger;
    let (file, rows) =
        LedgerFile::open(fs, &ledger_settings.path, &settings.info_headers, &ledger_settings.missing, now)?;
    let mut ledger = RecordLedger::new(settings.info_headers.clone(), ledger_settings.array_separator.clone());
    ledger.load_lines(rows)?;
    tracing::info!(path = %ledger_settings.path.display(), records = ledger.len(), "loaded ledger");
    Ok((file, ledger))
}

/// Canonical table of citation records.
#[derive(Debug, Clone, Default)]
pub struct RecordLedger {
    /// Records in row order.
    records: Vec<CitationRecord>,
    /// Code -> index into `records`.
    index: HashMap<String, usize>,
    /// Code -> file line, for records that came from a file.
    lines: HashMap<String, usize>,
    /// Base code -> highest suffix issued.
    counters: BTreeMap<String, u64>,
    /// Columns whose absence marks a record as needing an update.
    info_headers: Vec<String>,
    array_separator: String,
}

impl RecordLedger {
    /// Creates an empty ledger.
    #[must_use]
    pub fn new(info_headers: Vec<String>, array_separator: impl Into<String>) -> Self {
        Self { info_headers, array_separator: array_separator.into(), ..Self::default() }
    }

    /// Ingests pre-existing rows in file order, numbered as they would be in
    /// a ledger file with a header line and no blank lines.
    ///
    /// # Errors
    ///
    /// See [`RecordLedger::load_lines`].
    pub fn load(&mut self, rows: Vec<CitationRecord>) -> Result<()> {
        self.load_lines(rows.into_iter().enumerate().map(|(i, record)| (i + 2, record)))
    }

    /// Ingests `(file line, record)` pairs in file order.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::InvalidCitationCode`] for a row whose code is
    /// missing or does not round-trip, and [`CiteError::DuplicateCitationCode`]
    /// when a code repeats. Both name the file lines involved.
    pub fn load_lines(&mut self, rows: impl IntoIterator<Item = (usize, CitationRecord)>) -> Result<()> {
        for (line, record) in rows {
            let code = record.code().to_string();
            let (base, suffix) = split_code(&code);
            if code.is_empty() {
                return Err(CiteError::InvalidCitationCode {
                    code,
                    line,
                    reason: "the row has no citation code; enter one or remove the row".to_string(),
                });
            }
            let Some(suffix) = suffix.filter(|_| is_valid_code(&code)) else {
                let reason = match suggest_code(&code) {
                    Some(fixed) => format!("it would be valid as \"{fixed}\""),
                    None => "it is missing a lowercase suffix (a, b, ..., z, aa, ...)".to_string(),
                };
                return Err(CiteError::InvalidCitationCode { code, line, reason });
            };
            if self.index.contains_key(&code) {
                let first = self.lines.get(&code).copied().unwrap_or_default();
                return Err(CiteError::DuplicateCitationCode { code, first, second: line });
            }
            let n = decode_suffix(suffix)?;
            let counter = self.counters.entry(base.to_string()).or_insert(0);
            *counter = (*counter).max(n);
            self.lines.insert(code.clone(), line);
            self.index.insert(code, self.records.len());
            self.records.push(record);
        }
        Ok(())
    }

    /// Stores `record` under a fresh code for `base` and returns the code.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::InvalidInput`] if the counter for `base` overflows.
    pub fn allocate(&mut self, base: &str, mut record: CitationRecord) -> Result<String> {
        let code = self.next_code(base)?;
        record.set(CODE_FIELD, code.as_str());
        self.index.insert(code.clone(), self.records.len());
        self.records.push(record);
        tracing::debug!(%code, "allocated citation code");
        Ok(code)
    }

    fn next_code(&mut self, base: &str) -> Result<String> {
        let base = normalize_base(base);
        let counter = self.counters.entry(base.clone()).or_insert(0);
        let next = counter
            .checked_add(1)
            .ok_or_else(|| CiteError::InvalidInput(format!("suffix counter for \"{base}\" overflowed")))?;
        *counter = next;
        Ok(format!("{base}{}", encode_suffix(next)?))
    }

    /// Returns the record stored under `code`.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::UnknownCitationCode`] if there is none.
    pub fn get(&self, code: &str) -> Result<&CitationRecord> {
        self.position(code).map(|i| &self.records[i])
    }

    fn position(&self, code: &str) -> Result<usize> {
        self.index.get(code).copied().ok_or_else(|| CiteError::UnknownCitationCode(code.to_string()))
    }

    /// Returns `true` when `code` is in the ledger.
    #[must_use]
    pub fn contains(&self, code: &str) -> bool {
        self.index.contains_key(code)
    }

    /// Fills every missing field of `code` from `new_fields`.
    ///
    /// Fields that already hold a value are left alone. Returns the names of
    /// the fields that were filled.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::UnknownCitationCode`] if `code` is not stored.
    pub fn merge_missing(&mut self, code: &str, new_fields: &Fields) -> Result<Vec<String>> {
        let i = self.position(code)?;
        let record = &mut self.records[i];
        let mut filled = Vec::new();
        for (name, value) in new_fields {
            if name == CODE_FIELD || !value.is_present() || record.has(name) {
                continue;
            }
            record.set(name.as_str(), value.clone());
            filled.push(name.clone());
        }
        Ok(filled)
    }

    /// Moves `code` to a fresh code under `new_base` and returns it.
    ///
    /// The record keeps its row position; the old code is retired.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::UnknownCitationCode`] if `code` is not stored.
    pub fn rename(&mut self, code: &str, new_base: &str) -> Result<String> {
        let i = self.position(code)?;
        let new_code = self.next_code(new_base)?;
        self.records[i].set(CODE_FIELD, new_code.as_str());
        self.index.remove(code);
        self.index.insert(new_code.clone(), i);
        tracing::debug!(old = code, new = %new_code, "renamed citation code");
        Ok(new_code)
    }

    /// Codes of the records whose `cited-dois` list contains the DOI of `code`.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::UnknownCitationCode`] if `code` is not stored.
    pub fn codes_citing(&self, code: &str) -> Result<Vec<String>> {
        let Some(doi) = self.get(code)?.text(DOI_FIELD) else {
            return Ok(Vec::new());
        };
        Ok(self
            .records
            .iter()
            .filter(|r| r.list(CITED_DOIS_FIELD, &self.array_separator).contains(&doi))
            .map(|r| r.code().to_string())
            .collect())
    }

    /// Sorted codes of the records whose DOI appears in the `cited-dois` of `code`.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::UnknownCitationCode`] if `code` is not stored.
    pub fn codes_cited_by(&self, code: &str) -> Result<Vec<String>> {
        let cited = self.get(code)?.list(CITED_DOIS_FIELD, &self.array_separator);
        if cited.is_empty() {
            return Ok(Vec::new());
        }
        let mut codes: Vec<String> = self
            .records
            .iter()
            .filter(|r| r.text(DOI_FIELD).is_some_and(|doi| cited.contains(&doi)))
            .map(|r| r.code().to_string())
            .collect();
        codes.sort();
        Ok(codes)
    }

    /// All codes in row order.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.records.iter().map(CitationRecord::code).collect()
    }

    /// All records in row order.
    pub fn records(&self) -> impl Iterator<Item = &CitationRecord> {
        self.records.iter()
    }

    /// Returns `true` when any info header of `record` is missing.
    #[must_use]
    pub fn needs_update(&self, record: &CitationRecord) -> bool {
        self.info_headers.iter().any(|header| !record.has(header))
    }

    /// Codes of every record with a missing info header, in row order.
    #[must_use]
    pub fn codes_needing_update(&self) -> Vec<String> {
        self.records
            .iter()
            .filter(|r| self.needs_update(r))
            .map(|r| r.code().to_string())
            .collect()
    }

    /// Finds the record holding `identifier` in its `kind` column.
    #[must_use]
    pub fn find_by_identifier(&self, kind: IdKind, identifier: &str) -> Option<&str> {
        self.records
            .iter()
            .find(|r| r.text(kind.field()) == Some(identifier))
            .map(CitationRecord::code)
    }

    /// Highest suffix issued for `base`, zero if none.
    #[must_use]
    pub fn counter(&self, base: &str) -> u64 {
        self.counters.get(base).copied().unwrap_or(0)
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` when the ledger holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::FieldValue;

    fn ledger() -> RecordLedger {
        RecordLedger::new(vec!["doi".into(), "title".into(), "cited-dois".into()], "; ")
    }

    fn row(code: &str, doi: &str, cited: &str) -> CitationRecord {
        let mut record = CitationRecord::default();
        record.set(CODE_FIELD, code);
        record.set("doi", doi);
        record.set("title", format!("Title of {code}"));
        if cited.is_empty() {
            record.set("cited-dois", FieldValue::Missing);
        } else {
            record.set("cited-dois", cited);
        }
        record
    }

    #[test]
    fn load_folds_counters_to_max() {
        let mut ledger = ledger();
        ledger
            .load(vec![row("Doe2020c", "10.1/c", ""), row("Doe2020a", "10.1/a", ""), row("Roe1999a", "10.1/r", "")])
            .unwrap();
        assert_eq!(ledger.counter("Doe2020"), 3);
        assert_eq!(ledger.counter("Roe1999"), 1);
        assert_eq!(ledger.counter("Nobody"), 0);
    }

    #[test]
    fn load_rejects_invalid_code_with_hint() {
        let mut ledger = ledger();
        let err = ledger.load(vec![row("Doe2020a", "10.1/a", ""), row("Doe 2020b", "10.1/b", "")]).unwrap_err();
        match err {
            CiteError::InvalidCitationCode { code, line, reason } => {
                assert_eq!(code, "Doe 2020b");
                assert_eq!(line, 3);
                assert!(reason.contains("Doe_2020b"));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn load_rejects_code_without_suffix_or_empty() {
        assert!(matches!(
            ledger().load(vec![row("Doe2020", "10.1/a", "")]),
            Err(CiteError::InvalidCitationCode { .. })
        ));
        assert!(matches!(
            ledger().load(vec![CitationRecord::default()]),
            Err(CiteError::InvalidCitationCode { line: 2, .. })
        ));
    }

    #[test]
    fn load_rejects_duplicates_naming_both_lines() {
        let err = ledger()
            .load(vec![row("Doe2020a", "10.1/a", ""), row("Roe1999a", "10.1/r", ""), row("Doe2020a", "10.1/b", "")])
            .unwrap_err();
        assert!(matches!(err, CiteError::DuplicateCitationCode { first: 2, second: 4, .. }));
    }

    #[test]
    fn load_lines_reports_file_lines() {
        let err = ledger()
            .load_lines(vec![(2, row("Doe2020a", "10.1/a", "")), (5, row("Doe2020a", "10.1/b", ""))])
            .unwrap_err();
        assert!(matches!(err, CiteError::DuplicateCitationCode { first: 2, second: 5, .. }));
    }

    #[test]
    fn allocate_assigns_successive_suffixes() {
        let mut ledger = ledger();
        ledger.load(vec![row("Doe2020a", "10.1/a", "")]).unwrap();
        assert_eq!(ledger.allocate("Doe2020", CitationRecord::default()).unwrap(), "Doe2020b");
        assert_eq!(ledger.allocate("Doe2020", CitationRecord::default()).unwrap(), "Doe2020c");
        assert_eq!(ledger.allocate("new base", CitationRecord::default()).unwrap(), "new_base_a");
        assert_eq!(ledger.get("Doe2020c").unwrap().code(), "Doe2020c");
    }

    #[test]
    fn rename_never_reuses_suffixes() {
        let mut ledger = ledger();
        ledger.load(vec![row("Doe2020a", "10.1/a", ""), row("Doe2020b", "10.1/b", "")]).unwrap();
        let renamed = ledger.rename("Doe2020b", "Smith2021").unwrap();
        assert_eq!(renamed, "Smith2021a");
        assert!(!ledger.contains("Doe2020b"));
        assert_eq!(ledger.get("Smith2021a").unwrap().text("doi"), Some("10.1/b"));
        assert_eq!(ledger.codes(), vec!["Doe2020a", "Smith2021a"]);
        assert_eq!(ledger.allocate("Doe2020", CitationRecord::default()).unwrap(), "Doe2020c");
    }

    #[test]
    fn unknown_codes_are_reported() {
        let mut ledger = ledger();
        assert!(matches!(ledger.get("Nope2020a"), Err(CiteError::UnknownCitationCode(_))));
        assert!(matches!(ledger.rename("Nope2020a", "X"), Err(CiteError::UnknownCitationCode(_))));
    }

    #[test]
    fn merge_fills_only_missing_fields() {
        let mut ledger = ledger();
        let mut record = row("Doe2020a", "10.1/a", "");
        record.set("title", "Hand edited");
        ledger.load(vec![record]).unwrap();

        let mut fresh = Fields::new();
        fresh.insert("title".into(), "From provider".into());
        fresh.insert("cited-dois".into(), "10.1/z".into());
        fresh.insert("year".into(), FieldValue::Missing);
        let filled = ledger.merge_missing("Doe2020a", &fresh).unwrap();

        assert_eq!(filled, vec!["cited-dois".to_string()]);
        let merged = ledger.get("Doe2020a").unwrap();
        assert_eq!(merged.text("title"), Some("Hand edited"));
        assert_eq!(merged.text("cited-dois"), Some("10.1/z"));
        assert!(!merged.has("year"));
    }

    #[test]
    fn citation_graph_queries() {
        let mut ledger = ledger();
        ledger
            .load(vec![
                row("Doe2020a", "10.1/a", "10.1/c; 10.1/b"),
                row("Roe2019a", "10.1/b", "10.1/c"),
                row("Poe2018a", "10.1/c", ""),
            ])
            .unwrap();
        assert_eq!(ledger.codes_citing("Poe2018a").unwrap(), vec!["Doe2020a", "Roe2019a"]);
        assert_eq!(ledger.codes_cited_by("Doe2020a").unwrap(), vec!["Poe2018a", "Roe2019a"]);
        assert!(ledger.codes_cited_by("Poe2018a").unwrap().is_empty());
        assert!(ledger.codes_citing("Doe2020a").unwrap().is_empty());
    }

    #[test]
    fn needs_update_tracks_missing_info_headers() {
        let mut ledger = ledger();
        ledger.load(vec![row("Doe2020a", "10.1/a", ""), row("Roe2019a", "10.1/b", "10.1/a")]).unwrap();
        assert_eq!(ledger.codes_needing_update(), vec!["Doe2020a"]);
        assert_eq!(ledger.find_by_identifier(IdKind::Doi, "10.1/b"), Some("Roe2019a"));
        assert_eq!(ledger.find_by_identifier(IdKind::Isbn, "10.1/b"), None);
    }
}
