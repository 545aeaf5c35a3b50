//! BibTeX export.
//!
//! The file is a sequence of entries separated by blank lines. Entries are
//! held in file order and written back joined with `"\n\n"` at commit.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use super::{date_string, DerivedStore, FileSnapshot, StoreEntry};
use crate::config::Settings;
use crate::error::{CiteError, Result};
use crate::ports::FileSystem;
use crate::record::{CitationRecord, TYPE_FIELD};

const ENTRY_SEPARATOR: &str = "\n\n";

fn key_pattern() -> &'static Regex {
    static KEY: OnceLock<Regex> = OnceLock::new();
    KEY.get_or_init(|| Regex::new(r"@[a-z]+?\{(.+?),\n").expect("bibtex key pattern is valid"))
}

/// Renders one BibTeX entry.
///
/// Entry types other than `book` and `article` become `misc`. Authors are
/// joined with ` and `; the abbreviated journal title is preferred.
#[must_use]
pub fn render_entry(record: &CitationRecord, array_separator: &str, concat_separator: &str) -> String {
    let kind = match record.text(TYPE_FIELD) {
        Some(kind @ ("book" | "article")) => kind,
        _ => "misc",
    };
    let mut text = format!("@{kind}{{{},\n", record.code());
    let mut field = |key: &str, value: &str| text.push_str(&format!("  {key} = {{{value}}},\n"));

    if let Some(authors) = record.text("author") {
        field("author", &authors.replace(array_separator, " and ").replace(concat_separator, ", "));
    }
    if record.has("title") {
        field("title", &record.get("title").to_string());
    }
    if let Some(date) = date_string(record) {
        field("date", &format!("{{{date}}}"));
    }
    let journal = [record.get("abbreviated-journal"), record.get("journal")];
    if record.has("journal") {
        if let Some(name) = journal.iter().find(|v| v.is_present()) {
            field("journal", &name.to_string());
        }
    }
    for (column, key) in
        [("publisher", "publisher"), ("page", "pages"), ("volume", "volume"), ("issue", "number"), ("doi", "doi"), ("isbn", "isbn")]
    {
        let value = record.get(column);
        if value.is_present() {
            field(key, &value.to_string());
        }
    }
    text.push('}');
    text
}

/// The BibTeX file as a derived store.
pub struct BibtexStore<'a> {
    fs: &'a dyn FileSystem,
    path: PathBuf,
    array_separator: String,
    concat_separator: String,
    delete_unmatched: bool,
    entries: Vec<(String, String)>,
    snapshot: Option<FileSnapshot>,
}

impl<'a> BibtexStore<'a> {
    /// Creates a store writing to `path`.
    #[must_use]
    pub fn new(fs: &'a dyn FileSystem, path: &Path, settings: &Settings) -> Self {
        Self {
            fs,
            path: path.to_path_buf(),
            array_separator: settings.ledger.array_separator.clone(),
            concat_separator: settings.ledger.concat_separator.clone(),
            delete_unmatched: settings.bibliography.delete_unmatched,
            entries: Vec::new(),
            snapshot: None,
        }
    }

    /// Codes in file order.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.entries.iter().map(|(code, _)| code.as_str()).collect()
    }

    fn render(&self) -> String {
        self.entries.iter().map(|(_, text)| text.as_str()).collect::<Vec<_>>().join(ENTRY_SEPARATOR)
    }

    fn upsert(&mut self, entry: &StoreEntry<'_>) {
        let text = render_entry(entry.record, &self.array_separator, &self.concat_separator);
        let code = entry.code();
        match self.entries.iter_mut().find(|(c, _)| c == code) {
            Some(slot) => slot.1 = text,
            None => self.entries.push((code.to_string(), text)),
        }
    }
}

fn parse_entries(path: &Path, text: &str) -> Result<Vec<(String, String)>> {
    if text.trim().is_empty() {
        return Ok(Vec::new());
    }
    text.split(ENTRY_SEPARATOR)
        .filter(|chunk| !chunk.trim().is_empty())
        .map(|chunk| {
            let code = key_pattern().captures(chunk).map(|caps| caps[1].to_string()).ok_or_else(|| {
                CiteError::Parse {
                    path: path.to_path_buf(),
                    message: format!("entry without a citation key: {}", chunk.lines().next().unwrap_or_default()),
                }
            })?;
            Ok((code, chunk.to_string()))
        })
        .collect()
}

impl DerivedStore for BibtexStore<'_> {
    fn name(&self) -> &'static str {
        "bibtex"
    }

    fn snapshot_and_stage(&mut self) -> Result<()> {
        let snapshot = FileSnapshot::take(self.fs, &self.path)?;
        self.entries = parse_entries(&self.path, snapshot.original().unwrap_or_default())?;
        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "read bibtex file");
        self.snapshot = Some(snapshot);
        Ok(())
    }

    fn create(&mut self, entry: &StoreEntry<'_>) -> Result<()> {
        self.upsert(entry);
        Ok(())
    }

    fn update(&mut self, entry: &StoreEntry<'_>) -> Result<()> {
        self.upsert(entry);
        Ok(())
    }

    fn rename(&mut self, old: &str, new: &str, _backlinks: &[String]) -> Result<()> {
        if let Some(slot) = self.entries.iter_mut().find(|(code, _)| code == old) {
            slot.1 = slot.1.replacen(&format!("{{{old},\n"), &format!("{{{new},\n"), 1);
            slot.0 = new.to_string();
        }
        Ok(())
    }

    fn prune(&mut self, valid: &HashSet<String>) -> Result<Vec<String>> {
        if !self.delete_unmatched {
            return Ok(Vec::new());
        }
        let mut removed = Vec::new();
        self.entries.retain(|(code, _)| {
            let keep = valid.contains(code);
            if !keep {
                removed.push(code.clone());
            }
            keep
        });
        Ok(removed)
    }

    fn commit(&mut self) -> Result<()> {
        let original = self.snapshot.as_ref().and_then(FileSnapshot::original);
        if self.entries.is_empty() && original.is_none() {
            return Ok(());
        }
        let text = self.render();
        if original == Some(text.as_str()) {
            return Ok(());
        }
        self.fs.write(&self.path, &text).map_err(|e| CiteError::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), entries = self.entries.len(), "wrote bibtex file");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        match &self.snapshot {
            Some(snapshot) => snapshot.restore(self.fs),
            None => Ok(()),
        }
    }
}
