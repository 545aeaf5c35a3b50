//! Hayagriva (YAML) export.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde_yaml::{Mapping, Value};

use super::{date_string, DerivedStore, FileSnapshot, StoreEntry};
use crate::config::Settings;
use crate::error::{CiteError, Result};
use crate::ports::FileSystem;
use crate::record::{CitationRecord, FieldValue, TYPE_FIELD};

fn yaml(value: &FieldValue) -> Value {
    match value {
        FieldValue::Int(n) => Value::from(*n),
        FieldValue::Bool(b) => Value::Bool(*b),
        other => Value::String(other.to_string()),
    }
}

fn title_word(kind: &str) -> String {
    let mut out = String::with_capacity(kind.len());
    let mut start = true;
    for c in kind.chars() {
        if start {
            out.extend(c.to_uppercase());
        } else {
            out.extend(c.to_lowercase());
        }
        start = !c.is_alphabetic();
    }
    out
}

/// Builds the Hayagriva entry for one record.
///
/// Journal names are wrapped in braces so Hayagriva keeps their casing; the
/// abbreviation is added as `short` only when it differs from the full name.
#[must_use]
pub fn render_entry(record: &CitationRecord, array_separator: &str, concat_separator: &str) -> Mapping {
    let mut entry = Mapping::new();
    let mut put = |key: &str, value: Value| {
        entry.insert(Value::from(key), value);
    };

    put("type", Value::String(title_word(record.text(TYPE_FIELD).unwrap_or("misc"))));
    if record.has("title") {
        put("title", yaml(record.get("title")));
    }
    if let Some(authors) = record.text("author") {
        let names = authors
            .split(array_separator)
            .map(|name| Value::String(name.trim().replace(concat_separator, ", ")))
            .collect();
        put("author", Value::Sequence(names));
    }
    if let Some(date) = date_string(record) {
        put("date", Value::String(date));
    }
    if record.has("page") {
        put("page-range", yaml(record.get("page")));
    }
    if record.has("publisher") {
        put("publisher", yaml(record.get("publisher")));
    }
    if let Some(id) = ["doi", "isbn"].into_iter().find(|f| record.has(f)) {
        let mut serial = Mapping::new();
        serial.insert(Value::from(id), yaml(record.get(id)));
        put("serial-number", Value::Mapping(serial));
    }
    if ["journal", "volume", "issue"].iter().any(|f| record.has(f)) {
        let mut parent = Mapping::new();
        if let Some(journal) = record.text("journal") {
            let mut title = Mapping::new();
            title.insert(Value::from("value"), Value::String(format!("{{{journal}}}")));
            if let Some(short) = record.text("abbreviated-journal").filter(|s| *s != journal) {
                title.insert(Value::from("short"), Value::String(format!("{{{short}}}")));
            }
            parent.insert(Value::from("title"), Value::Mapping(title));
        }
        for field in ["volume", "issue"] {
            if record.has(field) {
                parent.insert(Value::from(field), yaml(record.get(field)));
            }
        }
        put("parent", Value::Mapping(parent));
    }
    entry
}

/// The Hayagriva file as a derived store.
pub struct HayagrivaStore<'a> {
    fs: &'a dyn FileSystem,
    path: PathBuf,
    array_separator: String,
    concat_separator: String,
    delete_unmatched: bool,
    entries: Mapping,
    snapshot: Option<FileSnapshot>,
}

impl<'a> HayagrivaStore<'a> {
    /// Creates a store writing to `path`.
    #[must_use]
    pub fn new(fs: &'a dyn FileSystem, path: &Path, settings: &Settings) -> Self {
        Self {
            fs,
            path: path.to_path_buf(),
            array_separator: settings.ledger.array_separator.clone(),
            concat_separator: settings.ledger.concat_separator.clone(),
            delete_unmatched: settings.bibliography.delete_unmatched,
            entries: Mapping::new(),
            snapshot: None,
        }
    }

    /// Codes in file order.
    #[must_use]
    pub fn codes(&self) -> Vec<&str> {
        self.entries.keys().filter_map(Value::as_str).collect()
    }

    fn upsert(&mut self, entry: &StoreEntry<'_>) {
        let rendered = render_entry(entry.record, &self.array_separator, &self.concat_separator);
        self.entries.insert(Value::from(entry.code()), Value::Mapping(rendered));
    }

    fn render(&self) -> Result<String> {
        if self.entries.is_empty() {
            return Ok(String::new());
        }
        serde_yaml::to_string(&self.entries)
            .map_err(|e| CiteError::Parse { path: self.path.clone(), message: e.to_string() })
    }
}

impl DerivedStore for HayagrivaStore<'_> {
    fn name(&self) -> &'static str {
        "hayagriva"
    }

    fn snapshot_and_stage(&mut self) -> Result<()> {
        let snapshot = FileSnapshot::take(self.fs, &self.path)?;
        let text = snapshot.original().unwrap_or_default();
        self.entries = if text.trim().is_empty() {
            Mapping::new()
        } else {
            serde_yaml::from_str(text)
                .map_err(|e| CiteError::Parse { path: self.path.clone(), message: e.to_string() })?
        };
        tracing::debug!(path = %self.path.display(), entries = self.entries.len(), "read hayagriva file");
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
        // Rebuilt rather than removed and reinserted, so the entry keeps its position.
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .map(|(key, value)| if key.as_str() == Some(old) { (Value::from(new), value) } else { (key, value) })
            .collect();
        Ok(())
    }

    fn prune(&mut self, valid: &HashSet<String>) -> Result<Vec<String>> {
        if !self.delete_unmatched {
            return Ok(Vec::new());
        }
        let mut removed = Vec::new();
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .filter(|(key, _)| match key.as_str() {
                Some(code) if !valid.contains(code) => {
                    removed.push(code.to_string());
                    false
                }
                _ => true,
            })
            .collect();
        Ok(removed)
    }

    fn commit(&mut self) -> Result<()> {
        let original = self.snapshot.as_ref().and_then(FileSnapshot::original);
        if self.entries.is_empty() && original.is_none() {
            return Ok(());
        }
        let text = self.render()?;
        if original == Some(text.as_str()) {
            return Ok(());
        }
        self.fs.write(&self.path, &text).map_err(|e| CiteError::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), entries = self.entries.len(), "wrote hayagriva file");
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        match &self.snapshot {
            Some(snapshot) => snapshot.restore(self.fs),
            None => Ok(()),
        }
    }
}
