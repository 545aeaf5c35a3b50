//! Markdown notes, one `<code>.md` file per citation.
//!
//! Each note starts with a YAML frontmatter block generated from the record:
//!
//! ```text
//! ---
//! title: "..."
//! author:
//!   - Family, Given
//! pdf-link: "[[<code>.pdf]]"
//! citations:
//!   - "[[<cited code>]]"
//! ---
//! free text kept across updates
//! ```
//!
//! Notes are written immediately. The first time a run touches a file its
//! previous contents (or its absence) are buffered so rollback can restore it.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use serde_yaml::Value;

use super::{DerivedStore, FileSnapshot, StoreEntry};
use crate::config::Settings;
use crate::error::{CiteError, Result};
use crate::ports::FileSystem;
use crate::record::{DOI_FIELD, ISBN_FIELD};

const FENCE: &str = "---\n";
const INDENT: &str = "  ";

/// `"[[target]]"` wiki link, quoted for YAML.
fn wiki_link(target: &str) -> String {
    format!("\"[[{target}]]\"")
}

fn yaml_list<I, S>(items: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    items.into_iter().map(|item| format!("\n{INDENT}- {}", item.as_ref())).collect()
}

fn user_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Sequence(items) => yaml_list(items.iter().map(user_value)),
        other => serde_yaml::to_string(other).map(|s| s.trim_end().to_string()).unwrap_or_default(),
    }
}

/// Renders the frontmatter lines (without the `---` fences) for `entry`.
#[must_use]
pub fn render_frontmatter(entry: &StoreEntry<'_>, settings: &Settings) -> String {
    let notes = &settings.notes;
    let ledger = &settings.ledger;
    let record = entry.record;
    let mut text = String::new();
    let mut line = |key: &str, value: &str| {
        text.push_str(key);
        text.push(':');
        if !value.is_empty() && !value.starts_with('\n') {
            text.push(' ');
        }
        text.push_str(value);
        text.push('\n');
    };

    for prop in &notes.included_properties {
        let value = record.get(prop);
        if !value.is_present() {
            continue;
        }
        match prop.as_str() {
            "title" => line(prop, &format!("\"{}\"", value.to_string().replace('"', "\\\""))),
            "author" => {
                let names = value
                    .to_string()
                    .split(ledger.array_separator.as_str())
                    .map(|name| name.trim().replace(ledger.concat_separator.as_str(), ", "))
                    .collect::<Vec<_>>();
                line(prop, &yaml_list(names));
            }
            _ => line(prop, &value.to_string()),
        }
    }
    if (notes.pdf_link_doi && record.has(DOI_FIELD)) || (notes.pdf_link_isbn && record.has(ISBN_FIELD)) {
        line("pdf-link", &wiki_link(&format!("{}.pdf", record.code())));
    }
    for (key, value) in &notes.user_properties {
        if let Some(key) = key.as_str() {
            line(key, &user_value(value));
        }
    }
    if notes.link_cited && !entry.cited_codes.is_empty() {
        line("citations", &yaml_list(entry.cited_codes.iter().map(|code| wiki_link(code))));
    }
    text
}

/// Splits a note into its frontmatter and the body after it.
///
/// A note without a frontmatter block is all body.
fn split_note(text: &str) -> (Option<&str>, &str) {
    let Some(rest) = text.strip_prefix(FENCE) else {
        return (None, text);
    };
    if let Some(body) = rest.strip_prefix(FENCE) {
        return (Some(""), body);
    }
    match rest.find("\n---\n") {
        Some(end) => (Some(&rest[..=end]), &rest[end + 1 + FENCE.len()..]),
        None => (None, text),
    }
}

/// Points every wiki link at `old` (plain, aliased, heading and PDF links) at `new`.
#[must_use]
pub fn rewrite_links(text: &str, old: &str, new: &str) -> String {
    let mut out = text.to_string();
    for (from, to) in [
        (format!("[[{old}]]"), format!("[[{new}]]")),
        (format!("[[{old}|"), format!("[[{new}|")),
        (format!("[[{old}#"), format!("[[{new}#")),
        (format!("[[{old}.pdf]]"), format!("[[{new}.pdf]]")),
    ] {
        out = out.replace(&from, &to);
    }
    out
}

/// The notes directory as a derived store.
pub struct NotesStore<'a> {
    fs: &'a dyn FileSystem,
    settings: &'a Settings,
    directory: PathBuf,
    touched: HashMap<PathBuf, FileSnapshot>,
}

impl<'a> NotesStore<'a> {
    /// Creates a store over `settings.notes.directory`.
    #[must_use]
    pub fn new(fs: &'a dyn FileSystem, settings: &'a Settings) -> Self {
        Self { fs, settings, directory: settings.notes.directory.clone(), touched: HashMap::new() }
    }

    /// Path of the note for `code`.
    #[must_use]
    pub fn path(&self, code: &str) -> PathBuf {
        self.directory.join(format!("{code}.md"))
    }

    fn touch(&mut self, path: &Path) -> Result<()> {
        if !self.touched.contains_key(path) {
            let snapshot = FileSnapshot::take(self.fs, path)?;
            self.touched.insert(path.to_path_buf(), snapshot);
        }
        Ok(())
    }

    fn read(&self, path: &Path) -> Result<String> {
        self.fs.read_to_string(path).map_err(|e| CiteError::io(path, e))
    }

    fn write(&mut self, path: &Path, text: &str) -> Result<()> {
        self.touch(path)?;
        self.fs.write(path, text).map_err(|e| CiteError::io(path, e))
    }

    fn remove(&mut self, path: &Path) -> Result<()> {
        self.touch(path)?;
        self.fs.remove(path).map_err(|e| CiteError::io(path, e))
    }

    fn note_text(&self, entry: &StoreEntry<'_>, body: &str) -> String {
        format!("{FENCE}{}{FENCE}{body}", render_frontmatter(entry, self.settings))
    }
}

impl DerivedStore for NotesStore<'_> {
    fn name(&self) -> &'static str {
        "notes"
    }

    fn snapshot_and_stage(&mut self) -> Result<()> {
        self.touched.clear();
        if self.fs.exists(&self.directory) {
            let names = self.fs.list_dir(&self.directory).map_err(|e| CiteError::io(&self.directory, e))?;
            let count = names.iter().filter(|n| n.ends_with(".md")).count();
            tracing::debug!(directory = %self.directory.display(), notes = count, "found notes");
        }
        Ok(())
    }

    fn create(&mut self, entry: &StoreEntry<'_>) -> Result<()> {
        let path = self.path(entry.code());
        if self.fs.exists(&path) {
            return self.update(entry);
        }
        let text = self.note_text(entry, "");
        self.write(&path, &text)?;
        tracing::debug!(path = %path.display(), "created note");
        Ok(())
    }

    fn update(&mut self, entry: &StoreEntry<'_>) -> Result<()> {
        let path = self.path(entry.code());
        if !self.fs.exists(&path) {
            let text = self.note_text(entry, "");
            return self.write(&path, &text);
        }
        let current = self.read(&path)?;
        let (_, body) = split_note(&current);
        let text = self.note_text(entry, body);
        if text != current {
            self.write(&path, &text)?;
        }
        Ok(())
    }

    fn rename(&mut self, old: &str, new: &str, backlinks: &[String]) -> Result<()> {
        let old_path = self.path(old);
        let new_path = self.path(new);
        if self.fs.exists(&old_path) {
            let text = rewrite_links(&self.read(&old_path)?, old, new);
            self.write(&new_path, &text)?;
            self.remove(&old_path)?;
            tracing::debug!(from = %old_path.display(), to = %new_path.display(), "moved note");
        }
        for code in backlinks {
            let path = self.path(code);
            if !self.fs.exists(&path) {
                continue;
            }
            let current = self.read(&path)?;
            let text = rewrite_links(&current, old, new);
            if text != current {
                self.write(&path, &text)?;
            }
        }
        Ok(())
    }

    fn prune(&mut self, valid: &HashSet<String>) -> Result<Vec<String>> {
        if !self.settings.notes.delete_unmatched || !self.fs.exists(&self.directory) {
            return Ok(Vec::new());
        }
        let names = self.fs.list_dir(&self.directory).map_err(|e| CiteError::io(&self.directory, e))?;
        let mut removed = Vec::new();
        for code in names.iter().filter_map(|name| name.strip_suffix(".md")) {
            if !valid.contains(code) {
                let path = self.path(code);
                self.remove(&path)?;
                removed.push(code.to_string());
            }
        }
        Ok(removed)
    }

    fn commit(&mut self) -> Result<()> {
        tracing::debug!(touched = self.touched.len(), "committed notes");
        self.touched.clear();
        Ok(())
    }

    fn rollback(&mut self) -> Result<()> {
        let mut first_error = None;
        for snapshot in self.touched.values() {
            if let Err(err) = snapshot.restore(self.fs) {
                tracing::error!(error = %err, "failed to restore note");
                first_error.get_or_insert(err);
            }
        }
        self.touched.clear();
        first_error.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CitationRecord;
    use crate::testing::MemFs;

    fn settings() -> Settings {
        let mut settings = Settings::default();
        settings.notes.directory = PathBuf::from("/notes");
        settings
    }

    fn record(code: &str) -> CitationRecord {
        let mut r = CitationRecord::default();
        r.set("citation-code", code);
        r.set("title", "Say \"Worms\"");
        r.set("author", "Doe, Jane; Roe, John");
        r.set("year", "2020");
        r.set("doi", "10.1/worms");
        r
    }

    #[test]
    fn frontmatter_lists_properties_links_and_citations() {
        let mut settings = settings();
        settings.notes.user_properties.insert("read".into(), Value::Bool(false));
        settings.notes.user_properties.insert("tags".into(), Value::Sequence(vec!["paper".into()]));
        let r = record("Doe2020a");
        let cited = vec!["Poe2018a".to_string()];
        let text = render_frontmatter(&StoreEntry { record: &r, cited_codes: &cited }, &settings);
        assert_eq!(
            text,
            "title: \"Say \\\"Worms\\\"\"\n\
             author:\n  - Doe, Jane\n  - Roe, John\n\
             year: 2020\n\
             doi: 10.1/worms\n\
             pdf-link: \"[[Doe2020a.pdf]]\"\n\
             read: false\n\
             tags:\n  - paper\n\
             citations:\n  - \"[[Poe2018a]]\"\n"
        );
    }

    #[test]
    fn update_replaces_frontmatter_and_keeps_body() {
        let fs = MemFs::with_files(&[("/notes/Doe2020a.md", "---\ntitle: old\n---\nMy notes\n---\nstill mine\n")]);
        let settings = settings();
        let mut store = NotesStore::new(&fs, &settings);
        store.snapshot_and_stage().unwrap();
        let r = record("Doe2020a");
        store.update(&StoreEntry { record: &r, cited_codes: &[] }).unwrap();

        let text = fs.read(Path::new("/notes/Doe2020a.md")).unwrap();
        assert!(text.starts_with("---\ntitle: \"Say"));
        assert!(text.ends_with("---\nMy notes\n---\nstill mine\n"));
        assert!(!text.contains("title: old"));
    }

    #[test]
    fn create_over_existing_note_keeps_body() {
        let fs = MemFs::with_files(&[("/notes/Doe2020a.md", "hand written")]);
        let settings = settings();
        let mut store = NotesStore::new(&fs, &settings);
        let r = record("Doe2020a");
        store.create(&StoreEntry { record: &r, cited_codes: &[] }).unwrap();
        let text = fs.read(Path::new("/notes/Doe2020a.md")).unwrap();
        assert!(text.starts_with("---\n"));
        assert!(text.ends_with("---\nhand written"));
    }

    #[test]
    fn rename_moves_note_and_rewrites_backlinks() {
        let fs = MemFs::with_files(&[
            ("/notes/Doe2020a.md", "---\npdf-link: \"[[Doe2020a.pdf]]\"\n---\n"),
            ("/notes/Roe2021a.md", "---\ncitations:\n  - \"[[Doe2020a]]\"\n---\nsee [[Doe2020a|Doe]] and [[Doe2020a#Intro]]\n"),
        ]);
        let settings = settings();
        let mut store = NotesStore::new(&fs, &settings);
        store.snapshot_and_stage().unwrap();
        store.rename("Doe2020a", "Smith2020a", &["Roe2021a".to_string()]).unwrap();

        assert!(!fs.exists(Path::new("/notes/Doe2020a.md")));
        assert_eq!(
            fs.read(Path::new("/notes/Smith2020a.md")).as_deref(),
            Some("---\npdf-link: \"[[Smith2020a.pdf]]\"\n---\n")
        );
        let citing = fs.read(Path::new("/notes/Roe2021a.md")).unwrap();
        assert!(!citing.contains("Doe2020a"));
        assert!(citing.contains("[[Smith2020a|Doe]]"));
        assert!(citing.contains("[[Smith2020a#Intro]]"));
    }

    #[test]
    fn prune_deletes_unmatched_and_rollback_restores_everything() {
        let files = [
            ("/notes/Keep2000a.md", "---\n---\nkeep"),
            ("/notes/Gone1999a.md", "---\n---\ngone"),
            ("/notes/readme.txt", "not a note"),
        ];
        let fs = MemFs::with_files(&files);
        let before = fs.dump();
        let settings = settings();
        let mut store = NotesStore::new(&fs, &settings);
        store.snapshot_and_stage().unwrap();

        let r = record("New2024a");
        store.create(&StoreEntry { record: &r, cited_codes: &[] }).unwrap();
        let valid: HashSet<String> = ["Keep2000a", "New2024a"].map(String::from).into();
        assert_eq!(store.prune(&valid).unwrap(), ["Gone1999a"]);
        assert!(!fs.exists(Path::new("/notes/Gone1999a.md")));

        store.rollback().unwrap();
        assert_eq!(fs.dump(), before);
    }

    #[test]
    fn prune_respects_delete_unmatched() {
        let fs = MemFs::with_files(&[("/notes/Gone1999a.md", "x")]);
        let mut settings = settings();
        settings.notes.delete_unmatched = false;
        let mut store = NotesStore::new(&fs, &settings);
        assert!(store.prune(&HashSet::new()).unwrap().is_empty());
        assert!(fs.exists(Path::new("/notes/Gone1999a.md")));
    }

    #[test]
    fn split_note_handles_missing_and_empty_frontmatter() {
        assert_eq!(split_note("plain"), (None, "plain"));
        assert_eq!(split_note("---\n---\nbody"), (Some(""), "body"));
        assert_eq!(split_note("---\na: 1\n---\nbody"), (Some("a: 1\n"), "body"));
        assert_eq!(split_note("---\nunterminated"), (None, "---\nunterminated"));
    }
}
