//! Derived stores: artifacts regenerated from ledger records.
//!
//! Each store keeps enough of its pre-run state to put every file it
//! touched back byte-for-byte. The bibliography stores work on an in-memory
//! copy flushed at commit; the notes store writes through immediately and
//! buffers what it overwrote.

pub mod bibtex;
pub mod hayagriva;
pub mod notes;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::error::{CiteError, Result};
use crate::ports::FileSystem;
use crate::record::CitationRecord;

pub use self::bibtex::BibtexStore;
pub use self::hayagriva::HayagrivaStore;
pub use self::notes::NotesStore;

/// What a store needs to render one entry.
#[derive(Debug, Clone, Copy)]
pub struct StoreEntry<'r> {
    /// The record to render.
    pub record: &'r CitationRecord,
    /// Codes of ledger records this record cites, sorted.
    pub cited_codes: &'r [String],
}

impl<'r> StoreEntry<'r> {
    /// The entry's citation code.
    #[must_use]
    pub fn code(&self) -> &'r str {
        self.record.code()
    }
}

/// One artifact kept consistent with the ledger.
pub trait DerivedStore {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Reads the backing artifact(s) and remembers their pre-run bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] or [`CiteError::Parse`] if the artifact
    /// cannot be read.
    fn snapshot_and_stage(&mut self) -> Result<()>;

    /// Adds an entry for a new record.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if a write fails.
    fn create(&mut self, entry: &StoreEntry<'_>) -> Result<()>;

    /// Regenerates the entry of an existing record.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if a write fails.
    fn update(&mut self, entry: &StoreEntry<'_>) -> Result<()>;

    /// Re-keys the entry for `old` as `new`.
    ///
    /// `backlinks` are the codes whose entries link to `old`.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if a write fails.
    fn rename(&mut self, old: &str, new: &str, backlinks: &[String]) -> Result<()>;

    /// Deletes every entry whose code is not in `valid`, returning the
    /// deleted codes.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if a delete fails.
    fn prune(&mut self, valid: &HashSet<String>) -> Result<Vec<String>>;

    /// Makes the run's changes permanent.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if a write fails.
    fn commit(&mut self) -> Result<()>;

    /// Restores every touched file to its pre-run bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if a file cannot be restored.
    fn rollback(&mut self) -> Result<()>;
}

/// Pre-run state of one file.
///
/// Snapshots hold text: every artifact a store manages is UTF-8. A file that
/// is not valid UTF-8 cannot be snapshotted, so the store refuses it with
/// [`CiteError::Io`] before changing anything rather than risk an inexact
/// restore.
#[derive(Debug, Clone)]
pub(crate) struct FileSnapshot {
    path: PathBuf,
    original: Option<String>,
}

impl FileSnapshot {
    /// Reads `path`, recording that it was absent when it does not exist.
    ///
    /// Fails with [`CiteError::Io`] when the file is not valid UTF-8.
    pub(crate) fn take(fs: &dyn FileSystem, path: &Path) -> Result<Self> {
        let original = if fs.exists(path) {
            Some(fs.read_to_string(path).map_err(|e| CiteError::io(path, e))?)
        } else {
            None
        };
        Ok(Self { path: path.to_path_buf(), original })
    }

    pub(crate) fn original(&self) -> Option<&str> {
        self.original.as_deref()
    }

    /// Writes the original bytes back, or removes a file that did not exist.
    ///
    /// A file that still holds its original bytes is left alone.
    pub(crate) fn restore(&self, fs: &dyn FileSystem) -> Result<()> {
        match &self.original {
            Some(text) if fs.read_to_string(&self.path).is_ok_and(|current| current == *text) => Ok(()),
            Some(text) => fs.write(&self.path, text),
            None if fs.exists(&self.path) => fs.remove(&self.path),
            None => Ok(()),
        }
        .map_err(|e| CiteError::io(&self.path, e))
    }
}

/// `Y`, `Y-M` or `Y-M-D` from the record's date columns.
pub(crate) fn date_string(record: &CitationRecord) -> Option<String> {
    let year = record.get("year");
    if !year.is_present() {
        return None;
    }
    let mut date = year.to_string();
    let month = record.get("month");
    if month.is_present() {
        date.push('-');
        date.push_str(&month.to_string());
        let day = record.get("day");
        if day.is_present() {
            date.push('-');
            date.push_str(&day.to_string());
        }
    }
    Some(date)
}
