//! CSV codec for the ledger file.
//!
//! Columns are `citation-code`, `add-date`, the configured info headers,
//! then any extra columns the user added, in the order they appear in the
//! file. The raw text read at open time is kept as the rollback snapshot.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::error::{CiteError, Result};
use crate::ports::FileSystem;
use crate::record::{CitationRecord, FieldValue, IdKind, ADD_DATE_FIELD, PROGRAM_HEADERS, TYPE_FIELD};

use super::RecordLedger;

/// The ledger's backing file.
pub struct LedgerFile<'a> {
    fs: &'a dyn FileSystem,
    path: PathBuf,
    missing: String,
    headers: Vec<String>,
    snapshot: Option<String>,
}

impl<'a> LedgerFile<'a> {
    /// Reads the ledger at `path` and returns the file handle plus its rows,
    /// each paired with the one-based file line it starts on.
    ///
    /// A missing file yields no rows. Blank rows are skipped. Rows without an
    /// `add-date` get `now`, and rows without a `type` get `book` when they
    /// only carry an ISBN and `article` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if the file cannot be read and
    /// [`CiteError::Parse`] if it is not valid CSV.
    pub fn open(
        fs: &'a dyn FileSystem,
        path: &Path,
        info_headers: &[String],
        missing: &str,
        now: DateTime<Utc>,
    ) -> Result<(Self, Vec<(usize, CitationRecord)>)> {
        let mut headers: Vec<String> = PROGRAM_HEADERS
            .iter()
            .map(|h| (*h).to_string())
            .chain(info_headers.iter().cloned())
            .collect();
        let mut file = Self {
            fs,
            path: path.to_path_buf(),
            missing: missing.to_string(),
            headers: Vec::new(),
            snapshot: None,
        };
        if !fs.exists(path) {
            tracing::debug!(path = %path.display(), "no ledger file yet");
            file.headers = headers;
            return Ok((file, Vec::new()));
        }

        let text = fs.read_to_string(path).map_err(|e| CiteError::io(path, e))?;
        let parse_err = |e: ::csv::Error| CiteError::Parse { path: path.to_path_buf(), message: e.to_string() };
        let mut reader = ::csv::ReaderBuilder::new().flexible(true).from_reader(text.as_bytes());
        let file_headers: Vec<String> = reader.headers().map_err(parse_err)?.iter().map(String::from).collect();
        for header in &file_headers {
            if !headers.contains(header) {
                headers.push(header.clone());
            }
        }

        let default_date = now.format("%Y-%m-%dT%H:%M:%S").to_string();
        let mut rows = Vec::new();
        for result in reader.records() {
            let cells = result.map_err(parse_err)?;
            if cells.iter().all(str::is_empty) {
                continue;
            }
            let line = cells.position().map_or(0, |p| usize::try_from(p.line()).unwrap_or(usize::MAX));
            let mut record = CitationRecord::default();
            for header in &headers {
                let cell = file_headers.iter().position(|h| h == header).and_then(|i| cells.get(i));
                record.set(header.as_str(), cell.map_or(FieldValue::Missing, |c| FieldValue::from_cell(c, missing)));
            }
            if !record.has(ADD_DATE_FIELD) {
                record.set(ADD_DATE_FIELD, default_date.as_str());
            }
            if !record.has(TYPE_FIELD) {
                let kind = if record.has(IdKind::Isbn.field()) && !record.has(IdKind::Doi.field()) {
                    IdKind::Isbn
                } else {
                    IdKind::Doi
                };
                record.set(TYPE_FIELD, kind.default_type());
            }
            rows.push((line, record));
        }
        tracing::debug!(path = %path.display(), rows = rows.len(), "read ledger");

        file.headers = headers;
        file.snapshot = Some(text);
        Ok((file, rows))
    }

    /// Column order used when writing.
    #[must_use]
    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Renders `ledger` as CSV text.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Parse`] if the CSV writer fails.
    pub fn render(&self, ledger: &RecordLedger) -> Result<String> {
        let write_err = |message: String| CiteError::Parse { path: self.path.clone(), message };
        let mut writer = ::csv::WriterBuilder::new()
            .terminator(::csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        writer.write_record(&self.headers).map_err(|e| write_err(e.to_string()))?;
        for record in ledger.records() {
            let cells = self.headers.iter().map(|h| record.get(h).to_cell(&self.missing));
            writer.write_record(cells).map_err(|e| write_err(e.to_string()))?;
        }
        let bytes = writer.into_inner().map_err(|e| write_err(e.to_string()))?;
        String::from_utf8(bytes).map_err(|e| write_err(e.to_string()))
    }

    /// Writes `ledger` to the backing file.
    ///
    /// Nothing is written when the ledger is empty and there was no file.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if the write fails.
    pub fn save(&self, ledger: &RecordLedger) -> Result<()> {
        if ledger.is_empty() && self.snapshot.is_none() {
            return Ok(());
        }
        let text = self.render(ledger)?;
        self.fs.write(&self.path, &text).map_err(|e| CiteError::io(&self.path, e))?;
        tracing::info!(path = %self.path.display(), rows = ledger.len(), "saved ledger");
        Ok(())
    }

    /// Puts the file back the way it was when it was opened.
    ///
    /// A file that still holds its original bytes is not rewritten.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::Io`] if the restore fails.
    pub fn restore(&self) -> Result<()> {
        match &self.snapshot {
            Some(text) if self.fs.read_to_string(&self.path).is_ok_and(|current| current == *text) => Ok(()),
            Some(text) => self.fs.write(&self.path, text),
            None if self.fs.exists(&self.path) => self.fs.remove(&self.path),
            None => Ok(()),
        }
        .map_err(|e| CiteError::io(&self.path, e))
    }
}
