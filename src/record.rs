//! Citation records and their field values.

use std::collections::BTreeMap;
use std::fmt;

use serde_json::Value;

/// Column holding the citation code.
pub const CODE_FIELD: &str = "citation-code";
/// Column holding the creation timestamp.
pub const ADD_DATE_FIELD: &str = "add-date";
/// Column holding the DOI.
pub const DOI_FIELD: &str = "doi";
/// Column holding the ISBN.
pub const ISBN_FIELD: &str = "isbn";
/// Column holding the DOIs a work cites.
pub const CITED_DOIS_FIELD: &str = "cited-dois";
/// Column holding the entry type (`article`, `book`, ...).
pub const TYPE_FIELD: &str = "type";
/// Columns the program always manages, in ledger order.
pub const PROGRAM_HEADERS: [&str; 2] = [CODE_FIELD, ADD_DATE_FIELD];

/// A single cell of a citation record.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FieldValue {
    /// Free text.
    Text(String),
    /// Whole number (years, months, page counts).
    Int(i64),
    /// Flag value.
    Bool(bool),
    /// The field is not available.
    #[default]
    Missing,
}

impl FieldValue {
    /// Returns `true` unless this is [`FieldValue::Missing`].
    #[must_use]
    pub fn is_present(&self) -> bool {
        !matches!(self, Self::Missing)
    }

    /// Returns the text content, if this is a text value.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Renders the value for a ledger cell, using `missing` for the sentinel.
    #[must_use]
    pub fn to_cell(&self, missing: &str) -> String {
        match self {
            Self::Missing => missing.to_string(),
            other => other.to_string(),
        }
    }

    /// Parses a ledger cell; empty cells and the sentinel become Missing.
    ///
    /// Cells are kept as text: a hand-typed `2020` stays `"2020"` so the
    /// file round-trips byte-for-byte.
    #[must_use]
    pub fn from_cell(cell: &str, missing: &str) -> Self {
        if cell.is_empty() || cell == missing {
            Self::Missing
        } else {
            Self::Text(cell.to_string())
        }
    }

    /// Converts a scalar JSON value; `null` becomes Missing and composite
    /// values are flattened to their compact JSON text.
    #[must_use]
    pub fn from_json(value: &Value, array_separator: &str) -> Self {
        match value {
            Value::Null => Self::Missing,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n.as_i64().map_or_else(|| Self::Text(n.to_string()), Self::Int),
            Value::String(s) if s.is_empty() => Self::Missing,
            Value::String(s) => Self::Text(s.clone()),
            Value::Array(items) if items.iter().all(|v| !v.is_array() && !v.is_object()) => {
                let parts: Vec<String> = items.iter().filter_map(scalar_text).collect();
                if parts.is_empty() {
                    Self::Missing
                } else {
                    Self::Text(parts.join(array_separator))
                }
            }
            other => Self::Text(other.to_string()),
        }
    }
}

/// Text form of a JSON scalar, `None` for `null`.
pub(crate) fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.write_str(text),
            Self::Int(n) => write!(f, "{n}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Missing => Ok(()),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for FieldValue {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

/// Kind of identifier a record is looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdKind {
    /// Digital Object Identifier.
    Doi,
    /// International Standard Book Number.
    Isbn,
}

impl IdKind {
    /// Ledger column that stores this identifier.
    #[must_use]
    pub fn field(self) -> &'static str {
        match self {
            Self::Doi => DOI_FIELD,
            Self::Isbn => ISBN_FIELD,
        }
    }

    /// Entry type assumed when a provider reports none.
    #[must_use]
    pub fn default_type(self) -> &'static str {
        match self {
            Self::Doi => "article",
            Self::Isbn => "book",
        }
    }
}

impl fmt::Display for IdKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.field())
    }
}

/// Field map of one citation.
pub type Fields = BTreeMap<String, FieldValue>;

/// One bibliographic entry with a unique code and a flat field map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CitationRecord {
    fields: Fields,
}

impl CitationRecord {
    /// Wraps a field map.
    #[must_use]
    pub fn new(fields: Fields) -> Self {
        Self { fields }
    }

    /// The record's citation code, or `""` if it has none yet.
    #[must_use]
    pub fn code(&self) -> &str {
        self.text(CODE_FIELD).unwrap_or_default()
    }

    /// Returns the value of `field`, Missing if absent.
    #[must_use]
    pub fn get(&self, field: &str) -> &FieldValue {
        static MISSING: FieldValue = FieldValue::Missing;
        self.fields.get(field).unwrap_or(&MISSING)
    }

    /// Returns the text of `field` when it holds text.
    #[must_use]
    pub fn text(&self, field: &str) -> Option<&str> {
        self.get(field).as_text()
    }

    /// Returns `true` when `field` holds a value.
    #[must_use]
    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_present()
    }

    /// Sets `field` to `value`.
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<FieldValue>) {
        self.fields.insert(field.into(), value.into());
    }

    /// The identifier this record was created from, DOI first.
    #[must_use]
    pub fn identifier(&self) -> Option<(IdKind, &str)> {
        [IdKind::Doi, IdKind::Isbn]
            .into_iter()
            .find_map(|kind| self.text(kind.field()).map(|id| (kind, id)))
    }

    /// Read-only view of all fields.
    #[must_use]
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// Splits a separator-delimited list field into its items.
    #[must_use]
    pub fn list(&self, field: &str, separator: &str) -> Vec<&str> {
        self.text(field)
            .map(|text| text.split(separator).map(str::trim).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn cells_round_trip_through_sentinel() {
        assert_eq!(FieldValue::from_cell("", "N/A"), FieldValue::Missing);
        assert_eq!(FieldValue::from_cell("N/A", "N/A"), FieldValue::Missing);
        assert_eq!(FieldValue::from_cell("2020", "N/A"), FieldValue::Text("2020".into()));
        assert_eq!(FieldValue::Missing.to_cell("N/A"), "N/A");
        assert_eq!(FieldValue::Int(7).to_cell("N/A"), "7");
    }

    #[test]
    fn json_scalars_convert() {
        assert_eq!(FieldValue::from_json(&json!(2020), "; "), FieldValue::Int(2020));
        assert_eq!(FieldValue::from_json(&json!(null), "; "), FieldValue::Missing);
        assert_eq!(FieldValue::from_json(&json!("x"), "; "), FieldValue::Text("x".into()));
        assert_eq!(FieldValue::from_json(&json!(["a", "b"]), "; "), FieldValue::Text("a; b".into()));
        assert_eq!(FieldValue::from_json(&json!([]), "; "), FieldValue::Missing);
    }

    #[test]
    fn identifier_prefers_doi() {
        let mut record = CitationRecord::default();
        record.set(ISBN_FIELD, "9780134092669");
        assert_eq!(record.identifier(), Some((IdKind::Isbn, "9780134092669")));
        record.set(DOI_FIELD, "10.1000/xyz");
        assert_eq!(record.identifier(), Some((IdKind::Doi, "10.1000/xyz")));
    }

    #[test]
    fn list_splits_on_separator() {
        let mut record = CitationRecord::default();
        record.set(CITED_DOIS_FIELD, "10.1/a; 10.1/b;  ");
        assert_eq!(record.list(CITED_DOIS_FIELD, "; "), vec!["10.1/a", "10.1/b"]);
        assert!(record.list("missing", "; ").is_empty());
    }
}
