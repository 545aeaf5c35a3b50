//! Projection of provider responses into citation records.

use std::fmt;

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use regex::Captures;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::address::Separators;
use crate::code::normalize_base;
use crate::config::{placeholder_pattern, Settings};
use crate::error::{CiteError, Result};
use crate::record::{CitationRecord, FieldValue, IdKind, ADD_DATE_FIELD, TYPE_FIELD};
use crate::text::{self, TitleStyle};

/// The metadata services a record can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Crossref works API (DOIs).
    Crossref,
    /// Open Library search API (ISBNs).
    OpenLibrary,
    /// Google Books volumes API (ISBNs).
    GoogleBooks,
}

impl ProviderKind {
    /// Every provider, in a fixed order.
    pub const ALL: [Self; 3] = [Self::Crossref, Self::OpenLibrary, Self::GoogleBooks];

    /// Lowercase name used in settings and cassettes.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Crossref => "crossref",
            Self::OpenLibrary => "openlibrary",
            Self::GoogleBooks => "googlebooks",
        }
    }

    /// The identifier kind this provider resolves.
    #[must_use]
    pub fn id_kind(self) -> IdKind {
        match self {
            Self::Crossref => IdKind::Doi,
            Self::OpenLibrary | Self::GoogleBooks => IdKind::Isbn,
        }
    }

    /// Checks a raw response body and returns the part projection runs on.
    ///
    /// Crossref answers are unwrapped from their `message` envelope. Open
    /// Library and Google Books answers are accepted only when they report
    /// exactly one match.
    #[must_use]
    pub fn accept(self, response: Value) -> Option<Value> {
        match self {
            Self::Crossref => match response {
                Value::Object(mut map) => map.remove("message").filter(Value::is_object),
                _ => None,
            },
            Self::OpenLibrary => exactly_one(response, "numFound"),
            Self::GoogleBooks => exactly_one(response, "totalItems"),
        }
    }

    /// Whether `header` has a post-processing rule for this provider.
    #[must_use]
    pub fn postprocesses(self, header: &str) -> bool {
        match self {
            Self::Crossref => matches!(header, "title" | "day" | "abstract" | "type"),
            Self::OpenLibrary | Self::GoogleBooks => {
                matches!(header, "title" | "author" | "year" | "month" | "day" | "type")
            }
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn exactly_one(response: Value, count_key: &str) -> Option<Value> {
    (response.get(count_key).and_then(Value::as_u64) == Some(1)).then_some(response)
}

/// Which part of a date a field holds.
#[derive(Debug, Clone, Copy)]
enum DatePart {
    Year,
    Month,
    Day,
}

impl DatePart {
    fn of(header: &str) -> Option<Self> {
        match header {
            "year" => Some(Self::Year),
            "month" => Some(Self::Month),
            "day" => Some(Self::Day),
            _ => None,
        }
    }

    fn pick(self, date: NaiveDate) -> i64 {
        match self {
            Self::Year => i64::from(date.year()),
            Self::Month => i64::from(date.month()),
            Self::Day => i64::from(date.day()),
        }
    }
}

/// Builds records from provider responses according to [`Settings`].
pub struct Projector<'a> {
    settings: &'a Settings,
}

impl<'a> Projector<'a> {
    /// Creates a projector over `settings`.
    #[must_use]
    pub fn new(settings: &'a Settings) -> Self {
        Self { settings }
    }

    fn separators(&self) -> Separators<'a> {
        Separators {
            array: &self.settings.ledger.array_separator,
            concat: &self.settings.ledger.concat_separator,
        }
    }

    /// Projects an accepted `response` from `kind` into a record.
    ///
    /// Every info header starts missing; `add-date` is `now`, the identifier
    /// column holds the normalized identifier, and each configured field is
    /// resolved (and post-processed when its address ends in `@`). A missing
    /// `type` falls back to `article` for DOIs and `book` for ISBNs.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::AddressFormat`] when an address does not fit the
    /// response, and [`CiteError::Config`] when an `@` field has no rule.
    pub fn project(
        &self,
        kind: ProviderKind,
        response: &Value,
        identifier: &str,
        now: DateTime<Utc>,
    ) -> Result<CitationRecord> {
        let seps = self.separators();
        let mut record = CitationRecord::default();
        for header in &self.settings.info_headers {
            record.set(header.as_str(), FieldValue::Missing);
        }
        record.set(ADD_DATE_FIELD, now.format("%Y-%m-%dT%H:%M:%S").to_string());

        for (header, address) in self.settings.providers.rules(kind).addresses()? {
            let resolved = address.resolve(response, seps)?;
            let value = match resolved.value {
                None => FieldValue::Missing,
                Some(data) if resolved.needs_postprocessing => {
                    self.postprocess(kind, header, &data)?
                }
                Some(data) => FieldValue::from_json(&data, seps.array),
            };
            record.set(header, value);
        }

        let id_kind = kind.id_kind();
        record.set(id_kind.field(), text::format_identifier(identifier, id_kind));
        if !record.has(TYPE_FIELD) {
            record.set(TYPE_FIELD, id_kind.default_type());
        }
        Ok(record)
    }

    fn postprocess(&self, kind: ProviderKind, header: &str, data: &Value) -> Result<FieldValue> {
        let ledger = &self.settings.ledger;
        let style = TitleStyle {
            title_case: ledger.title_case_titles,
            lower_all_caps: ledger.lower_case_all_caps_titles,
        };
        let fallback = || FieldValue::from_json(data, &ledger.array_separator);

        let value = match (kind, header) {
            (ProviderKind::Crossref, "title") | (ProviderKind::OpenLibrary, "title") => {
                data.as_str().map_or_else(fallback, |s| text::format_title(s, style).into())
            }
            (ProviderKind::GoogleBooks, "title") => data.as_str().map_or_else(fallback, |s| {
                text::format_title(&s.replace(&ledger.concat_separator, ": "), style).into()
            }),
            (ProviderKind::Crossref, "day") => match data.as_array().map(Vec::as_slice) {
                Some([_, _, day]) => FieldValue::from_json(day, &ledger.array_separator),
                _ => FieldValue::Missing,
            },
            (ProviderKind::Crossref, "abstract") => {
                data.as_str().map_or_else(fallback, |s| text::clean_markup(s).into())
            }
            (ProviderKind::Crossref, "type") => match data.as_str() {
                Some("journal-article") => "article".into(),
                _ => fallback(),
            },
            (ProviderKind::OpenLibrary | ProviderKind::GoogleBooks, "author") => {
                self.format_authors(data)
            }
            (ProviderKind::OpenLibrary, "type") => match data.as_str() {
                Some("work") => "book".into(),
                _ => fallback(),
            },
            (ProviderKind::GoogleBooks, "type") => match data.as_str() {
                Some("books#volume") => "book".into(),
                _ => fallback(),
            },
            (ProviderKind::OpenLibrary, _) if DatePart::of(header).is_some() => {
                let part = DatePart::of(header).unwrap_or(DatePart::Year);
                match data {
                    Value::Number(n) => n.as_i64().map_or(FieldValue::Missing, FieldValue::Int),
                    Value::String(s) => open_library_date(s, part),
                    _ => FieldValue::Missing,
                }
            }
            (ProviderKind::GoogleBooks, _) if DatePart::of(header).is_some() => {
                let part = DatePart::of(header).unwrap_or(DatePart::Year);
                data.as_str().map_or(FieldValue::Missing, |s| iso_date_part(s, part))
            }
            _ => {
                return Err(CiteError::Config(format!(
                    "{kind} has no post-processing rule for \"{header}\""
                )))
            }
        };
        Ok(value)
    }

    fn format_authors(&self, data: &Value) -> FieldValue {
        let ledger = &self.settings.ledger;
        let names: Vec<&str> = match data {
            Value::Array(items) => items.iter().filter_map(Value::as_str).collect(),
            Value::String(s) => vec![s.as_str()],
            _ => Vec::new(),
        };
        if names.is_empty() {
            return FieldValue::Missing;
        }
        text::format_names(&names, &ledger.array_separator, &ledger.concat_separator).into()
    }

    /// Computes the base code for a new record.
    ///
    /// A custom base wins. Otherwise `code_format` is rendered: `<field>`
    /// becomes the field's cell text (the missing sentinel when absent) and
    /// `<firstauthor.family>` / `<firstauthor.given>` come from the first
    /// `author` entry. The result is normalized.
    #[must_use]
    pub fn base_code(&self, record: &CitationRecord, custom: Option<&str>) -> String {
        if let Some(custom) = custom {
            return normalize_base(custom);
        }
        let ledger = &self.settings.ledger;
        let missing = ledger.missing.as_str();
        let first_author = record
            .text("author")
            .and_then(|authors| authors.split(ledger.array_separator.as_str()).next())
            .map(str::trim)
            .filter(|name| !name.is_empty());
        let (family, given) = match first_author {
            Some(name) => name
                .split_once(ledger.concat_separator.as_str())
                .map_or((name, missing), |(family, given)| (family, given)),
            None => (missing, missing),
        };
        let rendered =
            placeholder_pattern().replace_all(&ledger.code_format, |caps: &Captures<'_>| {
                match &caps[1] {
                    "firstauthor.family" => family.to_string(),
                    "firstauthor.given" => given.to_string(),
                    field => record.get(field).to_cell(missing),
                }
            });
        normalize_base(&rendered)
    }
}

/// Date formats Open Library uses for `publish_date`.
const OPEN_LIBRARY_DATES: [&str; 4] = ["%b %d, %Y", "%B %d, %Y", "%Y-%m-%d", "%d %B %Y"];

fn open_library_date(raw: &str, part: DatePart) -> FieldValue {
    let raw = raw.trim();
    if let Some(date) =
        OPEN_LIBRARY_DATES.iter().find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
    {
        return FieldValue::Int(part.pick(date));
    }
    // Month-precision dates ("March 2001", "Mar 2001", "2001-03") carry no day.
    let month_only = ["%d %B %Y", "%d %b %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&format!("1 {raw}"), fmt).ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok());
    match (month_only, part) {
        (Some(date), DatePart::Year | DatePart::Month) => FieldValue::Int(part.pick(date)),
        (None, DatePart::Year) => {
            raw.parse::<i64>().map_or(FieldValue::Missing, FieldValue::Int)
        }
        _ => {
            tracing::debug!(date = raw, "unrecognized publish date");
            FieldValue::Missing
        }
    }
}

fn iso_date_part(raw: &str, part: DatePart) -> FieldValue {
    let index = match part {
        DatePart::Year => 0,
        DatePart::Month => 1,
        DatePart::Day => 2,
    };
    raw.split('-')
        .nth(index)
        .and_then(|piece| piece.trim().parse::<i64>().ok())
        .map_or(FieldValue::Missing, FieldValue::Int)
}
