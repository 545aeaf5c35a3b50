//! Text clean-up helpers for titles, names and identifiers.

use std::sync::OnceLock;

use regex::Regex;

use crate::record::IdKind;

/// Words left lowercase by [`smart_title_case`] unless first or last.
const SMALL_WORDS: &[&str] = &[
    "a", "an", "and", "as", "at", "but", "by", "for", "from", "if", "in", "into", "like", "near",
    "nor", "of", "off", "on", "once", "onto", "or", "so", "than", "that", "the", "to", "when",
    "with", "yet",
];

const ENTITIES: &[(&str, &str)] = &[
    ("&amp;", "&"),
    ("&quot;", "\""),
    ("&apos;", "'"),
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("\u{a0}", " "),
    ("\u{2010}", "-"),
    ("\u{2013}", "-"),
    ("\u{2014}", "-"),
    ("\u{2019}", "'"),
    ("\n", ""),
    ("\u{223c}", "~"),
    ("\u{2009}", " "),
];

fn tag_pattern() -> &'static Regex {
    static TAGS: OnceLock<Regex> = OnceLock::new();
    TAGS.get_or_init(|| Regex::new(r"<[^>]*>").expect("tag pattern is valid"))
}

fn doi_pattern() -> &'static Regex {
    static DOI: OnceLock<Regex> = OnceLock::new();
    DOI.get_or_init(|| Regex::new(r"^10\.\d{4,}/.+").expect("doi pattern is valid"))
}

/// Removes HTML/JATS tags and decodes the common entities and typographic
/// characters providers embed in titles and abstracts.
#[must_use]
pub fn clean_markup(text: &str) -> String {
    let mut out = tag_pattern().replace_all(text, "").into_owned();
    for (from, to) in ENTITIES {
        out = out.replace(from, to);
    }
    out.trim().to_string()
}

/// Title-cases `text`, leaving [`SMALL_WORDS`] lowercase inside the title.
#[must_use]
pub fn smart_title_case(text: &str) -> String {
    let words: Vec<&str> = text.split(' ').collect();
    let last = words.len().saturating_sub(1);
    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            if i == 0 || i == last || !SMALL_WORDS.contains(word) {
                capitalize(word)
            } else {
                (*word).to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Upper-cases the first character and lower-cases the rest.
fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars.next().map_or_else(String::new, |first| {
        first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect()
    })
}

/// Options for [`format_title`].
#[derive(Debug, Clone, Copy)]
pub struct TitleStyle {
    /// Apply [`smart_title_case`].
    pub title_case: bool,
    /// Soften ALL-CAPS titles before casing.
    pub lower_all_caps: bool,
}

/// Cleans and optionally re-cases a title.
#[must_use]
pub fn format_title(text: &str, style: TitleStyle) -> String {
    let mut title = clean_markup(text);
    let has_letters = title.chars().any(char::is_alphabetic);
    if style.lower_all_caps && has_letters && !title.chars().any(char::is_lowercase) {
        title = title.split(':').map(capitalize).collect::<Vec<_>>().join(":");
    }
    if style.title_case {
        smart_title_case(&title)
    } else {
        title
    }
}

/// Splits "Given Family" into "Family<sep>Given".
///
/// Initials are kept with the given name: `"J. R. Smith"` splits after the
/// last `". "`.
#[must_use]
pub fn split_name(name: &str, concat_separator: &str) -> String {
    let name = name.trim();
    if let Some((given, family)) = name.rsplit_once(". ") {
        return format!("{family}{concat_separator}{given}.");
    }
    match name.rsplit_once(' ') {
        Some((given, family)) => format!("{family}{concat_separator}{given}"),
        None => name.to_string(),
    }
}

/// Formats a list of display names for the ledger.
#[must_use]
pub fn format_names<S: AsRef<str>>(names: &[S], array_separator: &str, concat_separator: &str) -> String {
    names
        .iter()
        .map(|name| split_name(name.as_ref(), concat_separator))
        .collect::<Vec<_>>()
        .join(array_separator)
}

/// Strips common ISBN decorations, leaving digits (and a check `x`).
#[must_use]
pub fn format_isbn(raw: &str) -> String {
    let mut isbn = raw.trim().replace(' ', "").to_lowercase();
    if let Some(rest) = isbn.strip_prefix("isbn") {
        let rest = rest.strip_prefix("-13").or_else(|| rest.strip_prefix("-10")).unwrap_or(rest);
        isbn = rest.strip_prefix(':').unwrap_or(rest).to_string();
    }
    isbn.replace('-', "")
}

/// Normalizes an identifier of the given kind for lookup and storage.
#[must_use]
pub fn format_identifier(raw: &str, kind: IdKind) -> String {
    match kind {
        IdKind::Doi => raw.trim().to_string(),
        IdKind::Isbn => format_isbn(raw),
    }
}

/// Guesses whether `raw` is a DOI or an ISBN.
#[must_use]
pub fn detect_kind(raw: &str) -> Option<IdKind> {
    let trimmed = raw.trim();
    if doi_pattern().is_match(trimmed) {
        return Some(IdKind::Doi);
    }
    let isbn = format_isbn(trimmed);
    let body = isbn.strip_suffix('x').unwrap_or(&isbn);
    (!body.is_empty() && body.bytes().all(|b| b.is_ascii_digit())).then_some(IdKind::Isbn)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_markup_strips_tags_and_entities() {
        assert_eq!(clean_markup("<jats:p>Fish &amp; Chips\u{2014}Again</jats:p>"), "Fish & Chips-Again");
    }

    #[test]
    fn title_case_keeps_small_words() {
        assert_eq!(smart_title_case("the art of the deal"), "The Art of the Deal");
        assert_eq!(smart_title_case("what it is for"), "What It Is For");
    }

    #[test]
    fn all_caps_titles_are_softened() {
        let style = TitleStyle { title_case: false, lower_all_caps: true };
        assert_eq!(format_title("GENOME BIOLOGY:A REVIEW", style), "Genome biology:A review");
        assert_eq!(format_title("Mixed CASE", style), "Mixed CASE");
    }

    #[test]
    fn names_split_family_first() {
        assert_eq!(split_name("Jane Doe", ", "), "Doe, Jane");
        assert_eq!(split_name("J. R. R. Tolkien", ", "), "Tolkien, J. R. R.");
        assert_eq!(split_name("Plato", ", "), "Plato");
        assert_eq!(format_names(&["Jane Doe", "John Roe"], "; ", ", "), "Doe, Jane; Roe, John");
    }

    #[test]
    fn isbn_decorations_are_removed() {
        assert_eq!(format_isbn(" ISBN-13: 978-0-13-409266-9 "), "9780134092669");
        assert_eq!(format_isbn("isbn:0-306-40615-2"), "0306406152");
        assert_eq!(format_isbn("080442957X"), "080442957x");
    }

    #[test]
    fn detects_identifier_kinds() {
        assert_eq!(detect_kind("10.1126/science.359.6377.725"), Some(IdKind::Doi));
        assert_eq!(detect_kind("978-0-13-409266-9"), Some(IdKind::Isbn));
        assert_eq!(detect_kind("080442957X"), Some(IdKind::Isbn));
        assert_eq!(detect_kind("not-an-id"), None);
        assert_eq!(detect_kind("10.12/short"), None);
    }
}
