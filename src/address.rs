//! Address expressions: projecting nested provider responses into flat fields.
//!
//! An address is a `|`-separated list of alternatives. Each alternative is a
//! `.`-separated path of segments, optionally ending in `@` to flag the
//! result for provider-specific post-processing:
//!
//! ```text
//! title                       plain key
//! title.0@                    list index, post-process
//! author.*.family             every element of a list
//! author.*.[given,family]     several keys of the same value
//! published.date-parts|issued.date-parts
//! ```
//!
//! Expressions are parsed once into [`Address`] and evaluated against
//! `serde_json::Value` trees. A *missing* value is a normal outcome; using a
//! segment against the wrong shape of data is an error.

use std::fmt;
use std::str::FromStr;

use serde_json::Value;

use crate::error::{CiteError, Result};
use crate::record::scalar_text;

/// One step of an alternative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    /// Index into a list.
    Index(usize),
    /// Fan out over every element of a list.
    Wildcard,
    /// Resolve several keys against the same value and concatenate them.
    Group(Vec<Segment>),
    /// Key of a mapping.
    Key(String),
}

/// One `|`-separated branch of an address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alternative {
    /// Path to follow, left to right.
    pub segments: Vec<Segment>,
    /// Whether the value needs provider post-processing (`@` suffix).
    pub needs_postprocessing: bool,
}

/// A parsed address expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    source: String,
    alternatives: Vec<Alternative>,
}

/// Separators used when an address joins several values into one.
#[derive(Debug, Clone, Copy)]
pub struct Separators<'a> {
    /// Joins the results of a `*` segment.
    pub array: &'a str,
    /// Joins the results of a `[..]` group.
    pub concat: &'a str,
}

/// Outcome of resolving an address.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    /// `true` when the winning (or last tried) alternative ended in `@`.
    pub needs_postprocessing: bool,
    /// The resolved value; `None` when every alternative came up missing.
    pub value: Option<Value>,
}

impl Address {
    /// Parses an address expression.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::AddressFormat`] for empty segments, unbalanced
    /// brackets, or `.`, `*`, `[` and `]` inside a bracket group.
    pub fn parse(source: &str) -> Result<Self> {
        let alternatives = source
            .split('|')
            .map(|alt| parse_alternative(source, alt))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { source: source.to_string(), alternatives })
    }

    /// Returns a copy of this address with `root` prepended to every alternative.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::AddressFormat`] if `root` is not a plain path.
    pub fn with_root(&self, root: &str) -> Result<Self> {
        if root.is_empty() {
            return Ok(self.clone());
        }
        let prefix = parse_alternative(root, root)?;
        if prefix.needs_postprocessing || prefix.segments.iter().any(|s| matches!(s, Segment::Group(_))) {
            return Err(CiteError::address(root, "a root must be a plain path"));
        }
        let alternatives = self
            .alternatives
            .iter()
            .map(|alt| Alternative {
                segments: prefix.segments.iter().chain(&alt.segments).cloned().collect(),
                needs_postprocessing: alt.needs_postprocessing,
            })
            .collect();
        Ok(Self { source: format!("{root}.{}", self.source), alternatives })
    }

    /// The parsed alternatives, in evaluation order.
    #[must_use]
    pub fn alternatives(&self) -> &[Alternative] {
        &self.alternatives
    }

    /// Evaluates the address against `data`.
    ///
    /// The first alternative producing a value wins; otherwise the result is
    /// missing and carries the flag of the last alternative.
    ///
    /// # Errors
    ///
    /// Returns [`CiteError::AddressFormat`] when an index or `*` is applied to
    /// something that is not a list, or a key to something that is not a
    /// mapping.
    pub fn resolve(&self, data: &Value, seps: Separators<'_>) -> Result<Resolved> {
        let mut needs_postprocessing = false;
        for alt in &self.alternatives {
            needs_postprocessing = alt.needs_postprocessing;
            if let Some(value) = self.walk(data, &alt.segments, seps)? {
                return Ok(Resolved { needs_postprocessing, value: Some(value) });
            }
        }
        Ok(Resolved { needs_postprocessing, value: None })
    }

    fn walk(&self, data: &Value, segments: &[Segment], seps: Separators<'_>) -> Result<Option<Value>> {
        let mut current = data;
        for (i, segment) in segments.iter().enumerate() {
            if current.as_array().is_some_and(Vec::is_empty) {
                return Ok(None);
            }
            let rest = &segments[i + 1..];
            match segment {
                Segment::Index(index) => {
                    let Value::Array(items) = current else {
                        return Err(self.misuse(&format!("index {index}"), current));
                    };
                    match items.get(*index) {
                        Some(item) => current = item,
                        None => return Ok(None),
                    }
                }
                Segment::Wildcard => {
                    let Value::Array(items) = current else {
                        return Err(self.misuse("`*`", current));
                    };
                    let mut parts = Vec::new();
                    for item in items {
                        if let Some(text) = self.walk(item, rest, seps)?.as_ref().and_then(scalar_text) {
                            parts.push(text);
                        }
                    }
                    return Ok(joined(parts, seps.array));
                }
                Segment::Group(keys) => {
                    let mut parts = Vec::new();
                    for key in keys {
                        let path: Vec<Segment> =
                            std::iter::once(key.clone()).chain(rest.iter().cloned()).collect();
                        if let Some(text) = self.walk(current, &path, seps)?.as_ref().and_then(scalar_text) {
                            parts.push(text);
                        }
                    }
                    return Ok(joined(parts, seps.concat));
                }
                Segment::Key(key) => match current {
                    Value::Object(map) => match map.get(key) {
                        Some(value) => current = value,
                        None => return Ok(None),
                    },
                    Value::Null => return Ok(None),
                    other => return Err(self.misuse(&format!("key \"{key}\""), other)),
                },
            }
        }
        Ok((!current.is_null()).then(|| current.clone()))
    }

    fn misuse(&self, what: &str, found: &Value) -> CiteError {
        CiteError::address(&self.source, format!("{what} cannot be applied to {}", kind_of(found)))
    }
}

impl FromStr for Address {
    type Err = CiteError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

/// Parses and evaluates `address` in one step.
///
/// # Errors
///
/// See [`Address::parse`] and [`Address::resolve`].
pub fn resolve(data: &Value, address: &str, seps: Separators<'_>) -> Result<Resolved> {
    Address::parse(address)?.resolve(data, seps)
}

fn joined(parts: Vec<String>, separator: &str) -> Option<Value> {
    (!parts.is_empty()).then(|| Value::String(parts.join(separator)))
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "a list",
        Value::Object(_) => "a mapping",
    }
}

fn parse_alternative(source: &str, alt: &str) -> Result<Alternative> {
    let (path, needs_postprocessing) = match alt.strip_suffix('@') {
        Some(path) => (path, true),
        None => (alt, false),
    };
    let mut segments = Vec::new();
    for raw in split_path(source, path)? {
        segments.push(parse_segment(source, raw)?);
    }
    Ok(Alternative { segments, needs_postprocessing })
}

/// Splits on `.` outside brackets and rejects nested syntax inside them.
fn split_path<'a>(source: &str, path: &'a str) -> Result<Vec<&'a str>> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut in_group = false;
    for (i, c) in path.char_indices() {
        match c {
            '[' if in_group => return Err(CiteError::address(source, "nested `[` inside a group")),
            '[' => in_group = true,
            ']' if !in_group => return Err(CiteError::address(source, "unmatched `]`")),
            ']' => in_group = false,
            '.' | '*' if in_group => {
                return Err(CiteError::address(source, format!("`{c}` is not allowed inside `[...]`")));
            }
            '.' => {
                parts.push(&path[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    if in_group {
        return Err(CiteError::address(source, "unclosed `[`"));
    }
    parts.push(&path[start..]);
    Ok(parts)
}

fn parse_segment(source: &str, raw: &str) -> Result<Segment> {
    if raw.is_empty() {
        return Err(CiteError::address(source, "empty segment"));
    }
    if raw == "*" {
        return Ok(Segment::Wildcard);
    }
    if let Some(inner) = raw.strip_prefix('[') {
        let Some(inner) = inner.strip_suffix(']') else {
            return Err(CiteError::address(source, format!("segment \"{raw}\" must end with `]`")));
        };
        let keys = inner
            .split(',')
            .map(|key| match key.trim() {
                "" => Err(CiteError::address(source, "empty key inside `[...]`")),
                key => Ok(plain_segment(key)),
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(Segment::Group(keys));
    }
    if raw.contains(['[', ']', '*', '@']) {
        return Err(CiteError::address(source, format!("malformed segment \"{raw}\"")));
    }
    Ok(plain_segment(raw))
}

fn plain_segment(raw: &str) -> Segment {
    if raw.bytes().all(|b| b.is_ascii_digit()) {
        raw.parse().map_or_else(|_| Segment::Key(raw.to_string()), Segment::Index)
    } else {
        Segment::Key(raw.to_string())
    }
}
