//! Citation code allocation helpers.
//!
//! A citation code is a normalized base (`Doe2020`, `smith_`) followed by a
//! suffix of lowercase letters encoding a positive integer in bijective
//! base 26: `a`..`z`, `aa`..`zz`, `aaa`, ... There is no zero digit, so every
//! positive integer has exactly one suffix and every suffix decodes back.

use crate::error::{CiteError, Result};

/// Characters removed from a base code.
const STRIPPED: &[char] = &['\\', '/', ':', ';', '*', '[', ']', '?', '"', '\'', '<', '>', '|'];

/// Encodes `n >= 1` as a suffix.
///
/// # Errors
///
/// Returns [`CiteError::InvalidInput`] when `n` is zero.
pub fn encode_suffix(n: u64) -> Result<String> {
    if n == 0 {
        return Err(CiteError::InvalidInput("suffix number must be at least 1".to_string()));
    }
    let mut n = n;
    let mut letters = Vec::new();
    while n > 0 {
        n -= 1;
        // `n % 26` is always < 26, so the cast cannot truncate.
        #[allow(clippy::cast_possible_truncation)]
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    Ok(letters.iter().rev().collect())
}

/// Decodes a suffix back into its integer.
///
/// # Errors
///
/// Returns [`CiteError::InvalidInput`] for an empty suffix, any character
/// outside `a..=z`, or a suffix too long to fit in a `u64`.
pub fn decode_suffix(suffix: &str) -> Result<u64> {
    if suffix.is_empty() || !suffix.chars().all(|c| c.is_ascii_lowercase()) {
        return Err(CiteError::InvalidInput(format!(
            "suffix \"{suffix}\" must be one or more lowercase letters"
        )));
    }
    suffix.bytes().try_fold(0u64, |acc, b| {
        acc.checked_mul(26)
            .and_then(|acc| acc.checked_add(u64::from(b - b'a' + 1)))
            .ok_or_else(|| CiteError::InvalidInput(format!("suffix \"{suffix}\" is too long")))
    })
}

/// Normalizes a raw base code.
///
/// Strips disallowed punctuation, collapses whitespace runs into a single
/// `_`, and appends `_` when the result would end in a lowercase letter so
/// the base cannot bleed into the suffix.
#[must_use]
pub fn normalize_base(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 1);
    let mut in_space = false;
    for c in raw.chars().filter(|c| !STRIPPED.contains(c)) {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    if out.chars().last().is_some_and(|c| c.is_ascii_lowercase()) {
        out.push('_');
    }
    out
}

/// Splits a code into its base and suffix.
///
/// The suffix is the maximal trailing run of lowercase ASCII letters, or
/// `None` when the code does not end in one.
#[must_use]
pub fn split_code(code: &str) -> (&str, Option<&str>) {
    let base_len = code.trim_end_matches(|c: char| c.is_ascii_lowercase()).len();
    let (base, suffix) = code.split_at(base_len);
    (base, (!suffix.is_empty()).then_some(suffix))
}

/// Returns `true` when `code` has a suffix and an already-normalized base.
#[must_use]
pub fn is_valid_code(code: &str) -> bool {
    match split_code(code) {
        (base, Some(_)) => normalize_base(base) == base,
        (_, None) => false,
    }
}

/// Suggests the nearest valid code for an invalid one, for error messages.
#[must_use]
pub fn suggest_code(code: &str) -> Option<String> {
    let (base, suffix) = split_code(code);
    suffix.map(|suffix| format!("{}{suffix}", normalize_base(base)))
}
