// OCR look-alike correction and text normalization
use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::SubstitutionScope;
use crate::types::{RentRollError, Result};

static NOISE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s.,\-$]").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Single-character substitutions for common OCR confusions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubstitutionTable {
    map: BTreeMap<char, char>,
}

impl SubstitutionTable {
    /// Build from config data. Keys and values must be exactly one character.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self> {
        let mut table = BTreeMap::new();
        for (from, to) in map {
            let (from_c, to_c) = match (single_char(from), single_char(to)) {
                (Some(f), Some(t)) => (f, t),
                _ => {
                    return Err(RentRollError::Config(format!(
                        "substitution '{}' -> '{}' must map one character to one character",
                        from, to
                    )))
                }
            };
            table.insert(from_c, to_c);
        }
        Ok(Self { map: table })
    }

    pub fn get(&self, c: char) -> Option<char> {
        self.map.get(&c).copied()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Substitute every mapped character.
    pub fn apply(&self, text: &str) -> String {
        text.chars().map(|c| self.get(c).unwrap_or(c)).collect()
    }

    /// Substitute only inside whitespace-delimited tokens accepted by `keep`.
    /// Whitespace is preserved as-is.
    pub fn apply_to_tokens<F>(&self, text: &str, keep: F) -> String
    where
        F: Fn(&str) -> bool,
    {
        let mut out = String::with_capacity(text.len());
        let mut token_start: Option<usize> = None;

        for (i, c) in text.char_indices() {
            if c.is_whitespace() {
                if let Some(start) = token_start.take() {
                    self.push_token(&mut out, &text[start..i], &keep);
                }
                out.push(c);
            } else if token_start.is_none() {
                token_start = Some(i);
            }
        }
        if let Some(start) = token_start {
            self.push_token(&mut out, &text[start..], &keep);
        }
        out
    }

    fn push_token<F>(&self, out: &mut String, token: &str, keep: &F)
    where
        F: Fn(&str) -> bool,
    {
        if keep(token) {
            out.push_str(&self.apply(token));
        } else {
            out.push_str(token);
        }
    }

    /// Apply according to the configured scope.
    pub fn apply_scoped(&self, text: &str, scope: SubstitutionScope) -> String {
        match scope {
            SubstitutionScope::Everywhere => self.apply(text),
            SubstitutionScope::DigitTokens => self.apply_to_tokens(text, has_digit),
        }
    }
}

fn single_char(s: &str) -> Option<char> {
    let mut chars = s.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) => Some(c),
        _ => None,
    }
}

pub fn has_digit(token: &str) -> bool {
    token.chars().any(|c| c.is_ascii_digit())
}

/// Tokens that look like a number or a currency figure.
pub fn is_money_token(token: &str) -> bool {
    has_digit(token) || token.contains('$')
}

/// Replace punctuation noise with spaces and collapse whitespace runs.
pub fn clean(text: &str) -> String {
    let stripped = NOISE.replace_all(text, " ");
    WHITESPACE.replace_all(&stripped, " ").trim().to_string()
}

/// True when `text[start..end]` is part of a date, a currency figure or a
/// decimal rather than a standalone number.
pub fn is_embedded_number(text: &str, start: usize, end: usize) -> bool {
    let mut before = text[..start].chars().rev();
    let mut after = text[end..].chars();
    let (prev, prev2) = (before.next(), before.next());
    let (next, next2) = (after.next(), after.next());
    let digit = |c: Option<char>| c.map_or(false, |c| c.is_ascii_digit());

    prev == Some('/')
        || next == Some('/')
        || prev == Some('$')
        || (matches!(prev, Some(',') | Some('.')) && digit(prev2))
        || (matches!(next, Some(',') | Some('.')) && digit(next2))
}

/// Two views of a page used by the locator.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedText {
    /// Substitutions applied, line structure intact
    pub substituted: String,
    /// Substituted, cleaned and collapsed onto one line
    pub normalized: String,
}

pub fn normalize(text: &str, table: &SubstitutionTable, scope: SubstitutionScope) -> NormalizedText {
    let substituted = table.apply_scoped(text, scope);
    let normalized = clean(&substituted);
    NormalizedText {
        substituted,
        normalized,
    }
}

/// Largest char boundary at or below `i`.
pub fn floor_boundary(text: &str, i: usize) -> usize {
    let mut i = i.min(text.len());
    while !text.is_char_boundary(i) {
        i -= 1;
    }
    i
}

/// Smallest char boundary at or above `i`.
pub fn ceil_boundary(text: &str, i: usize) -> usize {
    let mut i = i.min(text.len());
    while !text.is_char_boundary(i) {
        i += 1;
    }
    i
}
