// Ordered fallback chains of stateless extraction strategies
use regex::{Captures, Regex};

use super::normalize::{ceil_boundary, SubstitutionTable};
use crate::config::FieldConfig;

/// Evidence a strategy may look at: a text window and where the unit sits in it.
#[derive(Debug, Clone, Copy)]
pub struct FieldContext<'a> {
    pub text: &'a str,
    /// Byte offset of the identifier inside `text`
    pub anchor: usize,
    pub rules: &'a FieldRules,
}

impl<'a> FieldContext<'a> {
    pub fn new(text: &'a str, anchor: usize, rules: &'a FieldRules) -> Self {
        Self {
            text,
            anchor: anchor.min(text.len()),
            rules,
        }
    }
}

/// Tuning shared by every field strategy.
#[derive(Debug, Clone)]
pub struct FieldRules {
    pub config: FieldConfig,
    /// Wider look-alike table for monetary figures
    pub money_table: SubstitutionTable,
}

pub type Extractor<T> = fn(&FieldContext<'_>) -> Option<T>;

/// A named extractor; `None` means "no plausible value here".
pub struct Strategy<T> {
    pub name: &'static str,
    pub run: Extractor<T>,
}

impl<T> Strategy<T> {
    pub const fn new(name: &'static str, run: Extractor<T>) -> Self {
        Self { name, run }
    }
}

/// Value plus the strategy that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved<T> {
    pub strategy: &'static str,
    pub value: T,
}

/// Strategies tried in order until one yields a value.
pub struct Cascade<T> {
    pub field: &'static str,
    strategies: Vec<Strategy<T>>,
}

impl<T> Cascade<T> {
    pub fn new(field: &'static str, strategies: Vec<Strategy<T>>) -> Self {
        Self { field, strategies }
    }

    pub fn resolve(&self, ctx: &FieldContext<'_>) -> Option<Resolved<T>> {
        self.strategies.iter().find_map(|s| {
            (s.run)(ctx).map(|value| Resolved {
                strategy: s.name,
                value,
            })
        })
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.strategies.iter().map(|s| s.name).collect()
    }
}

/// Matches in evidence order: those at or after the anchor first, in
/// reading order, then those before it, nearest first. `overlapping`
/// restarts the search one character into each match.
pub fn ordered_captures<'t>(re: &Regex, text: &'t str, anchor: usize, overlapping: bool) -> Vec<Captures<'t>> {
    let mut all = Vec::new();
    if overlapping {
        let mut pos = 0;
        while pos < text.len() {
            let Some(caps) = re.captures_at(text, pos) else {
                break;
            };
            let start = caps.get(0).map(|m| m.start()).unwrap_or(text.len());
            pos = ceil_boundary(text, start + 1);
            all.push(caps);
        }
    } else {
        all.extend(re.captures_iter(text));
    }

    let (forward, mut backward): (Vec<_>, Vec<_>) = all
        .into_iter()
        .partition(|c| c.get(0).map(|m| m.start() >= anchor).unwrap_or(false));
    backward.reverse();
    forward.into_iter().chain(backward).collect()
}
