// Unit identifier locator
//
// Anchored pattern families run over both the substituted and the cleaned
// view of the page. Unanchored ones and the last-resort scan only see the
// substituted view, where dates and money keep their separators. A candidate
// is accepted only when its digits form a 3-digit number inside the expected
// domain (or, with no domain, a 3-digit number with a non-zero lead digit).
// Unanchored matches that sit inside a date or a money figure are dropped.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::normalize::{ceil_boundary, floor_boundary, is_embedded_number, normalize, SubstitutionTable};
use crate::config::{LocatorConfig, Strictness, SubstitutionScope, UnitDomain};
use crate::diagnostics::{Diagnostics, TraceEvent};

/// One accepted identifier and its best evidence window.
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedUnit {
    pub unit: String,
    pub context: String,
    /// Byte offset of the identifier inside `context`
    pub anchor: usize,
    pub from_original: bool,
}

struct UnitPattern {
    name: &'static str,
    regex: &'static Lazy<Regex>,
    /// Carries structural evidence beyond "a 3-digit number"
    anchored: bool,
    /// Reject matches glued to a following digit or a leading letter or digit
    isolated: bool,
}

static DOMAIN_DIRECT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3})\b").unwrap());
static PREFIXED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)(?:\bunit|\bapt|\bsuite|#)\s*[#:.]?\s*(\d{3})\b").unwrap());
static BUILDING_PREFIXED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b0[1-9]-(\d{3})\b").unwrap());
static BEFORE_TYPE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(\d{3})\s*type\b").unwrap());
static BEFORE_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{3})\s+(?:occupied|vacant)\b").unwrap());
static BEFORE_MBL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3})\s+MBL\b").unwrap());
static LINE_START: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^[ \t]*(\d{3})[ \t]").unwrap());
static BEFORE_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3})\s+[A-Za-z]{2,}").unwrap());
static BEFORE_FOUR_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3})\s*\d{4}").unwrap());
static SPLIT_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"([1-9])\s*(\d)\s*(\d)").unwrap());
static OCR_CORRUPTED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)([1-9])\s*([0-9IO]{1,2})\s*([0-9IO])").unwrap());
static NOISE_ARTIFACTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([1-9])[^\d]{0,2}(\d)[^\d]{0,2}(\d)").unwrap());
static DIGIT_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\d+").unwrap());

static PATTERNS: &[UnitPattern] = &[
    UnitPattern { name: "domain_direct", regex: &DOMAIN_DIRECT, anchored: false, isolated: false },
    UnitPattern { name: "prefixed", regex: &PREFIXED, anchored: true, isolated: false },
    UnitPattern { name: "building_prefixed", regex: &BUILDING_PREFIXED, anchored: true, isolated: false },
    UnitPattern { name: "before_type", regex: &BEFORE_TYPE, anchored: true, isolated: false },
    UnitPattern { name: "before_status", regex: &BEFORE_STATUS, anchored: true, isolated: false },
    UnitPattern { name: "before_mbl", regex: &BEFORE_MBL, anchored: true, isolated: false },
    UnitPattern { name: "line_start", regex: &LINE_START, anchored: true, isolated: false },
    UnitPattern { name: "before_word", regex: &BEFORE_WORD, anchored: false, isolated: false },
    UnitPattern { name: "before_four_digits", regex: &BEFORE_FOUR_DIGITS, anchored: false, isolated: false },
    UnitPattern { name: "split_digits", regex: &SPLIT_DIGITS, anchored: false, isolated: true },
    UnitPattern { name: "ocr_corrupted", regex: &OCR_CORRUPTED, anchored: false, isolated: true },
    UnitPattern { name: "noise_artifacts", regex: &NOISE_ARTIFACTS, anchored: false, isolated: true },
];

pub struct UnitLocator<'a> {
    config: &'a LocatorConfig,
    domain: Option<UnitDomain>,
    table: &'a SubstitutionTable,
    scope: SubstitutionScope,
}

impl<'a> UnitLocator<'a> {
    pub fn new(config: &'a LocatorConfig, table: &'a SubstitutionTable, scope: SubstitutionScope) -> Self {
        Self {
            config,
            domain: config.domain(),
            table,
            scope,
        }
    }

    /// Find identifiers in a page and attach their best context window.
    pub fn locate(&self, text: &str, diag: &mut Diagnostics) -> Vec<LocatedUnit> {
        let views = normalize(text, self.table, self.scope);
        let found = self.find_identifiers(&views.substituted, &views.normalized, diag);

        found
            .into_iter()
            .map(|unit| {
                let id = format!("{:03}", unit);
                best_context(&id, text, &views.normalized, self.config.context_radius)
            })
            .collect()
    }

    /// Union of every strategy's accepted identifiers.
    pub fn find_identifiers(&self, substituted: &str, cleaned: &str, diag: &mut Diagnostics) -> BTreeSet<u16> {
        let mut found = BTreeSet::new();

        for pattern in PATTERNS {
            if !self.strategy_enabled(pattern) {
                continue;
            }
            // The cleaned view has lost the '/' and '$' that mark dates and money
            let both = [substituted, cleaned];
            let views = if pattern.anchored { &both[..] } else { &both[..1] };
            let mut hits = BTreeSet::new();
            for view in views {
                for caps in guarded_captures(pattern.regex, view, pattern.isolated) {
                    let embedded = caps
                        .get(0)
                        .map_or(false, |m| is_embedded_number(view, m.start(), m.end()));
                    if !pattern.anchored && embedded {
                        continue;
                    }
                    if let Some(unit) = self.accept(&captured_digits(&caps)) {
                        hits.insert(unit);
                    }
                }
            }
            diag.record(TraceEvent::LocatorStrategy {
                strategy: pattern.name.to_string(),
                found: hits.len(),
            });
            found.extend(hits);
        }

        if self.needs_last_resort(found.len()) {
            let coverage = self.coverage(found.len());
            let before = found.len();
            for m in DIGIT_RUN.find_iter(substituted) {
                if m.as_str().len() != 3 || is_embedded_number(substituted, m.start(), m.end()) {
                    continue;
                }
                if let Some(unit) = self.accept(m.as_str()) {
                    found.insert(unit);
                }
            }
            diag.record(TraceEvent::LastResortScan {
                coverage,
                added: found.len() - before,
            });
        }

        tracing::debug!(units = found.len(), "identifiers located");
        found
    }

    fn strategy_enabled(&self, pattern: &UnitPattern) -> bool {
        pattern.anchored || self.domain.is_some() || self.config.strictness == Strictness::Permissive
    }

    fn coverage(&self, found: usize) -> f64 {
        match &self.domain {
            Some(domain) if !domain.is_empty() => found as f64 / domain.len() as f64,
            _ => 0.0,
        }
    }

    fn needs_last_resort(&self, found: usize) -> bool {
        match &self.domain {
            Some(_) => self.coverage(found) < self.config.coverage_threshold,
            None => self.config.strictness == Strictness::Permissive,
        }
    }

    /// Validate a candidate's digits against the domain.
    pub fn accept(&self, digits: &str) -> Option<u16> {
        if digits.len() != 3 || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let unit: u16 = digits.parse().ok()?;
        match &self.domain {
            Some(domain) => domain.contains(unit).then_some(unit),
            None => (unit >= 100).then_some(unit),
        }
    }
}

// All capture groups joined, OCR letters mapped, non-digits dropped
fn captured_digits(caps: &Captures<'_>) -> String {
    caps.iter()
        .skip(1)
        .flatten()
        .flat_map(|m| m.as_str().chars())
        .map(|c| match c {
            'I' | 'i' => '1',
            'O' | 'o' => '0',
            other => other,
        })
        .filter(|c| c.is_ascii_digit())
        .collect()
}

/// Captures in order, optionally refusing a match that runs into a further
/// digit or hangs off a preceding letter or digit, retrying one character
/// later.
fn guarded_captures<'t>(regex: &Regex, text: &'t str, isolated: bool) -> Vec<Captures<'t>> {
    let mut out = Vec::new();
    let mut pos = 0;

    while pos <= text.len() {
        let Some(caps) = regex.captures_at(text, pos) else {
            break;
        };
        let Some(whole) = caps.get(0) else {
            break;
        };

        let runs_on = text[whole.end()..].starts_with(|c: char| c.is_ascii_digit());
        let attached = text[..whole.start()].ends_with(|c: char| c.is_ascii_alphanumeric());
        if isolated && (runs_on || attached) {
            pos = next_boundary(text, whole.start());
            continue;
        }

        pos = if whole.end() > whole.start() {
            whole.end()
        } else {
            next_boundary(text, whole.end())
        };
        out.push(caps);
    }

    out
}

fn next_boundary(text: &str, i: usize) -> usize {
    if i >= text.len() {
        return text.len() + 1;
    }
    ceil_boundary(text, i + 1)
}

/// Longest ±radius window over every whole-word occurrence; the original
/// text is preferred when lengths tie.
pub fn best_context(unit: &str, original: &str, normalized: &str, radius: usize) -> LocatedUnit {
    let mut best = LocatedUnit {
        unit: unit.to_string(),
        context: String::new(),
        anchor: 0,
        from_original: false,
    };
    let mut best_len = 0usize;

    let Some(word) = unit_word(unit) else {
        return best;
    };

    for (text, from_original) in [(original, true), (normalized, false)] {
        for (context, anchor) in windows(&word, text, radius) {
            let len = context.chars().count();
            if len > best_len {
                best_len = len;
                best = LocatedUnit {
                    unit: unit.to_string(),
                    context: context.to_string(),
                    anchor,
                    from_original,
                };
            }
        }
    }

    best
}

/// Every ±radius window around whole-word matches, with the match offset.
pub fn windows<'t>(word: &Regex, text: &'t str, radius: usize) -> Vec<(&'t str, usize)> {
    word.find_iter(text)
        .map(|m| {
            let start = floor_boundary(text, m.start().saturating_sub(radius));
            let end = ceil_boundary(text, m.end().saturating_add(radius));
            (&text[start..end], m.start() - start)
        })
        .collect()
}

/// Whole-word matcher for an identifier.
pub fn unit_word(unit: &str) -> Option<Regex> {
    Regex::new(&format!(r"\b{}\b", regex::escape(unit))).ok()
}

/// The other identifiers found alongside a unit. A unit's evidence ends where
/// the next of them begins.
#[derive(Debug, Clone, Default)]
pub struct Neighbours {
    word: Option<Regex>,
}

impl Neighbours {
    pub fn new<'u>(unit: &str, all: impl IntoIterator<Item = &'u str>) -> Self {
        let others: Vec<String> = all
            .into_iter()
            .filter(|other| *other != unit)
            .map(regex::escape)
            .collect();
        if others.is_empty() {
            return Self::default();
        }
        Self {
            word: Regex::new(&format!(r"\b(?:{})\b", others.join("|"))).ok(),
        }
    }

    /// The part of `text` that belongs to the identifier at `anchor`, and the
    /// anchor's offset inside it.
    ///
    /// The segment runs forward up to the next neighbour. It reaches back to
    /// the start of the anchor's line unless a neighbour sits on that line
    /// before the anchor. Neighbour digits inside dates or money are ignored.
    pub fn own_segment<'t>(&self, text: &'t str, anchor: usize) -> (&'t str, usize) {
        let Some(word) = &self.word else {
            return (text, anchor);
        };
        let anchor = floor_boundary(text, anchor.min(text.len()));
        let hits: Vec<(usize, usize)> = word
            .find_iter(text)
            .filter(|m| !is_embedded_number(text, m.start(), m.end()))
            .map(|m| (m.start(), m.end()))
            .collect();

        let end = hits
            .iter()
            .map(|&(start, _)| start)
            .find(|&start| start > anchor)
            .unwrap_or(text.len());
        let line_start = text[..anchor].rfind('\n').map_or(0, |i| i + 1);
        let shared_line = hits.iter().any(|&(start, stop)| start >= line_start && stop <= anchor);
        let start = if shared_line { anchor } else { line_start };

        (&text[start..end.max(anchor)], anchor - start)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NormalizeConfig, UnitRange};

    fn table() -> SubstitutionTable {
        SubstitutionTable::from_map(&NormalizeConfig::default().unit_substitutions).unwrap()
    }

    fn domain_config() -> LocatorConfig {
        LocatorConfig {
            expected_units: vec![
                UnitRange { start: 101, end: 128 },
                UnitRange { start: 201, end: 227 },
            ],
            ..LocatorConfig::default()
        }
    }

    fn ids(units: &[LocatedUnit]) -> Vec<&str> {
        units.iter().map(|u| u.unit.as_str()).collect()
    }

    #[test]
    fn test_out_of_domain_rejected() {
        let config = domain_config();
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let units = locator.locate("Unit 105 Occupied\nUnit 999 Vacant\n210 Type A", &mut diag);
        assert_eq!(ids(&units), vec!["105", "210"]);
    }

    #[test]
    fn test_ocr_confusions_recovered() {
        let config = domain_config();
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let units = locator.locate("I05 Occupied Smith, John\n2I8 Vacant", &mut diag);
        assert_eq!(ids(&units), vec!["105", "218"]);
    }

    #[test]
    fn test_split_digits_reassembled() {
        let config = domain_config();
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let found = locator.find_identifiers("apt 1 2 4 next", "apt 1 2 4 next", &mut diag);
        assert!(found.contains(&124));
    }

    #[test]
    fn test_strict_without_domain_needs_anchor() {
        let config = LocatorConfig::default();
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let units = locator.locate("Unit 305 Occupied\nPhone 555 1234 office", &mut diag);
        assert_eq!(ids(&units), vec!["305"]);
        assert!(!diag
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::LastResortScan { .. })));
    }

    #[test]
    fn test_permissive_without_domain_scans_everything() {
        let config = LocatorConfig {
            strictness: Strictness::Permissive,
            ..LocatorConfig::default()
        };
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let found = locator.find_identifiers("Unit 305 and 555", "Unit 305 and 555", &mut diag);
        assert!(found.contains(&305));
        assert!(found.contains(&555));
    }

    #[test]
    fn test_isolated_match_retries() {
        let caps = guarded_captures(&SPLIT_DIGITS, "1234 and 1 2 4", true);
        let got: Vec<String> = caps.iter().map(captured_digits).collect();
        assert_eq!(got, vec!["124"]);
    }

    #[test]
    fn test_dates_do_not_yield_identifiers() {
        let config = domain_config();
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let units = locator.locate(
            "105 Occupied Martin, Paul 12/7/2023 11/30/2024 12/7/2023 $1,450.00",
            &mut diag,
        );
        assert_eq!(ids(&units), vec!["105"]);
    }

    #[test]
    fn test_tenant_ids_and_areas_do_not_yield_identifiers() {
        let config = domain_config();
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let units = locator.locate(
            "Unit 105 t0042117 Nguyen, Thanh Occupied 1120 sq ft $1,450.00",
            &mut diag,
        );
        assert_eq!(ids(&units), vec!["105"]);
    }

    #[test]
    fn test_last_resort_runs_below_coverage() {
        let config = domain_config();
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let units = locator.locate("Unit 105 Occupied\nApartment block A112 ready", &mut diag);
        assert_eq!(ids(&units), vec!["105", "112"]);
        assert!(diag
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::LastResortScan { added: 1, .. })));
    }

    #[test]
    fn test_last_resort_skipped_at_coverage() {
        let config = LocatorConfig {
            coverage_threshold: 0.01,
            ..domain_config()
        };
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let mut diag = Diagnostics::new();
        let units = locator.locate("Unit 105 Occupied\nApartment block A112 ready", &mut diag);
        assert_eq!(ids(&units), vec!["105"]);
        assert!(!diag
            .events()
            .iter()
            .any(|e| matches!(e, TraceEvent::LastResortScan { .. })));
    }

    #[test]
    fn test_segment_stops_at_next_unit() {
        let text = "101 Occupied Hale, Nora $1,350.00\n102 Vacant\n103 Occupied";
        let neighbours = Neighbours::new("102", ["101", "102", "103"]);
        let (segment, anchor) = neighbours.own_segment(text, text.find("102").unwrap());
        assert_eq!(segment, "102 Vacant\n");
        assert_eq!(anchor, 0);
    }

    #[test]
    fn test_segment_starts_at_anchor_when_line_is_shared() {
        let text = "101 Hale, Nora 102 Vacant 103 Ibarra, Luz";
        let neighbours = Neighbours::new("102", ["101", "102", "103"]);
        let (segment, anchor) = neighbours.own_segment(text, text.find("102").unwrap());
        assert_eq!(segment, "102 Vacant ");
        assert_eq!(anchor, 0);
    }

    #[test]
    fn test_segment_ignores_neighbour_digits_in_money() {
        let text = "Unit 104 Martin, Paul $1,103.00 rent";
        let neighbours = Neighbours::new("104", ["103", "104"]);
        let (segment, anchor) = neighbours.own_segment(text, 5);
        assert_eq!(segment, text);
        assert_eq!(anchor, 5);
    }

    #[test]
    fn test_context_prefers_original_on_tie() {
        let located = best_context("105", "105 Occupied", "105 Occupied", 300);
        assert!(located.from_original);
        assert_eq!(located.anchor, 0);
        assert_eq!(located.context, "105 Occupied");
    }

    #[test]
    fn test_locator_is_deterministic() {
        let config = domain_config();
        let table = table();
        let locator = UnitLocator::new(&config, &table, SubstitutionScope::DigitTokens);
        let text = "101 Occupied 1,250.00\n1 0 2 Vacant\n#1O3 Smith, Jane";
        let first = locator.locate(text, &mut Diagnostics::new());
        for _ in 0..5 {
            assert_eq!(locator.locate(text, &mut Diagnostics::new()), first);
        }
    }
}
