// Lease and move date strategies
//
// Sequence strategies (three dates, then two) form a cascade whose first
// success ends date extraction. Without a sequence, keyword-anchored dates
// are collected per field and table rows fill whatever is still empty.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use super::cascade::{ordered_captures, Cascade, FieldContext, Resolved, Strategy};
use crate::types::{DateField, UnitRecord};

const DATE: &str = r"\d{1,2}/\d{1,2}/\d{4}";

static THREE_DATES: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"\b({d})\s+({d})\s+({d})\b", d = DATE)).unwrap());
static TWO_DATES: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"\b({d})\s+({d})\b", d = DATE)).unwrap());

static KEYWORD_DATES: Lazy<Vec<(Regex, DateField)>> = Lazy::new(|| {
    let patterns = [
        (r"(?:lease.*?end|end.*?lease|expires?|expiration).*?", DateField::LeaseEnd, true),
        (r".*?(?:lease.*?end|end.*?lease|expires?|expiration)", DateField::LeaseEnd, false),
        (r"(?:move.*?out|vacate|leaving|notice).*?", DateField::MoveOut, true),
        (r".*?(?:move.*?out|vacate|leaving|notice)", DateField::MoveOut, false),
        (r"(?:lease.*?start|start.*?lease|begin|effective).*?", DateField::LeaseStart, true),
        (r".*?(?:lease.*?start|start.*?lease|begin|effective)", DateField::LeaseStart, false),
        (r"(?:move.*?in|occupancy|tenant.*?since).*?", DateField::MoveIn, true),
        (r".*?(?:move.*?in|occupancy|tenant.*?since)", DateField::MoveIn, false),
    ];
    patterns
        .iter()
        .filter_map(|(keyword, field, keyword_first)| {
            let source = if *keyword_first {
                format!(r"(?is){}({})", keyword, DATE)
            } else {
                format!(r"(?is)({}){}", DATE, keyword)
            };
            Regex::new(&source).ok().map(|re| (re, *field))
        })
        .collect()
});

static TABLE_ROWS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        format!(r"({d})\s+({d})\s+({d})\s+\S+", d = DATE),
        format!(r"({d})\s+[\d.,]+\s+({d})", d = DATE),
        format!(r"({d})[^\n]*?({d})[^\n]*?({d})", d = DATE),
    ]
    .iter()
    .filter_map(|source| Regex::new(source).ok())
    .collect()
});

/// Dates recovered by one strategy, not yet applied to a record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DateSet {
    pub lease_start: Option<NaiveDate>,
    pub lease_end: Option<NaiveDate>,
    pub move_in: Option<NaiveDate>,
    pub move_out: Option<NaiveDate>,
}

impl DateSet {
    pub fn get(&self, field: DateField) -> Option<NaiveDate> {
        match field {
            DateField::LeaseStart => self.lease_start,
            DateField::LeaseEnd => self.lease_end,
            DateField::MoveIn => self.move_in,
            DateField::MoveOut => self.move_out,
        }
    }

    fn slot(&mut self, field: DateField) -> &mut Option<NaiveDate> {
        match field {
            DateField::LeaseStart => &mut self.lease_start,
            DateField::LeaseEnd => &mut self.lease_end,
            DateField::MoveIn => &mut self.move_in,
            DateField::MoveOut => &mut self.move_out,
        }
    }

    pub fn is_empty(&self) -> bool {
        DateField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// Take fields from `other` that are empty here.
    pub fn fill_from(&mut self, other: &DateSet) {
        for field in DateField::ALL {
            if self.get(field).is_none() {
                *self.slot(field) = other.get(field);
            }
        }
    }

    /// Write into empty record fields only; returns the fields written.
    pub fn apply_to(&self, unit: &mut UnitRecord) -> Vec<DateField> {
        let mut written = Vec::new();
        for field in DateField::ALL {
            if let (None, Some(date)) = (unit.date(field), self.get(field)) {
                *unit.date_mut(field) = Some(date);
                written.push(field);
            }
        }
        written
    }

    /// Sorted dates: earliest is start and move-in, latest is end,
    /// a distinct middle date is move-out.
    fn from_sorted(dates: &mut [NaiveDate]) -> Self {
        dates.sort();
        let mut set = DateSet::default();
        let (Some(&first), Some(&last)) = (dates.first(), dates.last()) else {
            return set;
        };
        set.lease_start = Some(first);
        set.move_in = Some(first);
        if dates.len() >= 2 {
            set.lease_end = Some(last);
        }
        if dates.len() >= 3 {
            let middle = dates[1];
            if middle != first && middle != last {
                set.move_out = Some(middle);
            }
        }
        set
    }
}

/// m/d/yyyy inside the configured year range.
pub fn parse_date(raw: &str, ctx: &FieldContext<'_>) -> Option<NaiveDate> {
    let date = NaiveDate::parse_from_str(raw.trim(), "%m/%d/%Y").ok()?;
    ctx.rules
        .config
        .year_range
        .contains(chrono::Datelike::year(&date))
        .then_some(date)
}

fn three_date_sequence(ctx: &FieldContext<'_>) -> Option<DateSet> {
    ordered_captures(&THREE_DATES, ctx.text, ctx.anchor, false)
        .iter()
        .find_map(|caps| {
            let mut dates = (1..=3)
                .map(|i| caps.get(i).and_then(|m| parse_date(m.as_str(), ctx)))
                .collect::<Option<Vec<_>>>()?;
            Some(DateSet::from_sorted(&mut dates))
        })
}

fn two_date_sequence(ctx: &FieldContext<'_>) -> Option<DateSet> {
    let (a, b) = ordered_captures(&TWO_DATES, ctx.text, ctx.anchor, false)
        .iter()
        .find_map(|caps| {
            let a = caps.get(1).and_then(|m| parse_date(m.as_str(), ctx))?;
            let b = caps.get(2).and_then(|m| parse_date(m.as_str(), ctx))?;
            Some((a, b))
        })?;
    let (early, late) = (a.min(b), a.max(b));

    let lower = ctx.text.to_lowercase();
    let mentions = |words: &[&str]| words.iter().any(|w| lower.contains(w));

    let mut set = DateSet {
        lease_start: Some(early),
        move_in: Some(early),
        ..DateSet::default()
    };
    if !mentions(&["lease", "term", "contract"]) && mentions(&["move", "occupancy", "tenant"]) {
        set.move_out = Some(late);
    } else {
        set.lease_end = Some(late);
    }
    Some(set)
}

pub fn date_cascade() -> Cascade<DateSet> {
    Cascade::new(
        "dates",
        vec![
            Strategy::new("three_date_sequence", three_date_sequence),
            Strategy::new("two_date_sequence", two_date_sequence),
        ],
    )
}

/// First valid date per keyword pattern, each field filled once.
pub fn keyword_dates(ctx: &FieldContext<'_>) -> DateSet {
    let mut set = DateSet::default();
    for (re, field) in KEYWORD_DATES.iter() {
        if set.get(*field).is_some() {
            continue;
        }
        let found = ordered_captures(re, ctx.text, ctx.anchor, false)
            .iter()
            .find_map(|caps| caps.get(1).and_then(|m| parse_date(m.as_str(), ctx)));
        if found.is_some() {
            *set.slot(*field) = found;
        }
    }
    set
}

/// Multi-date table rows; the first row with two or more valid dates wins.
pub fn table_dates(ctx: &FieldContext<'_>) -> DateSet {
    for re in TABLE_ROWS.iter() {
        for caps in ordered_captures(re, ctx.text, ctx.anchor, false) {
            let mut dates: Vec<NaiveDate> = caps
                .iter()
                .skip(1)
                .flatten()
                .filter_map(|m| parse_date(m.as_str(), ctx))
                .collect();
            if dates.len() >= 2 {
                return DateSet::from_sorted(&mut dates);
            }
        }
    }
    DateSet::default()
}

/// Full date strategy order for one context window.
pub fn resolve_dates(cascade: &Cascade<DateSet>, ctx: &FieldContext<'_>) -> Option<Resolved<DateSet>> {
    if let Some(resolved) = cascade.resolve(ctx) {
        return Some(resolved);
    }

    let keyword = keyword_dates(ctx);
    let table = table_dates(ctx);
    let strategy = match (keyword.is_empty(), table.is_empty()) {
        (true, true) => return None,
        (false, true) => "keyword",
        (true, false) => "table_row",
        (false, false) => "keyword_table",
    };

    let mut value = keyword;
    value.fill_from(&table);
    Some(Resolved { strategy, value })
}
