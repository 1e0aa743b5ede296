// Per-field extraction strategies
//
// Each field owns a cascade of stateless strategies evaluated against the
// unit's context window. Evidence is read anchor-forward: the nearest match
// after the identifier, then the nearest one before it. A window is first cut
// down to the unit's own row, which ends at the next located identifier.

use once_cell::sync::Lazy;
use regex::Regex;

use super::cascade::{ordered_captures, Cascade, FieldContext, FieldRules, Resolved, Strategy};
use super::dates::{self, DateSet};
use super::locator::{unit_word, windows, LocatedUnit, Neighbours};
use super::normalize::{is_embedded_number, is_money_token};
use crate::config::PipelineConfig;
use crate::diagnostics::{Diagnostics, TraceEvent};
use crate::types::{Result, UnitRecord, UnitType, VACANT_TENANT};

static STRONG_STATUS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\b(occupied|vacant)\b").unwrap());
static WEAK_STATUS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:(tenant|rented|lease)|(empty|available|unrented))\b").unwrap());

static AREA_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{3,4})\b").unwrap());
static AREA_SQFT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{3,4})\s*(?:sq\.?\s*ft|sqft|sf\b|square)").unwrap());
static AREA_GENERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(8\d{2}|9\d{2}|[12]\d{3})\b").unwrap());

static TENANT_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bt\d{6,8}[ \t]+([A-Z][a-z]+(?:,[ \t]*|[ \t]+)[A-Z][a-z]+)").unwrap());
static LAST_FIRST: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+,[ \t]*[A-Z][a-z]+)\b").unwrap());
static FIRST_LAST: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b([A-Z][a-z]+[ \t]+[A-Z][a-z]+)\b").unwrap());

const VALUE: &str = r"(\d{1,2},\d{3}(?:\.\d{2})?|\d{3,5}(?:\.\d{2})?)";

static KW_BEFORE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b(?:rent|amount|monthly|payment)\b[\s:]*\$?\s*{}", VALUE)).unwrap()
});
static KW_AFTER: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\b{}\s*(?:rent|monthly|payment)\b", VALUE)).unwrap());
static DOLLAR: Lazy<Regex> = Lazy::new(|| Regex::new(&format!(r"\$\s*{}", VALUE)).unwrap());
static DECIMAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{1,2},\d{3}\.\d{2}|\d{3,4}\.\d{2})\b").unwrap());

static TABLE_PAIR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(\d{4})\s+(\d{4})\s+[\d.,]+").unwrap());
static RENT_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\brent[^0-9]{0,40}(\d{4})\b").unwrap());
static AMOUNT_BETWEEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(\d{4})\s+\d+\.\d{2}\s+(\d{4})\b").unwrap());

static TOTAL: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"(?i)\btotal\b[\s:]*\$?\s*{}", VALUE)).unwrap());

// Status

fn status_keyword(ctx: &FieldContext<'_>) -> Option<UnitType> {
    let caps = ordered_captures(&STRONG_STATUS, ctx.text, ctx.anchor, false);
    let word = caps.first()?.get(1)?.as_str().to_ascii_lowercase();
    match word.as_str() {
        "occupied" => Some(UnitType::Occupied),
        "vacant" => Some(UnitType::Vacant),
        _ => None,
    }
}

fn status_synonym(ctx: &FieldContext<'_>) -> Option<UnitType> {
    let caps = ordered_captures(&WEAK_STATUS, ctx.text, ctx.anchor, false);
    let first = caps.first()?;
    if first.get(1).is_some() {
        Some(UnitType::Occupied)
    } else {
        first.get(2).map(|_| UnitType::Vacant)
    }
}

// Area

fn area_candidates(re: &Regex, ctx: &FieldContext<'_>, known_only: bool) -> Option<u32> {
    let config = &ctx.rules.config;
    ordered_captures(re, ctx.text, ctx.anchor, false)
        .iter()
        .filter_map(|caps| caps.get(1))
        .filter(|m| m.start() != ctx.anchor && !is_embedded_number(ctx.text, m.start(), m.end()))
        .filter_map(|m| m.as_str().parse::<u32>().ok())
        .find(|area| config.area_band.contains(*area) && (!known_only || config.known_areas.contains(area)))
}

fn known_area(ctx: &FieldContext<'_>) -> Option<u32> {
    area_candidates(&AREA_NUMBER, ctx, true)
}

fn sqft_suffix(ctx: &FieldContext<'_>) -> Option<u32> {
    area_candidates(&AREA_SQFT, ctx, false)
}

fn generic_area(ctx: &FieldContext<'_>) -> Option<u32> {
    area_candidates(&AREA_GENERIC, ctx, false)
}

// Tenant

fn plausible_name(name: &str, rules: &FieldRules) -> bool {
    if name.chars().count() <= rules.config.min_name_len {
        return false;
    }
    !name
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .any(|w| rules.config.name_stopwords.iter().any(|s| s.eq_ignore_ascii_case(w)))
}

fn name_from(re: &Regex, ctx: &FieldContext<'_>) -> Option<String> {
    ordered_captures(re, ctx.text, ctx.anchor, true)
        .iter()
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .find(|name| plausible_name(name, ctx.rules))
        .map(str::to_string)
}

fn tenant_id(ctx: &FieldContext<'_>) -> Option<String> {
    name_from(&TENANT_ID, ctx)
}

fn last_first(ctx: &FieldContext<'_>) -> Option<String> {
    name_from(&LAST_FIRST, ctx)
}

fn first_last(ctx: &FieldContext<'_>) -> Option<String> {
    name_from(&FIRST_LAST, ctx)
}

// Rent and total

fn parse_money(raw: &str) -> Option<f64> {
    raw.replace(',', "").parse::<f64>().ok()
}

fn money_embedded(text: &str, start: usize, end: usize) -> bool {
    let mut before = text[..start].chars().rev();
    let mut after = text[end..].chars();
    let (prev, prev2) = (before.next(), before.next());
    let next = after.next();
    let digit = |c: Option<char>| c.map_or(false, |c| c.is_ascii_digit());

    prev == Some('/')
        || next == Some('/')
        || digit(next)
        || digit(prev)
        || ((prev == Some(',') || prev == Some('.')) && digit(prev2))
}

/// First in-band figure captured by group 1, in evidence order.
fn first_money(re: &Regex, ctx: &FieldContext<'_>) -> Option<f64> {
    let band = ctx.rules.config.rent_band;
    ordered_captures(re, ctx.text, ctx.anchor, false)
        .iter()
        .filter_map(|caps| caps.get(1))
        .filter(|m| m.start() != ctx.anchor && !money_embedded(ctx.text, m.start(), m.end()))
        .filter_map(|m| parse_money(m.as_str()))
        .find(|value| band.contains(*value))
}

fn keyword_currency(ctx: &FieldContext<'_>) -> Option<f64> {
    [&*KW_BEFORE, &*KW_AFTER, &*DOLLAR, &*DECIMAL]
        .into_iter()
        .find_map(|re| first_money(re, ctx))
}

fn ocr_corrected(ctx: &FieldContext<'_>) -> Option<f64> {
    let corrected = ctx.rules.money_table.apply_to_tokens(ctx.text, is_money_token);
    if corrected == ctx.text {
        return None;
    }
    let fixed = FieldContext::new(&corrected, ctx.anchor, ctx.rules);
    [&*KW_BEFORE, &*DOLLAR, &*DECIMAL]
        .into_iter()
        .find_map(|re| first_money(re, &fixed))
}

fn table_row(ctx: &FieldContext<'_>) -> Option<f64> {
    let config = &ctx.rules.config;
    [&*TABLE_PAIR, &*RENT_WORD, &*AMOUNT_BETWEEN]
        .into_iter()
        .find_map(|re| {
            ordered_captures(re, ctx.text, ctx.anchor, false)
                .iter()
                .flat_map(|caps| caps.iter().skip(1).flatten().collect::<Vec<_>>())
                .filter(|m| !money_embedded(ctx.text, m.start(), m.end()))
                .filter_map(|m| m.as_str().parse::<u32>().ok())
                .find(|value| !config.known_areas.contains(value) && config.rent_band.contains(*value as f64))
                .map(f64::from)
        })
}

fn total_keyword(ctx: &FieldContext<'_>) -> Option<f64> {
    first_money(&TOTAL, ctx)
}

fn record_resolution(diag: &mut Diagnostics, unit: &str, field: &str, strategy: &str) {
    diag.record(TraceEvent::FieldResolved {
        unit: unit.to_string(),
        field: field.to_string(),
        strategy: strategy.to_string(),
    });
}

/// Runs every field cascade for located units.
pub struct FieldExtractor {
    rules: FieldRules,
    status: Cascade<UnitType>,
    area: Cascade<u32>,
    tenant: Cascade<String>,
    rent: Cascade<f64>,
    total: Cascade<f64>,
    dates: Cascade<DateSet>,
}

impl FieldExtractor {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self::with_rules(FieldRules {
            config: config.fields.clone(),
            money_table: config.rent_substitutions()?,
        }))
    }

    pub fn with_rules(rules: FieldRules) -> Self {
        Self {
            rules,
            status: Cascade::new(
                "unit_type",
                vec![
                    Strategy::new("status_keyword", status_keyword),
                    Strategy::new("status_synonym", status_synonym),
                ],
            ),
            area: Cascade::new(
                "area_sqft",
                vec![
                    Strategy::new("known_area", known_area),
                    Strategy::new("sqft_suffix", sqft_suffix),
                    Strategy::new("generic_area", generic_area),
                ],
            ),
            tenant: Cascade::new(
                "tenant_name",
                vec![
                    Strategy::new("tenant_id", tenant_id),
                    Strategy::new("last_first", last_first),
                    Strategy::new("first_last", first_last),
                ],
            ),
            rent: Cascade::new(
                "rent",
                vec![
                    Strategy::new("keyword_currency", keyword_currency),
                    Strategy::new("ocr_corrected", ocr_corrected),
                    Strategy::new("table_row", table_row),
                ],
            ),
            total: Cascade::new("total_amount", vec![Strategy::new("total_keyword", total_keyword)]),
            dates: dates::date_cascade(),
        }
    }

    pub fn rules(&self) -> &FieldRules {
        &self.rules
    }

    /// Build a record from the unit's context window. A rent figure missing
    /// locally is searched for around every occurrence in `page_text`.
    pub fn extract(
        &self,
        located: &LocatedUnit,
        page_text: &str,
        neighbours: &Neighbours,
        diag: &mut Diagnostics,
    ) -> UnitRecord {
        let (segment, anchor) = neighbours.own_segment(&located.context, located.anchor);
        let ctx = FieldContext::new(segment, anchor, &self.rules);
        let mut record = UnitRecord::new(located.unit.clone());
        let unit = located.unit.as_str();

        if let Some(r) = self.status.resolve(&ctx) {
            record_resolution(diag, unit, self.status.field, r.strategy);
            record.unit_type = r.value;
        }
        if let Some(r) = self.area.resolve(&ctx) {
            record_resolution(diag, unit, self.area.field, r.strategy);
            record.area_sqft = r.value;
        }
        if let Some(r) = self.tenant.resolve(&ctx) {
            record_resolution(diag, unit, self.tenant.field, r.strategy);
            record.tenant_name = r.value;
        }

        match self.rent.resolve(&ctx) {
            Some(r) => {
                record_resolution(diag, unit, self.rent.field, r.strategy);
                record.rent = r.value;
            }
            None => {
                let radius = self.rules.config.rent_search_radius;
                if let Some(r) = self.search_rent(unit, page_text, radius, neighbours) {
                    record_resolution(diag, unit, self.rent.field, &format!("document_wide/{}", r.strategy));
                    record.rent = r.value;
                }
            }
        }
        if let Some(r) = self.total.resolve(&ctx) {
            record_resolution(diag, unit, self.total.field, r.strategy);
            record.total_amount = r.value;
        }
        record.equalize_money();

        if let Some(r) = self.resolve_dates(&ctx) {
            record_resolution(diag, unit, self.dates.field, r.strategy);
            r.value.apply_to(&mut record);
        }

        if record.unit_type == UnitType::Vacant && record.tenant_name.is_empty() {
            record.tenant_name = VACANT_TENANT.to_string();
        }

        record
    }

    pub fn resolve_rent(&self, ctx: &FieldContext<'_>) -> Option<Resolved<f64>> {
        self.rent.resolve(ctx)
    }

    pub fn resolve_dates(&self, ctx: &FieldContext<'_>) -> Option<Resolved<DateSet>> {
        dates::resolve_dates(&self.dates, ctx)
    }

    /// Rent cascade over ±radius windows around every occurrence of `unit`;
    /// the first window that yields a value wins.
    pub fn search_rent(
        &self,
        unit: &str,
        text: &str,
        radius: usize,
        neighbours: &Neighbours,
    ) -> Option<Resolved<f64>> {
        let word = unit_word(unit)?;
        windows(&word, text, radius).into_iter().find_map(|(window, anchor)| {
            let (segment, anchor) = neighbours.own_segment(window, anchor);
            self.resolve_rent(&FieldContext::new(segment, anchor, &self.rules))
        })
    }

    /// Date strategies over ±radius windows around every occurrence of `unit`.
    pub fn search_dates(
        &self,
        unit: &str,
        text: &str,
        radius: usize,
        neighbours: &Neighbours,
    ) -> Option<Resolved<DateSet>> {
        let word = unit_word(unit)?;
        windows(&word, text, radius).into_iter().find_map(|(window, anchor)| {
            let (segment, anchor) = neighbours.own_segment(window, anchor);
            self.resolve_dates(&FieldContext::new(segment, anchor, &self.rules))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn extractor() -> FieldExtractor {
        FieldExtractor::new(&PipelineConfig::default()).unwrap()
    }

    fn located(unit: &str, context: &str) -> LocatedUnit {
        LocatedUnit {
            unit: unit.to_string(),
            context: context.to_string(),
            anchor: context.find(unit).unwrap_or(0),
            from_original: true,
        }
    }

    fn extract(unit: &str, context: &str) -> (UnitRecord, Diagnostics) {
        let mut diag = Diagnostics::new();
        let record = extractor().extract(&located(unit, context), context, &Neighbours::default(), &mut diag);
        (record, diag)
    }

    #[test]
    fn test_full_row() {
        let row = "105 Occupied Smith, John 1358 12/7/2023 11/30/2024 12/7/2023 $1,450.00";
        let (record, diag) = extract("105", row);

        assert_eq!(record.unit_type, UnitType::Occupied);
        assert_eq!(record.tenant_name, "Smith, John");
        assert_eq!(record.area_sqft, 1358);
        assert_eq!(record.rent, 1450.0);
        assert_eq!(record.total_amount, 1450.0);
        assert_eq!(record.lease_start, NaiveDate::from_ymd_opt(2023, 12, 7));
        assert_eq!(record.lease_end, NaiveDate::from_ymd_opt(2024, 11, 30));
        assert_eq!(diag.resolutions_for("105", "area_sqft"), vec!["known_area"]);
        assert_eq!(diag.resolutions_for("105", "dates"), vec!["three_date_sequence"]);
    }

    #[test]
    fn test_dollar_figure_without_keyword() {
        let (record, diag) = extract("210", "210 Gomez, Maria $1,500.00");
        assert_eq!(record.rent, 1500.0);
        assert_eq!(record.total_amount, 1500.0);
        assert_eq!(diag.resolutions_for("210", "rent"), vec!["keyword_currency"]);
    }

    #[test]
    fn test_out_of_band_rent_rejected() {
        let (record, _) = extract("112", "112 Rent: $95.00 Deposit $12,500.00");
        assert_eq!(record.rent, 0.0);
    }

    #[test]
    fn test_ocr_corrected_rent() {
        let (record, diag) = extract("120", "120 Rent: $I,2O0.00");
        assert_eq!(record.rent, 1200.0);
        assert_eq!(diag.resolutions_for("120", "rent"), vec!["ocr_corrected"]);
    }

    #[test]
    fn test_table_row_skips_known_area() {
        let (record, diag) = extract("121", "121 1358 1325 250.00");
        assert_eq!(record.rent, 1325.0);
        assert_eq!(diag.resolutions_for("121", "rent"), vec!["table_row"]);
    }

    #[test]
    fn test_separate_total() {
        let (record, _) = extract("107", "107 Rent 1,200.00 Total: 1,275.00");
        assert_eq!(record.rent, 1200.0);
        assert_eq!(record.total_amount, 1275.0);
    }

    #[test]
    fn test_date_digits_are_not_area() {
        let (record, _) = extract("108", "108 Vacant 1/15/2024");
        assert_eq!(record.area_sqft, 0);
        assert_eq!(record.unit_type, UnitType::Vacant);
        assert_eq!(record.tenant_name, VACANT_TENANT);
    }

    #[test]
    fn test_column_headers_are_not_tenants() {
        let (record, _) = extract("109", "Market Rent 109 Occupied Lopez Garcia");
        assert_eq!(record.tenant_name, "Lopez Garcia");
    }

    #[test]
    fn test_tenant_id_anchor() {
        let (record, diag) = extract("110", "110 t0042117 Nguyen, Thanh Occupied");
        assert_eq!(record.tenant_name, "Nguyen, Thanh");
        assert_eq!(diag.resolutions_for("110", "tenant_name"), vec!["tenant_id"]);
    }

    #[test]
    fn test_weak_status_synonym() {
        let (record, diag) = extract("111", "111 available now");
        assert_eq!(record.unit_type, UnitType::Vacant);
        assert_eq!(diag.resolutions_for("111", "unit_type"), vec!["status_synonym"]);
    }

    #[test]
    fn test_rent_searched_across_page() {
        let page = format!("115 Occupied Baker, Ellen{}115 Rent $1,610.00", " ".repeat(400));
        let mut diag = Diagnostics::new();
        let located = located("115", "115 Occupied Baker, Ellen");
        let record = extractor().extract(&located, &page, &Neighbours::default(), &mut diag);
        assert_eq!(record.rent, 1610.0);
        assert_eq!(diag.resolutions_for("115", "rent"), vec!["document_wide/keyword_currency"]);
    }

    #[test]
    fn test_next_row_does_not_bleed_into_unit() {
        let page = "101 Occupied Hale, Nora $1,350.00\n\
                    102 Vacant\n\
                    103 Occupied Ibarra, Luz $1,400.00 4/1/2024 3/31/2025\n\
                    104 Martin, Paul $1,450.00\n\
                    105 Vacant";
        let ids = ["101", "102", "103", "104", "105"];
        let extract_row = |unit: &str| {
            let located = located(unit, page);
            let neighbours = Neighbours::new(unit, ids);
            extractor().extract(&located, page, &neighbours, &mut Diagnostics::new())
        };

        let vacant = extract_row("102");
        assert_eq!(vacant.unit_type, UnitType::Vacant);
        assert_eq!(vacant.rent, 0.0);
        assert_eq!(vacant.lease_start, None);

        let martin = extract_row("104");
        assert_eq!(martin.tenant_name, "Martin, Paul");
        assert_eq!(martin.rent, 1450.0);

        let last = extract_row("105");
        assert_eq!(last.tenant_name, VACANT_TENANT);
        assert_eq!(last.rent, 0.0);
    }
}
