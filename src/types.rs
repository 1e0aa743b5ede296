// Core types for rent-roll extraction
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::diagnostics::Diagnostics;

/// Tenant name used for units without an occupant.
pub const VACANT_TENANT: &str = "VACANT";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnitType {
    Occupied,
    Vacant,
    #[default]
    Unknown,
}

impl UnitType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UnitType::Occupied => "Occupied",
            UnitType::Vacant => "Vacant",
            UnitType::Unknown => "Unknown",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "Occupied" => UnitType::Occupied,
            "Vacant" => UnitType::Vacant,
            _ => UnitType::Unknown,
        }
    }
}

impl fmt::Display for UnitType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The four tenancy dates a unit record carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateField {
    LeaseStart,
    LeaseEnd,
    MoveIn,
    MoveOut,
}

impl DateField {
    pub const ALL: [DateField; 4] = [
        DateField::LeaseStart,
        DateField::LeaseEnd,
        DateField::MoveIn,
        DateField::MoveOut,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DateField::LeaseStart => "lease_start",
            DateField::LeaseEnd => "lease_end",
            DateField::MoveIn => "move_in_date",
            DateField::MoveOut => "move_out_date",
        }
    }
}

/// One tenancy extracted from a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub unit: String,
    pub unit_type: UnitType,
    /// Square feet, 0 when unknown
    pub area_sqft: u32,
    pub tenant_name: String,
    pub rent: f64,
    pub total_amount: f64,
    pub lease_start: Option<NaiveDate>,
    pub lease_end: Option<NaiveDate>,
    pub move_in_date: Option<NaiveDate>,
    pub move_out_date: Option<NaiveDate>,
}

impl UnitRecord {
    pub fn new(unit: impl Into<String>) -> Self {
        Self {
            unit: unit.into(),
            unit_type: UnitType::Unknown,
            area_sqft: 0,
            tenant_name: String::new(),
            rent: 0.0,
            total_amount: 0.0,
            lease_start: None,
            lease_end: None,
            move_in_date: None,
            move_out_date: None,
        }
    }

    pub fn date(&self, field: DateField) -> Option<NaiveDate> {
        match field {
            DateField::LeaseStart => self.lease_start,
            DateField::LeaseEnd => self.lease_end,
            DateField::MoveIn => self.move_in_date,
            DateField::MoveOut => self.move_out_date,
        }
    }

    pub fn date_mut(&mut self, field: DateField) -> &mut Option<NaiveDate> {
        match field {
            DateField::LeaseStart => &mut self.lease_start,
            DateField::LeaseEnd => &mut self.lease_end,
            DateField::MoveIn => &mut self.move_in_date,
            DateField::MoveOut => &mut self.move_out_date,
        }
    }

    pub fn has_any_date(&self) -> bool {
        DateField::ALL.iter().any(|f| self.date(*f).is_some())
    }

    pub fn has_rent(&self) -> bool {
        self.rent > 0.0
    }

    pub fn has_tenant(&self) -> bool {
        !self.tenant_name.is_empty() && self.tenant_name != VACANT_TENANT
    }

    /// Copy the one known monetary figure into the other. Returns true if
    /// anything changed.
    pub fn equalize_money(&mut self) -> bool {
        if self.rent > 0.0 && self.total_amount <= 0.0 {
            self.total_amount = self.rent;
            true
        } else if self.total_amount > 0.0 && self.rent <= 0.0 {
            self.rent = self.total_amount;
            true
        } else {
            false
        }
    }

    /// Fill fields that are still at their default from another sighting of
    /// the same unit. Populated fields are never overwritten.
    pub fn fill_missing_from(&mut self, other: &UnitRecord) {
        if self.unit_type == UnitType::Unknown {
            self.unit_type = other.unit_type;
        }
        if self.area_sqft == 0 {
            self.area_sqft = other.area_sqft;
        }
        if self.tenant_name.is_empty() {
            self.tenant_name = other.tenant_name.clone();
        }
        if self.rent <= 0.0 {
            self.rent = other.rent;
        }
        if self.total_amount <= 0.0 {
            self.total_amount = other.total_amount;
        }
        for field in DateField::ALL {
            if self.date(field).is_none() {
                *self.date_mut(field) = other.date(field);
            }
        }
    }
}

/// Why a page was sent to OCR.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OcrTrigger {
    /// Page has no embedded fonts
    Scanned,
    /// Direct extraction produced too little text
    InsufficientText,
    /// File name marks the document as hard to extract
    DifficultyHint,
}

/// Per-page outcome of text acquisition and unit location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageReport {
    pub page: usize,
    pub method: String,
    pub chars: usize,
    pub scanned: bool,
    pub ocr: Option<OcrTrigger>,
    pub units_found: usize,
}

/// Everything recovered from one document, ready for the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedDocument {
    pub file_path: PathBuf,
    pub file_name: String,
    pub page_count: usize,
    pub is_scanned: bool,
    pub units: Vec<UnitRecord>,
    pub total_units: usize,
    pub occupied_units: usize,
    pub vacant_units: usize,
    pub total_rent: f64,
    pub total_area: u64,
    pub pages: Vec<PageReport>,
    pub diagnostics: Diagnostics,
}

impl ParsedDocument {
    pub fn new(
        file_path: &Path,
        page_count: usize,
        units: Vec<UnitRecord>,
        pages: Vec<PageReport>,
        diagnostics: Diagnostics,
    ) -> Self {
        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.pdf")
            .to_string();
        let is_scanned = pages.iter().any(|p| p.scanned);

        let mut doc = Self {
            file_path: file_path.to_path_buf(),
            file_name,
            page_count,
            is_scanned,
            units,
            total_units: 0,
            occupied_units: 0,
            vacant_units: 0,
            total_rent: 0.0,
            total_area: 0,
            pages,
            diagnostics,
        };
        doc.recompute_totals();
        doc
    }

    pub fn recompute_totals(&mut self) {
        self.total_units = self.units.len();
        self.occupied_units = self
            .units
            .iter()
            .filter(|u| u.unit_type == UnitType::Occupied)
            .count();
        self.vacant_units = self
            .units
            .iter()
            .filter(|u| u.unit_type == UnitType::Vacant)
            .count();
        self.total_rent = self.units.iter().map(|u| u.rent).sum();
        self.total_area = self.units.iter().map(|u| u.area_sqft as u64).sum();
    }

    /// Extraction methods chosen per page, in page order.
    pub fn methods_used(&self) -> Vec<&str> {
        self.pages.iter().map(|p| p.method.as_str()).collect()
    }

    pub fn summary_line(&self) -> String {
        format!(
            "{}: {} units ({} occupied, {} vacant), ${} rent",
            self.file_name,
            self.total_units,
            self.occupied_units,
            self.vacant_units,
            format_currency(self.total_rent)
        )
    }
}

/// Formats an amount as `1,234.50`.
pub fn format_currency(amount: f64) -> String {
    let cents = (amount * 100.0).round() as i64;
    let whole = (cents / 100).abs();
    let frac = (cents % 100).abs();

    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if cents < 0 { "-" } else { "" };
    format!("{}{}.{:02}", sign, grouped, frac)
}

// Error types
#[derive(Debug, thiserror::Error)]
pub enum RentRollError {
    #[error("cannot open document {path}: {message}")]
    Open { path: PathBuf, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RentRollError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(y, m, d)
    }

    #[test]
    fn test_fill_missing_keeps_populated_fields() {
        let mut first = UnitRecord::new("105");
        first.rent = 1200.0;
        first.lease_start = date(2023, 1, 1);

        let mut second = UnitRecord::new("105");
        second.rent = 1450.0;
        second.area_sqft = 833;
        second.lease_start = date(2022, 6, 1);
        second.lease_end = date(2023, 12, 31);

        first.fill_missing_from(&second);
        assert_eq!(first.rent, 1200.0);
        assert_eq!(first.area_sqft, 833);
        assert_eq!(first.lease_start, date(2023, 1, 1));
        assert_eq!(first.lease_end, date(2023, 12, 31));
    }

    #[test]
    fn test_totals() {
        let mut a = UnitRecord::new("101");
        a.unit_type = UnitType::Occupied;
        a.rent = 1500.0;
        a.area_sqft = 833;
        let mut b = UnitRecord::new("102");
        b.unit_type = UnitType::Vacant;
        b.area_sqft = 895;

        let doc = ParsedDocument::new(
            Path::new("/tmp/rent_roll.pdf"),
            1,
            vec![a, b],
            vec![],
            Diagnostics::default(),
        );
        assert_eq!(doc.total_units, 2);
        assert_eq!(doc.occupied_units, 1);
        assert_eq!(doc.vacant_units, 1);
        assert_eq!(doc.total_area, 1728);
        assert_eq!(doc.file_name, "rent_roll.pdf");
        assert_eq!(
            doc.summary_line(),
            "rent_roll.pdf: 2 units (1 occupied, 1 vacant), $1,500.00 rent"
        );
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "0.00");
        assert_eq!(format_currency(950.5), "950.50");
        assert_eq!(format_currency(1234567.891), "1,234,567.89");
    }
}
