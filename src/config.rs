// Configuration for the rent-roll extraction pipeline
//
// Every field has a default, so an empty TOML file (or no file at all) gives
// the stock pipeline. Document-specific tuning such as the expected unit
// domain lives here rather than in pattern code.
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use crate::types::{RentRollError, Result};
use crate::units::normalize::SubstitutionTable;

/// Inclusive numeric band used for sanity checks.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Band<T> {
    pub min: T,
    pub max: T,
}

impl<T: PartialOrd + Copy> Band<T> {
    pub const fn new(min: T, max: T) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, value: T) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Inclusive range of unit numbers, e.g. 101..=128.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
pub struct UnitRange {
    pub start: u16,
    pub end: u16,
}

/// The set of identifiers known in advance for a document type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitDomain {
    ranges: Vec<UnitRange>,
}

impl UnitDomain {
    pub fn new(ranges: Vec<UnitRange>) -> Self {
        Self { ranges }
    }

    pub fn from_ranges(ranges: &[(u16, u16)]) -> Self {
        Self::new(
            ranges
                .iter()
                .map(|&(start, end)| UnitRange { start, end })
                .collect(),
        )
    }

    pub fn contains(&self, unit: u16) -> bool {
        self.ranges.iter().any(|r| unit >= r.start && unit <= r.end)
    }

    /// Number of distinct identifiers in the domain.
    pub fn len(&self) -> usize {
        let mut all: Vec<u16> = self
            .ranges
            .iter()
            .flat_map(|r| r.start..=r.end)
            .collect();
        all.sort_unstable();
        all.dedup();
        all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// How the locator treats bare numbers when no domain is configured.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Strictness {
    /// Only structurally anchored matches are accepted
    #[default]
    Strict,
    /// Any 3-digit number is accepted, including the last-resort scan
    Permissive,
}

/// Where OCR character substitutions are applied.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubstitutionScope {
    /// Only inside whitespace-separated tokens that already contain a digit
    #[default]
    DigitTokens,
    Everywhere,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub locator: LocatorConfig,
    pub fields: FieldConfig,
    pub ocr: OcrConfig,
    pub normalize: NormalizeConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LocatorConfig {
    /// Empty means no domain is known
    pub expected_units: Vec<UnitRange>,
    pub strictness: Strictness,
    /// Found/expected ratio below which the last-resort scan runs
    pub coverage_threshold: f64,
    /// Characters on each side of an identifier occurrence
    pub context_radius: usize,
}

impl Default for LocatorConfig {
    fn default() -> Self {
        Self {
            expected_units: Vec::new(),
            strictness: Strictness::Strict,
            coverage_threshold: 0.9,
            context_radius: 300,
        }
    }
}

impl LocatorConfig {
    pub fn domain(&self) -> Option<UnitDomain> {
        if self.expected_units.is_empty() {
            None
        } else {
            Some(UnitDomain::new(self.expected_units.clone()))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct FieldConfig {
    pub rent_band: Band<f64>,
    pub area_band: Band<u32>,
    /// Floor-plan areas seen in this portfolio, tried before generic patterns
    pub known_areas: Vec<u32>,
    pub year_range: Band<i32>,
    /// Tenant names must be longer than this
    pub min_name_len: usize,
    /// Capitalised words that are column headers, not people
    pub name_stopwords: Vec<String>,
    /// Window used when rent is searched around every occurrence of a unit
    pub rent_search_radius: usize,
    pub completion_rent_radius: usize,
    pub completion_date_radius: usize,
}

impl Default for FieldConfig {
    fn default() -> Self {
        Self {
            rent_band: Band::new(800.0, 5000.0),
            area_band: Band::new(500, 3000),
            known_areas: vec![1358, 1198, 833, 895, 1087, 1129, 2430, 1940, 2470, 1388],
            year_range: Band::new(2010, 2030),
            min_name_len: 5,
            name_stopwords: [
                "Unit", "Units", "Type", "Rent", "Rents", "Market", "Lease", "Total", "Amount",
                "Move", "Date", "Start", "End", "Expiration", "Status", "Tenant", "Resident",
                "Occupied", "Vacant", "Deposit", "Balance", "Charge", "Charges", "Page",
                "Report", "Property", "Building", "Sq", "Ft", "Area", "Notice", "Code",
                "Current", "Future", "Summary", "Roll", "Name", "Other", "Monthly",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            rent_search_radius: 500,
            completion_rent_radius: 600,
            completion_date_radius: 800,
        }
    }
}

/// One rasterization profile for the OCR fallback.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct OcrProfile {
    pub name: String,
    pub zoom: f32,
    #[serde(default)]
    pub enhance: bool,
}

impl OcrProfile {
    pub fn new(name: &str, zoom: f32, enhance: bool) -> Self {
        Self {
            name: name.to_string(),
            zoom,
            enhance,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct EnhanceConfig {
    /// Contrast factor, 1.0 leaves the image unchanged
    pub contrast: f32,
    /// Sharpness factor, 1.0 leaves the image unchanged
    pub sharpness: f32,
    pub unsharp_sigma: f32,
    pub unsharp_threshold: i32,
}

impl Default for EnhanceConfig {
    fn default() -> Self {
        Self {
            contrast: 2.2,
            sharpness: 2.0,
            unsharp_sigma: 1.0,
            unsharp_threshold: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Direct text shorter than this sends the page to OCR
    pub min_direct_chars: usize,
    /// A profile's text is kept only when longer than this
    pub min_profile_chars: usize,
    /// Concatenated profiles win when longer than this multiple of the best one
    pub combine_ratio: f64,
    /// File-name fragments that mark a document as hard to extract
    pub difficulty_hints: Vec<String>,
    pub profiles: Vec<OcrProfile>,
    pub enhance: EnhanceConfig,
    pub tesseract_path: String,
    pub pdftoppm_path: String,
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            min_direct_chars: 100,
            min_profile_chars: 1000,
            combine_ratio: 1.2,
            difficulty_hints: vec!["machine_readable".to_string()],
            profiles: vec![
                OcrProfile::new("standard", 2.0, false),
                OcrProfile::new("high_res_enhanced", 3.0, true),
                OcrProfile::new("medium_res_enhanced", 2.5, true),
            ],
            enhance: EnhanceConfig::default(),
            tesseract_path: "tesseract".to_string(),
            pdftoppm_path: "pdftoppm".to_string(),
            language: "eng".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub scope: SubstitutionScope,
    /// Look-alike fixes applied before unit identifiers are located
    pub unit_substitutions: BTreeMap<String, String>,
    /// Wider table used when re-reading monetary figures
    pub rent_substitutions: BTreeMap<String, String>,
}

fn char_map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            scope: SubstitutionScope::DigitTokens,
            unit_substitutions: char_map(&[
                ("I", "1"), ("l", "1"), ("|", "1"), ("i", "1"),
                ("O", "0"), ("o", "0"), ("Q", "0"),
                ("S", "5"), ("s", "5"),
                ("G", "6"),
                ("T", "7"), ("Z", "7"),
                ("B", "8"), ("R", "8"),
                ("g", "9"), ("q", "9"),
            ]),
            rent_substitutions: char_map(&[
                ("I", "1"), ("l", "1"), ("|", "1"), ("i", "1"), ("!", "1"), ("j", "1"),
                ("O", "0"), ("o", "0"), ("Q", "0"), ("D", "0"), ("U", "0"),
                ("S", "5"), ("s", "5"),
                ("G", "6"), ("b", "6"), ("C", "6"),
                ("T", "7"), ("t", "7"), ("Z", "7"), ("z", "7"), ("L", "7"),
                ("B", "8"), ("R", "8"), ("P", "8"), ("p", "8"),
                ("g", "9"), ("q", "9"), ("y", "9"),
            ]),
        }
    }
}

impl PipelineConfig {
    /// Load from a TOML file (or defaults), then apply environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(p) => {
                let raw = fs::read_to_string(p)?;
                Self::from_toml(&raw)?
            }
            None => Self::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| RentRollError::Config(e.to_string()))
    }

    /// Environment overrides for external tool locations.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup("RENTROLL_TESSERACT") {
            self.ocr.tesseract_path = path;
        }
        if let Some(path) = lookup("RENTROLL_PDFTOPPM") {
            self.ocr.pdftoppm_path = path;
        }
        if let Some(lang) = lookup("RENTROLL_OCR_LANG") {
            self.ocr.language = lang;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for range in &self.locator.expected_units {
            if range.start > range.end {
                return Err(RentRollError::Config(format!(
                    "unit range {}-{} is reversed",
                    range.start, range.end
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.locator.coverage_threshold) {
            return Err(RentRollError::Config(
                "locator.coverage_threshold must be within 0..=1".to_string(),
            ));
        }
        if self.fields.rent_band.min > self.fields.rent_band.max
            || self.fields.area_band.min > self.fields.area_band.max
            || self.fields.year_range.min > self.fields.year_range.max
        {
            return Err(RentRollError::Config("field band has min > max".to_string()));
        }
        if self.ocr.combine_ratio < 1.0 {
            return Err(RentRollError::Config(
                "ocr.combine_ratio must be at least 1.0".to_string(),
            ));
        }
        if let Some(bad) = self.ocr.profiles.iter().find(|p| p.zoom <= 0.0) {
            return Err(RentRollError::Config(format!(
                "OCR profile {} has non-positive zoom",
                bad.name
            )));
        }
        SubstitutionTable::from_map(&self.normalize.unit_substitutions)?;
        SubstitutionTable::from_map(&self.normalize.rent_substitutions)?;
        Ok(())
    }

    pub fn unit_substitutions(&self) -> Result<SubstitutionTable> {
        SubstitutionTable::from_map(&self.normalize.unit_substitutions)
    }

    pub fn rent_substitutions(&self) -> Result<SubstitutionTable> {
        SubstitutionTable::from_map(&self.normalize.rent_substitutions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_toml_gives_defaults() {
        let config = PipelineConfig::from_toml("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert!(config.locator.domain().is_none());
        assert_eq!(config.ocr.profiles.len(), 3);
    }

    #[test]
    fn test_domain_from_toml() {
        let raw = r#"
            [locator]
            strictness = "permissive"
            expected_units = [
                { start = 101, end = 128 },
                { start = 201, end = 227 },
            ]
        "#;
        let config = PipelineConfig::from_toml(raw).unwrap();
        let domain = config.locator.domain().unwrap();
        assert_eq!(domain.len(), 55);
        assert!(domain.contains(128));
        assert!(!domain.contains(129));
        assert!(!domain.contains(999));
        assert_eq!(config.locator.strictness, Strictness::Permissive);
    }

    #[test]
    fn test_overrides() {
        let mut config = PipelineConfig::default();
        config.apply_overrides(|key| match key {
            "RENTROLL_TESSERACT" => Some("/opt/bin/tesseract".to_string()),
            _ => None,
        });
        assert_eq!(config.ocr.tesseract_path, "/opt/bin/tesseract");
        assert_eq!(config.ocr.pdftoppm_path, "pdftoppm");
    }

    #[test]
    fn test_validate_rejects_multi_char_substitution() {
        let mut config = PipelineConfig::default();
        config
            .normalize
            .unit_substitutions
            .insert("I0".to_string(), "10".to_string());
        assert!(matches!(config.validate(), Err(RentRollError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_reversed_range() {
        let mut config = PipelineConfig::default();
        config.locator.expected_units = vec![UnitRange { start: 128, end: 101 }];
        assert!(config.validate().is_err());
    }
}
