// Document pipeline: pages in order, units merged, then the consistency pass
use std::collections::btree_map::Entry;
use std::collections::BTreeMap;
use std::path::Path;

use crate::config::PipelineConfig;
use crate::diagnostics::{Diagnostics, TraceEvent};
use crate::pdf_extraction::{ExtractionRouter, LopdfDocument, OcrEngine, OcrFallback, PageSource, TesseractOcr};
use crate::types::{PageReport, ParsedDocument, Result, UnitRecord};
use crate::units::{ConsistencyPass, FieldExtractor, Neighbours, SubstitutionTable, UnitLocator};

pub struct DocumentParser {
    config: PipelineConfig,
    ocr: Box<dyn OcrEngine>,
    unit_table: SubstitutionTable,
    fields: FieldExtractor,
}

/// What one page contributed.
struct PageOutcome {
    report: PageReport,
    text: String,
    units: Vec<UnitRecord>,
}

impl DocumentParser {
    /// Parser backed by the `tesseract` CLI named in the config.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let ocr = TesseractOcr::new(config.ocr.tesseract_path.clone(), config.ocr.language.clone());
        if !ocr.is_available() {
            tracing::warn!(binary = %config.ocr.tesseract_path, "tesseract not found; scanned pages will yield no text");
        }
        Self::with_ocr(config, Box::new(ocr))
    }

    pub fn with_ocr(config: PipelineConfig, ocr: Box<dyn OcrEngine>) -> Result<Self> {
        config.validate()?;
        let unit_table = config.unit_substitutions()?;
        let fields = FieldExtractor::new(&config)?;
        Ok(Self {
            config,
            ocr,
            unit_table,
            fields,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Open a PDF and extract its unit records. Only a document that cannot
    /// be opened is an error.
    pub fn parse_document(&self, path: &Path) -> Result<ParsedDocument> {
        let document = LopdfDocument::open(path)?.with_rasterizer(self.config.ocr.pdftoppm_path.clone());
        let pages = document.pages();
        tracing::info!(file = %path.display(), pages = pages.len(), "parsing document");
        Ok(self.parse_pages(path, &pages))
    }

    /// Run the pipeline over already-opened pages.
    pub fn parse_pages<P: PageSource>(&self, path: &Path, pages: &[P]) -> ParsedDocument {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();

        let locator = UnitLocator::new(&self.config.locator, &self.unit_table, self.config.normalize.scope);
        let fallback = OcrFallback::new(self.ocr.as_ref(), &self.config.ocr);
        let mut diag = Diagnostics::new();

        let mut merged: BTreeMap<String, UnitRecord> = BTreeMap::new();
        let mut reports = Vec::with_capacity(pages.len());
        let mut texts = Vec::with_capacity(pages.len());

        for page in pages {
            let outcome = self.process_page(page, &file_name, &locator, &fallback, &mut diag);

            // First sighting wins; later pages only fill gaps
            for record in outcome.units {
                match merged.entry(record.unit.clone()) {
                    Entry::Occupied(mut existing) => existing.get_mut().fill_missing_from(&record),
                    Entry::Vacant(slot) => {
                        slot.insert(record);
                    }
                }
            }
            reports.push(outcome.report);
            texts.push(outcome.text);
        }

        let document_text = texts.join("\n\n");
        let mut units: Vec<UnitRecord> = merged.into_values().collect();
        ConsistencyPass::new(&self.fields).finalize(&mut units, &document_text, &mut diag);

        let parsed = ParsedDocument::new(path, pages.len(), units, reports, diag);
        tracing::info!(
            file = %parsed.file_name,
            units = parsed.total_units,
            occupied = parsed.occupied_units,
            vacant = parsed.vacant_units,
            "document parsed"
        );
        parsed
    }

    fn process_page(
        &self,
        page: &dyn PageSource,
        file_name: &str,
        locator: &UnitLocator<'_>,
        fallback: &OcrFallback<'_>,
        diag: &mut Diagnostics,
    ) -> PageOutcome {
        diag.record(TraceEvent::PageStarted { page: page.number() });

        let selection = ExtractionRouter::select(page, diag);
        let acquired = fallback.acquire(page, &selection, file_name, diag);

        let located = locator.locate(&acquired.text, diag);
        let ids: Vec<&str> = located.iter().map(|unit| unit.unit.as_str()).collect();
        let units: Vec<UnitRecord> = located
            .iter()
            .map(|unit| {
                let neighbours = Neighbours::new(&unit.unit, ids.iter().copied());
                self.fields.extract(unit, &acquired.text, &neighbours, diag)
            })
            .collect();

        let method = if acquired.from_ocr {
            "ocr".to_string()
        } else {
            selection.method_name().to_string()
        };
        tracing::debug!(page = page.number(), %method, units = units.len(), "page processed");

        PageOutcome {
            report: PageReport {
                page: page.number(),
                method,
                chars: acquired.text.chars().count(),
                scanned: selection.scanned,
                ocr: acquired.trigger,
                units_found: units.len(),
            },
            text: acquired.text,
            units,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UnitRange;
    use crate::pdf_extraction::TextRun;
    use crate::types::UnitType;
    use image::DynamicImage;

    struct TextPage {
        number: usize,
        text: String,
    }

    impl PageSource for TextPage {
        fn number(&self) -> usize {
            self.number
        }
        fn has_embedded_fonts(&self) -> bool {
            true
        }
        fn raw_text(&self) -> anyhow::Result<String> {
            Ok(self.text.clone())
        }
        fn text_runs(&self) -> anyhow::Result<Vec<TextRun>> {
            Ok(Vec::new())
        }
        fn rasterize(&self, _zoom: f32) -> anyhow::Result<DynamicImage> {
            anyhow::bail!("no renderer")
        }
    }

    struct NoOcr;

    impl OcrEngine for NoOcr {
        fn recognize(&self, _image: &DynamicImage) -> anyhow::Result<String> {
            Ok(String::new())
        }
    }

    fn parser() -> DocumentParser {
        let mut config = PipelineConfig::default();
        config.locator.expected_units = vec![UnitRange { start: 101, end: 128 }];
        DocumentParser::with_ocr(config, Box::new(NoOcr)).unwrap()
    }

    fn page(number: usize, body: &str) -> TextPage {
        TextPage {
            number,
            text: format!("RENT ROLL SUMMARY REPORT FOR THE PROPERTY AS OF THE CURRENT PERIOD\n{}", body),
        }
    }

    #[test]
    fn test_units_merged_across_pages() {
        let pages = vec![
            page(1, "Unit 104 Occupied Harris, Jonah $1,275.00 9/1/2023 8/31/2024"),
            page(2, "Unit 104 Occupied Harris, Jonah 1129 sq ft\nUnit 106 Vacant"),
        ];
        let doc = parser().parse_pages(Path::new("roll.pdf"), &pages);

        assert_eq!(doc.total_units, 2);
        let unit = &doc.units[0];
        assert_eq!(unit.unit, "104");
        assert_eq!(unit.rent, 1275.0);
        assert_eq!(unit.area_sqft, 1129);
        assert_eq!(unit.unit_type, UnitType::Occupied);
        assert_eq!(doc.units[1].unit_type, UnitType::Vacant);
        assert_eq!(doc.methods_used(), vec!["direct", "direct"]);
    }

    #[test]
    fn test_thin_page_goes_to_ocr() {
        let pages = vec![TextPage {
            number: 1,
            text: "105 Occupied".to_string(),
        }];
        let doc = parser().parse_pages(Path::new("roll.pdf"), &pages);

        assert_eq!(doc.pages[0].method, "ocr");
        assert_eq!(doc.pages[0].chars, 0);
        assert!(doc.units.is_empty());
    }
}
