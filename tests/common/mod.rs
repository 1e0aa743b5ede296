// Shared fakes for the integration tests
#![allow(dead_code)]

use image::DynamicImage;
use rentroll::config::{PipelineConfig, UnitRange};
use rentroll::pdf_extraction::{OcrEngine, PageSource, TextRun};
use rentroll::DocumentParser;
use std::cell::RefCell;

/// A page whose direct text is fixed. Rasterized width encodes the zoom.
pub struct FakePage {
    pub number: usize,
    pub text: String,
    pub fonts: bool,
}

impl FakePage {
    pub fn text(number: usize, body: &str) -> Self {
        Self {
            number,
            text: format!("{}\n{}", HEADER, body),
            fonts: true,
        }
    }

    pub fn scanned(number: usize) -> Self {
        Self {
            number,
            text: String::new(),
            fonts: false,
        }
    }
}

pub const HEADER: &str = "RENT ROLL DETAIL - SUNSET TERRACE APARTMENTS - AS OF PERIOD END - ALL UNITS LISTED BELOW";

impl PageSource for FakePage {
    fn number(&self) -> usize {
        self.number
    }

    fn has_embedded_fonts(&self) -> bool {
        self.fonts
    }

    fn raw_text(&self) -> anyhow::Result<String> {
        Ok(self.text.clone())
    }

    fn text_runs(&self) -> anyhow::Result<Vec<TextRun>> {
        Ok(Vec::new())
    }

    fn rasterize(&self, zoom: f32) -> anyhow::Result<DynamicImage> {
        Ok(DynamicImage::new_luma8((zoom * 10.0) as u32, 4))
    }
}

/// Returns `text` for images of one width and nothing for the rest.
pub struct ScriptedOcr {
    pub width: u32,
    pub text: String,
    pub calls: RefCell<usize>,
}

impl ScriptedOcr {
    pub fn new(width: u32, text: impl Into<String>) -> Self {
        Self {
            width,
            text: text.into(),
            calls: RefCell::new(0),
        }
    }
}

impl OcrEngine for ScriptedOcr {
    fn recognize(&self, image: &DynamicImage) -> anyhow::Result<String> {
        *self.calls.borrow_mut() += 1;
        if image.width() == self.width {
            Ok(self.text.clone())
        } else {
            Ok(String::new())
        }
    }
}

pub fn domain_config() -> PipelineConfig {
    let mut config = PipelineConfig::default();
    config.locator.expected_units = vec![
        UnitRange { start: 101, end: 128 },
        UnitRange { start: 201, end: 227 },
    ];
    config
}

pub fn parser_with(config: PipelineConfig, ocr: ScriptedOcr) -> DocumentParser {
    DocumentParser::with_ocr(config, Box::new(ocr)).unwrap()
}

pub fn parser() -> DocumentParser {
    parser_with(domain_config(), ScriptedOcr::new(0, ""))
}
