// PDF text acquisition: direct extraction strategies with OCR fallback
pub mod content_stream;
pub mod document_analyzer;
pub mod extraction_router;
pub mod image_enhance;
pub mod lopdf_helper;
pub mod ocr_engine;
pub mod ocr_fallback;

use anyhow::Result;
use image::DynamicImage;

pub use content_stream::TextRun;
pub use extraction_router::{ExtractionCandidate, ExtractionMethod, ExtractionRouter, Selection};
pub use lopdf_helper::{LopdfDocument, LopdfPage};
pub use ocr_engine::{OcrEngine, TesseractOcr};
pub use ocr_fallback::OcrFallback;

/// One page of an opened document, as seen by the extraction pipeline.
pub trait PageSource {
    /// 1-based page number
    fn number(&self) -> usize;

    /// False for image-only pages
    fn has_embedded_fonts(&self) -> bool;

    /// Text from the PDF library's own extractor
    fn raw_text(&self) -> Result<String>;

    /// Positioned text spans in drawing order
    fn text_runs(&self) -> Result<Vec<TextRun>>;

    /// Render the page; `zoom` 1.0 is 72 dpi
    fn rasterize(&self, zoom: f32) -> Result<DynamicImage>;
}
