// lopdf helper - document loading and the PageSource implementation
use anyhow::{anyhow, Context, Result};
use image::DynamicImage;
use lopdf::{Document, ObjectId};
use std::path::{Path, PathBuf};
use std::process::Command;

use super::content_stream::{self, TextRun};
use super::document_analyzer::{DocumentAnalyzer, PageFingerprint};
use super::PageSource;
use crate::types::RentRollError;

/// An opened PDF plus the tools needed to render its pages
pub struct LopdfDocument {
    path: PathBuf,
    document: Document,
    pdftoppm: String,
}

impl LopdfDocument {
    /// Load a PDF. This is the only hard failure in the pipeline.
    pub fn open(path: &Path) -> crate::types::Result<Self> {
        let document = Document::load(path).map_err(|e| RentRollError::Open {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            document,
            pdftoppm: "pdftoppm".to_string(),
        })
    }

    pub fn with_rasterizer(mut self, pdftoppm: impl Into<String>) -> Self {
        self.pdftoppm = pdftoppm.into();
        self
    }

    /// Pages in document order
    pub fn pages(&self) -> Vec<LopdfPage<'_>> {
        self.document
            .get_pages()
            .into_iter()
            .map(|(number, id)| LopdfPage::new(self, number, id))
            .collect()
    }
}

pub struct LopdfPage<'a> {
    owner: &'a LopdfDocument,
    number: u32,
    id: ObjectId,
    fingerprint: PageFingerprint,
}

impl<'a> LopdfPage<'a> {
    fn new(owner: &'a LopdfDocument, number: u32, id: ObjectId) -> Self {
        let fingerprint = DocumentAnalyzer::analyze_page(&owner.document, number as usize, id)
            .unwrap_or_else(|e| {
                tracing::warn!(page = number, error = %e, "could not fingerprint page");
                PageFingerprint {
                    page: number as usize,
                    ..PageFingerprint::default()
                }
            });
        Self {
            owner,
            number,
            id,
            fingerprint,
        }
    }
}

impl PageSource for LopdfPage<'_> {
    fn number(&self) -> usize {
        self.number as usize
    }

    fn has_embedded_fonts(&self) -> bool {
        !self.fingerprint.is_scanned()
    }

    fn raw_text(&self) -> Result<String> {
        Ok(self.owner.document.extract_text(&[self.number])?)
    }

    fn text_runs(&self) -> Result<Vec<TextRun>> {
        content_stream::page_runs(&self.owner.document, self.id)
    }

    fn rasterize(&self, zoom: f32) -> Result<DynamicImage> {
        render_page(&self.owner.pdftoppm, &self.owner.path, self.number, zoom)
    }
}

/// Render one page to PNG with pdftoppm and load it.
pub fn render_page(pdftoppm: &str, pdf: &Path, page: u32, zoom: f32) -> Result<DynamicImage> {
    let dpi = (zoom * 72.0).round().max(1.0) as u32;
    let temp_dir = tempfile::tempdir().context("creating render directory")?;
    let prefix = temp_dir.path().join("page");
    let page_arg = page.to_string();

    let output = Command::new(pdftoppm)
        .arg("-png")
        .arg("-r")
        .arg(dpi.to_string())
        .args(["-f", page_arg.as_str(), "-l", page_arg.as_str()])
        .arg("-singlefile")
        .arg(pdf)
        .arg(&prefix)
        .output()
        .with_context(|| format!("failed to run pdftoppm (path='{}')", pdftoppm))?;

    if !output.status.success() {
        return Err(anyhow!(
            "pdftoppm failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        ));
    }

    let rendered = prefix.with_extension("png");
    image::open(&rendered).with_context(|| format!("reading rendered page {}", rendered.display()))
}
