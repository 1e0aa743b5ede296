// OCR capability: the tesseract CLI behind a small trait
use anyhow::{anyhow, Context, Result};
use image::{DynamicImage, ImageFormat};
use std::process::Command;

/// Stateless image-to-text service. Called once per rasterization profile.
pub trait OcrEngine {
    fn recognize(&self, image: &DynamicImage) -> Result<String>;
}

/// Runs `tesseract <image> stdout -l <lang>` on a temporary PNG.
#[derive(Debug, Clone)]
pub struct TesseractOcr {
    binary: String,
    language: String,
}

impl TesseractOcr {
    pub fn new(binary: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            language: language.into(),
        }
    }

    pub fn is_available(&self) -> bool {
        Command::new(&self.binary)
            .arg("--version")
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }
}

impl Default for TesseractOcr {
    fn default() -> Self {
        Self::new("tesseract", "eng")
    }
}

impl OcrEngine for TesseractOcr {
    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        let file = tempfile::Builder::new()
            .prefix("rentroll-ocr-")
            .suffix(".png")
            .tempfile()
            .context("creating OCR input file")?;
        image
            .save_with_format(file.path(), ImageFormat::Png)
            .context("writing OCR input image")?;

        let output = Command::new(&self.binary)
            .arg(file.path())
            .arg("stdout")
            .arg("-l")
            .arg(&self.language)
            .output()
            .with_context(|| format!("failed to run tesseract (path='{}')", self.binary))?;

        if !output.status.success() {
            return Err(anyhow!(
                "tesseract exited with {}: {}",
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
