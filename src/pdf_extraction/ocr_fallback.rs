// OCR fallback for pages whose direct text cannot be trusted
//
// Each configured profile renders the page at its own zoom, optionally
// enhances it, and runs the OCR engine. Profiles that fail or return too
// little text are dropped. The longest survivor wins unless all survivors
// joined together are meaningfully longer.

use super::extraction_router::Selection;
use super::image_enhance;
use super::ocr_engine::OcrEngine;
use super::PageSource;
use crate::config::{OcrConfig, OcrProfile};
use crate::diagnostics::{Diagnostics, TraceEvent};
use crate::types::OcrTrigger;

pub struct OcrFallback<'a> {
    engine: &'a dyn OcrEngine,
    config: &'a OcrConfig,
}

/// Final text for a page after the OCR decision.
#[derive(Debug, Clone, PartialEq)]
pub struct AcquiredText {
    pub text: String,
    pub trigger: Option<OcrTrigger>,
    /// True when the OCR output replaced the direct text
    pub from_ocr: bool,
}

impl<'a> OcrFallback<'a> {
    pub fn new(engine: &'a dyn OcrEngine, config: &'a OcrConfig) -> Self {
        Self { engine, config }
    }

    /// Why this page needs OCR, if it does.
    pub fn trigger(&self, selection: &Selection, file_name: &str) -> Option<OcrTrigger> {
        if selection.scanned {
            Some(OcrTrigger::Scanned)
        } else if selection.chars() < self.config.min_direct_chars {
            Some(OcrTrigger::InsufficientText)
        } else if self
            .config
            .difficulty_hints
            .iter()
            .any(|hint| !hint.is_empty() && file_name.contains(hint.as_str()))
        {
            Some(OcrTrigger::DifficultyHint)
        } else {
            None
        }
    }

    /// Decide between direct and OCR text for a page.
    pub fn acquire(
        &self,
        page: &dyn PageSource,
        selection: &Selection,
        file_name: &str,
        diag: &mut Diagnostics,
    ) -> AcquiredText {
        let trigger = match self.trigger(selection, file_name) {
            Some(trigger) => trigger,
            None => {
                return AcquiredText {
                    text: selection.text.clone(),
                    trigger: None,
                    from_ocr: false,
                }
            }
        };

        diag.record(TraceEvent::OcrTriggered { trigger });
        tracing::info!(page = page.number(), ?trigger, "running OCR fallback");
        let ocr_text = self.run(page, diag);

        // A hinted page keeps its direct text unless OCR found more
        let use_ocr = match trigger {
            OcrTrigger::DifficultyHint => ocr_text.chars().count() > selection.chars(),
            OcrTrigger::Scanned | OcrTrigger::InsufficientText => true,
        };

        if use_ocr {
            AcquiredText {
                text: ocr_text,
                trigger: Some(trigger),
                from_ocr: true,
            }
        } else {
            AcquiredText {
                text: selection.text.clone(),
                trigger: Some(trigger),
                from_ocr: false,
            }
        }
    }

    /// Run every profile and merge. Never fails; no usable profile gives "".
    pub fn run(&self, page: &dyn PageSource, diag: &mut Diagnostics) -> String {
        let mut kept = Vec::new();

        for profile in &self.config.profiles {
            match self.run_profile(page, profile) {
                Ok(text) => {
                    let chars = text.chars().count();
                    let keep = chars > self.config.min_profile_chars;
                    diag.record(TraceEvent::OcrProfile {
                        profile: profile.name.clone(),
                        chars,
                        kept: keep,
                    });
                    if keep {
                        kept.push(text);
                    }
                }
                Err(e) => {
                    tracing::warn!(page = page.number(), profile = %profile.name, error = %e, "OCR profile failed");
                    diag.record(TraceEvent::OcrProfileFailed {
                        profile: profile.name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        let (text, combined) = merge_results(&kept, self.config.combine_ratio);
        diag.record(TraceEvent::OcrMerged {
            chars: text.chars().count(),
            combined,
        });
        text
    }

    fn run_profile(&self, page: &dyn PageSource, profile: &OcrProfile) -> anyhow::Result<String> {
        let image = page.rasterize(profile.zoom)?;
        let image = if profile.enhance {
            image_enhance::enhance(&image, &self.config.enhance)
        } else {
            image
        };
        self.engine.recognize(&image)
    }
}

/// Longest single result, or all results joined when that is longer than
/// `ratio` times the longest. Returns the text and whether it was joined.
pub fn merge_results(kept: &[String], ratio: f64) -> (String, bool) {
    let longest = kept
        .iter()
        .fold(None::<&String>, |best, t| match best {
            Some(b) if b.chars().count() >= t.chars().count() => Some(b),
            _ => Some(t),
        });

    let Some(longest) = longest else {
        return (String::new(), false);
    };

    let joined = kept.join(" ");
    if joined.chars().count() as f64 > longest.chars().count() as f64 * ratio {
        (joined, true)
    } else {
        (longest.clone(), false)
    }
}
