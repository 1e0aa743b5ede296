// Text acquisition strategy selection
//
// Every strategy runs against the page and the richest candidate wins:
// highest character count, ties going to the earlier strategy in
// `ExtractionMethod::ALL`. A failing strategy is recorded and skipped.

use std::collections::BTreeMap;
use std::fmt;

use super::content_stream::TextRun;
use super::PageSource;
use crate::diagnostics::{Diagnostics, TraceEvent};

/// Direct extraction strategies, in tie-break order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtractionMethod {
    Direct,  // library text extraction
    Blocks,  // one line per BT/ET text object
    Dict,    // spans grouped into lines
    Spatial, // words placed by position
}

impl ExtractionMethod {
    pub const ALL: [ExtractionMethod; 4] = [
        ExtractionMethod::Direct,
        ExtractionMethod::Blocks,
        ExtractionMethod::Dict,
        ExtractionMethod::Spatial,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ExtractionMethod::Direct => "direct",
            ExtractionMethod::Blocks => "blocks",
            ExtractionMethod::Dict => "dict",
            ExtractionMethod::Spatial => "spatial",
        }
    }
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One strategy's output for a page
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionCandidate {
    pub method: ExtractionMethod,
    pub text: String,
    pub chars: usize,
}

impl ExtractionCandidate {
    pub fn new(method: ExtractionMethod, text: String) -> Self {
        let chars = text.chars().count();
        Self { method, text, chars }
    }
}

/// Outcome of text acquisition for one page
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// None when every strategy failed
    pub method: Option<ExtractionMethod>,
    pub text: String,
    pub scanned: bool,
}

impl Selection {
    pub fn chars(&self) -> usize {
        self.text.chars().count()
    }

    pub fn method_name(&self) -> &'static str {
        self.method.map(|m| m.name()).unwrap_or("none")
    }
}

pub struct ExtractionRouter;

impl ExtractionRouter {
    /// Run all strategies on a page and keep the richest.
    pub fn select(page: &dyn PageSource, diag: &mut Diagnostics) -> Selection {
        let scanned = !page.has_embedded_fonts();
        let candidates = Self::candidates(page, diag);

        match Self::richest(candidates) {
            Some(best) => {
                diag.record(TraceEvent::MethodSelected {
                    strategy: best.method.name().to_string(),
                    chars: best.chars,
                });
                Selection {
                    method: Some(best.method),
                    text: best.text,
                    scanned,
                }
            }
            None => Selection {
                method: None,
                text: String::new(),
                scanned,
            },
        }
    }

    /// Candidates from every strategy that did not fail, in declaration order.
    pub fn candidates(page: &dyn PageSource, diag: &mut Diagnostics) -> Vec<ExtractionCandidate> {
        // Layout strategies share one pass over the content stream
        let runs = page.text_runs();
        let mut candidates = Vec::with_capacity(ExtractionMethod::ALL.len());

        for method in ExtractionMethod::ALL {
            let outcome: Result<String, String> = match method {
                ExtractionMethod::Direct => page.raw_text().map_err(|e| e.to_string()),
                _ => match &runs {
                    Ok(runs) => Ok(layout_text(method, runs)),
                    Err(e) => Err(e.to_string()),
                },
            };

            match outcome {
                Ok(text) => {
                    let candidate = ExtractionCandidate::new(method, text);
                    diag.record(TraceEvent::CandidateMeasured {
                        strategy: method.name().to_string(),
                        chars: candidate.chars,
                    });
                    candidates.push(candidate);
                }
                Err(error) => {
                    tracing::debug!(page = page.number(), strategy = %method, %error, "strategy failed");
                    diag.record(TraceEvent::StrategyFailed {
                        strategy: method.name().to_string(),
                        error,
                    });
                }
            }
        }

        candidates
    }

    /// Highest character count; the first declared wins ties.
    pub fn richest(candidates: Vec<ExtractionCandidate>) -> Option<ExtractionCandidate> {
        candidates.into_iter().fold(None, |best, c| match best {
            Some(b) if b.chars >= c.chars => Some(b),
            _ => Some(c),
        })
    }
}

fn layout_text(method: ExtractionMethod, runs: &[TextRun]) -> String {
    match method {
        ExtractionMethod::Blocks => blocks_text(runs),
        ExtractionMethod::Dict => dict_text(runs),
        ExtractionMethod::Spatial => spatial_text(runs),
        ExtractionMethod::Direct => String::new(),
    }
}

/// One output line per text object.
pub fn blocks_text(runs: &[TextRun]) -> String {
    let mut blocks: Vec<(usize, Vec<&str>)> = Vec::new();
    for run in runs {
        match blocks.last_mut() {
            Some((block, parts)) if *block == run.block => parts.push(run.text.trim()),
            _ => blocks.push((run.block, vec![run.text.trim()])),
        }
    }
    blocks
        .iter()
        .map(|(_, parts)| parts.join(" "))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Spans sharing a baseline within a text object form a line.
pub fn dict_text(runs: &[TextRun]) -> String {
    let mut lines: Vec<String> = Vec::new();
    let mut last: Option<(usize, f32)> = None;

    for run in runs {
        let same_line = matches!(last, Some((block, y)) if block == run.block && (y - run.y).abs() < 0.5);
        match lines.last_mut() {
            Some(line) if same_line => {
                line.push(' ');
                line.push_str(run.text.trim());
            }
            _ => lines.push(run.text.trim().to_string()),
        }
        last = Some((run.block, run.y));
    }

    lines.join("\n")
}

/// Words bucketed into 3pt bands, top to bottom then left to right.
pub fn spatial_text(runs: &[TextRun]) -> String {
    // Key is negated so the map iterates top of page first
    let mut lines: BTreeMap<i64, Vec<(f32, &str)>> = BTreeMap::new();
    for run in runs {
        let key = ((run.y / 3.0).round() * 3.0) as i64;
        lines.entry(-key).or_default().push((run.x, run.text.trim()));
    }

    lines
        .into_values()
        .map(|mut words| {
            words.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
            words.iter().map(|(_, w)| *w).collect::<Vec<_>>().join(" ")
        })
        .collect::<Vec<_>>()
        .join("\n")
}
