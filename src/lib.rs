// Rent-roll extraction library
pub mod config;
pub mod diagnostics;
pub mod document_parser;
pub mod pdf_extraction;
pub mod storage;
pub mod types;
pub mod units;

pub use config::PipelineConfig;
pub use document_parser::DocumentParser;
pub use types::{ParsedDocument, RentRollError, Result, UnitRecord, UnitType};
