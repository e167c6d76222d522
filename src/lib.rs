// src/lib.rs

pub mod config;
pub mod convert;
pub mod dispatch;
pub mod error;
pub mod heuristics;
pub mod pdf_extract;
pub mod sheet_extract;
pub mod text_extract;

pub use config::Config;
pub use convert::{ConversionOutcome, revalidate};
pub use dispatch::{SourceFormat, extract_document, extract_document_with};
pub use error::{ErrorCode, ExtractError};
pub use heuristics::rules::Policy;
pub use heuristics::{ExtractionResult, OrderLineRecord};
