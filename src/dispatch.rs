// src/dispatch.rs

use crate::error::{ErrorCode, ExtractError, Result};
use crate::heuristics::normalize::normalize;
use crate::heuristics::rules::Policy;
use crate::heuristics::{CandidateRecord, ExtractionResult, ResultMeta};
use crate::pdf_extract::PdfExtractor;
use crate::sheet_extract::SheetExtractor;
use crate::text_extract::TextExtractor;
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use tracing::{error, info, info_span, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Pdf,
    Spreadsheet,
    Text,
}

impl SourceFormat {
    /// Pick the format from the file-name suffix, ignoring case.
    pub fn from_file_name(file_name: &str) -> Option<Self> {
        let (_, ext) = file_name.trim().rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "pdf" => Some(SourceFormat::Pdf),
            "xls" | "xlsx" => Some(SourceFormat::Spreadsheet),
            "txt" => Some(SourceFormat::Text),
            _ => None,
        }
    }

    /// Code reported when this format's reader gives up.
    pub fn failure_code(&self) -> ErrorCode {
        match self {
            SourceFormat::Pdf => ErrorCode::PdfExtractionFailed,
            SourceFormat::Spreadsheet => ErrorCode::ExcelExtractionFailed,
            SourceFormat::Text => ErrorCode::TxtExtractionFailed,
        }
    }
}

pub fn detect_format(file_name: &str) -> Result<SourceFormat> {
    SourceFormat::from_file_name(file_name).ok_or_else(|| ExtractError::UnsupportedFormat {
        file_name: file_name.to_string(),
    })
}

/// What a format reader hands to the normalizer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedDocument {
    pub customer_name: String,
    pub records: Vec<CandidateRecord>,
}

/// One reader per source format.
pub trait FormatExtractor {
    fn format(&self) -> SourceFormat;

    fn extract(&self, bytes: &[u8], policy: &Policy) -> Result<ExtractedDocument>;
}

pub fn extractor_for(format: SourceFormat) -> &'static dyn FormatExtractor {
    match format {
        SourceFormat::Pdf => &PdfExtractor,
        SourceFormat::Spreadsheet => &SheetExtractor,
        SourceFormat::Text => &TextExtractor,
    }
}

/// Extract one document with the default policy.
pub fn extract_document(bytes: &[u8], file_name: &str) -> ExtractionResult {
    extract_document_with(bytes, file_name, &Policy::default())
}

/// Extract one document. Every failure, including a panic inside a decoding
/// library, comes back as an error code on the result.
pub fn extract_document_with(bytes: &[u8], file_name: &str, policy: &Policy) -> ExtractionResult {
    let span = info_span!("extract", file = %file_name, bytes = bytes.len());
    let _enter = span.enter();

    let mut meta = ResultMeta {
        file_name: file_name.to_string(),
        ..Default::default()
    };

    let format = match detect_format(file_name) {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, "rejected");
            return ExtractionResult::failed(meta, e.code());
        }
    };
    meta.source_format = Some(format);

    if bytes.is_empty() {
        warn!("empty upload");
        return ExtractionResult::failed(meta, ErrorCode::EmptyFile);
    }

    let extractor = extractor_for(format);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| extractor.extract(bytes, policy)));
    let doc = match outcome {
        Ok(Ok(doc)) => doc,
        Ok(Err(e)) => {
            warn!(error = %e, code = %e.code(), "extraction failed");
            return ExtractionResult::failed(meta, e.code());
        }
        Err(_) => {
            error!(format = ?format, "reader panicked");
            return ExtractionResult::failed(meta, format.failure_code());
        }
    };

    info!(
        format = ?extractor.format(),
        customer = %doc.customer_name,
        candidates = doc.records.len(),
        "document read"
    );
    meta.customer_name = doc.customer_name;
    normalize(meta, doc.records)
}
