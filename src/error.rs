use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Document-level failure codes carried on an `ExtractionResult`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    EmptyFile,
    UnsupportedFormat,
    TableHeaderNotFound,
    NoDataRows,
    PdfExtractionFailed,
    ExcelExtractionFailed,
    TxtExtractionFailed,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmptyFile => "EMPTY_FILE",
            ErrorCode::UnsupportedFormat => "UNSUPPORTED_FORMAT",
            ErrorCode::TableHeaderNotFound => "TABLE_HEADER_NOT_FOUND",
            ErrorCode::NoDataRows => "NO_DATA_ROWS",
            ErrorCode::PdfExtractionFailed => "PDF_EXTRACTION_FAILED",
            ErrorCode::ExcelExtractionFailed => "EXCEL_EXTRACTION_FAILED",
            ErrorCode::TxtExtractionFailed => "TXT_EXTRACTION_FAILED",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failures raised inside a format extractor before they are folded into
/// the result's `error` field.
#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("empty file")]
    EmptyFile,

    #[error("unsupported file type: {file_name}")]
    UnsupportedFormat { file_name: String },

    #[error("no table header found in the first {scanned} rows")]
    TableHeaderNotFound { scanned: usize },

    #[error("no valid data rows")]
    NoDataRows,

    #[error("pdf extraction failed: {reason}")]
    Pdf { reason: String },

    #[error("spreadsheet extraction failed: {reason}")]
    Excel { reason: String },

    #[error("text extraction failed: {reason}")]
    Txt { reason: String },
}

impl ExtractError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ExtractError::EmptyFile => ErrorCode::EmptyFile,
            ExtractError::UnsupportedFormat { .. } => ErrorCode::UnsupportedFormat,
            ExtractError::TableHeaderNotFound { .. } => ErrorCode::TableHeaderNotFound,
            ExtractError::NoDataRows => ErrorCode::NoDataRows,
            ExtractError::Pdf { .. } => ErrorCode::PdfExtractionFailed,
            ExtractError::Excel { .. } => ErrorCode::ExcelExtractionFailed,
            ExtractError::Txt { .. } => ErrorCode::TxtExtractionFailed,
        }
    }
}

impl From<lopdf::Error> for ExtractError {
    fn from(e: lopdf::Error) -> Self {
        ExtractError::Pdf {
            reason: format!("Failed to parse PDF: {e}"),
        }
    }
}

pub type Result<T> = std::result::Result<T, ExtractError>;
