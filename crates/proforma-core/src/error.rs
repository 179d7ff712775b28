//! Error types for the proforma-core library.

use thiserror::Error;

/// Main error type for the proforma library.
#[derive(Error, Debug)]
pub enum ProformaError {
    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// Line item extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// A page content stream could not be decoded.
    #[error("failed to read page content: {0}")]
    Content(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,
}

/// Errors raised while turning table rows into stock items.
///
/// Unlike header metadata, which falls back to empty strings, these abort
/// the whole extraction.
#[derive(Error, Debug, PartialEq)]
pub enum ExtractionError {
    /// A numeric cell held something that is not a number.
    #[error("invalid number in {field}: {value:?}")]
    InvalidNumber { field: &'static str, value: String },

    /// The line number cell could not be represented as an integer.
    #[error("invalid line number: {0:?}")]
    InvalidLineNumber(String),

    /// A data row is too short for the column layout.
    #[error("malformed row {line}: {columns} columns, at least {required} required")]
    MalformedRow {
        line: String,
        columns: usize,
        required: usize,
    },
}

/// Result type for the proforma library.
pub type Result<T> = std::result::Result<T, ProformaError>;
