//! Core library for proforma stock extraction.
//!
//! This crate provides:
//! - PDF processing (page text and ruled-line table detection)
//! - Header metadata extraction (proforma number, serie, date, currency, supplier)
//! - Stock line item extraction with the fixed price markups
//! - Configuration and data models shared by the CLI and HTTP service

pub mod error;
pub mod models;
pub mod pdf;
pub mod proforma;

pub use error::{ExtractionError, PdfError, ProformaError, Result};
pub use models::config::{ProformaConfig, ServerConfig};
pub use models::stock::{ExtractResult, Metadata, StockItem};
pub use pdf::{PdfDocument, PdfPage, Table, TableSettings};
pub use proforma::{StockExtractor, extract_metadata, extract_stock};
