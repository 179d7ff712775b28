//! Document level extraction pipeline.

use std::time::Instant;

use tracing::{debug, info};

use super::items::ItemExtractor;
use super::rules::extract_metadata;
use crate::error::Result;
use crate::models::stock::ExtractResult;
use crate::pdf::{PdfDocument, TableSettings};

/// Extracts metadata and stock items from proforma PDFs.
///
/// Metadata comes from the text of all pages; items come from the ruled
/// table of each page, in page order.
#[derive(Debug, Clone, Default)]
pub struct StockExtractor {
    settings: TableSettings,
    items: ItemExtractor,
}

impl StockExtractor {
    /// Create an extractor with default table settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom table detection settings.
    pub fn with_table_settings(mut self, settings: TableSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Parse the bytes as a PDF and extract from it.
    pub fn extract_bytes(&self, data: &[u8]) -> Result<ExtractResult> {
        let pdf = PdfDocument::open(data)?;
        self.extract(&pdf)
    }

    /// Extract from an opened document.
    pub fn extract(&self, pdf: &PdfDocument) -> Result<ExtractResult> {
        let start = Instant::now();

        let text = pdf.full_text();
        let metadata = extract_metadata(&text);
        debug!("Metadata: {:?}", metadata);

        let mut items = Vec::new();
        for page in pdf.pages() {
            let Some(table) = page.extract_table(&self.settings) else {
                debug!("Page {} has no table", page.number());
                continue;
            };
            let page_items = self.items.extract(&table)?;
            debug!("Page {}: {} items", page.number(), page_items.len());
            items.extend(page_items);
        }

        info!(
            "Extracted {} items from {} pages in {}ms",
            items.len(),
            pdf.page_count(),
            start.elapsed().as_millis()
        );

        Ok(ExtractResult { metadata, items })
    }
}

/// Extract stock from PDF bytes with default settings.
pub fn extract_stock(data: &[u8]) -> Result<ExtractResult> {
    StockExtractor::new().extract_bytes(data)
}
