//! Proforma stock extraction: header metadata and priced line items.

pub mod items;
mod parser;
pub mod rules;

pub use items::{ColumnLayout, ItemExtractor};
pub use parser::{StockExtractor, extract_stock};
pub use rules::extract_metadata;
