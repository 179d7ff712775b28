//! PDF processing module.

mod content;
mod document;
mod fonts;
mod table;

#[cfg(test)]
pub(crate) mod testing;

pub use content::{Char, PageContent, Segment, chars_to_text};
pub use document::{PdfDocument, PdfPage};
pub use table::{CellBox, Table, TableFinder, TableSettings};

use crate::error::PdfError;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;
