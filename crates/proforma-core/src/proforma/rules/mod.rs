//! Rule-based extractors for proforma header fields.

pub mod fields;
pub mod patterns;

pub use fields::{
    CurrencyField, DateField, ProformaNumberField, SerieField, SupplierField, extract_metadata,
};

/// Trait for field extractors.
pub trait FieldExtractor {
    /// The type of value this extractor produces.
    type Output;

    /// Extract the field from text, `None` when the label is absent.
    fn extract(&self, text: &str) -> Option<Self::Output>;
}
