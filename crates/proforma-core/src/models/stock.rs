//! Stock data extracted from a proforma document.

use serde::{Deserialize, Serialize};

/// Header fields of a proforma.
///
/// Fields that could not be found in the document are empty strings, never
/// absent, so the serialized shape is always the same.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Proforma number (digits only).
    pub proforma_number: String,

    /// Document series.
    pub serie: String,

    /// Issue date as written in the document (D/M/YYYY or D-M-YYYY).
    pub date: String,

    /// Three letter currency code, upper-cased.
    pub currency: String,

    /// Supplier name, rest of the "Furnizor" line.
    pub supplier: String,
}

/// A single stock line taken from the proforma table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StockItem {
    /// Line number from the first table column, verbatim.
    pub line_number: u64,

    /// Item description.
    pub description: String,

    /// Unit of measure, lower-cased.
    pub unit: String,

    /// Quantity as listed.
    pub quantity: f64,

    /// Unit price with the 35% markup, rounded to a multiple of 10.
    pub unit_price: f64,

    /// Unit price with the 70% markup, rounded to a multiple of 10.
    pub value: f64,

    /// VAT cell, passed through as parsed.
    pub vat: f64,
}

/// Everything extracted from one document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractResult {
    pub metadata: Metadata,
    pub items: Vec<StockItem>,
}

impl ExtractResult {
    /// Flatten into one record per item with the header fields repeated,
    /// the shape stock rows are stored in.
    pub fn stock_rows(&self) -> Vec<StockRow<'_>> {
        self.items
            .iter()
            .map(|item| StockRow {
                item,
                metadata: &self.metadata,
            })
            .collect()
    }
}

/// A stock item joined with the document header.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct StockRow<'a> {
    #[serde(flatten)]
    pub item: &'a StockItem,
    #[serde(flatten)]
    pub metadata: &'a Metadata,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_empty_metadata_serializes_as_strings() {
        let result = ExtractResult::default();
        let value = serde_json::to_value(&result).unwrap();

        assert_eq!(
            value,
            json!({
                "metadata": {
                    "proforma_number": "",
                    "serie": "",
                    "date": "",
                    "currency": "",
                    "supplier": ""
                },
                "items": []
            })
        );
    }

    #[test]
    fn test_stock_rows_repeat_metadata() {
        let result = ExtractResult {
            metadata: Metadata {
                proforma_number: "12".to_string(),
                currency: "RON".to_string(),
                ..Default::default()
            },
            items: vec![StockItem {
                line_number: 1,
                description: "Cablu".to_string(),
                unit: "m".to_string(),
                quantity: 2.0,
                unit_price: 140.0,
                value: 170.0,
                vat: 19.0,
            }],
        };

        let rows = serde_json::to_value(result.stock_rows()).unwrap();
        assert_eq!(rows[0]["line_number"], json!(1));
        assert_eq!(rows[0]["proforma_number"], json!("12"));
        assert_eq!(rows[0]["currency"], json!("RON"));
        assert_eq!(rows[0]["unit_price"], json!(140.0));
    }
}
