//! Stock line items from proforma table rows.

use tracing::trace;

use crate::error::ExtractionError;
use crate::models::stock::StockItem;
use crate::pdf::Table;

/// Markup applied to the listed price for the unit price.
pub const UNIT_PRICE_MARKUP: f64 = 1.35;

/// Markup applied to the listed price for the value.
pub const VALUE_MARKUP: f64 = 1.70;

/// Column positions of the stock table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub line_number: usize,
    pub description: usize,
    pub unit: usize,
    pub quantity: usize,
    pub price: usize,
    pub vat: usize,
}

impl ColumnLayout {
    /// Layout of the supplier's proforma: nr, description, unit, quantity,
    /// price, three unused columns, VAT.
    pub const PROFORMA: Self = Self {
        line_number: 0,
        description: 1,
        unit: 2,
        quantity: 3,
        price: 4,
        vat: 8,
    };

    /// Minimum number of cells a data row needs.
    pub const fn required_columns(&self) -> usize {
        let mut max = self.line_number;
        let others = [self.description, self.unit, self.quantity, self.price, self.vat];
        let mut i = 0;
        while i < others.len() {
            if others[i] > max {
                max = others[i];
            }
            i += 1;
        }
        max + 1
    }
}

const _: () = assert!(ColumnLayout::PROFORMA.required_columns() == 9);

/// Whether a row is a data row: its first cell, trimmed, is a non-empty run
/// of ASCII digits. Header, subtotal and blank rows fail this.
pub fn is_data_row(row: &[Option<String>]) -> bool {
    match row.first() {
        Some(Some(cell)) => {
            let cell = cell.trim();
            !cell.is_empty() && cell.bytes().all(|b| b.is_ascii_digit())
        }
        _ => false,
    }
}

/// The data rows of a table, in order.
pub fn data_rows(table: &Table) -> impl Iterator<Item = &Vec<Option<String>>> {
    table.rows().iter().filter(|row| is_data_row(row))
}

/// Parse a numeric cell. Absent and empty cells are zero; a decimal comma
/// is accepted. NaN and infinities are rejected, including literals that
/// overflow to infinity.
pub fn parse_number(cell: Option<&str>, field: &'static str) -> Result<f64, ExtractionError> {
    let raw = match cell {
        None | Some("") => return Ok(0.0),
        Some(raw) => raw,
    };

    raw.replace(',', ".")
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ExtractionError::InvalidNumber {
            field,
            value: raw.to_string(),
        })
}

/// Apply a markup and round to the nearest multiple of 10, halves to even.
pub fn apply_markup(price: f64, markup: f64) -> f64 {
    (price * markup / 10.0).round_ties_even() * 10.0
}

/// Turns table rows into stock items for a given column layout.
#[derive(Debug, Clone, Copy)]
pub struct ItemExtractor {
    layout: ColumnLayout,
}

impl Default for ItemExtractor {
    fn default() -> Self {
        Self::new(ColumnLayout::PROFORMA)
    }
}

impl ItemExtractor {
    pub fn new(layout: ColumnLayout) -> Self {
        Self { layout }
    }

    /// Items from every data row of the table; other rows are skipped.
    pub fn extract(&self, table: &Table) -> Result<Vec<StockItem>, ExtractionError> {
        data_rows(table).map(|row| self.extract_row(row)).collect()
    }

    /// Build one item from a data row.
    pub fn extract_row(&self, row: &[Option<String>]) -> Result<StockItem, ExtractionError> {
        let layout = &self.layout;
        let cell = |index: usize| row.get(index).and_then(|c| c.as_deref());

        let line = cell(layout.line_number).unwrap_or_default().trim();
        let required = layout.required_columns();
        if row.len() < required {
            return Err(ExtractionError::MalformedRow {
                line: line.to_string(),
                columns: row.len(),
                required,
            });
        }

        let line_number = line
            .parse::<u64>()
            .map_err(|_| ExtractionError::InvalidLineNumber(line.to_string()))?;
        let price = parse_number(cell(layout.price), "price")?;
        let value = apply_markup(price, VALUE_MARKUP);
        if !value.is_finite() {
            return Err(ExtractionError::InvalidNumber {
                field: "price",
                value: cell(layout.price).unwrap_or_default().to_string(),
            });
        }

        let item = StockItem {
            line_number,
            description: cell(layout.description).unwrap_or_default().trim().to_string(),
            unit: cell(layout.unit).unwrap_or_default().trim().to_lowercase(),
            quantity: parse_number(cell(layout.quantity), "quantity")?,
            unit_price: apply_markup(price, UNIT_PRICE_MARKUP),
            value,
            vat: parse_number(cell(layout.vat), "vat")?,
        };
        trace!("Row {}: {:?}", line_number, item);
        Ok(item)
    }
}
