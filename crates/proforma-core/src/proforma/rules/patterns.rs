//! Label-anchored regex patterns for proforma header fields.
//!
//! Every pattern is case-insensitive and searched over the whole document
//! text; the first match wins.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // "Proforma nr. 1234", "Proforma 1234"
    pub static ref PROFORMA_NUMBER: Regex = Regex::new(
        r"(?i)Proforma\s+(?:nr\.?\s*)?[:\-]?\s*(\d+)"
    ).unwrap();

    // "Serie: ABC-9"
    pub static ref SERIE: Regex = Regex::new(
        r"(?i)Serie\s*[:\-]?\s*(\S+)"
    ).unwrap();

    // "Data: 07/03/2024", "Data 7-3-2024"
    pub static ref DATE: Regex = Regex::new(
        r"(?i)Data\s*[:\-]?\s*(\d{1,2}[-/]\d{1,2}[-/]\d{4})"
    ).unwrap();

    // "Moneda: eur"
    pub static ref CURRENCY: Regex = Regex::new(
        r"(?i)Moneda\s*[:\-]?\s*(\w{3})"
    ).unwrap();

    // "Furnizor: Acme SRL" up to the end of the line
    pub static ref SUPPLIER: Regex = Regex::new(
        r"(?i)Furnizor\s*[:\-]?\s*(.+)"
    ).unwrap();
}
