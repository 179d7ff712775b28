//! One extractor per proforma header field.

use regex::Regex;

use super::FieldExtractor;
use super::patterns::{CURRENCY, DATE, PROFORMA_NUMBER, SERIE, SUPPLIER};
use crate::models::stock::Metadata;

fn first_capture(pattern: &Regex, text: &str) -> Option<String> {
    pattern.captures(text).map(|caps| caps[1].to_string())
}

/// Digit run after "Proforma [nr.]".
pub struct ProformaNumberField;

impl FieldExtractor for ProformaNumberField {
    type Output = String;

    fn extract(&self, text: &str) -> Option<String> {
        first_capture(&PROFORMA_NUMBER, text)
    }
}

/// First non-whitespace token after "Serie".
pub struct SerieField;

impl FieldExtractor for SerieField {
    type Output = String;

    fn extract(&self, text: &str) -> Option<String> {
        first_capture(&SERIE, text)
    }
}

/// Date-shaped token after "Data". Not checked against the calendar.
pub struct DateField;

impl FieldExtractor for DateField {
    type Output = String;

    fn extract(&self, text: &str) -> Option<String> {
        first_capture(&DATE, text)
    }
}

/// Three word characters after "Moneda", upper-cased.
pub struct CurrencyField;

impl FieldExtractor for CurrencyField {
    type Output = String;

    fn extract(&self, text: &str) -> Option<String> {
        first_capture(&CURRENCY, text).map(|code| code.to_uppercase())
    }
}

/// Rest of the "Furnizor" line, trimmed.
pub struct SupplierField;

impl FieldExtractor for SupplierField {
    type Output = String;

    fn extract(&self, text: &str) -> Option<String> {
        first_capture(&SUPPLIER, text).map(|name| name.trim().to_string())
    }
}

/// Extract header metadata from the full document text.
///
/// Missing labels leave their field empty; this never fails.
pub fn extract_metadata(text: &str) -> Metadata {
    Metadata {
        proforma_number: ProformaNumberField.extract(text).unwrap_or_default(),
        serie: SerieField.extract(text).unwrap_or_default(),
        date: DateField.extract(text).unwrap_or_default(),
        currency: CurrencyField.extract(text).unwrap_or_default(),
        supplier: SupplierField.extract(text).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extract_metadata_literal() {
        let text = r#"
            Proforma nr. 1234
            Serie: ABC-9
            Data: 07/03/2024
            Moneda: EUR
            Furnizor: Acme SRL
        "#;

        assert_eq!(
            extract_metadata(text),
            Metadata {
                proforma_number: "1234".to_string(),
                serie: "ABC-9".to_string(),
                date: "07/03/2024".to_string(),
                currency: "EUR".to_string(),
                supplier: "Acme SRL".to_string(),
            }
        );
    }

    #[test]
    fn test_no_labels_gives_empty_fields() {
        let metadata = extract_metadata("Factura fiscala\nTotal 100,00\n");
        assert_eq!(metadata, Metadata::default());
    }

    #[test]
    fn test_proforma_number() {
        assert_eq!(ProformaNumberField.extract("PROFORMA NR: 77"), Some("77".to_string()));
        assert_eq!(ProformaNumberField.extract("Proforma nr.-0042 din"), Some("0042".to_string()));
        assert_eq!(ProformaNumberField.extract("Proforma 15"), Some("15".to_string()));
        assert_eq!(ProformaNumberField.extract("Proforma nr. ABC"), None);
    }

    #[test]
    fn test_serie_takes_one_token() {
        assert_eq!(SerieField.extract("serie - PF/2024 nr 3"), Some("PF/2024".to_string()));
    }

    #[test]
    fn test_date_shapes() {
        assert_eq!(DateField.extract("Data: 7-3-2024"), Some("7-3-2024".to_string()));
        assert_eq!(DateField.extract("data 31/12/2023"), Some("31/12/2023".to_string()));
        // Shape only, not a calendar check.
        assert_eq!(DateField.extract("Data: 45/99/2024"), Some("45/99/2024".to_string()));
        assert_eq!(DateField.extract("Data: 2024-03-07"), None);
    }

    #[test]
    fn test_currency_is_uppercased() {
        assert_eq!(CurrencyField.extract("moneda: ron"), Some("RON".to_string()));
        assert_eq!(CurrencyField.extract("Moneda: E"), None);
    }

    #[test]
    fn test_supplier_stops_at_line_end() {
        let text = "Furnizor:   Electro Grup SRL   \nCUI: RO123";
        assert_eq!(SupplierField.extract(text), Some("Electro Grup SRL".to_string()));
    }

    #[test]
    fn test_first_match_wins() {
        let text = "Moneda: EUR\nMoneda: RON";
        assert_eq!(CurrencyField.extract(text), Some("EUR".to_string()));
    }

    #[test]
    fn test_labels_match_anywhere_in_text() {
        let text = "Cumparator X\nDetalii Furnizor: Beta SA";
        assert_eq!(extract_metadata(text).supplier, "Beta SA");
    }
}
