//! Glyph decoding for text found in page content streams.
//!
//! Only what table detection needs: character codes to Unicode (through the
//! font's ToUnicode CMap when present) and glyph advance widths.

use std::collections::HashMap;

use lopdf::{Dictionary, Document, Object};
use tracing::{trace, warn};

use super::content::number;

/// Width used when a font carries no metrics (standard 14 fonts).
const FALLBACK_WIDTH: f64 = 500.0;

/// Largest two-byte character code.
const MAX_CID: u32 = 0xFFFF;

/// A decoded glyph.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Glyph {
    /// Unicode text for the glyph (may be several chars, may be empty).
    pub text: String,
    /// Advance in thousandths of text space.
    pub width: f64,
    /// Whether this is the single-byte code 32, which receives word spacing.
    pub is_space: bool,
}

/// Decoder for one font resource.
#[derive(Debug, Clone)]
pub(crate) struct FontDecoder {
    two_byte: bool,
    unicode: HashMap<u32, String>,
    first_char: u32,
    widths: Vec<f64>,
    cid_widths: HashMap<u32, f64>,
    default_width: f64,
}

impl FontDecoder {
    /// Decoder for text shown before any usable `Tf`.
    pub fn fallback() -> Self {
        Self {
            two_byte: false,
            unicode: HashMap::new(),
            first_char: 0,
            widths: Vec::new(),
            cid_widths: HashMap::new(),
            default_width: FALLBACK_WIDTH,
        }
    }

    /// Build a decoder from a font dictionary.
    pub fn from_dict(doc: &Document, font: &Dictionary) -> Self {
        let mut decoder = Self::fallback();

        let subtype = font
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .unwrap_or(b"Type1");
        decoder.two_byte = subtype == b"Type0";

        if let Some(map) = unicode_map(doc, font) {
            decoder.unicode = map;
        }

        if decoder.two_byte {
            decoder.default_width = 1000.0;
            if let Some(descendant) = first_descendant(doc, font) {
                if let Some(dw) = resolve(doc, descendant.get(b"DW").ok()).and_then(number) {
                    decoder.default_width = dw;
                }
                if let Some(Object::Array(w)) = resolve(doc, descendant.get(b"W").ok()) {
                    decoder.cid_widths = parse_cid_widths(doc, w);
                }
            }
        } else {
            decoder.first_char = resolve(doc, font.get(b"FirstChar").ok())
                .and_then(number)
                .map(|n| n.max(0.0) as u32)
                .unwrap_or(0);
            if let Some(Object::Array(widths)) = resolve(doc, font.get(b"Widths").ok()) {
                decoder.widths = widths
                    .iter()
                    .map(|w| resolve(doc, Some(w)).and_then(number).unwrap_or(FALLBACK_WIDTH))
                    .collect();
            }
        }

        trace!(
            "Font decoder: two_byte={}, {} unicode entries, {} widths",
            decoder.two_byte,
            decoder.unicode.len(),
            decoder.widths.len() + decoder.cid_widths.len()
        );
        decoder
    }

    /// Split a shown string into glyphs.
    pub fn glyphs(&self, bytes: &[u8]) -> Vec<Glyph> {
        if self.two_byte {
            bytes
                .chunks(2)
                .map(|pair| {
                    let code = pair
                        .iter()
                        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b));
                    Glyph {
                        text: self.decode_code(code),
                        width: self.width(code),
                        is_space: false,
                    }
                })
                .collect()
        } else {
            bytes
                .iter()
                .map(|&b| {
                    let code = u32::from(b);
                    Glyph {
                        text: self.decode_code(code),
                        width: self.width(code),
                        is_space: b == b' ',
                    }
                })
                .collect()
        }
    }

    fn decode_code(&self, code: u32) -> String {
        if let Some(text) = self.unicode.get(&code) {
            return text.clone();
        }
        // Without a map, Identity codes and Latin-1 bytes both read as code points.
        char::from_u32(code).map(String::from).unwrap_or_default()
    }

    fn width(&self, code: u32) -> f64 {
        if self.two_byte {
            return self
                .cid_widths
                .get(&code)
                .copied()
                .unwrap_or(self.default_width);
        }
        code.checked_sub(self.first_char)
            .and_then(|i| self.widths.get(i as usize))
            .copied()
            .filter(|w| *w > 0.0)
            .unwrap_or(self.default_width)
    }
}

/// Follow a reference if needed.
pub(crate) fn resolve<'a>(doc: &'a Document, obj: Option<&'a Object>) -> Option<&'a Object> {
    let obj = obj?;
    match doc.dereference(obj) {
        Ok((_, resolved)) => Some(resolved),
        Err(_) => Some(obj),
    }
}

fn first_descendant<'a>(doc: &'a Document, font: &'a Dictionary) -> Option<&'a Dictionary> {
    match resolve(doc, font.get(b"DescendantFonts").ok())? {
        Object::Array(arr) => match resolve(doc, arr.first())? {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        },
        _ => None,
    }
}

/// Parse a CID font `W` array: `c [w1 w2 ...]` and `c_first c_last w` forms.
///
/// Codes are two bytes, so entries beyond `MAX_CID` are dropped.
fn parse_cid_widths(doc: &Document, w: &[Object]) -> HashMap<u32, f64> {
    let mut widths = HashMap::new();
    let mut i = 0;

    while i < w.len() {
        let Some(start) = resolve(doc, w.get(i)).and_then(number) else {
            break;
        };
        let start = start as u32;
        match resolve(doc, w.get(i + 1)) {
            Some(Object::Array(list)) => {
                for (offset, value) in list.iter().enumerate() {
                    let Some(code) = u32::try_from(offset)
                        .ok()
                        .and_then(|offset| start.checked_add(offset))
                        .filter(|code| *code <= MAX_CID)
                    else {
                        break;
                    };
                    if let Some(width) = resolve(doc, Some(value)).and_then(number) {
                        widths.insert(code, width);
                    }
                }
                i += 2;
            }
            Some(end) => {
                let (Some(end), Some(width)) =
                    (number(end), resolve(doc, w.get(i + 2)).and_then(number))
                else {
                    break;
                };
                for code in start..=(end as u32).min(MAX_CID) {
                    widths.insert(code, width);
                }
                i += 3;
            }
            None => break,
        }
    }

    widths
}

fn unicode_map(doc: &Document, font: &Dictionary) -> Option<HashMap<u32, String>> {
    let Object::Stream(stream) = resolve(doc, font.get(b"ToUnicode").ok())? else {
        return None;
    };
    let contents = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());

    let cmap = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        adobe_cmap_parser::get_unicode_map(&contents)
    })) {
        Ok(Ok(cmap)) => cmap,
        Ok(Err(e)) => {
            warn!("Failed to parse ToUnicode CMap: {:?}", e);
            return None;
        }
        Err(_) => {
            warn!("ToUnicode CMap parser panicked, ignoring map");
            return None;
        }
    };

    let mut unicode = HashMap::with_capacity(cmap.len());
    for (code, bytes) in cmap {
        if bytes.len() % 2 != 0 {
            continue;
        }
        let units: Vec<u16> = bytes
            .chunks(2)
            .map(|pair| (u16::from(pair[0]) << 8) | u16::from(pair[1]))
            .collect();
        if let Ok(text) = String::from_utf16(&units) {
            unicode.insert(code, text);
        }
    }
    Some(unicode)
}
