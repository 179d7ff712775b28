//! Synthetic PDFs for tests.

use lopdf::{Document, Object, ObjectId, Stream, dictionary};

/// Builds a PDF whose pages share a Helvetica `/F1` font through the page
/// tree, so page resources are inherited.
#[derive(Default)]
pub(crate) struct TestPdf {
    pages: Vec<String>,
}

impl TestPdf {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a page with the given content stream.
    pub fn page(mut self, content: &str) -> Self {
        self.pages.push(content.to_string());
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id: ObjectId = doc.new_object_id();

        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Helvetica",
            "Encoding" => "WinAnsiEncoding",
        });

        let mut kids = Vec::new();
        for content in &self.pages {
            let stream = Stream::new(dictionary! {}, content.as_bytes().to_vec());
            let content_id = doc.add_object(Object::Stream(stream));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
                "Contents" => content_id,
            });
            kids.push(Object::from(page_id));
        }

        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids.clone(),
                "Count" => kids.len() as i64,
                "Resources" => dictionary! {
                    "Font" => dictionary! {
                        "F1" => font_id,
                    },
                },
            }),
        );

        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut buf = Vec::new();
        doc.save_to(&mut buf).expect("failed to save test PDF");
        buf
    }
}

/// Content stream drawing a ruled table with one row per entry of `rows`.
///
/// Columns are 60pt wide, rows 20pt tall, starting at the top of an A4 page.
pub(crate) fn ruled_table(rows: &[&[&str]]) -> String {
    const LEFT: f64 = 20.0;
    const TOP: f64 = 800.0;
    const COL: f64 = 60.0;
    const ROW: f64 = 20.0;

    let cols = rows.iter().map(|r| r.len()).max().unwrap_or(0);
    let width = cols as f64 * COL;
    let height = rows.len() as f64 * ROW;
    let bottom = TOP - height;

    let mut ops = String::new();
    for r in 0..=rows.len() {
        let y = TOP - r as f64 * ROW;
        ops.push_str(&format!("{} {} m {} {} l S\n", LEFT, y, LEFT + width, y));
    }
    for c in 0..=cols {
        let x = LEFT + c as f64 * COL;
        ops.push_str(&format!("{} {} m {} {} l S\n", x, bottom, x, TOP));
    }
    for (r, row) in rows.iter().enumerate() {
        let y = TOP - (r as f64 + 1.0) * ROW + 6.0;
        for (c, text) in row.iter().enumerate() {
            if text.is_empty() {
                continue;
            }
            let x = LEFT + c as f64 * COL + 2.0;
            ops.push_str(&format!("BT /F1 8 Tf {} {} Td ({}) Tj ET\n", x, y, text));
        }
    }
    ops
}
