//! Content stream interpretation.
//!
//! Walks a page's operators and records the two things table detection
//! needs: positioned characters and painted straight segments. Coordinates
//! are reported in page space with the vertical axis flipped (`top` grows
//! downward), so sorting by `top` gives reading order.

use std::collections::HashMap;
use std::rc::Rc;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace};

use super::Result;
use super::fonts::{FontDecoder, resolve};
use crate::error::PdfError;

/// Form XObjects nested deeper than this are not followed.
const MAX_FORM_DEPTH: usize = 8;

/// Form XObjects run at most this many times per page.
pub(crate) const MAX_FORM_INVOCATIONS: usize = 256;

/// Horizontal gap (points) above which two characters are separate words.
const X_TOLERANCE: f64 = 3.0;

/// Vertical distance (points) within which characters share a line.
const Y_TOLERANCE: f64 = 3.0;

type Matrix = [f64; 6];

const IDENTITY: Matrix = [1.0, 0.0, 0.0, 1.0, 0.0, 0.0];

/// A character placed on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct Char {
    pub text: String,
    pub x0: f64,
    pub x1: f64,
    pub top: f64,
    pub bottom: f64,
}

impl Char {
    /// Center point of the character box.
    pub fn midpoint(&self) -> (f64, f64) {
        ((self.x0 + self.x1) / 2.0, (self.top + self.bottom) / 2.0)
    }
}

/// A painted straight segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segment {
    pub x0: f64,
    pub top0: f64,
    pub x1: f64,
    pub top1: f64,
}

/// Everything recovered from one page.
#[derive(Debug, Clone, Default)]
pub struct PageContent {
    pub chars: Vec<Char>,
    pub segments: Vec<Segment>,
}

impl PageContent {
    /// Interpret a content stream against its resources.
    pub fn interpret(doc: &Document, data: &[u8], resources: Option<&Dictionary>) -> Result<Self> {
        let content = Content::decode(data).map_err(|e| PdfError::Content(e.to_string()))?;

        let mut interpreter = Interpreter::new(doc);
        interpreter.run(&content.operations, resources, 0);

        debug!(
            "Interpreted {} operations: {} chars, {} segments",
            content.operations.len(),
            interpreter.page.chars.len(),
            interpreter.page.segments.len()
        );
        Ok(interpreter.page)
    }

    /// Plain text of the page in reading order.
    pub fn text(&self) -> String {
        chars_to_text(self.chars.iter())
    }
}

/// Join characters into text: lines top to bottom, characters left to right,
/// a space wherever the horizontal gap exceeds the word tolerance.
pub fn chars_to_text<'a>(chars: impl IntoIterator<Item = &'a Char>) -> String {
    let mut chars: Vec<&Char> = chars.into_iter().collect();
    chars.sort_by(|a, b| a.bottom.total_cmp(&b.bottom));

    let mut lines: Vec<Vec<&Char>> = Vec::new();
    let mut line_bottom = f64::NEG_INFINITY;
    for c in chars {
        match lines.last_mut() {
            Some(line) if (c.bottom - line_bottom).abs() <= Y_TOLERANCE => line.push(c),
            _ => {
                line_bottom = c.bottom;
                lines.push(vec![c]);
            }
        }
    }

    lines
        .into_iter()
        .map(|mut line| {
            line.sort_by(|a, b| a.x0.total_cmp(&b.x0));
            let mut text = String::new();
            let mut prev_x1: Option<f64> = None;
            for c in line {
                if let Some(x1) = prev_x1 {
                    if c.x0 - x1 > X_TOLERANCE && !text.ends_with(' ') && c.text != " " {
                        text.push(' ');
                    }
                }
                text.push_str(&c.text);
                prev_x1 = Some(c.x1);
            }
            text.trim().to_string()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read a numeric operand.
pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

fn multiply(a: &Matrix, b: &Matrix) -> Matrix {
    [
        a[0] * b[0] + a[1] * b[2],
        a[0] * b[1] + a[1] * b[3],
        a[2] * b[0] + a[3] * b[2],
        a[2] * b[1] + a[3] * b[3],
        a[4] * b[0] + a[5] * b[2] + b[4],
        a[4] * b[1] + a[5] * b[3] + b[5],
    ]
}

fn apply(m: &Matrix, x: f64, y: f64) -> (f64, f64) {
    (m[0] * x + m[2] * y + m[4], m[1] * x + m[3] * y + m[5])
}

fn translation(tx: f64, ty: f64) -> Matrix {
    [1.0, 0.0, 0.0, 1.0, tx, ty]
}

fn matrix_operands(operands: &[Object]) -> Option<Matrix> {
    if operands.len() < 6 {
        return None;
    }
    let mut m = IDENTITY;
    for (slot, obj) in m.iter_mut().zip(operands) {
        *slot = number(obj)?;
    }
    Some(m)
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    font: Option<Rc<FontDecoder>>,
    font_size: f64,
    char_spacing: f64,
    word_spacing: f64,
    horizontal_scaling: f64,
    leading: f64,
    rise: f64,
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self {
            ctm: IDENTITY,
            font: None,
            font_size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            horizontal_scaling: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Default)]
struct PathState {
    subpaths: Vec<(Vec<(f64, f64)>, bool)>,
}

impl PathState {
    fn move_to(&mut self, p: (f64, f64)) {
        self.subpaths.push((vec![p], false));
    }

    fn line_to(&mut self, p: (f64, f64)) {
        match self.subpaths.last_mut() {
            Some((points, _)) => points.push(p),
            None => self.move_to(p),
        }
    }

    fn close(&mut self) {
        if let Some((_, closed)) = self.subpaths.last_mut() {
            *closed = true;
        }
    }
}

struct Interpreter<'a> {
    doc: &'a Document,
    state: GraphicsState,
    stack: Vec<GraphicsState>,
    text_matrix: Matrix,
    line_matrix: Matrix,
    path: PathState,
    fonts: HashMap<Vec<u8>, Rc<FontDecoder>>,
    forms: Vec<ObjectId>,
    form_invocations: usize,
    page: PageContent,
}

impl<'a> Interpreter<'a> {
    fn new(doc: &'a Document) -> Self {
        Self {
            doc,
            state: GraphicsState::default(),
            stack: Vec::new(),
            text_matrix: IDENTITY,
            line_matrix: IDENTITY,
            path: PathState::default(),
            fonts: HashMap::new(),
            forms: Vec::new(),
            form_invocations: 0,
            page: PageContent::default(),
        }
    }

    fn run(&mut self, operations: &[Operation], resources: Option<&Dictionary>, depth: usize) {
        for op in operations {
            if self.execute(op, resources, depth).is_none() {
                trace!("Skipping malformed operator {} {:?}", op.operator, op.operands);
            }
        }
    }

    fn execute(&mut self, op: &Operation, resources: Option<&Dictionary>, depth: usize) -> Option<()> {
        let operands = &op.operands;
        let num = |i: usize| operands.get(i).and_then(number);

        match op.operator.as_str() {
            // Graphics state
            "q" => self.stack.push(self.state.clone()),
            "Q" => {
                if let Some(state) = self.stack.pop() {
                    self.state = state;
                }
            }
            "cm" => {
                let m = matrix_operands(operands)?;
                self.state.ctm = multiply(&m, &self.state.ctm);
            }

            // Path construction, stored in page space
            "m" => {
                let p = apply(&self.state.ctm, num(0)?, num(1)?);
                self.path.move_to(p);
            }
            "l" => {
                let p = apply(&self.state.ctm, num(0)?, num(1)?);
                self.path.line_to(p);
            }
            "c" | "v" | "y" => {
                let n = operands.len();
                if n < 2 {
                    return None;
                }
                // Curves are not ruling lines; continue from the end point.
                let p = apply(&self.state.ctm, num(n - 2)?, num(n - 1)?);
                self.path.move_to(p);
            }
            "re" => {
                let (x, y, w, h) = (num(0)?, num(1)?, num(2)?, num(3)?);
                let ctm = self.state.ctm;
                self.path.move_to(apply(&ctm, x, y));
                self.path.line_to(apply(&ctm, x + w, y));
                self.path.line_to(apply(&ctm, x + w, y + h));
                self.path.line_to(apply(&ctm, x, y + h));
                self.path.close();
            }
            "h" => self.path.close(),

            // Path painting
            "S" => self.paint(false),
            "s" => {
                self.path.close();
                self.paint(false);
            }
            "f" | "F" | "f*" | "B" | "B*" | "b" | "b*" => self.paint(true),
            "n" => self.path = PathState::default(),

            // Text objects and state
            "BT" => {
                self.text_matrix = IDENTITY;
                self.line_matrix = IDENTITY;
            }
            "ET" => {}
            "Tf" => {
                let name = operands.first()?.as_name().ok()?;
                self.state.font = Some(self.font(name, resources));
                self.state.font_size = num(1)?;
            }
            "Tc" => self.state.char_spacing = num(0)?,
            "Tw" => self.state.word_spacing = num(0)?,
            "Tz" => self.state.horizontal_scaling = num(0)? / 100.0,
            "TL" => self.state.leading = num(0)?,
            "Ts" => self.state.rise = num(0)?,
            "Td" => self.next_line(num(0)?, num(1)?),
            "TD" => {
                let (tx, ty) = (num(0)?, num(1)?);
                self.state.leading = -ty;
                self.next_line(tx, ty);
            }
            "Tm" => {
                let m = matrix_operands(operands)?;
                self.text_matrix = m;
                self.line_matrix = m;
            }
            "T*" => self.next_line(0.0, -self.state.leading),

            // Text showing
            "Tj" => self.show_string(operands.first()?),
            "'" => {
                self.next_line(0.0, -self.state.leading);
                self.show_string(operands.first()?);
            }
            "\"" => {
                self.state.word_spacing = num(0)?;
                self.state.char_spacing = num(1)?;
                self.next_line(0.0, -self.state.leading);
                self.show_string(operands.get(2)?);
            }
            "TJ" => {
                let Object::Array(items) = operands.first()? else {
                    return None;
                };
                for item in items {
                    match item {
                        Object::String(..) => self.show_string(item),
                        other => {
                            let adjust = number(other)?;
                            let tx = -adjust / 1000.0
                                * self.state.font_size
                                * self.state.horizontal_scaling;
                            self.text_matrix = multiply(&translation(tx, 0.0), &self.text_matrix);
                        }
                    }
                }
            }

            // XObjects
            "Do" => {
                let name = operands.first()?.as_name().ok()?;
                self.form_xobject(name, resources, depth);
            }

            _ => {}
        }
        Some(())
    }

    fn next_line(&mut self, tx: f64, ty: f64) {
        self.line_matrix = multiply(&translation(tx, ty), &self.line_matrix);
        self.text_matrix = self.line_matrix;
    }

    fn font(&mut self, name: &[u8], resources: Option<&Dictionary>) -> Rc<FontDecoder> {
        if let Some(font) = self.fonts.get(name) {
            return font.clone();
        }

        let decoder = resources
            .and_then(|res| resolve(self.doc, res.get(b"Font").ok()))
            .and_then(|fonts| match fonts {
                Object::Dictionary(dict) => resolve(self.doc, dict.get(name).ok()),
                _ => None,
            })
            .and_then(|font| match font {
                Object::Dictionary(dict) => Some(FontDecoder::from_dict(self.doc, dict)),
                _ => None,
            })
            .unwrap_or_else(FontDecoder::fallback);

        let decoder = Rc::new(decoder);
        self.fonts.insert(name.to_vec(), decoder.clone());
        decoder
    }

    fn show_string(&mut self, obj: &Object) {
        let Object::String(bytes, _) = obj else {
            return;
        };
        let font = self
            .state
            .font
            .clone()
            .unwrap_or_else(|| Rc::new(FontDecoder::fallback()));

        let size = self.state.font_size;
        let scaling = self.state.horizontal_scaling;

        for glyph in font.glyphs(bytes) {
            let w0 = glyph.width / 1000.0;
            let render = multiply(&self.text_matrix, &self.state.ctm);
            let (ox, oy) = apply(&render, 0.0, self.state.rise);
            let (ex, _) = apply(&render, w0 * size * scaling, self.state.rise);
            let height = size * render[2].hypot(render[3]);

            if !glyph.text.is_empty() {
                self.page.chars.push(Char {
                    text: glyph.text,
                    x0: ox.min(ex),
                    x1: ox.max(ex),
                    top: -(oy + 0.8 * height),
                    bottom: -(oy - 0.2 * height),
                });
            }

            let mut spacing = self.state.char_spacing;
            if glyph.is_space {
                spacing += self.state.word_spacing;
            }
            let tx = (w0 * size + spacing) * scaling;
            self.text_matrix = multiply(&translation(tx, 0.0), &self.text_matrix);
        }
    }

    fn paint(&mut self, fill: bool) {
        let path = std::mem::take(&mut self.path);
        for (points, closed) in path.subpaths {
            for pair in points.windows(2) {
                self.push_segment(pair[0], pair[1]);
            }
            if (closed || fill) && points.len() > 2 {
                if let (Some(&last), Some(&first)) = (points.last(), points.first()) {
                    self.push_segment(last, first);
                }
            }
        }
    }

    fn push_segment(&mut self, from: (f64, f64), to: (f64, f64)) {
        self.page.segments.push(Segment {
            x0: from.0,
            top0: -from.1,
            x1: to.0,
            top1: -to.1,
        });
    }

    fn form_xobject(&mut self, name: &[u8], resources: Option<&Dictionary>, depth: usize) {
        if depth >= MAX_FORM_DEPTH {
            debug!("Form XObject nesting too deep, skipping");
            return;
        }
        if self.form_invocations >= MAX_FORM_INVOCATIONS {
            debug!("Too many form XObject invocations, skipping");
            return;
        }

        let doc = self.doc;
        let entry = resources
            .and_then(|res| resolve(doc, res.get(b"XObject").ok()))
            .and_then(|xobjects| match xobjects {
                Object::Dictionary(dict) => dict.get(name).ok(),
                _ => None,
            });
        let form_id = match entry {
            Some(Object::Reference(id)) => Some(*id),
            _ => None,
        };
        if form_id.is_some_and(|id| self.forms.contains(&id)) {
            debug!("Form XObject draws itself, skipping");
            return;
        }
        let Some(Object::Stream(stream)) = resolve(doc, entry) else {
            return;
        };

        let is_form = stream
            .dict
            .get(b"Subtype")
            .ok()
            .and_then(|o| o.as_name().ok())
            .is_some_and(|subtype| subtype == b"Form");
        if !is_form {
            return;
        }

        let data = stream
            .decompressed_content()
            .unwrap_or_else(|_| stream.content.clone());
        let content = match Content::decode(&data) {
            Ok(content) => content,
            Err(e) => {
                debug!("Unreadable form XObject content: {}", e);
                return;
            }
        };

        let form_resources = match resolve(doc, stream.dict.get(b"Resources").ok()) {
            Some(Object::Dictionary(dict)) => Some(dict),
            _ => resources,
        };
        let matrix = match stream.dict.get(b"Matrix") {
            Ok(Object::Array(values)) => matrix_operands(values).unwrap_or(IDENTITY),
            _ => IDENTITY,
        };

        self.form_invocations += 1;
        let saved_state = self.state.clone();
        let saved_fonts = std::mem::take(&mut self.fonts);
        self.state.ctm = multiply(&matrix, &self.state.ctm);
        self.forms.extend(form_id);

        self.run(&content.operations, form_resources, depth + 1);

        if form_id.is_some() {
            self.forms.pop();
        }
        self.state = saved_state;
        self.fonts = saved_fonts;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use lopdf::dictionary;

    fn interpret(data: &[u8]) -> PageContent {
        let doc = Document::with_version("1.5");
        PageContent::interpret(&doc, data, None).unwrap()
    }

    #[test]
    fn test_rectangle_yields_four_segments() {
        let page = interpret(b"10 20 100 50 re S");

        assert_eq!(page.segments.len(), 4);
        assert_eq!(
            page.segments[0],
            Segment { x0: 10.0, top0: -20.0, x1: 110.0, top1: -20.0 }
        );
    }

    #[test]
    fn test_discarded_path_is_not_recorded() {
        let page = interpret(b"0 0 m 100 0 l n 0 0 m 0 100 l S");
        assert_eq!(page.segments.len(), 1);
        assert_eq!(page.segments[0].x1, 0.0);
    }

    #[test]
    fn test_ctm_applies_to_paths() {
        let page = interpret(b"q 2 0 0 2 5 5 cm 0 0 m 10 0 l S Q 0 0 m 1 0 l S");

        assert_eq!(page.segments[0], Segment { x0: 5.0, top0: -5.0, x1: 25.0, top1: -5.0 });
        assert_eq!(page.segments[1], Segment { x0: 0.0, top0: 0.0, x1: 1.0, top1: 0.0 });
    }

    #[test]
    fn test_text_positions_follow_td() {
        let page = interpret(b"BT /F1 10 Tf 100 700 Td (AB) Tj 0 -20 Td (C) Tj ET");

        assert_eq!(page.chars.len(), 3);
        assert_eq!(page.chars[0].x0, 100.0);
        assert_eq!(page.chars[1].x0, 105.0);
        assert_eq!(page.chars[2].x0, 100.0);
        assert!(page.chars[2].top > page.chars[0].top);
        assert_eq!(page.text(), "AB\nC");
    }

    #[test]
    fn test_tj_array_adjustments_split_words() {
        let page = interpret(b"BT /F1 10 Tf 0 0 Td [(Ab) -1000 (cd)] TJ ET");
        assert_eq!(page.text(), "Ab cd");
    }

    #[test]
    fn test_unknown_operators_are_ignored() {
        let page = interpret(b"1 0 0 RG 0.5 w BT /F1 12 Tf 1 0 0 1 50 50 Tm (x) Tj ET");
        assert_eq!(page.text(), "x");
    }

    fn add_form(doc: &mut Document, id: ObjectId, content: &str, next: Option<ObjectId>) {
        let mut dict = lopdf::dictionary! {
            "Type" => "XObject",
            "Subtype" => "Form",
            "BBox" => vec![0.into(), 0.into(), 100.into(), 100.into()],
        };
        if let Some(next) = next {
            dict.set("Resources", lopdf::dictionary! {
                "XObject" => lopdf::dictionary! { "X" => next },
            });
        }
        let stream = lopdf::Stream::new(dict, content.as_bytes().to_vec());
        doc.objects.insert(id, Object::Stream(stream));
    }

    const FORM_BODY: &str = "0 0 m 10 0 l S /X Do /X Do /X Do /X Do";

    #[test]
    fn test_form_drawing_itself_runs_once() {
        let mut doc = Document::with_version("1.5");
        let id = doc.new_object_id();
        add_form(&mut doc, id, FORM_BODY, Some(id));
        let resources = lopdf::dictionary! {
            "XObject" => lopdf::dictionary! { "X" => id },
        };

        let page = PageContent::interpret(&doc, b"/X Do", Some(&resources)).unwrap();
        assert_eq!(page.segments.len(), 1);
    }

    #[test]
    fn test_form_fan_out_is_capped() {
        let mut doc = Document::with_version("1.5");
        let ids: Vec<ObjectId> = (0..6).map(|_| doc.new_object_id()).collect();
        for (i, id) in ids.iter().enumerate() {
            add_form(&mut doc, *id, FORM_BODY, ids.get(i + 1).copied());
        }
        let resources = lopdf::dictionary! {
            "XObject" => lopdf::dictionary! { "X" => ids[0] },
        };

        // Uncapped this would paint 1365 segments.
        let page = PageContent::interpret(&doc, b"/X Do", Some(&resources)).unwrap();
        assert_eq!(page.segments.len(), MAX_FORM_INVOCATIONS);
    }
}
