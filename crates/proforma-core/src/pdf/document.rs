//! PDF document handle using lopdf and pdf-extract.

use std::collections::{HashMap, HashSet};

use lopdf::content::Content;
use lopdf::{Dictionary, Document, Object, ObjectId};
use tracing::{debug, trace, warn};

use super::content::{MAX_FORM_INVOCATIONS, PageContent};
use super::table::{Table, TableFinder, TableSettings};
use super::Result;
use crate::error::PdfError;

/// An opened PDF.
///
/// Owns the parsed document for the duration of one extraction; dropping it
/// releases everything.
pub struct PdfDocument {
    document: Document,
    page_ids: Vec<ObjectId>,
    page_texts: Option<Vec<String>>,
}

/// One page of an opened document.
pub struct PdfPage<'a> {
    pdf: &'a PdfDocument,
    number: u32,
    id: ObjectId,
}

impl PdfDocument {
    /// Parse a document from memory.
    pub fn open(data: &[u8]) -> Result<Self> {
        let mut doc = Document::load_mem(data).map_err(|e| PdfError::Parse(e.to_string()))?;

        // Handle PDFs with empty password encryption
        let raw_data = if doc.is_encrypted() {
            if doc.decrypt("").is_err() {
                return Err(PdfError::Encrypted);
            }
            debug!("Decrypted PDF with empty password");

            let mut decrypted = Vec::new();
            doc.save_to(&mut decrypted)
                .map_err(|e| PdfError::Parse(format!("Failed to save decrypted PDF: {}", e)))?;
            decrypted
        } else {
            data.to_vec()
        };

        let page_ids: Vec<ObjectId> = doc.get_pages().into_values().collect();
        if page_ids.is_empty() {
            return Err(PdfError::NoPages);
        }
        check_page_tree(&doc, &page_ids)?;
        let form_calls = check_form_graph(&doc, &page_ids)?;

        let page_texts = if form_calls > MAX_FORM_INVOCATIONS {
            warn!(
                "Form XObjects fan out to {} invocations, using content text",
                form_calls
            );
            None
        } else {
            extract_page_texts(&raw_data, page_ids.len())
        };

        debug!("Loaded PDF with {} pages", page_ids.len());
        Ok(Self {
            document: doc,
            page_ids,
            page_texts,
        })
    }

    pub fn page_count(&self) -> u32 {
        self.page_ids.len() as u32
    }

    /// Pages in document order.
    pub fn pages(&self) -> Vec<PdfPage<'_>> {
        self.page_ids
            .iter()
            .enumerate()
            .map(|(i, id)| PdfPage {
                pdf: self,
                number: i as u32 + 1,
                id: *id,
            })
            .collect()
    }

    /// Text of every page joined with newlines; pages without text
    /// contribute an empty line.
    pub fn full_text(&self) -> String {
        self.pages()
            .iter()
            .map(PdfPage::extract_text)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Resources dictionary for a page, inherited through the page tree.
    fn page_resources(&self, page_id: ObjectId) -> Option<Dictionary> {
        node_resources(&self.document, page_id).cloned()
    }
}

/// Per-page text from pdf-extract, or `None` when it fails or disagrees on
/// the page count.
fn extract_page_texts(data: &[u8], page_count: usize) -> Option<Vec<String>> {
    match pdf_extract::extract_text_from_mem_by_pages(data) {
        Ok(texts) if texts.len() == page_count => Some(texts),
        Ok(texts) => {
            warn!(
                "Text extraction returned {} pages for a {} page document, using content text",
                texts.len(),
                page_count
            );
            None
        }
        Err(e) => {
            warn!("Text extraction failed ({}), using content text", e);
            None
        }
    }
}

/// The nearest `Resources` dictionary walking up from `node_id`.
fn node_resources(doc: &Document, node_id: ObjectId) -> Option<&Dictionary> {
    let mut visited = HashSet::new();
    let mut node_id = node_id;

    while visited.insert(node_id) {
        let Ok(Object::Dictionary(dict)) = doc.get_object(node_id) else {
            return None;
        };
        if let Ok(resources) = dict.get(b"Resources") {
            if let Ok((_, Object::Dictionary(res_dict))) = doc.dereference(resources) {
                return Some(res_dict);
            }
        }
        match dict.get(b"Parent") {
            Ok(Object::Reference(parent_id)) => node_id = *parent_id,
            _ => return None,
        }
    }
    None
}

/// Reject page trees whose `/Parent` chain loops.
fn check_page_tree(doc: &Document, page_ids: &[ObjectId]) -> Result<()> {
    for &page_id in page_ids {
        let mut visited = HashSet::new();
        let mut node_id = page_id;
        loop {
            if !visited.insert(node_id) {
                return Err(PdfError::Parse(format!(
                    "page tree /Parent cycle at object {} {}",
                    node_id.0, node_id.1
                )));
            }
            match doc.get_dictionary(node_id).ok().and_then(|d| d.get(b"Parent").ok()) {
                Some(Object::Reference(parent_id)) => node_id = *parent_id,
                _ => break,
            }
        }
    }
    Ok(())
}

/// XObject names of a resources dictionary mapped to their objects.
fn xobject_names(doc: &Document, resources: &Dictionary) -> HashMap<Vec<u8>, ObjectId> {
    let xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| doc.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_dict().ok());
    let Some(xobjects) = xobjects else {
        return HashMap::new();
    };
    xobjects
        .iter()
        .filter_map(|(name, obj)| Some((name.clone(), obj.as_reference().ok()?)))
        .collect()
}

/// A form XObject as far as `Do` reachability is concerned.
struct FormNode {
    /// Names passed to `Do` in the form's content.
    invoked: Vec<Vec<u8>>,
    /// Index of the form's own resources in the context list.
    own: Option<usize>,
}

fn form_node(
    doc: &Document,
    id: ObjectId,
    contexts: &mut Vec<HashMap<Vec<u8>, ObjectId>>,
) -> Option<FormNode> {
    let Ok(Object::Stream(stream)) = doc.get_object(id) else {
        return None;
    };
    let is_form = stream
        .dict
        .get(b"Subtype")
        .and_then(Object::as_name)
        .is_ok_and(|subtype| subtype == b"Form");
    if !is_form {
        return None;
    }

    let data = stream
        .decompressed_content()
        .unwrap_or_else(|_| stream.content.clone());
    let invoked = Content::decode(&data)
        .map(|content| {
            content
                .operations
                .iter()
                .filter(|op| op.operator == "Do")
                .filter_map(|op| op.operands.first()?.as_name().ok().map(<[u8]>::to_vec))
                .collect()
        })
        .unwrap_or_default();

    let own = stream
        .dict
        .get(b"Resources")
        .ok()
        .and_then(|obj| doc.dereference(obj).ok())
        .and_then(|(_, obj)| obj.as_dict().ok())
        .map(|resources| {
            contexts.push(xobject_names(doc, resources));
            contexts.len() - 1
        });

    Some(FormNode { invoked, own })
}

/// Reject documents where a form XObject can reach itself through `Do`.
///
/// A form without its own `Resources` draws with the resources it was
/// invoked from, so every context that names it is searched. Returns the
/// largest number of form invocations a single `Do` of any form expands to.
fn check_form_graph(doc: &Document, page_ids: &[ObjectId]) -> Result<usize> {
    let mut contexts: Vec<HashMap<Vec<u8>, ObjectId>> = Vec::new();
    let mut forms: HashMap<ObjectId, FormNode> = HashMap::new();

    for &id in doc.objects.keys() {
        if let Some(node) = form_node(doc, id, &mut contexts) {
            forms.insert(id, node);
        }
    }
    if forms.is_empty() {
        return Ok(0);
    }
    for &page_id in page_ids {
        if let Some(resources) = node_resources(doc, page_id) {
            contexts.push(xobject_names(doc, resources));
        }
    }

    let mut callers: HashMap<ObjectId, Vec<usize>> = HashMap::new();
    for (index, context) in contexts.iter().enumerate() {
        for target in context.values() {
            callers.entry(*target).or_default().push(index);
        }
    }

    let edges = |id: ObjectId| -> Vec<ObjectId> {
        let Some(node) = forms.get(&id) else {
            return Vec::new();
        };
        let scopes: &[usize] = match &node.own {
            Some(own) => std::slice::from_ref(own),
            None => callers.get(&id).map_or(&[][..], Vec::as_slice),
        };
        node.invoked
            .iter()
            .flat_map(|name| scopes.iter().filter_map(|c| contexts[*c].get(name).copied()))
            .filter(|target| forms.contains_key(target))
            .collect()
    };

    // Iterative depth-first search; a node met again while on the path is a
    // cycle. Nodes finish in post-order, so callees are counted first.
    let mut calls: HashMap<ObjectId, usize> = HashMap::new();
    for &start in forms.keys() {
        if calls.contains_key(&start) {
            continue;
        }
        let mut on_path: HashSet<ObjectId> = HashSet::from([start]);
        let mut stack: Vec<(ObjectId, Vec<ObjectId>)> = vec![(start, edges(start))];
        while let Some((node, pending)) = stack.last_mut() {
            let node = *node;
            match pending.pop() {
                Some(next) if on_path.contains(&next) => {
                    return Err(PdfError::Parse(format!(
                        "form XObject cycle through object {} {}",
                        next.0, next.1
                    )));
                }
                Some(next) if !calls.contains_key(&next) => {
                    on_path.insert(next);
                    stack.push((next, edges(next)));
                }
                Some(_) => {}
                None => {
                    let nested = edges(node).iter().fold(1usize, |total, next| {
                        total.saturating_add(calls.get(next).copied().unwrap_or(0))
                    });
                    on_path.remove(&node);
                    calls.insert(node, nested);
                    stack.pop();
                }
            }
        }
    }
    Ok(calls.into_values().max().unwrap_or(0))
}

impl<'a> PdfPage<'a> {
    /// Page number (1-indexed).
    pub fn number(&self) -> u32 {
        self.number
    }

    /// Positioned characters and painted segments of the page.
    pub fn content(&self) -> Result<PageContent> {
        let doc = &self.pdf.document;
        let data = doc
            .get_page_content(self.id)
            .map_err(|e| PdfError::Content(e.to_string()))?;
        let resources = self.pdf.page_resources(self.id);
        PageContent::interpret(doc, &data, resources.as_ref())
    }

    /// Page text; empty when the page has none.
    pub fn extract_text(&self) -> String {
        if let Some(text) = self
            .pdf
            .page_texts
            .as_ref()
            .and_then(|texts| texts.get(self.number as usize - 1))
        {
            return text.clone();
        }

        match self.content() {
            Ok(content) => content.text(),
            Err(e) => {
                debug!("No text for page {}: {}", self.number, e);
                String::new()
            }
        }
    }

    /// The page's ruled table. Pages without one, or whose content cannot
    /// be read, yield `None`.
    pub fn extract_table(&self, settings: &TableSettings) -> Option<Table> {
        let content = match self.content() {
            Ok(content) => content,
            Err(e) => {
                debug!("Skipping table on page {}: {}", self.number, e);
                return None;
            }
        };
        let table = TableFinder::new(settings).extract(&content);
        trace!(
            "Page {}: {}",
            self.number,
            table
                .as_ref()
                .map_or("no table".to_string(), |t| format!("{} rows", t.rows().len()))
        );
        table
    }
}
