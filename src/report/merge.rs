//! Combining several PDFs into one document.

use std::path::Path;

use lopdf::{dictionary, Dictionary, Document, Object, ObjectId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PdfError {
    #[error("failed to read PDF {path}: {message}")]
    Load { path: String, message: String },
    #[error("malformed PDF: {0}")]
    Malformed(String),
    #[error("failed to write PDF: {0}")]
    Save(String),
    #[error("failed to encode QR code: {0}")]
    Qr(String),
}

impl From<lopdf::Error> for PdfError {
    fn from(err: lopdf::Error) -> Self {
        PdfError::Malformed(err.to_string())
    }
}

/// Page attributes a page may inherit from its ancestors in the page tree.
const INHERITABLE: [&[u8]; 4] = [b"Resources", b"MediaBox", b"CropBox", b"Rotate"];

/// `Parent` chains longer than this are treated as cyclic.
const MAX_TREE_DEPTH: usize = 64;

/// Value of `key` on the nearest ancestor of `page` that defines it.
pub(crate) fn inherited_attribute(doc: &Document, page: &Dictionary, key: &[u8]) -> Option<Object> {
    let mut parent = page.get(b"Parent").and_then(Object::as_reference).ok();
    let mut depth = 0;

    while let Some(id) = parent {
        if depth >= MAX_TREE_DEPTH {
            return None;
        }
        let node = doc.get_dictionary(id).ok()?;
        if let Ok(value) = node.get(key) {
            return Some(value.clone());
        }
        parent = node.get(b"Parent").and_then(Object::as_reference).ok();
        depth += 1;
    }
    None
}

fn type_name(object: &Object) -> Option<&[u8]> {
    let dict = match object {
        Object::Dictionary(dict) => dict,
        Object::Stream(stream) => &stream.dict,
        _ => return None,
    };
    dict.get(b"Type").and_then(Object::as_name).ok()
}

fn load(path: &Path) -> Result<Document, PdfError> {
    Document::load(path).map_err(|e| PdfError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}

/// Merge `inputs` into a new PDF at `output`.
///
/// Pages appear in input order, and within one input in their original order.
/// Any unreadable input fails the whole merge.
pub fn merge_pdfs<P: AsRef<Path>>(inputs: &[P], output: &Path) -> Result<usize, PdfError> {
    if inputs.is_empty() {
        return Err(PdfError::Malformed("no documents to merge".to_string()));
    }

    let mut merged = Document::with_version("1.7");
    let mut pages: Vec<(ObjectId, Dictionary)> = Vec::new();
    let mut next_id = 1;

    for input in inputs {
        let mut doc = load(input.as_ref())?;
        doc.renumber_objects_with(next_id);
        next_id = doc.objects.keys().map(|(id, _)| *id).max().unwrap_or(next_id) + 1;

        for page_id in doc.get_pages().into_values() {
            let mut page = doc.get_dictionary(page_id)?.clone();
            for key in INHERITABLE {
                if !page.has(key) {
                    if let Some(value) = inherited_attribute(&doc, &page, key) {
                        page.set(key, value);
                    }
                }
            }
            pages.push((page_id, page));
        }

        for (id, object) in doc.objects {
            match type_name(&object) {
                Some(b"Catalog") | Some(b"Pages") | Some(b"Page") | Some(b"Outlines")
                | Some(b"Outline") => {}
                _ => {
                    merged.objects.insert(id, object);
                }
            }
        }
    }

    if pages.is_empty() {
        return Err(PdfError::Malformed("inputs contain no pages".to_string()));
    }

    merged.max_id = next_id;
    let pages_id = merged.new_object_id();
    let page_count = pages.len();

    let mut kids = Vec::with_capacity(page_count);
    for (page_id, mut page) in pages {
        page.set("Parent", pages_id);
        merged.objects.insert(page_id, Object::Dictionary(page));
        kids.push(Object::Reference(page_id));
    }

    merged.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => kids,
            "Count" => page_count as i64,
        }),
    );
    let catalog_id = merged.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
    });
    merged.trailer.set("Root", catalog_id);

    merged.compress();
    merged.save(output).map_err(|e| PdfError::Save(e.to_string()))?;

    log::info!(
        "Merged {} document(s) into {} ({} pages)",
        inputs.len(),
        output.display(),
        page_count
    );
    Ok(page_count)
}
