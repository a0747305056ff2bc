//! Stamping a QR code of the public link onto the first page of a PDF.

use std::path::Path;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream};
use qrcode::{Color, EcLevel, QrCode};
use tempfile::NamedTempFile;

use super::merge::{inherited_attribute, PdfError};

/// Edge length of the rendered image in pixels and of the stamp in points.
pub const QR_SIZE: u32 = 200;
/// Distance of the stamp from the bottom-left corner of the page, in points.
pub const QR_OFFSET: i64 = 50;
const QUIET_ZONE_MODULES: usize = 4;

/// Render `payload` as a square 8-bit grayscale bitmap of `size` pixels.
pub fn render_qr(payload: &str, size: u32) -> Result<Vec<u8>, PdfError> {
    let code = QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::L)
        .map_err(|e| PdfError::Qr(e.to_string()))?;
    let width = code.width();
    let colors = code.to_colors();
    let modules = width + 2 * QUIET_ZONE_MODULES;
    let size = size as usize;

    let mut pixels = Vec::with_capacity(size * size);
    for y in 0..size {
        let row = y * modules / size;
        for x in 0..size {
            let column = x * modules / size;
            let dark = row >= QUIET_ZONE_MODULES
                && column >= QUIET_ZONE_MODULES
                && row < QUIET_ZONE_MODULES + width
                && column < QUIET_ZONE_MODULES + width
                && colors[(row - QUIET_ZONE_MODULES) * width + column - QUIET_ZONE_MODULES]
                    == Color::Dark;
            pixels.push(if dark { 0x00 } else { 0xFF });
        }
    }
    Ok(pixels)
}

/// Resolve a dictionary that may be stored inline or behind a reference.
fn resolve_dictionary(doc: &Document, object: &Object) -> Result<Dictionary, PdfError> {
    match object {
        Object::Dictionary(dict) => Ok(dict.clone()),
        Object::Reference(id) => Ok(doc.get_dictionary(*id)?.clone()),
        other => Err(PdfError::Malformed(format!(
            "expected a dictionary, found {:?}",
            other
        ))),
    }
}

fn first_page(doc: &Document) -> Result<ObjectId, PdfError> {
    doc.get_pages()
        .into_values()
        .next()
        .ok_or_else(|| PdfError::Malformed("document has no pages".to_string()))
}

/// Draw a QR code encoding `url` on page 1 of the PDF at `path`, in place.
///
/// The existing page content is wrapped in a saved graphics state so the
/// stamp is drawn in default user space regardless of what the page leaves
/// on the stack. The file is replaced atomically.
pub fn stamp_qr_code(path: &Path, url: &str) -> Result<(), PdfError> {
    let pixels = render_qr(url, QR_SIZE)?;

    let mut doc = Document::load(path).map_err(|e| PdfError::Load {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let page_id = first_page(&doc)?;
    let mut page = doc.get_dictionary(page_id)?.clone();

    let mut resources = match page.get(b"Resources") {
        Ok(object) => resolve_dictionary(&doc, object)?,
        Err(_) => match inherited_attribute(&doc, &page, b"Resources") {
            Some(object) => resolve_dictionary(&doc, &object)?,
            None => Dictionary::new(),
        },
    };
    let mut xobjects = match resources.get(b"XObject") {
        Ok(object) => resolve_dictionary(&doc, object)?,
        Err(_) => Dictionary::new(),
    };

    let mut index = 0;
    let name = loop {
        let candidate = format!("QrCode{}", index);
        if !xobjects.has(candidate.as_bytes()) {
            break candidate;
        }
        index += 1;
    };

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => QR_SIZE as i64,
            "Height" => QR_SIZE as i64,
            "ColorSpace" => "DeviceGray",
            "BitsPerComponent" => 8_i64,
        },
        pixels,
    ));
    xobjects.set(name.as_str(), image_id);
    resources.set("XObject", Object::Dictionary(xobjects));

    let size = QR_SIZE as i64;
    let stamp = Content {
        operations: vec![
            Operation::new("Q", vec![]),
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    size.into(),
                    0_i64.into(),
                    0_i64.into(),
                    size.into(),
                    QR_OFFSET.into(),
                    QR_OFFSET.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(name.clone().into_bytes())]),
            Operation::new("Q", vec![]),
        ],
    };
    let save_id = doc.add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let stamp_id = doc.add_object(Stream::new(dictionary! {}, stamp.encode()?));

    let mut contents = vec![Object::Reference(save_id)];
    match page.get(b"Contents") {
        Ok(Object::Array(existing)) => contents.extend(existing.iter().cloned()),
        Ok(Object::Reference(id)) => contents.push(Object::Reference(*id)),
        _ => {}
    }
    contents.push(Object::Reference(stamp_id));

    page.set("Resources", Object::Dictionary(resources));
    page.set("Contents", Object::Array(contents));
    doc.objects.insert(page_id, Object::Dictionary(page));

    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut temp = NamedTempFile::new_in(dir).map_err(|e| PdfError::Save(e.to_string()))?;
    doc.compress();
    doc.save_to(temp.as_file_mut())
        .map_err(|e| PdfError::Save(e.to_string()))?;
    temp.persist(path)
        .map_err(|e| PdfError::Save(e.error.to_string()))?;

    log::info!("Stamped QR code /{} onto {}", name, path.display());
    Ok(())
}
