//! Placeholder filling for SpreadsheetML (`.xlsx`) packages.
//!
//! Cell text lives either in the shared string table (`si` items) or inline
//! in a worksheet cell (`is` items). An item whose text changes is rewritten
//! as a single plain `t` element; every other item is copied byte for byte.

use std::path::Path;

use quick_xml::escape::escape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::{Reader, Writer};

use super::docx::read_element_body;
use super::package::{part_names, rewrite_package};
use super::runs::{contains_placeholder, substitute_text};
use super::{TemplateError, TemplateFiller};
use crate::report::flatten::SubstitutionMap;

const WORKBOOK_PART: &str = "xl/workbook.xml";
const SHARED_STRINGS_PART: &str = "xl/sharedStrings.xml";
const WORKSHEET_PREFIX: &str = "xl/worksheets/";

pub struct XlsxFiller;

impl TemplateFiller for XlsxFiller {
    fn fill(&self, source: &Path, target: &Path, data: &SubstitutionMap) -> Result<(), TemplateError> {
        let parts = part_names(source)?;
        if !parts.iter().any(|name| name == WORKBOOK_PART) {
            return Err(TemplateError::MissingPart(WORKBOOK_PART.to_string()));
        }

        let replaced = rewrite_package(source, target, |name, bytes| {
            if is_string_part(name) {
                fill_part(name, bytes, data)
            } else {
                Ok(None)
            }
        })?;

        log::debug!("Filled {} part(s) of {}", replaced, source.display());
        Ok(())
    }
}

fn is_string_part(name: &str) -> bool {
    if name == SHARED_STRINGS_PART {
        return true;
    }
    name.strip_prefix(WORKSHEET_PREFIX)
        .map(|file| !file.contains('/') && file.ends_with(".xml"))
        .unwrap_or(false)
}

fn is_string_item(start: &BytesStart<'_>) -> bool {
    matches!(start.local_name().as_ref(), b"si" | b"is")
}

/// Rewrite one XML part. Returns `None` when no string item changed.
pub fn fill_part(name: &str, bytes: &[u8], data: &SubstitutionMap) -> Result<Option<Vec<u8>>, TemplateError> {
    let xml = std::str::from_utf8(bytes).map_err(|_| TemplateError::Encoding(name.to_string()))?;
    if !contains_placeholder(xml) {
        return Ok(None);
    }

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(bytes.len()));
    let mut changed = false;

    loop {
        match reader.read_event()? {
            Event::Eof => break,
            Event::Start(start) if is_string_item(&start) => {
                let element = start.name().as_ref().to_vec();
                let body = read_element_body(&mut reader, &element, name)?;

                let replacement = match item_text(&body)? {
                    Some(text) if contains_placeholder(&text) => substitute_text(&text, data),
                    _ => None,
                };

                writer.write_event(Event::Start(start.clone()))?;
                match replacement {
                    Some(text) => {
                        let out = writer.get_mut();
                        out.extend_from_slice(b"<t xml:space=\"preserve\">");
                        out.extend_from_slice(escape(text.as_str()).as_bytes());
                        out.extend_from_slice(b"</t>");
                        changed = true;
                    }
                    None => {
                        for event in body {
                            writer.write_event(event)?;
                        }
                    }
                }
                writer.write_event(Event::End(start.to_end()))?;
            }
            event => writer.write_event(event)?,
        }
    }

    Ok(changed.then(|| writer.into_inner()))
}

/// Visible text of a string item: every `t` element outside phonetic runs.
fn item_text(body: &[Event<'_>]) -> Result<Option<String>, TemplateError> {
    let mut text = String::new();
    let mut in_text = false;
    let mut phonetic_depth = 0usize;

    for event in body {
        match event {
            Event::Start(e) if e.local_name().as_ref() == b"rPh" => phonetic_depth += 1,
            Event::End(e) if e.local_name().as_ref() == b"rPh" => {
                phonetic_depth = phonetic_depth.saturating_sub(1)
            }
            Event::Start(e) if e.local_name().as_ref() == b"t" => in_text = true,
            Event::End(e) if e.local_name().as_ref() == b"t" => in_text = false,
            Event::Text(t) if in_text && phonetic_depth == 0 => text.push_str(&t.unescape()?),
            Event::CData(c) if in_text && phonetic_depth == 0 => {
                text.push_str(&String::from_utf8_lossy(c))
            }
            _ => {}
        }
    }

    Ok((!text.is_empty()).then_some(text))
}
