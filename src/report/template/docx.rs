//! Placeholder filling for WordprocessingML (`.docx`) packages.
//!
//! Each `w:p` element is decomposed into its direct children. Text runs
//! (`w:r` holding `w:rPr`, `w:t`, tabs, line breaks and render hints) are
//! substituted as a group with [`substitute_runs`], using the raw `w:rPr`
//! markup as the run style. Hyperlinks, smart tags and tracked insertions are
//! kept as wrappers and their own runs form a separate group. Anything else
//! (fields, drawings, bookmarks) is copied through untouched and separates
//! groups.

use std::path::Path;

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::{Reader, Writer};

use super::package::{part_names, rewrite_package};
use super::runs::{contains_placeholder, substitute_runs, StyledRun};
use super::{TemplateError, TemplateFiller};
use crate::report::flatten::SubstitutionMap;

const MAIN_PART: &str = "word/document.xml";

const PARAGRAPH: &[u8] = b"w:p";
const RUN: &[u8] = b"w:r";
const RUN_PROPERTIES: &[u8] = b"w:rPr";
const TEXT: &[u8] = b"w:t";
const PROOFING_MARK: &[u8] = b"w:proofErr";
const RENDERED_BREAK: &[u8] = b"w:lastRenderedPageBreak";
const TAB: &[u8] = b"w:tab";
const LINE_BREAK: &[u8] = b"w:br";
const CARRIAGE_RETURN: &[u8] = b"w:cr";
const NO_BREAK_HYPHEN: &[u8] = b"w:noBreakHyphen";

/// Inline wrappers whose runs are filled in place.
const RUN_CONTAINERS: &[&[u8]] = &[b"w:hyperlink", b"w:smartTag", b"w:ins"];

const NON_BREAKING_HYPHEN: char = '\u{2011}';

/// Run style: the serialized `w:rPr` element, empty when the run has none.
type RunStyle = Vec<u8>;

pub struct DocxFiller;

impl TemplateFiller for DocxFiller {
    fn fill(&self, source: &Path, target: &Path, data: &SubstitutionMap) -> Result<(), TemplateError> {
        let parts = part_names(source)?;
        if !parts.iter().any(|name| name == MAIN_PART) {
            return Err(TemplateError::MissingPart(MAIN_PART.to_string()));
        }

        let replaced = rewrite_package(source, target, |name, bytes| {
            if is_text_part(name) {
                fill_part(name, bytes, data)
            } else {
                Ok(None)
            }
        })?;

        log::debug!(
            "Filled {} part(s) of {}",
            replaced,
            source.display()
        );
        Ok(())
    }
}

/// Body, headers and footers carry user-visible paragraphs.
fn is_text_part(name: &str) -> bool {
    if name == MAIN_PART {
        return true;
    }
    let Some(file) = name.strip_prefix("word/") else {
        return false;
    };
    !file.contains('/')
        && (file.starts_with("header") || file.starts_with("footer"))
        && file.ends_with(".xml")
}

/// Rewrite one XML part. Returns `None` when no paragraph changed.
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
            Event::Start(start) if start.name().as_ref() == PARAGRAPH => {
                let children = read_element_body(&mut reader, PARAGRAPH, name)?;
                writer.write_event(Event::Start(start.clone()))?;
                changed |= write_paragraph_children(&mut writer, children, data)?;
                writer.write_event(Event::End(start.to_end()))?;
            }
            event => writer.write_event(event)?,
        }
    }

    Ok(changed.then(|| writer.into_inner()))
}

/// Events between a start tag and its matching end tag, both excluded.
pub(super) fn read_element_body<'a>(
    reader: &mut Reader<&'a [u8]>,
    element: &[u8],
    part: &str,
) -> Result<Vec<Event<'a>>, TemplateError> {
    let mut depth = 0usize;
    let mut events = Vec::new();

    loop {
        let event = reader.read_event()?;
        match &event {
            Event::Start(e) if e.name().as_ref() == element => depth += 1,
            Event::End(e) if e.name().as_ref() == element => {
                if depth == 0 {
                    return Ok(events);
                }
                depth -= 1;
            }
            Event::Eof => return Err(TemplateError::Truncated(part.to_string())),
            _ => {}
        }
        events.push(event);
    }
}

/// Split a flat event list into top-level elements (each a balanced slice).
fn split_elements(events: Vec<Event<'_>>) -> Vec<Vec<Event<'_>>> {
    let mut elements = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;

    for event in events {
        match &event {
            Event::Start(_) => depth += 1,
            Event::End(_) => depth = depth.saturating_sub(1),
            _ => {}
        }
        current.push(event);
        if depth == 0 {
            elements.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        elements.push(current);
    }
    elements
}

enum ParagraphItem<'a> {
    /// A run holding only styled text.
    Text {
        run: StyledRun<RunStyle>,
        events: Vec<Event<'a>>,
    },
    /// Markup that may sit between text runs and is dropped on rewrite.
    Transparent(Vec<Event<'a>>),
    /// A wrapper around runs, filled as its own group.
    Container(Vec<Event<'a>>),
    /// Anything else, always copied through.
    Opaque(Vec<Event<'a>>),
}

impl<'a> ParagraphItem<'a> {
    fn events(self) -> Vec<Event<'a>> {
        match self {
            ParagraphItem::Text { events, .. }
            | ParagraphItem::Transparent(events)
            | ParagraphItem::Container(events)
            | ParagraphItem::Opaque(events) => events,
        }
    }

    fn joins_group(&self) -> bool {
        matches!(self, ParagraphItem::Text { .. } | ParagraphItem::Transparent(_))
    }
}

fn element_name<'e>(element: &'e [Event<'_>]) -> Option<&'e [u8]> {
    match element.first()? {
        Event::Start(e) | Event::Empty(e) => Some(e.name().into_inner()),
        _ => None,
    }
}

fn classify(element: Vec<Event<'_>>) -> Result<ParagraphItem<'_>, TemplateError> {
    let name = element_name(&element);
    let is_proofing_mark = name == Some(PROOFING_MARK);
    let has_body = matches!(element.first(), Some(Event::Start(_)));
    let is_run = name == Some(RUN) && has_body;
    let is_container = has_body && name.is_some_and(|n| RUN_CONTAINERS.iter().any(|c| *c == n));

    if is_proofing_mark {
        return Ok(ParagraphItem::Transparent(element));
    }
    if is_container {
        return Ok(ParagraphItem::Container(element));
    }
    if is_run {
        if let Some(run) = text_run(&element)? {
            return Ok(ParagraphItem::Text { run, events: element });
        }
    }
    Ok(ParagraphItem::Opaque(element))
}

/// Style and text of a plain text run, `None` for runs with other content.
fn text_run(run: &[Event<'_>]) -> Result<Option<StyledRun<RunStyle>>, TemplateError> {
    let inner = run[1..run.len().saturating_sub(1)].to_vec();
    let mut style = RunStyle::new();
    let mut text = String::new();

    for child in split_elements(inner) {
        match element_name(&child) {
            Some(RUN_PROPERTIES) => style = serialize(&child)?,
            Some(RENDERED_BREAK) => {}
            Some(TAB) => text.push('\t'),
            Some(CARRIAGE_RETURN) => text.push('\n'),
            Some(LINE_BREAK) if is_text_wrapping(&child)? => text.push('\n'),
            Some(NO_BREAK_HYPHEN) => text.push(NON_BREAKING_HYPHEN),
            Some(TEXT) => {
                for event in &child {
                    if let Event::Text(t) = event {
                        text.push_str(&t.unescape()?);
                    }
                }
            }
            None if child.iter().all(is_whitespace) => {}
            _ => return Ok(None),
        }
    }

    Ok(Some(StyledRun::new(text, style)))
}

/// Page and column breaks carry a `w:type` and are not part of the text.
fn is_text_wrapping(element: &[Event<'_>]) -> Result<bool, TemplateError> {
    let Some(Event::Start(e) | Event::Empty(e)) = element.first() else {
        return Ok(false);
    };
    let kind = e
        .try_get_attribute("w:type")
        .map_err(quick_xml::Error::from)?;
    Ok(kind.map_or(true, |attr| attr.value.as_ref() == b"textWrapping"))
}

fn is_whitespace(event: &Event<'_>) -> bool {
    match event {
        Event::Text(t) => t.iter().all(|b| b.is_ascii_whitespace()),
        _ => false,
    }
}

fn serialize(events: &[Event<'_>]) -> Result<Vec<u8>, TemplateError> {
    let mut writer = Writer::new(Vec::new());
    for event in events {
        writer.write_event(event.clone())?;
    }
    Ok(writer.into_inner())
}

/// Write a paragraph's children, substituting text-run groups.
/// Returns whether any group was rewritten.
fn write_paragraph_children(
    writer: &mut Writer<Vec<u8>>,
    children: Vec<Event<'_>>,
    data: &SubstitutionMap,
) -> Result<bool, TemplateError> {
    let mut items = Vec::new();
    for element in split_elements(children) {
        items.push(classify(element)?);
    }

    let mut changed = false;
    let mut group: Vec<ParagraphItem<'_>> = Vec::new();

    for item in items {
        if item.joins_group() {
            group.push(item);
            continue;
        }
        changed |= flush_group(writer, std::mem::take(&mut group), data)?;
        if let ParagraphItem::Container(mut events) = item {
            // Start tag, wrapped runs, end tag.
            let end = events.pop();
            let inner = events.split_off(1);
            for event in events {
                writer.write_event(event)?;
            }
            changed |= write_paragraph_children(writer, inner, data)?;
            if let Some(end) = end {
                writer.write_event(end)?;
            }
            continue;
        }
        for event in item.events() {
            writer.write_event(event)?;
        }
    }
    changed |= flush_group(writer, group, data)?;

    Ok(changed)
}

fn flush_group(
    writer: &mut Writer<Vec<u8>>,
    group: Vec<ParagraphItem<'_>>,
    data: &SubstitutionMap,
) -> Result<bool, TemplateError> {
    let runs: Vec<StyledRun<RunStyle>> = group
        .iter()
        .filter_map(|item| match item {
            ParagraphItem::Text { run, .. } => Some(run.clone()),
            _ => None,
        })
        .collect();

    match substitute_runs(&runs, data) {
        Some(replacement) => {
            for run in &replacement {
                write_text_run(writer.get_mut(), run);
            }
            Ok(true)
        }
        None => {
            for item in group {
                for event in item.events() {
                    writer.write_event(event)?;
                }
            }
            Ok(false)
        }
    }
}

/// Emit `<w:r>` with the given style. Tabs, line breaks and non-breaking
/// hyphens in the text become their own run elements.
fn write_text_run(out: &mut Vec<u8>, run: &StyledRun<RunStyle>) {
    out.extend_from_slice(b"<w:r>");
    out.extend_from_slice(&run.style);
    let mut rest = run.text.as_str();
    while !rest.is_empty() {
        let split = rest
            .find(['\t', '\n', NON_BREAKING_HYPHEN])
            .unwrap_or(rest.len());
        let (text, tail) = rest.split_at(split);
        if !text.is_empty() {
            out.extend_from_slice(b"<w:t xml:space=\"preserve\">");
            out.extend_from_slice(escape(text).as_bytes());
            out.extend_from_slice(b"</w:t>");
        }
        let mut chars = tail.chars();
        match chars.next() {
            Some('\t') => out.extend_from_slice(b"<w:tab/>"),
            Some('\n') => out.extend_from_slice(b"<w:br/>"),
            Some(NON_BREAKING_HYPHEN) => out.extend_from_slice(b"<w:noBreakHyphen/>"),
            _ => {}
        }
        rest = chars.as_str();
    }
    out.extend_from_slice(b"</w:r>");
}
