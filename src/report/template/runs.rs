//! Placeholder substitution over text and over styled runs.
//!
//! Office documents often split a logical `{{KEY}}` token across several
//! runs with different formatting. Substitution therefore works on the
//! concatenated paragraph text and re-derives the runs afterwards from a
//! per-character style table.

use crate::report::flatten::SubstitutionMap;

pub const PLACEHOLDER_OPEN: &str = "{{";
pub const PLACEHOLDER_CLOSE: &str = "}}";

/// A span of text that shares one style.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StyledRun<S> {
    pub text: String,
    pub style: S,
}

impl<S> StyledRun<S> {
    pub fn new(text: impl Into<String>, style: S) -> Self {
        Self {
            text: text.into(),
            style,
        }
    }
}

/// One `{{KEY}}` occurrence with a known key, as byte offsets into the text.
#[derive(Debug)]
struct Substitution<'a> {
    start: usize,
    end: usize,
    value: &'a str,
}

pub fn contains_placeholder(text: &str) -> bool {
    text.contains(PLACEHOLDER_OPEN)
}

/// Left-to-right scan for placeholders whose key is present in `data`.
///
/// Unknown keys stay in the text untouched, and replacement values are never
/// scanned again.
fn find_substitutions<'a>(text: &str, data: &'a SubstitutionMap) -> Vec<Substitution<'a>> {
    let mut found = Vec::new();
    let mut cursor = 0;

    while let Some(offset) = text[cursor..].find(PLACEHOLDER_OPEN) {
        let open = cursor + offset;
        let key_start = open + PLACEHOLDER_OPEN.len();
        let Some(close_offset) = text[key_start..].find(PLACEHOLDER_CLOSE) else {
            break;
        };
        let close = key_start + close_offset;

        match data.get(&text[key_start..close]) {
            Some(value) => {
                let end = close + PLACEHOLDER_CLOSE.len();
                found.push(Substitution {
                    start: open,
                    end,
                    value: value.as_str(),
                });
                cursor = end;
            }
            // `{` is one byte, so this stays on a char boundary.
            None => cursor = open + 1,
        }
    }

    found
}

/// Replace every known placeholder in `text`.
///
/// Returns `None` when nothing was replaced.
pub fn substitute_text(text: &str, data: &SubstitutionMap) -> Option<String> {
    let substitutions = find_substitutions(text, data);
    if substitutions.is_empty() {
        return None;
    }

    let mut result = String::with_capacity(text.len());
    let mut cursor = 0;
    for sub in &substitutions {
        result.push_str(&text[cursor..sub.start]);
        result.push_str(sub.value);
        cursor = sub.end;
    }
    result.push_str(&text[cursor..]);
    Some(result)
}

/// Substitute placeholders across a paragraph's runs.
///
/// Untouched characters keep the style of the run they came from. Inserted
/// text takes the style of the run holding the first character of its
/// placeholder. Adjacent characters with equal styles are merged, so the
/// result is the minimal run sequence. Returns `None` when the paragraph
/// contains no known placeholder and should be left as it is.
pub fn substitute_runs<S>(runs: &[StyledRun<S>], data: &SubstitutionMap) -> Option<Vec<StyledRun<S>>>
where
    S: Clone + PartialEq,
{
    let full_text: String = runs.iter().map(|run| run.text.as_str()).collect();
    let substitutions = find_substitutions(&full_text, data);
    if substitutions.is_empty() {
        return None;
    }

    // Style of every character of the original text, by character offset.
    let style_at: Vec<&S> = runs
        .iter()
        .flat_map(|run| run.text.chars().map(move |_| &run.style))
        .collect();

    let mut output: Vec<StyledRun<S>> = Vec::new();
    let mut byte_pos = 0;
    let mut char_pos = 0;

    for sub in &substitutions {
        for ch in full_text[byte_pos..sub.start].chars() {
            push_char(&mut output, ch, style_at[char_pos]);
            char_pos += 1;
        }

        let anchor = style_at[char_pos];
        push_str(&mut output, sub.value, anchor);

        char_pos += full_text[sub.start..sub.end].chars().count();
        byte_pos = sub.end;
    }

    for ch in full_text[byte_pos..].chars() {
        push_char(&mut output, ch, style_at[char_pos]);
        char_pos += 1;
    }

    Some(output)
}

fn push_char<S: Clone + PartialEq>(output: &mut Vec<StyledRun<S>>, ch: char, style: &S) {
    match output.last_mut() {
        Some(last) if last.style == *style => last.text.push(ch),
        _ => output.push(StyledRun::new(ch.to_string(), style.clone())),
    }
}

fn push_str<S: Clone + PartialEq>(output: &mut Vec<StyledRun<S>>, text: &str, style: &S) {
    if text.is_empty() {
        return;
    }
    match output.last_mut() {
        Some(last) if last.style == *style => last.text.push_str(text),
        _ => output.push(StyledRun::new(text, style.clone())),
    }
}
