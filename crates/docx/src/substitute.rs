//! `{{ key }}` placeholder substitution.
//!
//! Word freely splits a paragraph's text into several runs, so a
//! placeholder typed as `{{ nome }}` may arrive as `{{ no` + `me }}`. Each
//! paragraph is buffered; when every placeholder sits inside one `w:t` the
//! text nodes are filled in place and run formatting survives. Otherwise
//! the paragraph's text is merged into its first text node.
//!
//! Placeholders without a value in the context are left as typed.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use quick_xml::events::{BytesText, Event};
use quick_xml::{Reader, Writer};
use regex::{Captures, Regex};

use crate::xml::{ref_text, text_of, xml_err, PARAGRAPH_TAG, TEXT_TAG};
use crate::DocxError;

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^{}\s]+)\s*\}\}").unwrap());

/// Replace every resolvable placeholder in `text`.
pub fn fill_placeholders(text: &str, context: &BTreeMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures| match context.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholder keys found in `text`, in order of appearance.
pub fn placeholder_keys(text: &str) -> Vec<String> {
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .collect()
}

/// Substitute placeholders in an XML part or fragment.
pub(crate) fn substitute_xml(
    xml: &str,
    context: &BTreeMap<String, String>,
) -> Result<String, DocxError> {
    if !xml.contains('{') {
        return Ok(xml.to_string());
    }

    let mut reader = Reader::from_str(xml);
    let mut writer = Writer::new(Vec::with_capacity(xml.len()));
    // Open paragraphs, innermost last. Text boxes nest paragraphs.
    let mut open: Vec<Vec<Event<'static>>> = Vec::new();

    loop {
        let event = reader.read_event().map_err(xml_err)?.into_owned();
        if matches!(event, Event::Eof) {
            break;
        }

        if opens(&event, PARAGRAPH_TAG) {
            open.push(vec![event]);
        } else if closes(&event, PARAGRAPH_TAG) {
            let mut paragraph = open
                .pop()
                .ok_or_else(|| DocxError::Xml("unbalanced w:p".to_string()))?;
            paragraph.push(event);
            let filled = fill_paragraph(paragraph, context)?;
            emit(&mut open, &mut writer, filled)?;
        } else {
            emit(&mut open, &mut writer, vec![event])?;
        }
    }

    String::from_utf8(writer.into_inner()).map_err(xml_err)
}

fn opens(event: &Event, tag: &[u8]) -> bool {
    matches!(event, Event::Start(e) if e.name().as_ref() == tag)
}

fn closes(event: &Event, tag: &[u8]) -> bool {
    matches!(event, Event::End(e) if e.name().as_ref() == tag)
}

fn emit(
    open: &mut [Vec<Event<'static>>],
    writer: &mut Writer<Vec<u8>>,
    events: Vec<Event<'static>>,
) -> Result<(), DocxError> {
    match open.last_mut() {
        Some(parent) => parent.extend(events),
        None => {
            for event in events {
                writer.write_event(event).map_err(xml_err)?;
            }
        }
    }
    Ok(())
}

/// A `w:t` element of the paragraph being filled.
struct TextNode {
    start: usize,
    end: usize,
    text: String,
}

/// Fill one buffered paragraph; nested paragraphs were filled already.
fn fill_paragraph(
    events: Vec<Event<'static>>,
    context: &BTreeMap<String, String>,
) -> Result<Vec<Event<'static>>, DocxError> {
    let nodes = text_nodes(&events)?;
    let joined: String = nodes.iter().map(|n| n.text.as_str()).collect();
    if !PLACEHOLDER.is_match(&joined) {
        return Ok(events);
    }

    let filled = fill_placeholders(&joined, context);
    let per_node: Vec<String> = nodes
        .iter()
        .map(|n| fill_placeholders(&n.text, context))
        .collect();
    let replacements = if per_node.concat() == filled {
        per_node
    } else {
        let mut merged = vec![String::new(); nodes.len()];
        merged[0] = filled;
        merged
    };

    let mut out = Vec::with_capacity(events.len());
    let mut pending = nodes.into_iter().zip(replacements);
    let mut next = pending.next();
    let mut skip_until: Option<usize> = None;

    for (i, event) in events.into_iter().enumerate() {
        if let Some(end) = skip_until {
            if i < end {
                continue;
            }
            skip_until = None;
        }

        if let Some((node, replacement)) = next.take_if(|(node, _)| node.start == i) {
            out.push(preserve_space(event)?);
            if !replacement.is_empty() {
                out.push(Event::Text(BytesText::new(&replacement).into_owned()));
            }
            skip_until = Some(node.end);
            next = pending.next();
            continue;
        }

        out.push(event);
    }

    Ok(out)
}

fn text_nodes(events: &[Event<'static>]) -> Result<Vec<TextNode>, DocxError> {
    let mut nodes = Vec::new();
    let mut nested = 0usize;
    let mut current: Option<(usize, String)> = None;
    let last = events.len().saturating_sub(1);

    for (i, event) in events.iter().enumerate() {
        if i == 0 || i == last {
            continue;
        }
        match event {
            Event::Start(e) if e.name().as_ref() == PARAGRAPH_TAG => nested += 1,
            Event::End(e) if e.name().as_ref() == PARAGRAPH_TAG => {
                nested = nested.saturating_sub(1)
            }
            _ if nested > 0 => {}
            Event::Start(e) if e.name().as_ref() == TEXT_TAG => current = Some((i, String::new())),
            Event::End(e) if e.name().as_ref() == TEXT_TAG => {
                if let Some((start, text)) = current.take() {
                    nodes.push(TextNode {
                        start,
                        end: i,
                        text,
                    });
                }
            }
            Event::Text(t) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&text_of(t)?);
                }
            }
            Event::GeneralRef(r) => {
                if let Some((_, text)) = current.as_mut() {
                    text.push_str(&ref_text(r)?);
                }
            }
            _ => {}
        }
    }

    Ok(nodes)
}

/// Mark a `w:t` start tag so Word keeps leading and trailing spaces.
fn preserve_space(event: Event<'static>) -> Result<Event<'static>, DocxError> {
    match event {
        Event::Start(mut start) => {
            if start.try_get_attribute("xml:space").map_err(xml_err)?.is_none() {
                start.push_attribute(("xml:space", "preserve"));
            }
            Ok(Event::Start(start))
        }
        other => Ok(other),
    }
}
