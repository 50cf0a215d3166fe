//! Small helpers over `quick-xml` events.

use quick_xml::escape::{escape, partial_escape, resolve_predefined_entity};
use quick_xml::events::{BytesRef, BytesText, Event};
use quick_xml::Reader;

use crate::DocxError;

pub(crate) const TEXT_TAG: &[u8] = b"w:t";
pub(crate) const PARAGRAPH_TAG: &[u8] = b"w:p";

pub(crate) fn xml_err(e: impl std::fmt::Display) -> DocxError {
    DocxError::Xml(e.to_string())
}

/// Decoded content of a text event.
pub(crate) fn text_of(text: &BytesText) -> Result<String, DocxError> {
    let decoded = text.decode().map_err(xml_err)?;
    Ok(quick_xml::escape::unescape(&decoded)
        .map_err(xml_err)?
        .into_owned())
}

/// Decoded content of an entity or character reference.
///
/// Unknown entities are kept in their escaped form.
pub(crate) fn ref_text(reference: &BytesRef) -> Result<String, DocxError> {
    if let Some(ch) = reference.resolve_char_ref().map_err(xml_err)? {
        return Ok(ch.to_string());
    }
    let name = reference.decode().map_err(xml_err)?;
    Ok(match resolve_predefined_entity(&name) {
        Some(resolved) => resolved.to_string(),
        None => format!("&{name};"),
    })
}

/// Escape character data.
pub(crate) fn escape_text(text: &str) -> String {
    partial_escape(text).into_owned()
}

/// Escape an attribute value.
pub(crate) fn escape_attr(text: &str) -> String {
    escape(text).into_owned()
}

/// Concatenated `w:t` content of an XML fragment.
pub(crate) fn visible_text(xml: &str) -> Result<String, DocxError> {
    let mut reader = Reader::from_str(xml);
    let mut text = String::new();
    let mut in_text = false;

    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) if e.name().as_ref() == TEXT_TAG => in_text = true,
            Event::End(e) if e.name().as_ref() == TEXT_TAG => in_text = false,
            Event::Text(t) if in_text => text.push_str(&text_of(&t)?),
            Event::GeneralRef(r) if in_text => text.push_str(&ref_text(&r)?),
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(text)
}

/// Value of attribute `key` in the first `<tag .../>` of `xml`.
pub(crate) fn attribute_of(xml: &str, tag: &[u8], key: &[u8]) -> Result<Option<String>, DocxError> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event().map_err(xml_err)? {
            Event::Start(e) | Event::Empty(e) if e.name().as_ref() == tag => {
                for attribute in e.attributes() {
                    let attribute = attribute.map_err(xml_err)?;
                    if attribute.key.as_ref() == key {
                        let raw = std::str::from_utf8(&attribute.value).map_err(xml_err)?;
                        let value = quick_xml::escape::unescape(raw).map_err(xml_err)?;
                        return Ok(Some(value.into_owned()));
                    }
                }
                return Ok(None);
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_visible_text_joins_runs_and_entities() {
        let xml = r#"<w:p><w:r><w:t>A &amp; </w:t></w:r><w:r><w:t xml:space="preserve">B&#233;</w:t></w:r><w:r><w:tab/></w:r></w:p>"#;
        assert_eq!(visible_text(xml).unwrap(), "A & Bé");
    }

    #[test]
    fn test_visible_text_ignores_instr_text() {
        let xml = r#"<w:p><w:r><w:instrText>PAGE</w:instrText></w:r><w:r><w:t>x</w:t></w:r></w:p>"#;
        assert_eq!(visible_text(xml).unwrap(), "x");
    }

    #[test]
    fn test_attribute_of() {
        let xml = r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr>"#;
        assert_eq!(
            attribute_of(xml, b"w:pgSz", b"w:h").unwrap().as_deref(),
            Some("16838")
        );
        assert_eq!(attribute_of(xml, b"w:pgMar", b"w:top").unwrap(), None);
    }

    #[test]
    fn test_escape_text() {
        assert_eq!(escape_text("a < b & \"c\""), "a &lt; b &amp; \"c\"");
        assert_eq!(escape_attr("\"x\""), "&quot;x&quot;");
    }
}
