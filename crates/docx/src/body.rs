//! Top-level blocks of the document body.
//!
//! The body is kept as a sequence of raw XML fragments, one per direct child
//! of `w:body`. Whitespace and comments between children stay with the
//! child that follows them, so untouched blocks are written back byte for
//! byte.

use quick_xml::events::Event;
use quick_xml::Reader;

use crate::xml::{attribute_of, escape_attr, escape_text, visible_text, xml_err, PARAGRAPH_TAG};
use crate::DocxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Paragraph,
    Table,
    /// The final `w:sectPr` of the body.
    SectionProperties,
    Other,
}

impl BlockKind {
    fn from_tag(tag: &[u8]) -> Self {
        match tag {
            PARAGRAPH_TAG => BlockKind::Paragraph,
            b"w:tbl" => BlockKind::Table,
            b"w:sectPr" => BlockKind::SectionProperties,
            _ => BlockKind::Other,
        }
    }
}

/// Paragraph alignment (`w:jc`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Alignment {
    Left,
    Center,
    Right,
    Both,
}

impl Alignment {
    fn as_str(&self) -> &'static str {
        match self {
            Alignment::Left => "left",
            Alignment::Center => "center",
            Alignment::Right => "right",
            Alignment::Both => "both",
        }
    }
}

/// Direct formatting for generated paragraphs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParagraphStyle {
    /// Style id from `styles.xml`, e.g. `Heading1`.
    pub style_id: Option<String>,
    pub alignment: Option<Alignment>,
    pub bold: bool,
    /// RGB hex, e.g. `C00000`.
    pub color: Option<String>,
}

impl ParagraphStyle {
    pub fn styled(style_id: impl Into<String>) -> Self {
        Self {
            style_id: Some(style_id.into()),
            ..Self::default()
        }
    }

    fn paragraph_properties(&self) -> String {
        let mut ppr = String::new();
        if let Some(id) = &self.style_id {
            ppr.push_str(&format!("<w:pStyle w:val=\"{}\"/>", escape_attr(id)));
        }
        if let Some(alignment) = self.alignment {
            ppr.push_str(&format!("<w:jc w:val=\"{}\"/>", alignment.as_str()));
        }
        if ppr.is_empty() {
            ppr
        } else {
            format!("<w:pPr>{ppr}</w:pPr>")
        }
    }

    fn run_properties(&self) -> String {
        let mut rpr = String::new();
        if self.bold {
            rpr.push_str("<w:b/>");
        }
        if let Some(color) = &self.color {
            rpr.push_str(&format!("<w:color w:val=\"{}\"/>", escape_attr(color)));
        }
        if rpr.is_empty() {
            rpr
        } else {
            format!("<w:rPr>{rpr}</w:rPr>")
        }
    }
}

/// One direct child of `w:body`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    kind: BlockKind,
    xml: String,
}

impl Block {
    pub fn raw(kind: BlockKind, xml: impl Into<String>) -> Self {
        Self {
            kind,
            xml: xml.into(),
        }
    }

    /// A single-run paragraph.
    pub fn paragraph(text: &str, style: &ParagraphStyle) -> Self {
        let mut xml = format!("<w:p>{}", style.paragraph_properties());
        if !text.is_empty() {
            xml.push_str(&format!(
                "<w:r>{}<w:t xml:space=\"preserve\">{}</w:t></w:r>",
                style.run_properties(),
                escape_text(text)
            ));
        }
        xml.push_str("</w:p>");
        Self::raw(BlockKind::Paragraph, xml)
    }

    /// A heading paragraph using the `<prefix><level>` style (`Heading2`).
    pub fn heading(level: usize, text: &str, style_prefix: &str) -> Self {
        Self::paragraph(text, &ParagraphStyle::styled(format!("{style_prefix}{level}")))
    }

    pub fn page_break() -> Self {
        Self::raw(
            BlockKind::Paragraph,
            "<w:p><w:r><w:br w:type=\"page\"/></w:r></w:p>",
        )
    }

    pub fn blank() -> Self {
        Self::raw(BlockKind::Paragraph, "<w:p/>")
    }

    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    pub fn xml(&self) -> &str {
        &self.xml
    }

    pub(crate) fn set_xml(&mut self, xml: String) {
        self.xml = xml;
    }

    pub fn is_paragraph(&self) -> bool {
        self.kind == BlockKind::Paragraph
    }

    /// Visible text of the block.
    pub fn text(&self) -> Result<String, DocxError> {
        visible_text(&self.xml)
    }

    /// Paragraph style id, if any.
    pub fn style_id(&self) -> Result<Option<String>, DocxError> {
        attribute_of(&self.xml, b"w:pStyle", b"w:val")
    }

    pub fn has_page_break(&self) -> bool {
        self.xml.contains("w:type=\"page\"")
    }
}

/// `document.xml` split around its body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Body {
    /// Everything up to and including `<w:body>`.
    pub prefix: String,
    pub blocks: Vec<Block>,
    /// `</w:body>` and everything after it.
    pub suffix: String,
}

impl Body {
    pub fn parse(xml: &str) -> Result<Self, DocxError> {
        let mut reader = Reader::from_str(xml);
        let mut depth = 0usize;
        let mut body_depth: Option<usize> = None;
        let mut prefix_end = 0usize;
        let mut last_end = 0usize;
        let mut block_start: Option<usize> = None;
        let mut blocks = Vec::new();

        loop {
            let before = reader.buffer_position() as usize;
            let event = reader.read_event().map_err(xml_err)?;
            let after = reader.buffer_position() as usize;

            match event {
                Event::Start(e) => {
                    depth += 1;
                    match body_depth {
                        None if e.name().as_ref() == b"w:body" => {
                            body_depth = Some(depth);
                            prefix_end = after;
                            last_end = after;
                        }
                        Some(body) if depth == body + 1 => block_start = Some(last_end),
                        _ => {}
                    }
                }
                Event::End(e) => {
                    match body_depth {
                        Some(body) if depth == body + 1 => {
                            if let Some(start) = block_start.take() {
                                let kind = BlockKind::from_tag(e.name().as_ref());
                                blocks.push(Block::raw(kind, &xml[start..after]));
                                last_end = after;
                            }
                        }
                        Some(body) if depth == body => {
                            return Ok(Self {
                                prefix: xml[..prefix_end].to_string(),
                                blocks,
                                suffix: xml[last_end..].to_string(),
                            });
                        }
                        _ => {}
                    }
                    depth = depth.saturating_sub(1);
                }
                Event::Empty(e) => match body_depth {
                    None if e.name().as_ref() == b"w:body" => {
                        return Ok(Self {
                            prefix: format!("{}<w:body>", &xml[..before]),
                            blocks,
                            suffix: format!("</w:body>{}", &xml[after..]),
                        });
                    }
                    Some(body) if depth == body => {
                        let kind = BlockKind::from_tag(e.name().as_ref());
                        blocks.push(Block::raw(kind, &xml[last_end..after]));
                        last_end = after;
                    }
                    _ => {}
                },
                Event::Eof => break,
                _ => {}
            }
        }

        Err(DocxError::Xml("document has no w:body".to_string()))
    }

    pub fn to_xml(&self) -> String {
        let mut xml = String::with_capacity(
            self.prefix.len()
                + self.suffix.len()
                + self.blocks.iter().map(|b| b.xml.len()).sum::<usize>(),
        );
        xml.push_str(&self.prefix);
        for block in &self.blocks {
            xml.push_str(&block.xml);
        }
        xml.push_str(&self.suffix);
        xml
    }

    /// Index of the trailing section properties, if present.
    pub fn section_properties(&self) -> Option<usize> {
        self.blocks
            .iter()
            .rposition(|b| b.kind == BlockKind::SectionProperties)
    }
}
