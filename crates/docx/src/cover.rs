//! Cover images.
//!
//! Two mutually exclusive strategies:
//!
//! - [`CoverStrategy::FullPage`] adds a first page holding only the image,
//!   sized to the page with zero margins. The section that follows keeps
//!   the margins the template gives it, or gets standard one-inch margins
//!   when the template declares none.
//! - [`CoverStrategy::ReplaceResource`] swaps the bytes of an image part
//!   the template already reserves for the cover.

use std::sync::LazyLock;

use regex::Regex;

use crate::body::{Block, BlockKind, Body};
use crate::package::{Package, CONTENT_TYPES_PART, DOCUMENT_RELS_PART};
use crate::xml::attribute_of;
use crate::DocxError;

/// A4 portrait, in twentieths of a point.
const DEFAULT_PAGE_WIDTH: u64 = 11906;
const DEFAULT_PAGE_HEIGHT: u64 = 16838;
/// One inch, in twentieths of a point.
const STANDARD_MARGIN: u64 = 1440;
const EMU_PER_TWIP: u64 = 635;

const IMAGE_RELATIONSHIP: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

static PAGE_MARGIN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<w:pgMar\b[^>]*/>").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoverStrategy {
    FullPage,
    /// Package part to overwrite, e.g. `word/media/image1.png`.
    ReplaceResource { part: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
    Gif,
    Bmp,
}

impl ImageFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpeg",
            ImageFormat::Gif => "gif",
            ImageFormat::Bmp => "bmp",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ImageFormat::Png => "image/png",
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
        }
    }
}

/// Detect an image format from its magic bytes.
pub fn detect_image_format(bytes: &[u8]) -> Option<ImageFormat> {
    if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        Some(ImageFormat::Png)
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some(ImageFormat::Jpeg)
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some(ImageFormat::Gif)
    } else if bytes.starts_with(b"BM") {
        Some(ImageFormat::Bmp)
    } else {
        None
    }
}

/// Index of the block carrying the properties of the section that contains
/// block `from`: the first paragraph-level `w:sectPr` at or after it, else
/// the body's final one.
fn section_of(body: &Body, from: usize) -> Option<usize> {
    body.blocks
        .iter()
        .enumerate()
        .skip(from)
        .find(|(_, block)| block.is_paragraph() && block.xml().contains("<w:sectPr"))
        .map(|(index, _)| index)
        .or_else(|| body.section_properties())
}

/// Page size in twips of the first section.
pub(crate) fn page_size(body: &Body) -> Result<(u64, u64), DocxError> {
    let Some(index) = section_of(body, 0) else {
        return Ok((DEFAULT_PAGE_WIDTH, DEFAULT_PAGE_HEIGHT));
    };
    let xml = body.blocks[index].xml();
    let read = |key: &[u8], default: u64| -> Result<u64, DocxError> {
        Ok(attribute_of(xml, b"w:pgSz", key)?
            .and_then(|v| v.parse().ok())
            .unwrap_or(default))
    };
    Ok((
        read(b"w:w", DEFAULT_PAGE_WIDTH)?,
        read(b"w:h", DEFAULT_PAGE_HEIGHT)?,
    ))
}

pub(crate) fn replace_resource(
    package: &mut Package,
    part: &str,
    image: &[u8],
) -> Result<(), DocxError> {
    if !package.contains(part) {
        return Err(DocxError::ResourceNotFound(part.to_string()));
    }
    package.set(part, image.to_vec());
    Ok(())
}

pub(crate) fn insert_full_page(
    package: &mut Package,
    body: &mut Body,
    image: &[u8],
) -> Result<(), DocxError> {
    let format = detect_image_format(image).ok_or(DocxError::UnsupportedImage)?;

    let mut n = 1usize;
    let media = loop {
        let name = format!("word/media/cover{n}.{}", format.extension());
        if !package.contains(&name) {
            break name;
        }
        n += 1;
    };
    package.set(&media, image.to_vec());

    let relationship_id = add_relationship(package, &media)?;
    ensure_default_content_type(package, format)?;

    let (width, height) = page_size(body)?;
    body.blocks.insert(
        0,
        cover_paragraph(&relationship_id, n, width, height),
    );
    restore_margins(body, 1, width, height);
    Ok(())
}

fn add_relationship(package: &mut Package, media: &str) -> Result<String, DocxError> {
    let mut rels = package.text(DOCUMENT_RELS_PART)?;
    let mut n = 1usize;
    let id = loop {
        let id = format!("rIdCover{n}");
        if !rels.contains(&format!("Id=\"{id}\"")) {
            break id;
        }
        n += 1;
    };

    let target = media.trim_start_matches("word/");
    let relationship =
        format!("<Relationship Id=\"{id}\" Type=\"{IMAGE_RELATIONSHIP}\" Target=\"{target}\"/>");
    let close = rels
        .rfind("</Relationships>")
        .ok_or_else(|| DocxError::Xml(format!("{DOCUMENT_RELS_PART}: no </Relationships>")))?;
    rels.insert_str(close, &relationship);

    package.set(DOCUMENT_RELS_PART, rels.into_bytes());
    Ok(id)
}

fn ensure_default_content_type(package: &mut Package, format: ImageFormat) -> Result<(), DocxError> {
    let mut types = package.text(CONTENT_TYPES_PART)?;
    let declared = format!("extension=\"{}\"", format.extension());
    if types.to_lowercase().contains(&declared) {
        return Ok(());
    }

    let default = format!(
        "<Default Extension=\"{}\" ContentType=\"{}\"/>",
        format.extension(),
        format.content_type()
    );
    let close = types
        .rfind("</Types>")
        .ok_or_else(|| DocxError::Xml(format!("{CONTENT_TYPES_PART}: no </Types>")))?;
    types.insert_str(close, &default);

    package.set(CONTENT_TYPES_PART, types.into_bytes());
    Ok(())
}

fn zero_margin_section(width: u64, height: u64) -> String {
    format!(
        concat!(
            "<w:sectPr><w:pgSz w:w=\"{w}\" w:h=\"{h}\"/>",
            "<w:pgMar w:top=\"0\" w:right=\"0\" w:bottom=\"0\" w:left=\"0\" ",
            "w:header=\"0\" w:footer=\"0\" w:gutter=\"0\"/></w:sectPr>"
        ),
        w = width,
        h = height
    )
}

fn standard_margins() -> String {
    format!(
        concat!(
            "<w:pgMar w:top=\"{m}\" w:right=\"{m}\" w:bottom=\"{m}\" w:left=\"{m}\" ",
            "w:header=\"720\" w:footer=\"720\" w:gutter=\"0\"/>"
        ),
        m = STANDARD_MARGIN
    )
}

fn cover_paragraph(relationship_id: &str, n: usize, width: u64, height: u64) -> Block {
    let cx = width * EMU_PER_TWIP;
    let cy = height * EMU_PER_TWIP;
    let drawing = format!(
        concat!(
            "<w:drawing>",
            "<wp:inline distT=\"0\" distB=\"0\" distL=\"0\" distR=\"0\" ",
            "xmlns:wp=\"http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing\">",
            "<wp:extent cx=\"{cx}\" cy=\"{cy}\"/>",
            "<wp:docPr id=\"{doc_id}\" name=\"Capa {n}\"/>",
            "<a:graphic xmlns:a=\"http://schemas.openxmlformats.org/drawingml/2006/main\">",
            "<a:graphicData uri=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">",
            "<pic:pic xmlns:pic=\"http://schemas.openxmlformats.org/drawingml/2006/picture\">",
            "<pic:nvPicPr><pic:cNvPr id=\"0\" name=\"capa{n}\"/><pic:cNvPicPr/></pic:nvPicPr>",
            "<pic:blipFill>",
            "<a:blip r:embed=\"{rid}\" ",
            "xmlns:r=\"http://schemas.openxmlformats.org/officeDocument/2006/relationships\"/>",
            "<a:stretch><a:fillRect/></a:stretch></pic:blipFill>",
            "<pic:spPr><a:xfrm><a:off x=\"0\" y=\"0\"/><a:ext cx=\"{cx}\" cy=\"{cy}\"/></a:xfrm>",
            "<a:prstGeom prst=\"rect\"><a:avLst/></a:prstGeom></pic:spPr>",
            "</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing>"
        ),
        cx = cx,
        cy = cy,
        doc_id = 9000 + n,
        n = n,
        rid = relationship_id
    );

    Block::raw(
        BlockKind::Paragraph,
        format!(
            concat!(
                "<w:p><w:pPr>",
                "<w:spacing w:before=\"0\" w:after=\"0\" w:line=\"240\" w:lineRule=\"auto\"/>",
                "<w:ind w:left=\"0\" w:right=\"0\"/>",
                "{section}</w:pPr><w:r>{drawing}</w:r></w:p>"
            ),
            section = zero_margin_section(width, height),
            drawing = drawing
        ),
    )
}

/// Make sure the section containing block `from` has page margins.
///
/// Margins the template declares are left as they are; a section without
/// `w:pgMar` gets standard one-inch margins.
fn restore_margins(body: &mut Body, from: usize, width: u64, height: u64) {
    let margins = standard_margins();
    let Some(index) = section_of(body, from) else {
        body.blocks.push(Block::raw(
            BlockKind::SectionProperties,
            format!("<w:sectPr><w:pgSz w:w=\"{width}\" w:h=\"{height}\"/>{margins}</w:sectPr>"),
        ));
        return;
    };

    let block = &mut body.blocks[index];
    let xml = block.xml();
    if PAGE_MARGIN.is_match(xml) {
        return;
    }
    let updated = if let Some(close) = xml.rfind("</w:sectPr>") {
        format!("{}{margins}{}", &xml[..close], &xml[close..])
    } else if let Some(open) = xml.rfind("<w:sectPr/>") {
        format!(
            "{}<w:sectPr>{margins}</w:sectPr>{}",
            &xml[..open],
            &xml[open + "<w:sectPr/>".len()..]
        )
    } else {
        return;
    };
    block.set_xml(updated);
}
