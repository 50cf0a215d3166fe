//! Word (`.docx`) documents as report templates.
//!
//! A [`Document`] is an opened package whose main body is split into
//! top-level [`Block`]s. It supports the operations report assembly needs:
//!
//! - locating paragraphs by their visible text
//! - removing and replacing body blocks
//! - `{{ key }}` placeholder substitution across body, headers and footers
//! - a cover image, by either [`CoverStrategy`]
//! - saving atomically, so a failed save never leaves a partial file
//!
//! Anything the document does not touch is written back unchanged.

use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::Path;

use thiserror::Error;

mod body;
mod cover;
mod package;
mod substitute;
mod xml;

pub use body::{Alignment, Block, BlockKind, ParagraphStyle};
pub use cover::{detect_image_format, CoverStrategy, ImageFormat};
pub use package::{Package, CONTENT_TYPES_PART, DOCUMENT_PART, DOCUMENT_RELS_PART};
pub use substitute::{fill_placeholders, placeholder_keys};

use body::Body;

#[derive(Debug, Error)]
pub enum DocxError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid package: {0}")]
    Zip(#[from] zip::result::ZipError),
    #[error("XML error: {0}")]
    Xml(String),
    #[error("Package part not found: {0}")]
    MissingPart(String),
    #[error("Paragraph not found: {0}")]
    MarkerNotFound(String),
    #[error("Image not found: {0}")]
    ImageNotFound(String),
    #[error("Embedded resource not found: {0}")]
    ResourceNotFound(String),
    #[error("Unsupported image format")]
    UnsupportedImage,
}

/// An opened `.docx` package.
#[derive(Debug, Clone)]
pub struct Document {
    package: Package,
    body: Body,
}

impl Document {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, DocxError> {
        let bytes = std::fs::read(path.as_ref())?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, DocxError> {
        let package = Package::from_bytes(bytes)?;
        let body = Body::parse(&package.text(DOCUMENT_PART)?)?;
        Ok(Self { package, body })
    }

    /// A minimal document whose body holds `body_xml`.
    pub fn with_body(body_xml: &str) -> Result<Self, DocxError> {
        let mut package = Package::default();
        package.set(CONTENT_TYPES_PART, MINIMAL_CONTENT_TYPES.as_bytes().to_vec());
        package.set("_rels/.rels", MINIMAL_PACKAGE_RELS.as_bytes().to_vec());
        package.set(
            DOCUMENT_PART,
            format!("{MINIMAL_DOCUMENT_OPEN}{body_xml}{MINIMAL_DOCUMENT_CLOSE}").into_bytes(),
        );
        package.set(DOCUMENT_RELS_PART, MINIMAL_DOCUMENT_RELS.as_bytes().to_vec());

        let body = Body::parse(&package.text(DOCUMENT_PART)?)?;
        Ok(Self { package, body })
    }

    pub fn package(&self) -> &Package {
        &self.package
    }

    /// Add or replace a package part other than the main document.
    pub fn set_part(&mut self, name: &str, data: Vec<u8>) {
        self.package.set(name, data);
    }

    pub fn blocks(&self) -> &[Block] {
        &self.body.blocks
    }

    /// Visible text of every paragraph block, with its block index.
    pub fn paragraphs(&self) -> Result<Vec<(usize, String)>, DocxError> {
        self.body
            .blocks
            .iter()
            .enumerate()
            .filter(|(_, block)| block.is_paragraph())
            .map(|(i, block)| block.text().map(|text| (i, text)))
            .collect()
    }

    /// Indices of paragraph blocks whose text contains `needle`.
    pub fn find_paragraphs(&self, needle: &str) -> Result<Vec<usize>, DocxError> {
        Ok(self
            .paragraphs()?
            .into_iter()
            .filter(|(_, text)| text.contains(needle))
            .map(|(i, _)| i)
            .collect())
    }

    pub fn remove_block(&mut self, index: usize) -> Option<Block> {
        (index < self.body.blocks.len()).then(|| self.body.blocks.remove(index))
    }

    /// Replace the block at `index` with `blocks`.
    pub fn replace_block(&mut self, index: usize, blocks: Vec<Block>) -> Result<(), DocxError> {
        if index >= self.body.blocks.len() {
            return Err(DocxError::MarkerNotFound(format!("block {index}")));
        }
        self.body.blocks.splice(index..=index, blocks);
        Ok(())
    }

    /// Substitute `{{ key }}` placeholders in the body, headers and footers.
    pub fn render(&mut self, context: &BTreeMap<String, String>) -> Result<(), DocxError> {
        for block in &mut self.body.blocks {
            let filled = substitute::substitute_xml(block.xml(), context)?;
            block.set_xml(filled);
        }

        for name in self.header_footer_parts() {
            let xml = self.package.text(&name)?;
            let filled = substitute::substitute_xml(&xml, context)?;
            if filled != xml {
                self.package.set(&name, filled.into_bytes());
            }
        }

        Ok(())
    }

    /// Placeholder keys still present in the visible text, sorted and
    /// without duplicates.
    pub fn unresolved_placeholders(&self) -> Result<Vec<String>, DocxError> {
        let mut keys = BTreeSet::new();
        for block in &self.body.blocks {
            keys.extend(placeholder_keys(&block.text()?));
        }
        for name in self.header_footer_parts() {
            keys.extend(placeholder_keys(&xml::visible_text(
                &self.package.text(&name)?,
            )?));
        }
        Ok(keys.into_iter().collect())
    }

    fn header_footer_parts(&self) -> Vec<String> {
        self.package
            .names()
            .filter(|name| {
                let Some(file) = name.strip_prefix("word/") else {
                    return false;
                };
                !file.contains('/')
                    && (file.starts_with("header") || file.starts_with("footer"))
                    && file.ends_with(".xml")
            })
            .map(str::to_string)
            .collect()
    }

    /// Apply a cover image with the chosen strategy.
    pub fn apply_cover(&mut self, strategy: &CoverStrategy, image: &[u8]) -> Result<(), DocxError> {
        match strategy {
            CoverStrategy::FullPage => cover::insert_full_page(&mut self.package, &mut self.body, image),
            CoverStrategy::ReplaceResource { part } => {
                cover::replace_resource(&mut self.package, part, image)
            }
        }
    }

    /// [`Document::apply_cover`] reading the image from `path`.
    pub fn apply_cover_file(
        &mut self,
        strategy: &CoverStrategy,
        path: impl AsRef<Path>,
    ) -> Result<(), DocxError> {
        let path = path.as_ref();
        let image = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => DocxError::ImageNotFound(path.display().to_string()),
            _ => DocxError::Io(e),
        })?;
        self.apply_cover(strategy, &image)
    }

    /// Page size of the first section, in twips.
    pub fn page_size(&self) -> Result<(u64, u64), DocxError> {
        cover::page_size(&self.body)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, DocxError> {
        let mut package = self.package.clone();
        package.set(DOCUMENT_PART, self.body.to_xml().into_bytes());
        package.to_bytes()
    }

    /// Write the document to `path` through a temporary file in the same
    /// directory; on failure `path` is left untouched.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), DocxError> {
        let path = path.as_ref();
        let bytes = self.to_bytes()?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.persist(path).map_err(|e| DocxError::Io(e.error))?;

        log::debug!("Saved {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }
}

const MINIMAL_CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

const MINIMAL_PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

const MINIMAL_DOCUMENT_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"</Relationships>"#
);

const MINIMAL_DOCUMENT_OPEN: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
    r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships">"#,
    r#"<w:body>"#
);

const MINIMAL_DOCUMENT_CLOSE: &str = "</w:body></w:document>";

#[cfg(test)]
mod tests {
    use super::*;

    const MARKER: &str = "[[SUMARIO]]";
    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    fn template() -> Document {
        let mut doc = Document::with_body(concat!(
            r#"<w:p><w:r><w:t>Relatório {{ tipo_relatorio }}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>[[SUMARIO]]</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>Fim</w:t></w:r></w:p>"#,
            r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/><w:pgMar w:top="720" w:right="720" w:bottom="720" w:left="720"/></w:sectPr>"#,
        ))
        .unwrap();
        doc.set_part(
            "word/header1.xml",
            br#"<w:hdr><w:p><w:r><w:t>{{ n_processo_eTCE }}</w:t></w:r></w:p></w:hdr>"#.to_vec(),
        );
        doc.set_part("word/media/image1.png", PNG.to_vec());
        doc
    }

    fn context(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_round_trip_without_changes() {
        // Arrange
        let doc = template();
        let original = doc.to_bytes().unwrap();

        // Act
        let reopened = Document::from_bytes(&original).unwrap();

        // Assert
        assert_eq!(reopened.blocks(), doc.blocks());
        assert_eq!(
            reopened.package().get("word/header1.xml"),
            doc.package().get("word/header1.xml")
        );
    }

    #[test]
    fn test_render_body_and_header() {
        let mut doc = template();

        doc.render(&context(&[("tipo_relatorio", "Recurso"), ("n_processo_eTCE", "TC/1/2024")]))
            .unwrap();

        assert_eq!(doc.blocks()[0].text().unwrap(), "Relatório Recurso");
        let header = doc.package().text("word/header1.xml").unwrap();
        assert!(header.contains("TC/1/2024"));
        assert!(doc.unresolved_placeholders().unwrap().is_empty());
    }

    #[test]
    fn test_unresolved_placeholders_listed() {
        let doc = template();
        assert_eq!(
            doc.unresolved_placeholders().unwrap(),
            vec!["n_processo_eTCE".to_string(), "tipo_relatorio".to_string()]
        );
    }

    #[test]
    fn test_unresolved_placeholders_deduplicated() {
        // Arrange
        let doc = Document::with_body(concat!(
            r#"<w:p><w:r><w:t>{{ b }}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>{{ a }}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>{{ b }} e {{ a }}</w:t></w:r></w:p>"#,
        ))
        .unwrap();

        // Act
        let keys = doc.unresolved_placeholders().unwrap();

        // Assert
        assert_eq!(keys, vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_find_and_replace_marker() {
        // Arrange
        let mut doc = template();
        let found = doc.find_paragraphs(MARKER).unwrap();

        // Act
        doc.replace_block(
            found[0],
            vec![Block::page_break(), Block::heading(1, "Introdução", "Heading")],
        )
        .unwrap();

        // Assert
        assert_eq!(found, vec![1]);
        assert!(doc.blocks()[1].has_page_break());
        assert_eq!(doc.blocks()[2].text().unwrap(), "Introdução");
        assert_eq!(doc.find_paragraphs("Introdução").unwrap(), vec![2]);
        assert!(doc.find_paragraphs(MARKER).unwrap().is_empty());
    }

    #[test]
    fn test_replace_block_out_of_range() {
        let mut doc = template();
        let result = doc.replace_block(99, vec![Block::blank()]);
        assert!(matches!(result, Err(DocxError::MarkerNotFound(_))));
    }

    #[test]
    fn test_full_page_cover() {
        // Arrange
        let mut doc = template();

        // Act
        doc.apply_cover(&CoverStrategy::FullPage, PNG).unwrap();

        // Assert
        let first = doc.blocks()[0].xml();
        assert!(first.contains("<w:drawing>"));
        assert!(first.contains(r#"w:top="0""#));
        assert!(doc.package().contains("word/media/cover1.png"));
        let rels = doc.package().text(DOCUMENT_RELS_PART).unwrap();
        assert!(rels.contains(r#"Target="media/cover1.png""#));
        let types = doc.package().text(CONTENT_TYPES_PART).unwrap();
        assert!(types.contains(r#"Extension="png""#));
        let section = doc.blocks().last().unwrap().xml();
        assert!(section.contains(r#"w:top="720""#));
        assert!(!section.contains(r#"w:top="1440""#));

        let reopened = Document::from_bytes(&doc.to_bytes().unwrap()).unwrap();
        assert_eq!(reopened.blocks().len(), doc.blocks().len());
    }

    #[test]
    fn test_full_page_cover_rejects_unknown_format() {
        let mut doc = template();
        let result = doc.apply_cover(&CoverStrategy::FullPage, b"not an image");
        assert!(matches!(result, Err(DocxError::UnsupportedImage)));
    }

    #[test]
    fn test_replace_resource_cover() {
        let mut doc = template();
        let replacement = [0xFF, 0xD8, 0xFF, 0xE0, 9];

        let strategy = CoverStrategy::ReplaceResource {
            part: "word/media/image1.png".to_string(),
        };
        doc.apply_cover(&strategy, &replacement).unwrap();

        assert_eq!(
            doc.package().get("word/media/image1.png"),
            Some(&replacement[..])
        );
        assert_eq!(doc.blocks().len(), 4);
    }

    #[test]
    fn test_replace_resource_missing_part() {
        let mut doc = template();
        let strategy = CoverStrategy::ReplaceResource {
            part: "word/media/image9.png".to_string(),
        };
        assert!(matches!(
            doc.apply_cover(&strategy, PNG),
            Err(DocxError::ResourceNotFound(_))
        ));
    }

    #[test]
    fn test_apply_cover_file_missing() {
        let mut doc = template();
        let result = doc.apply_cover_file(&CoverStrategy::FullPage, "/nonexistent/capa.png");
        assert!(matches!(result, Err(DocxError::ImageNotFound(_))));
    }

    #[test]
    fn test_save_is_atomic() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("relatorio.docx");
        let doc = template();

        // Act
        doc.save(&path).unwrap();

        // Assert
        let saved = Document::open(&path).unwrap();
        assert_eq!(saved.blocks().len(), 4);
        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.path() != path)
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_save_into_missing_directory_fails_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("relatorio.docx");

        let result = template().save(&path);

        assert!(matches!(result, Err(DocxError::Io(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_open_missing_template() {
        assert!(matches!(
            Document::open("/nonexistent/modelo.docx"),
            Err(DocxError::Io(_))
        ));
    }
}
