//! Report assembly: template, outline, placeholders, cover, save.

use crate::config::ReportConfig;
use crate::prelude::*;
use chrono::NaiveDate;
use docx::{Document, DocxError};
use relatorio_core::job::ReportParams;
use relatorio_core::normalize::build_context;
use relatorio_core::outline::OutlineNode;
use relatorio_core::record::{RawRecord, TemplateContext};
use std::path::{Path, PathBuf};

pub mod outline;

pub use outline::render_outline;

/// Inputs of one document assembly.
#[derive(Debug, Clone, Default)]
pub struct ReportInput {
    pub context: TemplateContext,
    pub outline: Vec<OutlineNode>,
    pub cover: Option<PathBuf>,
}

impl ReportInput {
    /// Normalize `record` and combine it with the request parameters.
    pub fn prepare(
        config: &ReportConfig,
        record: &RawRecord,
        params: &ReportParams,
        cover: Option<PathBuf>,
        today: NaiveDate,
    ) -> Self {
        let normalized = config.normalizer.normalize(record);
        let context = build_context(
            &normalized,
            params.tipo_relatorio.as_deref(),
            &config.statuses,
            params.extra_context(),
            today,
        );
        Self {
            context,
            outline: params.cleaned_outline(),
            cover,
        }
    }
}

/// Resolve a cover image reference inside `cover_dir`.
///
/// Only the file name of the reference is used, so a request can never
/// point outside the directory.
pub fn resolve_cover(cover_dir: &Path, reference: &str) -> Result<PathBuf, Error> {
    Path::new(reference.trim())
        .file_name()
        .map(|name| cover_dir.join(name))
        .ok_or_else(|| Error::Asset(format!("imagem de capa inválida: {reference}")))
}

/// Build the report and write it to `output`.
///
/// Nothing is written to `output` unless every step succeeds.
pub fn assemble(config: &ReportConfig, input: &ReportInput, output: &Path) -> Result<(), Error> {
    let mut document = Document::open(&config.template).map_err(|e| match e {
        DocxError::Io(io) => Error::Template(format!("{}: {io}", config.template.display())),
        other => Error::Template(format!("{}: {other}", config.template.display())),
    })?;

    if !input.outline.is_empty() {
        let outcome = render_outline(
            &mut document,
            &config.outline_marker,
            &input.outline,
            &config.heading_style_prefix,
        )?;
        log::debug!("Outline: {outcome:?}");
    }

    document.render(&input.context)?;
    let unresolved = document.unresolved_placeholders()?;
    if !unresolved.is_empty() {
        log::warn!("Unresolved placeholders: {}", unresolved.join(", "));
    }

    if let Some(cover) = &input.cover {
        document.apply_cover_file(&config.cover, cover)?;
    }

    document.save(output)?;
    log::info!("Report written to {}", output.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docx::CoverStrategy;
    use relatorio_core::coerce::JoinSeparator;
    use relatorio_core::lookups::OrgLookups;
    use relatorio_core::normalize::Normalizer;
    use relatorio_core::status::StatusTable;

    const PNG: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A, 1, 2, 3];

    fn config(dir: &Path) -> ReportConfig {
        let template = dir.join("modelo.docx");
        Document::with_body(concat!(
            r#"<w:p><w:r><w:t>Processo {{ n_processo_eTCE }}</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>[[ESTRUTURA_RELATORIO]]</w:t></w:r></w:p>"#,
            r#"<w:p><w:r><w:t>Status: {{ status_processo }}</w:t></w:r></w:p>"#,
            r#"<w:sectPr><w:pgSz w:w="11906" w:h="16838"/></w:sectPr>"#,
        ))
        .unwrap()
        .save(&template)
        .unwrap();

        ReportConfig {
            normalizer: Normalizer::new(OrgLookups::default(), JoinSeparator::Comma),
            statuses: StatusTable::from_json(
                r#"{"recurso": {"tomada de contas": "A", "default": "B"}}"#,
            )
            .unwrap(),
            template,
            cover: CoverStrategy::FullPage,
            cover_dir: dir.to_path_buf(),
            outline_marker: "[[ESTRUTURA_RELATORIO]]".to_string(),
            heading_style_prefix: "Heading".to_string(),
            list_name: "Lista".to_string(),
        }
    }

    fn texts(path: &Path) -> Vec<String> {
        Document::open(path)
            .unwrap()
            .paragraphs()
            .unwrap()
            .into_iter()
            .map(|(_, text)| text)
            .collect()
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, 2).unwrap()
    }

    #[test]
    fn test_prepare_merges_status_and_params() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let record = RawRecord::new()
            .with("Nº Processo e-TCE", "12;#TC/001/2024")
            .with("Nº Processo e-TCE: processoTipo", "12;#TOMADA DE CONTAS ESPECIAL");
        let params: ReportParams = serde_json::from_value(serde_json::json!({
            "tipo_relatorio": "Recurso",
            "auditor_responsavel": "Ana",
            "outline": [{"title": "A", "subtitles": []}]
        }))
        .unwrap();

        // Act
        let input = ReportInput::prepare(&config, &record, &params, None, today());

        // Assert
        assert_eq!(input.context["tipo_relatorio"], "Recurso");
        assert_eq!(input.context["status_processo"], "A");
        assert_eq!(input.context["n_processo_eTCE"], "TC/001/2024");
        assert_eq!(input.context["auditor_responsavel"], "Ana");
        assert_eq!(input.context["data_atual"], "02/05/2024");
        assert_eq!(input.outline, vec![OutlineNode::new("A")]);
    }

    #[test]
    fn test_assemble_without_outline_or_cover_only_substitutes() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let output = dir.path().join("saida.docx");
        let input = ReportInput {
            context: [("n_processo_eTCE", "TC/1"), ("status_processo", "B")]
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..ReportInput::default()
        };

        // Act
        assemble(&config, &input, &output).unwrap();

        // Assert
        assert_eq!(
            texts(&output),
            vec!["Processo TC/1", "[[ESTRUTURA_RELATORIO]]", "Status: B"]
        );
    }

    #[test]
    fn test_assemble_with_outline_and_cover() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let cover = dir.path().join("capa.png");
        std::fs::write(&cover, PNG).unwrap();
        let output = dir.path().join("saida.docx");
        let input = ReportInput {
            outline: vec![OutlineNode::new("Conclusão")],
            cover: Some(cover),
            ..ReportInput::default()
        };

        // Act
        assemble(&config, &input, &output).unwrap();

        // Assert
        let document = Document::open(&output).unwrap();
        assert!(document.blocks()[0].xml().contains("<w:drawing>"));
        let texts = texts(&output);
        assert!(texts.contains(&"Conclusão".to_string()));
        assert!(texts.iter().any(|t| t.starts_with("Teresina, ")));
        assert!(!texts.contains(&"[[ESTRUTURA_RELATORIO]]".to_string()));
        assert!(texts.contains(&"Processo {{ n_processo_eTCE }}".to_string()));
    }

    #[test]
    fn test_assemble_missing_template() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.template = dir.path().join("ausente.docx");
        let output = dir.path().join("saida.docx");

        let result = assemble(&config, &ReportInput::default(), &output);

        assert!(matches!(result, Err(Error::Template(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_assemble_missing_cover_leaves_no_output() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path());
        let output = dir.path().join("saida.docx");
        let input = ReportInput {
            cover: Some(dir.path().join("ausente.png")),
            ..ReportInput::default()
        };

        let result = assemble(&config, &input, &output);

        assert!(matches!(result, Err(Error::Asset(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_assemble_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path());
        config.cover = CoverStrategy::ReplaceResource {
            part: "word/media/image1.png".to_string(),
        };
        let cover = dir.path().join("capa.png");
        std::fs::write(&cover, PNG).unwrap();
        let output = dir.path().join("saida.docx");
        let input = ReportInput {
            cover: Some(cover),
            ..ReportInput::default()
        };

        let result = assemble(&config, &input, &output);

        assert!(matches!(result, Err(Error::Asset(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_resolve_cover_strips_directories() {
        let dir = Path::new("/srv/capas");
        assert_eq!(
            resolve_cover(dir, "../../etc/capa.png").unwrap(),
            PathBuf::from("/srv/capas/capa.png")
        );
        assert!(matches!(resolve_cover(dir, ".."), Err(Error::Asset(_))));
    }
}
