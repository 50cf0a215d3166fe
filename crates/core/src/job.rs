//! Report jobs: submission contract, status model and bookkeeping
//!
//! Everything here is pure. Persisting statuses, running workers and
//! sweeping expired files belong to the binary.

use std::time::{Duration, SystemTime};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::outline::{clean, clean_sections, CleanOptions, OutlineNode, OutlineSection};

/// MIME type of generated reports.
pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// Prefix of every generated report file name.
pub const REPORT_PREFIX: &str = "relatorio";

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Pending,
    Processing,
    Completed,
    Error,
}

/// The persisted status of one job, as returned by the polling endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub status: JobState,
    pub progress: u8,
    pub message: String,
    /// ISO-8601 local timestamp of the write.
    pub created_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_url: Option<String>,
}

impl JobStatus {
    fn at(status: JobState, progress: u8, message: impl Into<String>, now: NaiveDateTime) -> Self {
        Self {
            status,
            progress,
            message: message.into(),
            created_at: now.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
            filename: None,
            download_url: None,
        }
    }

    pub fn pending(now: NaiveDateTime) -> Self {
        Self::at(JobState::Pending, 0, "Geração de relatório iniciada", now)
    }

    /// Fetching the source record.
    pub fn fetching(now: NaiveDateTime) -> Self {
        Self::at(JobState::Processing, 10, "Obtendo dados do SharePoint", now)
    }

    /// Assembling the document.
    pub fn generating(now: NaiveDateTime) -> Self {
        Self::at(
            JobState::Processing,
            50,
            "Gerando relatório com os dados obtidos",
            now,
        )
    }

    pub fn completed(filename: impl Into<String>, now: NaiveDateTime) -> Self {
        Self {
            filename: Some(filename.into()),
            ..Self::at(JobState::Completed, 100, "Relatório gerado com sucesso", now)
        }
    }

    pub fn failed(reason: impl std::fmt::Display, now: NaiveDateTime) -> Self {
        Self::at(
            JobState::Error,
            0,
            format!("Erro ao gerar relatório: {reason}"),
            now,
        )
    }

    /// Attach the download link of a completed job.
    pub fn with_download(mut self, job_id: &str) -> Self {
        if self.status == JobState::Completed {
            self.download_url = Some(download_url(job_id));
        }
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, JobState::Completed | JobState::Error)
    }
}

/// Body of a report submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    #[serde(default)]
    pub sharepoint_id: Option<serde_json::Value>,
    #[serde(default)]
    pub report_params: Option<ReportParams>,
    #[serde(default)]
    pub cover_image: Option<String>,
}

/// Report parameters. Unknown keys are kept as extra context entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportParams {
    #[serde(default)]
    pub tipo_relatorio: Option<String>,
    #[serde(default)]
    pub outline: Option<Vec<OutlineNode>>,
    #[serde(default)]
    pub sections: Option<Vec<OutlineSection>>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ReportParams {
    /// The cleaned heading tree to render.
    ///
    /// A sectioned outline takes precedence and is cleaned with the
    /// empty-section policy; otherwise the plain outline is used.
    pub fn cleaned_outline(&self) -> Vec<OutlineNode> {
        if let Some(sections) = &self.sections {
            return clean_sections(sections, &CleanOptions::sectioned())
                .into_iter()
                .map(OutlineSection::into_node)
                .collect();
        }
        match &self.outline {
            Some(nodes) => clean(nodes, &CleanOptions::plain()),
            None => Vec::new(),
        }
    }

    /// Extra parameters rendered as context strings.
    ///
    /// Lists are joined one item per line; objects and nulls are skipped.
    pub fn extra_context(&self) -> Vec<(&str, String)> {
        self.extra
            .iter()
            .filter_map(|(key, value)| Some((key.as_str(), context_text(value)?)))
            .collect()
    }
}

fn context_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Array(items) => Some(
            items
                .iter()
                .filter_map(context_text)
                .collect::<Vec<_>>()
                .join("\n"),
        ),
        serde_json::Value::Null | serde_json::Value::Object(_) => None,
    }
}

/// A submission that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedJob {
    pub record_id: String,
    pub params: ReportParams,
    pub cover_image: Option<String>,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Nenhum dado JSON recebido")]
    EmptyBody,

    #[error("Campos obrigatórios ausentes: {}", .0.join(", "))]
    MissingFields(Vec<String>),

    #[error("sharepoint_id inválido: {0}")]
    InvalidRecordId(String),
}

/// Check the required fields of a submission.
pub fn validate_request(request: JobRequest) -> Result<ValidatedJob, ValidationError> {
    let mut missing = Vec::new();
    if request.sharepoint_id.as_ref().is_none_or(|v| v.is_null()) {
        missing.push("sharepoint_id".to_string());
    }
    if request.report_params.is_none() {
        missing.push("report_params".to_string());
    }
    if !missing.is_empty() {
        return Err(ValidationError::MissingFields(missing));
    }

    let record_id = match request.sharepoint_id {
        Some(serde_json::Value::String(s)) if !s.trim().is_empty() => s.trim().to_string(),
        Some(serde_json::Value::Number(n)) => n.to_string(),
        other => {
            let shown = other.map(|v| v.to_string()).unwrap_or_default();
            return Err(ValidationError::InvalidRecordId(shown));
        }
    };

    Ok(ValidatedJob {
        record_id,
        params: request.report_params.unwrap_or_default(),
        cover_image: request.cover_image.filter(|c| !c.trim().is_empty()),
    })
}

/// File name of a job's report: `relatorio_<YYYYmmdd_HHMMSS>_<id8>.docx`.
pub fn report_filename(now: NaiveDateTime, job_id: &str) -> String {
    format!(
        "{REPORT_PREFIX}_{}_{}.docx",
        now.format("%Y%m%d_%H%M%S"),
        id_prefix(job_id)
    )
}

/// Whether `filename` is the report of `job_id`.
pub fn is_report_of(filename: &str, job_id: &str) -> bool {
    let prefix = id_prefix(job_id);
    !prefix.is_empty()
        && filename.starts_with(REPORT_PREFIX)
        && filename.ends_with(&format!("_{prefix}.docx"))
}

fn id_prefix(job_id: &str) -> &str {
    job_id
        .char_indices()
        .nth(8)
        .map(|(i, _)| &job_id[..i])
        .unwrap_or(job_id)
}

pub fn download_url(job_id: &str) -> String {
    format!("/api/reports/{job_id}")
}

/// Whether an artifact last modified at `modified` has outlived `ttl`.
///
/// Timestamps in the future never expire.
pub fn is_expired(modified: SystemTime, now: SystemTime, ttl: Duration) -> bool {
    now.duration_since(modified)
        .map(|age| age > ttl)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use serde_json::json;

    fn now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 5, 20)
            .unwrap()
            .and_hms_opt(14, 3, 9)
            .unwrap()
    }

    // ============================================================================
    // JobStatus tests
    // ============================================================================

    #[test]
    fn test_status_stages() {
        assert_eq!(JobStatus::fetching(now()).progress, 10);
        assert_eq!(JobStatus::generating(now()).progress, 50);

        let done = JobStatus::completed("relatorio_x.docx", now());
        assert_eq!(done.status, JobState::Completed);
        assert_eq!(done.progress, 100);
        assert_eq!(done.filename.as_deref(), Some("relatorio_x.docx"));

        let failed = JobStatus::failed("template ausente", now());
        assert_eq!(failed.status, JobState::Error);
        assert_eq!(failed.progress, 0);
        assert_eq!(failed.message, "Erro ao gerar relatório: template ausente");
    }

    #[test]
    fn test_status_serialization() {
        // Arrange
        let status = JobStatus::completed("r.docx", now()).with_download("abc");

        // Act
        let value = serde_json::to_value(&status).unwrap();

        // Assert
        assert_eq!(value["status"], "completed");
        assert_eq!(value["progress"], 100);
        assert_eq!(value["created_at"], "2025-05-20T14:03:09.000000");
        assert_eq!(value["download_url"], "/api/reports/abc");
    }

    #[test]
    fn test_with_download_ignored_until_completed() {
        let status = JobStatus::generating(now()).with_download("abc");
        assert_eq!(status.download_url, None);
        let value = serde_json::to_value(&status).unwrap();
        assert!(value.get("filename").is_none());
    }

    // ============================================================================
    // validate_request tests
    // ============================================================================

    #[test]
    fn test_validate_request_missing_fields() {
        let request: JobRequest = serde_json::from_value(json!({})).unwrap();
        let err = validate_request(request).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Campos obrigatórios ausentes: sharepoint_id, report_params"
        );
    }

    #[test]
    fn test_validate_request_numeric_id() {
        // Arrange
        let request: JobRequest = serde_json::from_value(json!({
            "sharepoint_id": 3868,
            "report_params": {
                "tipo_relatorio": "Recurso",
                "auditor_responsavel": "Carla Nunes",
                "outline": [{"title": "Introdução", "subtitles": []}]
            },
            "cover_image": ""
        }))
        .unwrap();

        // Act
        let job = validate_request(request).unwrap();

        // Assert
        assert_eq!(job.record_id, "3868");
        assert_eq!(job.params.tipo_relatorio.as_deref(), Some("Recurso"));
        assert_eq!(job.cover_image, None);
        assert_eq!(
            job.params.extra_context(),
            vec![("auditor_responsavel", "Carla Nunes".to_string())]
        );
    }

    #[test]
    fn test_validate_request_invalid_id() {
        let request: JobRequest = serde_json::from_value(json!({
            "sharepoint_id": {"id": 1},
            "report_params": {}
        }))
        .unwrap();
        assert!(matches!(
            validate_request(request),
            Err(ValidationError::InvalidRecordId(_))
        ));

        let request: JobRequest =
            serde_json::from_value(json!({"sharepoint_id": " ", "report_params": {}})).unwrap();
        assert!(validate_request(request).is_err());
    }

    #[test]
    fn test_extra_context_joins_lists() {
        let params: ReportParams =
            serde_json::from_value(json!({"achados": ["a", "b"], "n": 2, "x": null})).unwrap();
        let mut extra = params.extra_context();
        extra.sort();
        assert_eq!(
            extra,
            vec![("achados", "a\nb".to_string()), ("n", "2".to_string())]
        );
    }

    #[test]
    fn test_cleaned_outline_prefers_sections() {
        let params: ReportParams = serde_json::from_value(json!({
            "outline": [{"title": "Ignorado"}],
            "sections": [
                {"title": "Achados", "data": [{"title": "Achado 1"}]},
                {"title": "Vazia", "data": []}
            ]
        }))
        .unwrap();

        let outline = params.cleaned_outline();

        assert_eq!(outline.len(), 1);
        assert_eq!(outline[0].title, "Achados");
        assert_eq!(outline[0].subtitles[0].title, "Achado 1");
    }

    // ============================================================================
    // naming and expiry tests
    // ============================================================================

    #[test]
    fn test_report_filename() {
        let id = "1b4e28ba-2fa1-11d2-883f-0016d3cca427";
        let name = report_filename(now(), id);
        assert_eq!(name, "relatorio_20250520_140309_1b4e28ba.docx");
        assert!(is_report_of(&name, id));
        assert!(!is_report_of(&name, "ffffffff-0000"));
        assert!(!is_report_of(&name, ""));
    }

    #[test]
    fn test_is_expired() {
        let base = SystemTime::UNIX_EPOCH + Duration::from_secs(10_000);
        let ttl = Duration::from_secs(30 * 60);

        assert!(!is_expired(base, base + Duration::from_secs(60), ttl));
        assert!(is_expired(base, base + Duration::from_secs(31 * 60), ttl));
        assert!(!is_expired(base + Duration::from_secs(60), base, ttl));
    }
}
