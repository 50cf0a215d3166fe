use docx::DocxError;

/// Why a report could not be produced.
///
/// The message of each variant ends up verbatim in the job status, after
/// the "Erro ao gerar relatório: " prefix.
#[derive(thiserror::Error, Debug, serde::Deserialize, serde::Serialize)]
pub enum Error {
    #[error("Falha ao obter dados do SharePoint: {0}")]
    SourceFetch(String),

    #[error("{0}")]
    Validation(String),

    #[error("Template inválido: {0}")]
    Template(String),

    #[error("Recurso não encontrado: {0}")]
    Asset(String),

    #[error("Falha ao montar o documento: {0}")]
    Render(String),
}

impl From<DocxError> for Error {
    fn from(err: DocxError) -> Self {
        match err {
            DocxError::MarkerNotFound(_) | DocxError::MissingPart(_) => {
                Error::Template(err.to_string())
            }
            DocxError::ImageNotFound(_)
            | DocxError::ResourceNotFound(_)
            | DocxError::UnsupportedImage => Error::Asset(err.to_string()),
            DocxError::Io(_) | DocxError::Zip(_) | DocxError::Xml(_) => {
                Error::Render(err.to_string())
            }
        }
    }
}

impl From<relatorio_core::job::ValidationError> for Error {
    fn from(err: relatorio_core::job::ValidationError) -> Self {
        Error::Validation(err.to_string())
    }
}
