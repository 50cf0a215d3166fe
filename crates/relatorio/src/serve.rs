use crate::config::{ReportConfig, ServiceConfig};
use crate::jobs::{JobContext, JobQueue, JobStore, WorkerPool};
use crate::prelude::{eprintln, *};
use crate::source::RecordSource;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use relatorio_core::job::{validate_request, JobRequest, ValidationError, DOCX_MIME};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

#[derive(Debug, clap::Args)]
#[command(about = "Run the report HTTP API")]
pub struct App {
    /// Host to bind
    #[arg(long, env = "RELATORIO_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to bind
    #[arg(long, env = "RELATORIO_PORT", default_value = "5000")]
    port: u16,

    /// Number of report workers (overrides the config file)
    #[arg(long, env = "RELATORIO_WORKERS")]
    workers: Option<usize>,

    /// Minutes a report is kept before the sweep removes it
    #[arg(long, env = "RELATORIO_REPORT_EXPIRATION_MINUTES")]
    report_expiration_minutes: Option<u64>,

    /// Seconds between two sweeps
    #[arg(long, env = "RELATORIO_CLEANUP_INTERVAL_SECONDS")]
    cleanup_interval_seconds: Option<u64>,
}

/// Shared state of the HTTP handlers.
#[derive(Debug, Clone)]
pub struct ApiState {
    queue: JobQueue,
    store: JobStore,
}

pub async fn run(app: App, global: crate::Global) -> Result<()> {
    let mut config = ServiceConfig::resolve(&global)?;
    if let Some(workers) = app.workers {
        config.workers = workers;
    }
    if let Some(minutes) = app.report_expiration_minutes {
        config.report_expiration_minutes = minutes;
    }
    if let Some(seconds) = app.cleanup_interval_seconds {
        config.cleanup_interval_seconds = seconds;
    }

    let report_config = Arc::new(ReportConfig::load(&config)?);
    let store = JobStore::new(&config.status_dir, &config.reports_dir);
    store
        .create_dirs()
        .context("Failed to create report directories")?;
    let interrupted = store.fail_interrupted(chrono::Local::now().naive_local());
    if interrupted > 0 {
        log::warn!("Marked {interrupted} interrupted job(s) as failed");
    }

    let source = RecordSource::from_options(global.records_file.as_deref())?;
    let pool = WorkerPool::spawn(
        config.workers,
        Arc::new(JobContext {
            config: report_config,
            source,
            store: store.clone(),
        }),
    );

    tokio::spawn(crate::sweep::run(
        vec![config.reports_dir.clone(), config.status_dir.clone()],
        config.report_ttl(),
        config.cleanup_interval(),
    ));

    let state = ApiState {
        queue: pool.queue(),
        store,
    };

    let addr = format!("{}:{}", app.host, app.port);

    if global.verbose {
        eprintln!("Report API listening on http://{}", addr);
        eprintln!("Workers: {}", config.workers);
        eprintln!("Reports: {}", config.reports_dir.display());
    }
    log::info!("Listening on {addr} with {} worker(s)", config.workers);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| eyre!("Failed to bind to {}: {}", addr, e))?;

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .map_err(|e| eyre!("Server error: {e}"))?;

    log::info!("Shutting down, waiting for queued jobs");
    pool.shutdown().await;
    Ok(())
}

pub fn router(state: ApiState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/generate-report", post(generate_report))
        .route("/api/report-status/{task_id}", get(report_status))
        .route("/api/reports/{report_id}", get(download_report))
        .layer(cors)
        .with_state(Arc::new(state))
}

fn error_response(status: StatusCode, message: impl std::fmt::Display) -> Response {
    (status, Json(json!({ "error": message.to_string() }))).into_response()
}

async fn generate_report(State(state): State<Arc<ApiState>>, body: Bytes) -> Response {
    let value: serde_json::Value = match serde_json::from_slice(&body) {
        Ok(value @ serde_json::Value::Object(_)) => value,
        _ => return error_response(StatusCode::BAD_REQUEST, ValidationError::EmptyBody),
    };
    let request: JobRequest = match serde_json::from_value(value) {
        Ok(request) => request,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, format!("JSON inválido: {e}")),
    };
    let job = match validate_request(request) {
        Ok(job) => job,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, e),
    };

    match state.queue.submit(job).await {
        Ok(task_id) => (
            StatusCode::ACCEPTED,
            Json(json!({
                "success": true,
                "message": "Geração de relatório iniciada",
                "task_id": task_id,
                "status": "processing",
            })),
        )
            .into_response(),
        Err(e) => {
            log::error!("Failed to submit job: {e}");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Erro ao iniciar geração de relatório: {e}"),
            )
        }
    }
}

async fn report_status(
    State(state): State<Arc<ApiState>>,
    Path(task_id): Path<String>,
) -> Response {
    match state.store.lookup(&task_id) {
        Some(status) => Json(status).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Tarefa não encontrada"),
    }
}

async fn download_report(
    State(state): State<Arc<ApiState>>,
    Path(report_id): Path<String>,
) -> Response {
    let Some(path) = state.store.find_report(&report_id) else {
        return error_response(StatusCode::NOT_FOUND, "Relatório não encontrado");
    };
    let bytes = match tokio::fs::read(&path).await {
        Ok(bytes) => bytes,
        Err(e) => {
            log::warn!("Report {} vanished: {e}", path.display());
            return error_response(
                StatusCode::NOT_FOUND,
                "Arquivo de relatório não encontrado no servidor",
            );
        }
    };
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();

    (
        [
            (header::CONTENT_TYPE, DOCX_MIME.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
