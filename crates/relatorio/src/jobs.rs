//! Report jobs: status store and worker pool.
//!
//! Each job has one status file, `<status_dir>/<job_id>.json`. It is written
//! when the job is queued and afterwards only by the worker that runs the
//! job. Every write goes through a temporary file in the same directory and
//! a rename, so readers never see a partial status.

use crate::config::ReportConfig;
use crate::prelude::*;
use crate::report::{assemble, resolve_cover, ReportInput};
use crate::source::RecordSource;
use chrono::Local;
use relatorio_core::job::{is_report_of, report_filename, JobStatus, ValidatedJob};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::task::JoinHandle;

/// Status files and generated reports on disk.
#[derive(Debug, Clone)]
pub struct JobStore {
    status_dir: PathBuf,
    reports_dir: PathBuf,
}

impl JobStore {
    pub fn new(status_dir: impl Into<PathBuf>, reports_dir: impl Into<PathBuf>) -> Self {
        Self {
            status_dir: status_dir.into(),
            reports_dir: reports_dir.into(),
        }
    }

    pub fn create_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.status_dir)?;
        std::fs::create_dir_all(&self.reports_dir)
    }

    pub fn status_dir(&self) -> &Path {
        &self.status_dir
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    /// Path of a job's status file; `None` for ids that are not UUIDs.
    fn status_path(&self, job_id: &str) -> Option<PathBuf> {
        uuid::Uuid::parse_str(job_id)
            .ok()
            .map(|id| self.status_dir.join(format!("{}.json", id.hyphenated())))
    }

    pub fn write(&self, job_id: &str, status: &JobStatus) -> Result<(), Error> {
        let path = self
            .status_path(job_id)
            .ok_or_else(|| Error::Validation(format!("id de tarefa inválido: {job_id}")))?;
        let body = serde_json::to_vec_pretty(status).map_err(|e| Error::Render(e.to_string()))?;

        let persist = || -> std::io::Result<()> {
            let mut file = tempfile::NamedTempFile::new_in(&self.status_dir)?;
            file.write_all(&body)?;
            file.persist(&path).map_err(|e| e.error)?;
            Ok(())
        };
        persist().map_err(|e| Error::Render(format!("{}: {e}", path.display())))
    }

    /// The stored status of a job, without fallbacks.
    pub fn read(&self, job_id: &str) -> Option<JobStatus> {
        let text = std::fs::read_to_string(self.status_path(job_id)?).ok()?;
        match serde_json::from_str(&text) {
            Ok(status) => Some(status),
            Err(e) => {
                log::warn!("Unreadable status file for job {job_id}: {e}");
                None
            }
        }
    }

    /// Delete a job's status file. A missing file is not an error.
    pub fn remove(&self, job_id: &str) -> std::io::Result<()> {
        let Some(path) = self.status_path(job_id) else {
            return Ok(());
        };
        match std::fs::remove_file(path) {
            Err(e) if e.kind() != std::io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Mark every job still pending or processing as failed.
    ///
    /// The queue lives in memory, so these jobs died with the previous run.
    /// Returns the number of jobs marked.
    pub fn fail_interrupted(&self, now: chrono::NaiveDateTime) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.status_dir) else {
            return 0;
        };
        let stale: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_suffix(".json").map(str::to_string)
            })
            .filter(|id| self.read(id).is_some_and(|status| !status.is_terminal()))
            .collect();

        for id in &stale {
            let status = JobStatus::failed("geração interrompida pelo reinício do serviço", now);
            if let Err(e) = self.write(id, &status) {
                log::warn!("Failed to mark job {id} as interrupted: {e}");
            }
        }
        stale.len()
    }

    /// The generated report of a job, if it is on disk.
    pub fn find_report(&self, job_id: &str) -> Option<PathBuf> {
        uuid::Uuid::parse_str(job_id).ok()?;
        let entries = std::fs::read_dir(&self.reports_dir).ok()?;
        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .find(|path| {
                path.is_file()
                    && path
                        .file_name()
                        .and_then(|name| name.to_str())
                        .is_some_and(|name| is_report_of(name, job_id))
            })
    }

    /// The status to report to a poller.
    ///
    /// Completed jobs carry their download link. A job whose status file is
    /// gone but whose report is still on disk is reported as completed.
    pub fn lookup(&self, job_id: &str) -> Option<JobStatus> {
        if let Some(status) = self.read(job_id) {
            return Some(status.with_download(job_id));
        }
        let report = self.find_report(job_id)?;
        let filename = report.file_name()?.to_string_lossy().into_owned();
        Some(JobStatus::completed(filename, Local::now().naive_local()).with_download(job_id))
    }
}

/// One queued report request.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub request: ValidatedJob,
}

/// What a worker needs to run jobs.
#[derive(Debug)]
pub struct JobContext {
    pub config: Arc<ReportConfig>,
    pub source: RecordSource,
    pub store: JobStore,
}

/// The sending side of the job queue.
#[derive(Debug, Clone)]
pub struct JobQueue {
    sender: async_channel::Sender<Job>,
    store: JobStore,
}

impl JobQueue {
    pub fn new(sender: async_channel::Sender<Job>, store: JobStore) -> Self {
        Self { sender, store }
    }

    /// Record the job as pending and hand it to the workers.
    pub async fn submit(&self, request: ValidatedJob) -> Result<String, Error> {
        let id = uuid::Uuid::new_v4().to_string();
        self.store
            .write(&id, &JobStatus::pending(Local::now().naive_local()))?;
        let sent = self
            .sender
            .send(Job {
                id: id.clone(),
                request,
            })
            .await;
        if sent.is_err() {
            if let Err(e) = self.store.remove(&id) {
                log::warn!("Failed to remove status of unqueued job {id}: {e}");
            }
            return Err(Error::Render("fila de tarefas encerrada".to_string()));
        }
        log::info!("Job {id} submitted");
        Ok(id)
    }
}

/// A fixed number of workers consuming the job queue.
pub struct WorkerPool {
    queue: JobQueue,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(size: usize, context: Arc<JobContext>) -> Self {
        let (sender, receiver) = async_channel::unbounded::<Job>();
        let workers = (0..size.max(1))
            .map(|n| {
                let receiver = receiver.clone();
                let context = context.clone();
                tokio::spawn(async move {
                    while let Ok(job) = receiver.recv().await {
                        log::debug!("Worker {n} picked job {}", job.id);
                        run_job(&context, job).await;
                    }
                })
            })
            .collect();

        Self {
            queue: JobQueue::new(sender, context.store.clone()),
            workers,
        }
    }

    pub fn queue(&self) -> JobQueue {
        self.queue.clone()
    }

    /// Stop accepting jobs and wait for the queued ones to finish.
    pub async fn shutdown(self) {
        self.queue.sender.close();
        futures::future::join_all(self.workers).await;
    }
}

/// Run one job to completion or failure, recording its progress.
pub async fn run_job(context: &JobContext, job: Job) {
    log::info!("Job {} processing", job.id);
    match generate(context, &job).await {
        Ok(filename) => {
            log::info!("Job {} completed: {filename}", job.id);
            let status = JobStatus::completed(filename, Local::now().naive_local());
            record(context, &job.id, &status);
        }
        Err(e) => {
            log::error!("Job {} failed: {e}", job.id);
            record(context, &job.id, &JobStatus::failed(&e, Local::now().naive_local()));
        }
    }
}

fn record(context: &JobContext, job_id: &str, status: &JobStatus) {
    if let Err(e) = context.store.write(job_id, status) {
        log::error!("Failed to record status of job {job_id}: {e}");
    }
}

async fn generate(context: &JobContext, job: &Job) -> Result<String, Error> {
    let config = &context.config;

    context
        .store
        .write(&job.id, &JobStatus::fetching(Local::now().naive_local()))?;
    let record = context
        .source
        .fetch_record(&config.list_name, &job.request.record_id)
        .await?;

    context
        .store
        .write(&job.id, &JobStatus::generating(Local::now().naive_local()))?;
    let cover = job
        .request
        .cover_image
        .as_deref()
        .map(|reference| resolve_cover(&config.cover_dir, reference))
        .transpose()?;
    let now = Local::now().naive_local();
    let input = ReportInput::prepare(config, &record, &job.request.params, cover, now.date());

    let filename = report_filename(now, &job.id);
    let output = context.store.reports_dir().join(&filename);
    let config = config.clone();
    tokio::task::spawn_blocking(move || assemble(&config, &input, &output))
        .await
        .map_err(|e| Error::Render(e.to_string()))??;

    Ok(filename)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::FileSource;
    use docx::{CoverStrategy, Document};
    use relatorio_core::coerce::JoinSeparator;
    use relatorio_core::job::{JobState, ReportParams};
    use relatorio_core::lookups::OrgLookups;
    use relatorio_core::normalize::Normalizer;
    use relatorio_core::status::StatusTable;
    use std::fs;

    const JOB_ID: &str = "0f8fad5b-d9cb-469f-a165-70867728950e";

    fn store(dir: &Path) -> JobStore {
        let store = JobStore::new(dir.join("pending"), dir.join("reports"));
        store.create_dirs().unwrap();
        store
    }

    fn context(dir: &Path) -> JobContext {
        let template = dir.join("modelo.docx");
        Document::with_body(concat!(
            r#"<w:p><w:r><w:t>{{ unidades_fiscalizadas }}</w:t></w:r></w:p>"#,
            r#"<w:sectPr/>"#,
        ))
        .unwrap()
        .save(&template)
        .unwrap();

        let records = dir.join("registros.json");
        fs::write(
            &records,
            r#"[{"ID": 42, "Unidades Fiscalizadas": "x;#Town A"}]"#,
        )
        .unwrap();

        JobContext {
            config: Arc::new(ReportConfig {
                normalizer: Normalizer::new(OrgLookups::default(), JoinSeparator::Comma),
                statuses: StatusTable::default(),
                template,
                cover: CoverStrategy::FullPage,
                cover_dir: dir.to_path_buf(),
                outline_marker: "[[ESTRUTURA_RELATORIO]]".to_string(),
                heading_style_prefix: "Heading".to_string(),
                list_name: "Lista".to_string(),
            }),
            source: RecordSource::File(FileSource::new(records)),
            store: store(dir),
        }
    }

    fn job(record_id: &str) -> Job {
        Job {
            id: JOB_ID.to_string(),
            request: ValidatedJob {
                record_id: record_id.to_string(),
                params: ReportParams::default(),
                cover_image: None,
            },
        }
    }

    #[test]
    fn test_write_and_read_status() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let now = Local::now().naive_local();

        // Act
        store.write(JOB_ID, &JobStatus::fetching(now)).unwrap();
        store.write(JOB_ID, &JobStatus::generating(now)).unwrap();

        // Assert
        let status = store.read(JOB_ID).unwrap();
        assert_eq!(status.progress, 50);
        let files = fs::read_dir(store.status_dir()).unwrap().count();
        assert_eq!(files, 1);
    }

    #[test]
    fn test_rejects_non_uuid_ids() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let now = Local::now().naive_local();

        assert!(store.write("../escape", &JobStatus::pending(now)).is_err());
        assert!(store.lookup("../escape").is_none());
    }

    #[test]
    fn test_lookup_falls_back_to_report_on_disk() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let filename = "relatorio_20240101_120000_0f8fad5b.docx";
        fs::write(store.reports_dir().join(filename), b"docx").unwrap();

        // Act
        let status = store.lookup(JOB_ID).unwrap();

        // Assert
        assert_eq!(status.status, JobState::Completed);
        assert_eq!(status.progress, 100);
        assert_eq!(status.filename.as_deref(), Some(filename));
        assert_eq!(
            status.download_url,
            Some(format!("/api/reports/{JOB_ID}"))
        );
    }

    #[tokio::test]
    async fn test_submit_to_closed_queue_leaves_no_status() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let (sender, receiver) = async_channel::unbounded();
        receiver.close();
        let queue = JobQueue::new(sender, store.clone());

        // Act
        let result = queue
            .submit(ValidatedJob {
                record_id: "42".to_string(),
                params: ReportParams::default(),
                cover_image: None,
            })
            .await;

        // Assert
        assert!(matches!(result, Err(Error::Render(_))));
        assert_eq!(fs::read_dir(store.status_dir()).unwrap().count(), 0);
    }

    #[test]
    fn test_fail_interrupted_marks_only_live_jobs() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let store = store(dir.path());
        let now = Local::now().naive_local();
        let done = "7c9e6679-7425-40de-944b-e07fc1f90ae7";
        store.write(JOB_ID, &JobStatus::generating(now)).unwrap();
        store.write(done, &JobStatus::completed("r.docx", now)).unwrap();

        // Act
        let marked = store.fail_interrupted(now);

        // Assert
        assert_eq!(marked, 1);
        assert_eq!(store.read(JOB_ID).unwrap().status, JobState::Error);
        assert_eq!(store.read(done).unwrap().status, JobState::Completed);
    }

    #[test]
    fn test_lookup_unknown_job() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(dir.path()).lookup(JOB_ID).is_none());
    }

    #[tokio::test]
    async fn test_run_job_completes() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());

        // Act
        run_job(&context, job("42")).await;

        // Assert
        let status = context.store.lookup(JOB_ID).unwrap();
        assert_eq!(status.status, JobState::Completed);
        let report = context.store.find_report(JOB_ID).unwrap();
        let texts: Vec<String> = Document::open(&report)
            .unwrap()
            .paragraphs()
            .unwrap()
            .into_iter()
            .map(|(_, t)| t)
            .collect();
        assert_eq!(texts, vec!["Town A"]);
    }

    #[tokio::test]
    async fn test_run_job_records_failure_without_output() {
        let dir = tempfile::tempdir().unwrap();
        let context = context(dir.path());

        run_job(&context, job("7")).await;

        let status = context.store.lookup(JOB_ID).unwrap();
        assert_eq!(status.status, JobState::Error);
        assert_eq!(status.progress, 0);
        assert!(status.message.starts_with("Erro ao gerar relatório: "));
        assert!(context.store.find_report(JOB_ID).is_none());
    }

    #[tokio::test]
    async fn test_pool_runs_submitted_jobs() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let context = Arc::new(context(dir.path()));
        let pool = WorkerPool::spawn(2, context.clone());
        let request = ValidatedJob {
            record_id: "42".to_string(),
            params: ReportParams::default(),
            cover_image: None,
        };

        // Act
        let id = pool.queue().submit(request).await.unwrap();
        pool.shutdown().await;

        // Assert
        let status = context.store.lookup(&id).unwrap();
        assert_eq!(status.status, JobState::Completed);
    }
}
