//! Periodic removal of expired reports and status files.

use relatorio_core::job::{is_expired, JobStatus, REPORT_PREFIX};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepSummary {
    pub removed: usize,
    pub failed: usize,
}

/// Files the sweep owns: generated reports and job status files.
fn is_artifact(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    (name.starts_with(REPORT_PREFIX) && name.ends_with(".docx")) || name.ends_with(".json")
}

/// A status file of a job that is still pending or processing.
fn is_live_status(path: &Path) -> bool {
    if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        return false;
    }
    std::fs::read_to_string(path)
        .ok()
        .and_then(|text| serde_json::from_str::<JobStatus>(&text).ok())
        .is_some_and(|status| !status.is_terminal())
}

/// Delete every artifact in `dirs` older than `ttl`.
///
/// Status files of jobs still queued or running are kept whatever their age.
/// Files that disappear mid-sweep are not errors. A failure on one file is
/// logged and the sweep moves on.
pub fn sweep_once(dirs: &[PathBuf], ttl: Duration, now: SystemTime) -> SweepSummary {
    let mut summary = SweepSummary::default();

    for dir in dirs {
        let entries = match std::fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => continue,
            Err(e) => {
                log::warn!("Cannot list {}: {e}", dir.display());
                summary.failed += 1;
                continue;
            }
        };

        for entry in entries.filter_map(|entry| entry.ok()) {
            let path = entry.path();
            if !is_artifact(&path) {
                continue;
            }
            let modified = match entry.metadata().and_then(|m| m.modified()) {
                Ok(modified) => modified,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    log::warn!("Cannot stat {}: {e}", path.display());
                    summary.failed += 1;
                    continue;
                }
            };
            if !is_expired(modified, now, ttl) || is_live_status(&path) {
                continue;
            }

            match std::fs::remove_file(&path) {
                Ok(()) => {
                    log::debug!("Removed expired {}", path.display());
                    summary.removed += 1;
                }
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => {
                    log::warn!("Cannot remove {}: {e}", path.display());
                    summary.failed += 1;
                }
            }
        }
    }

    summary
}

/// Sweep `dirs` every `interval` until the task is dropped.
pub async fn run(dirs: Vec<PathBuf>, ttl: Duration, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        let dirs = dirs.clone();
        let summary =
            match tokio::task::spawn_blocking(move || sweep_once(&dirs, ttl, SystemTime::now()))
                .await
            {
                Ok(summary) => summary,
                Err(e) => {
                    log::error!("Sweep task failed: {e}");
                    continue;
                }
            };
        log::info!(
            "Sweep removed {} expired artifact(s), {} failure(s)",
            summary.removed,
            summary.failed
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    const TTL: Duration = Duration::from_secs(30 * 60);

    #[test]
    fn test_sweep_removes_only_expired_artifacts() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("relatorio_20240101_120000_abcdef12.docx");
        let status = dir.path().join("abcdef12-0000-0000-0000-000000000000.json");
        let other = dir.path().join("modelo.docx");
        for path in [&report, &status, &other] {
            fs::write(path, b"x").unwrap();
        }
        let later = SystemTime::now() + TTL + Duration::from_secs(60);

        // Act
        let summary = sweep_once(&[dir.path().to_path_buf()], TTL, later);

        // Assert
        assert_eq!(summary, SweepSummary { removed: 2, failed: 0 });
        assert!(!report.exists());
        assert!(!status.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_sweep_keeps_status_of_live_jobs() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        let now = chrono::Local::now().naive_local();
        let queued = dir.path().join("0f8fad5b-d9cb-469f-a165-70867728950e.json");
        let failed = dir.path().join("7c9e6679-7425-40de-944b-e07fc1f90ae7.json");
        fs::write(&queued, serde_json::to_vec(&JobStatus::pending(now)).unwrap()).unwrap();
        fs::write(&failed, serde_json::to_vec(&JobStatus::failed("x", now)).unwrap()).unwrap();
        let later = SystemTime::now() + TTL * 2;

        // Act
        let summary = sweep_once(&[dir.path().to_path_buf()], TTL, later);

        // Assert
        assert_eq!(summary, SweepSummary { removed: 1, failed: 0 });
        assert!(queued.exists());
        assert!(!failed.exists());
    }

    #[test]
    fn test_sweep_keeps_fresh_files() {
        let dir = tempfile::tempdir().unwrap();
        let report = dir.path().join("relatorio_20240101_120000_abcdef12.docx");
        fs::write(&report, b"x").unwrap();

        let summary = sweep_once(&[dir.path().to_path_buf()], TTL, SystemTime::now());

        assert_eq!(summary.removed, 0);
        assert!(report.exists());
    }

    #[test]
    fn test_sweep_tolerates_missing_dirs_and_repeats() {
        // Arrange
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.json"), b"{}").unwrap();
        let dirs = vec![dir.path().to_path_buf(), dir.path().join("ausente")];
        let later = SystemTime::now() + TTL * 2;

        // Act
        let first = sweep_once(&dirs, TTL, later);
        let second = sweep_once(&dirs, TTL, later);

        // Assert
        assert_eq!(first, SweepSummary { removed: 1, failed: 0 });
        assert_eq!(second, SweepSummary::default());
    }

    #[test]
    fn test_is_artifact() {
        assert!(is_artifact(Path::new("/r/relatorio_x.docx")));
        assert!(is_artifact(Path::new("/r/p/0f8f.json")));
        assert!(!is_artifact(Path::new("/r/.tmpA1b2")));
        assert!(!is_artifact(Path::new("/r/outro.docx")));
    }
}
