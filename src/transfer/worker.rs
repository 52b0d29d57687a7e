//! Background move execution.
//!
//! Moves run one at a time on a dedicated thread so a slow copy never blocks
//! the UI thread. Every request produces exactly one `MoveReport`.

use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use flume::Sender;
use tracing::{debug, info, warn};

use super::mover::{move_file, MovedFile};
use crate::error::MoveError;
use crate::events::{UiEvent, UiSender};
use crate::pane::Side;

#[derive(Debug, Clone)]
pub struct MoveRequest {
    pub id: u64,
    /// Pane the file is leaving.
    pub from: Side,
    pub file_name: String,
    pub source_dir: PathBuf,
    pub dest_dir: PathBuf,
}

impl MoveRequest {
    pub fn source_path(&self) -> PathBuf {
        self.source_dir.join(&self.file_name)
    }
}

#[derive(Debug)]
pub struct MoveReport {
    pub request: MoveRequest,
    pub result: Result<MovedFile, MoveError>,
}

/// Receives the paths touched by completed moves so an external media index
/// can pick up the change.
pub trait MediaIndex: Send + Sync {
    fn notify(&self, paths: &[PathBuf]) -> Result<()>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMediaIndex;

impl MediaIndex for NoopMediaIndex {
    fn notify(&self, _paths: &[PathBuf]) -> Result<()> {
        Ok(())
    }
}

pub struct TransferWorker {
    request_tx: Option<Sender<MoveRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl TransferWorker {
    pub fn new(ui: UiSender, index: Arc<dyn MediaIndex>) -> Result<Self> {
        let (request_tx, request_rx) = flume::unbounded::<MoveRequest>();
        let handle = thread::Builder::new()
            .name("transfer".to_string())
            .spawn(move || {
                for request in request_rx.iter() {
                    let result = move_file(&request.source_path(), &request.dest_dir);
                    match &result {
                        Ok(moved) => {
                            info!(
                                id = request.id,
                                from = request.from.name(),
                                file = %request.file_name,
                                outcome = ?moved.outcome,
                                "Move finished"
                            );
                            if let Err(e) = index.notify(&[moved.source.clone(), moved.target.clone()]) {
                                warn!(error = %e, "Failed to notify media index");
                            }
                        }
                        Err(e) => {
                            warn!(id = request.id, file = %request.file_name, error = %e, "Move failed");
                        }
                    }
                    if !ui.send(UiEvent::MoveFinished(MoveReport { request, result })) {
                        break;
                    }
                }
                debug!("Transfer worker stopped");
            })
            .context("Failed to spawn transfer worker")?;

        Ok(Self {
            request_tx: Some(request_tx),
            handle: Some(handle),
        })
    }

    pub fn submit(&self, request: MoveRequest) -> bool {
        self.request_tx
            .as_ref()
            .is_some_and(|tx| tx.send(request).is_ok())
    }
}

impl Drop for TransferWorker {
    fn drop(&mut self) {
        self.request_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::UiQueue;
    use parking_lot::Mutex;
    use std::fs;
    use std::time::Duration;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingIndex {
        seen: Mutex<Vec<PathBuf>>,
    }

    impl MediaIndex for RecordingIndex {
        fn notify(&self, paths: &[PathBuf]) -> Result<()> {
            self.seen.lock().extend_from_slice(paths);
            Ok(())
        }
    }

    struct FailingIndex;

    impl MediaIndex for FailingIndex {
        fn notify(&self, _paths: &[PathBuf]) -> Result<()> {
            anyhow::bail!("index unavailable")
        }
    }

    fn request(id: u64, from: &std::path::Path, to: &std::path::Path, name: &str) -> MoveRequest {
        MoveRequest {
            id,
            from: Side::From,
            file_name: name.to_string(),
            source_dir: from.to_path_buf(),
            dest_dir: to.to_path_buf(),
        }
    }

    fn next_report(queue: &UiQueue) -> MoveReport {
        match queue.recv_timeout(Duration::from_secs(5)) {
            Some(UiEvent::MoveFinished(report)) => report,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_reports_and_notifies() {
        let root = tempdir().unwrap();
        let (from, to) = (root.path().join("a"), root.path().join("b"));
        fs::create_dir(&from).unwrap();
        fs::create_dir(&to).unwrap();
        fs::write(from.join("x.jpg"), b"x").unwrap();

        let queue = UiQueue::new();
        let index = Arc::new(RecordingIndex::default());
        let worker = TransferWorker::new(queue.sender(), index.clone()).unwrap();
        assert!(worker.submit(request(1, &from, &to, "x.jpg")));

        let report = next_report(&queue);
        assert_eq!(report.request.id, 1);
        assert!(report.result.is_ok());
        assert!(to.join("x.jpg").exists());
        assert_eq!(index.seen.lock().len(), 2);
    }

    #[test]
    fn test_failures_are_reported() {
        let root = tempdir().unwrap();
        let (from, to) = (root.path().join("a"), root.path().join("b"));
        fs::create_dir(&from).unwrap();
        fs::create_dir(&to).unwrap();

        let queue = UiQueue::new();
        let worker = TransferWorker::new(queue.sender(), Arc::new(FailingIndex)).unwrap();
        worker.submit(request(7, &from, &to, "missing.jpg"));

        let report = next_report(&queue);
        assert_eq!(report.request.id, 7);
        assert!(matches!(report.result, Err(MoveError::SourceMissing { .. })));
    }

    #[test]
    fn test_index_failure_does_not_fail_move() {
        let root = tempdir().unwrap();
        let (from, to) = (root.path().join("a"), root.path().join("b"));
        fs::create_dir(&from).unwrap();
        fs::create_dir(&to).unwrap();
        fs::write(from.join("x.jpg"), b"x").unwrap();

        let queue = UiQueue::new();
        let worker = TransferWorker::new(queue.sender(), Arc::new(FailingIndex)).unwrap();
        worker.submit(request(2, &from, &to, "x.jpg"));
        assert!(next_report(&queue).result.is_ok());
    }
}
