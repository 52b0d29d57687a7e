//! Serial background scanning for one pane.
//!
//! Each pane owns one worker thread, so a pane never runs two scans at once
//! while the two panes scan in parallel. Results go back through the UI
//! queue tagged with the generation they were requested for.

use std::path::PathBuf;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use flume::Sender;
use tracing::{debug, info};

use super::Side;
use crate::config::ScanConfig;
use crate::events::{UiEvent, UiSender};
use crate::scanner::{FileScanner, MetadataExtractor, ScanResult};

#[derive(Debug, Clone)]
struct RefreshRequest {
    dir: PathBuf,
    generation: u64,
    mutations: u64,
}

#[derive(Debug)]
pub struct RefreshResult {
    pub side: Side,
    pub dir: PathBuf,
    /// Directory generation the scan was requested for.
    pub generation: u64,
    /// Number of direct registry mutations seen when the scan was requested.
    pub mutations: u64,
    pub scan: ScanResult,
}

pub struct RefreshWorker {
    request_tx: Option<Sender<RefreshRequest>>,
    handle: Option<JoinHandle<()>>,
}

impl RefreshWorker {
    pub fn new(
        side: Side,
        config: ScanConfig,
        extractor: MetadataExtractor,
        ui: UiSender,
    ) -> Result<Self> {
        let (request_tx, request_rx) = flume::unbounded::<RefreshRequest>();
        let handle = thread::Builder::new()
            .name(format!("refresh-{}", side.name()))
            .spawn(move || {
                let scanner = FileScanner::with_config(config).with_extractor(extractor);
                for request in request_rx.iter() {
                    let scan = scanner.scan(&request.dir);
                    info!(
                        side = side.name(),
                        entries = scan.entries.len(),
                        generation = request.generation,
                        "Refresh scanned"
                    );
                    let delivered = ui.send(UiEvent::Refreshed(RefreshResult {
                        side,
                        dir: request.dir,
                        generation: request.generation,
                        mutations: request.mutations,
                        scan,
                    }));
                    if !delivered {
                        break;
                    }
                }
                debug!(side = side.name(), "Refresh worker stopped");
            })
            .context("Failed to spawn refresh worker")?;

        Ok(Self {
            request_tx: Some(request_tx),
            handle: Some(handle),
        })
    }

    pub fn submit(&self, dir: PathBuf, generation: u64, mutations: u64) -> bool {
        self.request_tx.as_ref().is_some_and(|tx| {
            tx.send(RefreshRequest {
                dir,
                generation,
                mutations,
            })
            .is_ok()
        })
    }
}

impl Drop for RefreshWorker {
    fn drop(&mut self) {
        self.request_tx.take();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
