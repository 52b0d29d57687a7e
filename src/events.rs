//! Hand-off from background workers to the UI thread.
//!
//! Workers never touch registries. They send a `UiEvent` and the UI thread
//! applies it when it drains the queue.

use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, Sender};
use tracing::warn;

use crate::pane::RefreshResult;
use crate::transfer::MoveReport;

#[derive(Debug)]
pub enum UiEvent {
    Refreshed(RefreshResult),
    MoveFinished(MoveReport),
}

/// Sending half given to workers.
#[derive(Debug, Clone)]
pub struct UiSender {
    tx: Sender<UiEvent>,
}

impl UiSender {
    /// Returns false once the UI side is gone.
    pub fn send(&self, event: UiEvent) -> bool {
        match self.tx.send(event) {
            Ok(()) => true,
            Err(_) => {
                warn!("UI queue closed, dropping event");
                false
            }
        }
    }
}

pub struct UiQueue {
    tx: Sender<UiEvent>,
    rx: Receiver<UiEvent>,
}

impl UiQueue {
    pub fn new() -> Self {
        let (tx, rx) = flume::unbounded();
        Self { tx, rx }
    }

    pub fn sender(&self) -> UiSender {
        UiSender {
            tx: self.tx.clone(),
        }
    }

    /// Everything queued so far, without blocking.
    pub fn drain(&self) -> Vec<UiEvent> {
        self.rx.try_iter().collect()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<UiEvent> {
        match self.rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for UiQueue {
    fn default() -> Self {
        Self::new()
    }
}
