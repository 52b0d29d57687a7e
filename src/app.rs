//! The triage engine: two panes, the two scroll synchronizers between them
//! and the move pipeline.
//!
//! Everything here runs on the UI thread. Scans and moves happen on worker
//! threads and come back as `UiEvent`s that `tick` applies, so every registry
//! change is observed by the display in one piece.

use std::collections::{HashMap, VecDeque};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use tracing::{debug, info, trace, warn};

use crate::config::EngineConfig;
use crate::decode::{
    FfmpegPosterSource, MediaDecoder, MemoryProbe, PosterFrameSource, SystemMemoryProbe,
};
use crate::error::MoveError;
use crate::events::{UiEvent, UiQueue};
use crate::models::PreferenceStore;
use crate::pane::{collapse_duration, PaneController, Side, SwipeFrame, SwipeRelease};
use crate::sync::{ScrollSynchronizer, SyncPhase, SyncPlan};
use crate::transfer::{MediaIndex, MoveReport, MoveRequest, NoopMediaIndex, TransferWorker};

/// A transient, non-blocking message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub file_name: String,
    pub message: String,
}

/// What the display should do after a pointer is released on an item.
#[derive(Debug)]
pub enum SwipeOutcome {
    Ignored,
    /// Tap without a swipe: open the file in a viewer.
    Open(PathBuf),
    Revert { duration: Duration },
    /// The item flies out while its move runs in the background, then its
    /// slot closes over `collapse`.
    Moving {
        id: u64,
        end_x: f32,
        duration: Duration,
        collapse: Duration,
    },
    /// The swipe committed but no move was started; the item snaps back.
    Rejected(MoveError),
}

pub struct TriageEngine {
    panes: [PaneController; 2],
    /// `syncs[i]` reads pane `i` and drives the other one.
    syncs: [ScrollSynchronizer; 2],
    queue: UiQueue,
    transfer: TransferWorker,
    ready: Arc<AtomicBool>,
    in_flight: HashMap<u64, MoveRequest>,
    next_move_id: u64,
    /// Display slot each pane's swipe tracker is following.
    swipe_slots: [Option<usize>; 2],
    notifications: VecDeque<Notification>,
}

/// Splits the panes into (`side`, other side).
fn split_panes(
    panes: &mut [PaneController; 2],
    side: Side,
) -> (&mut PaneController, &mut PaneController) {
    let [from, to] = panes;
    match side {
        Side::From => (from, to),
        Side::To => (to, from),
    }
}

impl TriageEngine {
    pub fn new(config: EngineConfig) -> Result<Self> {
        Self::with_collaborators(
            config,
            Arc::new(NoopMediaIndex),
            Arc::new(SystemMemoryProbe::new()),
            Arc::new(FfmpegPosterSource::new()),
        )
    }

    pub fn with_collaborators(
        config: EngineConfig,
        index: Arc<dyn MediaIndex>,
        probe: Arc<dyn MemoryProbe>,
        posters: Arc<dyn PosterFrameSource>,
    ) -> Result<Self> {
        let queue = UiQueue::new();
        let ready = Arc::new(AtomicBool::new(false));
        let decoder = MediaDecoder::with_poster_source(posters);

        let panes = [
            PaneController::new(
                Side::From,
                &config,
                decoder.clone(),
                probe.clone(),
                ready.clone(),
                queue.sender(),
            )?,
            PaneController::new(
                Side::To,
                &config,
                decoder,
                probe,
                ready.clone(),
                queue.sender(),
            )?,
        ];
        let syncs = [
            ScrollSynchronizer::new(Side::From, config.sync.clone()),
            ScrollSynchronizer::new(Side::To, config.sync),
        ];
        let transfer = TransferWorker::new(queue.sender(), index)?;

        Ok(Self {
            panes,
            syncs,
            queue,
            transfer,
            ready,
            in_flight: HashMap::new(),
            next_move_id: 1,
            swipe_slots: [None, None],
            notifications: VecDeque::new(),
        })
    }

    pub fn pane(&self, side: Side) -> &PaneController {
        &self.panes[side.index()]
    }

    pub fn pane_mut(&mut self, side: Side) -> &mut PaneController {
        &mut self.panes[side.index()]
    }

    /// The synchronizer that reads `source` and scrolls the other pane.
    pub fn sync(&self, source: Side) -> &ScrollSynchronizer {
        &self.syncs[source.index()]
    }

    pub fn set_directory(&mut self, side: Side, dir: &Path) -> bool {
        self.swipe_slots[side.index()] = None;
        self.pane_mut(side).set_directory(dir)
    }

    /// The display surfaces have been measured; scans may start.
    pub fn mark_layout_complete(&mut self) {
        if self.ready.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("Layout complete, loading panes");
        for pane in &mut self.panes {
            pane.refresh();
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Re-scans both panes, e.g. when the app returns to the foreground.
    pub fn resume(&mut self) {
        if !self.is_ready() {
            return;
        }
        for pane in &mut self.panes {
            pane.refresh();
        }
    }

    /// True until both panes point at an existing directory.
    pub fn needs_introduction(&self) -> bool {
        !self.panes.iter().all(PaneController::has_valid_directory)
    }

    pub fn restore_preferences(&mut self, store: &PreferenceStore) {
        for side in Side::BOTH {
            match store.directory(side) {
                Some(dir) if dir.is_dir() => {
                    self.set_directory(side, &dir);
                }
                Some(dir) => debug!(?side, ?dir, "Stored directory no longer exists"),
                None => {}
            }
        }
    }

    pub fn save_preferences(&self, store: &PreferenceStore) -> Result<()> {
        for pane in &self.panes {
            if let Some(dir) = pane.directory() {
                store.set_directory(pane.side(), dir)?;
            }
        }
        Ok(())
    }

    pub fn set_display_size(&mut self, side: Side, width: u32, height: u32) {
        self.pane_mut(side).set_display_size(width, height);
    }

    /// The user physically touched `side`: any synchronization scroll on it
    /// stops and its scroll events count as genuine again.
    pub fn user_touched(&mut self, side: Side, now: Instant) {
        self.syncs[side.other().index()].user_touched_target(now);
    }

    /// The user scrolled `side` to `y`. Returns the synchronization plan
    /// that was acted on, if the scroll was transmitted.
    pub fn user_scrolled(&mut self, side: Side, y: f32, now: Instant) -> Option<SyncPlan> {
        self.user_touched(side, now);
        if !self.pane_mut(side).viewport_mut().scroll_to(y) {
            return None;
        }
        self.on_scroll_changed(side, now)
    }

    /// Handles a scroll position change of `side`, genuine or not.
    fn on_scroll_changed(&mut self, side: Side, now: Instant) -> Option<SyncPlan> {
        if self.syncs[side.other().index()].suppresses_target(now) {
            trace!(side = side.name(), "Scroll is self-induced, not transmitting");
            return None;
        }

        let (source, target) = split_panes(&mut self.panes, side);
        let before = target.viewport().scroll_y();
        let (target_entries, target_view) = target.entries_and_viewport_mut();
        let plan = self.syncs[side.index()].transmit(
            source.entries(),
            source.viewport(),
            target_entries,
            target_view,
            now,
        );

        // A jump toward a far target is itself a scroll of the other pane.
        if target.viewport().scroll_y() != before {
            self.on_scroll_changed(side.other(), now);
        }
        Some(plan)
    }

    pub fn pointer_down(&mut self, side: Side, slot: usize, x: f32) -> bool {
        if !self.pane_mut(side).swipe_mut().down(x) {
            return false;
        }
        self.swipe_slots[side.index()] = Some(slot);
        true
    }

    pub fn pointer_moved(&mut self, side: Side, x: f32, item_width: f32) -> Option<SwipeFrame> {
        self.pane_mut(side).swipe_mut().moved(x, item_width)
    }

    pub fn pointer_up(&mut self, side: Side, x: f32, item_width: f32) -> SwipeOutcome {
        let release = self.pane_mut(side).swipe_mut().up(x, item_width);
        let Some(slot) = self.swipe_slots[side.index()].take() else {
            return SwipeOutcome::Ignored;
        };
        // The slot may have been rebound while the pointer was down.
        let Some(file_name) = self
            .pane(side)
            .entry_for_slot(slot)
            .map(|entry| entry.file_name.clone())
        else {
            return SwipeOutcome::Ignored;
        };

        match release {
            SwipeRelease::Ignored => SwipeOutcome::Ignored,
            SwipeRelease::Click => match self.pane(side).path_of(&file_name) {
                Some(path) => SwipeOutcome::Open(path),
                None => SwipeOutcome::Ignored,
            },
            SwipeRelease::Revert { duration } => SwipeOutcome::Revert { duration },
            SwipeRelease::Commit { end_x, duration } => {
                let pane = self.pane(side);
                let item_height = pane
                    .index_of(&file_name)
                    .and_then(|index| pane.viewport().item_height(index))
                    .unwrap_or(0.0);
                match self.commit_swipe(side, &file_name) {
                    Ok(id) => SwipeOutcome::Moving {
                        id,
                        end_x,
                        duration,
                        collapse: collapse_duration(item_height),
                    },
                    Err(e) => {
                        self.notify(&file_name, &e);
                        SwipeOutcome::Rejected(e)
                    }
                }
            }
        }
    }

    pub fn pointer_cancelled(&mut self, side: Side) {
        self.pane_mut(side).swipe_mut().cancel();
        self.swipe_slots[side.index()] = None;
    }

    /// Sends `file_name` from `side` to the other pane's directory. The move
    /// runs in the background; the entry is pending until `tick` applies the
    /// result.
    pub fn commit_swipe(&mut self, side: Side, file_name: &str) -> Result<u64, MoveError> {
        if let Some(id) = self.in_flight_id(side, file_name) {
            return Ok(id);
        }

        let dest_dir = self
            .pane(side.other())
            .directory()
            .filter(|dir| dir.is_dir())
            .map(Path::to_path_buf)
            .ok_or(MoveError::NoDestination)?;
        let source = self.pane(side);
        let source_dir = source
            .directory()
            .map(Path::to_path_buf)
            .ok_or_else(|| MoveError::InvalidSource {
                from: PathBuf::from(file_name),
            })?;
        if !source.registry().contains(file_name) {
            return Err(MoveError::SourceMissing {
                from: source_dir.join(file_name),
            });
        }

        let id = self.next_move_id;
        self.next_move_id += 1;
        let request = MoveRequest {
            id,
            from: side,
            file_name: file_name.to_owned(),
            source_dir,
            dest_dir,
        };
        debug!(id, side = side.name(), file = file_name, "Submitting move");

        self.pane_mut(side).mark_pending(file_name);
        if !self.transfer.submit(request.clone()) {
            self.pane_mut(side).clear_pending(file_name);
            return Err(MoveError::io(
                request.source_path(),
                request.dest_dir.join(file_name),
                io::Error::other("transfer worker stopped"),
            ));
        }
        self.in_flight.insert(id, request);
        Ok(id)
    }

    fn in_flight_id(&self, side: Side, file_name: &str) -> Option<u64> {
        self.in_flight
            .values()
            .find(|r| r.from == side && r.file_name == file_name)
            .map(|r| r.id)
    }

    pub fn moves_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Applies worker results and steps scroll animations. Returns the number
    /// of worker events applied.
    pub fn tick(&mut self, now: Instant) -> usize {
        let events = self.queue.drain();
        let applied = events.len();
        for event in events {
            self.apply_event(event, now);
        }
        self.advance_animations(now);
        applied
    }

    fn advance_animations(&mut self, now: Instant) {
        for side in Side::BOTH {
            let target = side.other();
            let scrolled = self.syncs[side.index()]
                .advance(self.panes[target.index()].viewport_mut(), now);
            if scrolled {
                self.on_scroll_changed(target, now);
            }
        }
    }

    fn apply_event(&mut self, event: UiEvent, now: Instant) {
        match event {
            UiEvent::Refreshed(result) => {
                self.panes[result.side.index()].apply_refresh(result);
            }
            UiEvent::MoveFinished(report) => self.apply_move(report, now),
        }
    }

    /// Mirrors a finished move into both registries, then centers the
    /// destination pane on the moved entry.
    fn apply_move(&mut self, report: MoveReport, now: Instant) {
        let MoveReport { request, result } = report;
        self.in_flight.remove(&request.id);
        let from = request.from;
        self.panes[from.index()].clear_pending(&request.file_name);

        let moved = match result {
            Ok(moved) => moved,
            Err(e) => {
                warn!(
                    file = %request.file_name,
                    source = ?request.source_dir,
                    destination = ?request.dest_dir,
                    error = %e,
                    "Move not applied"
                );
                self.notify(&request.file_name, &e);
                return;
            }
        };

        let (source, dest) = split_panes(&mut self.panes, from);
        // Either pane may have switched directories while the move ran.
        let received = if dest.directory() == Some(request.dest_dir.as_path()) {
            dest.receive_moved(&moved.target)
        } else {
            None
        };
        if source.directory() == Some(request.source_dir.as_path()) {
            source.remove_moved(&request.file_name);
        }

        if let Some(index) = received.and_then(|entry| dest.index_of(&entry.file_name)) {
            self.syncs[from.index()].center_on(index, dest.viewport_mut(), now);
        }
    }

    fn notify(&mut self, file_name: &str, error: &MoveError) {
        self.notifications.push_back(Notification {
            file_name: file_name.to_owned(),
            message: error.to_string(),
        });
    }

    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        self.notifications.drain(..).collect()
    }

    /// What the direction reading `side` is doing.
    pub fn phase(&mut self, side: Side, now: Instant) -> SyncPhase {
        if self.syncs[side.index()].is_animating() {
            SyncPhase::Transmitting
        } else if self.syncs[side.other().index()].suppresses_target(now) {
            SyncPhase::Suppressed
        } else {
            SyncPhase::Idle
        }
    }

    fn is_busy(&self) -> bool {
        !self.in_flight.is_empty() || self.panes.iter().any(|p| p.outstanding_refreshes() > 0)
    }

    /// Blocks until every submitted refresh and move has been applied.
    /// Returns false if `timeout` ran out first.
    pub fn settle(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.is_busy() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return false;
            }
            match self.queue.recv_timeout(remaining) {
                Some(event) => self.apply_event(event, Instant::now()),
                None => return !self.is_busy(),
            }
        }
        true
    }
}
