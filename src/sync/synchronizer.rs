//! Keeps the other pane's visible time range aligned with a scrolled pane.
//!
//! One synchronizer exists per direction. The one for `From -> To` reads the
//! `From` pane's scroll position, drives smooth scrolls on the `To` pane and
//! owns the suppression windows that tell the opposite synchronizer to
//! ignore the scroll events those animations produce.

use std::time::Instant;

use chrono::{DateTime, Utc};
use tracing::{debug, trace};

use super::animation::{AnimationEnd, ScrollAnimation};
use super::suppression::SuppressionWindows;
use super::viewport::{TopBottom, Viewport};
use crate::config::SyncConfig;
use crate::models::Entry;
use crate::pane::Side;

/// What one direction is doing at a given moment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Idle,
    /// A scroll of this direction's source is being played out on its target.
    Transmitting,
    /// This direction's source is being scrolled by the opposite direction.
    Suppressed,
}

/// Outcome of comparing the two focus windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPlan {
    /// One of the panes has nothing in focus.
    Unavailable,
    /// The windows overlap.
    InSync,
    /// The target should move toward older items but the source is still on
    /// its first page.
    HoldOnFirstPage,
    ScrollDown(usize),
    ScrollUp(usize),
    /// A direction was needed but no target entry crosses the boundary.
    NoTarget,
}

impl SyncPlan {
    pub fn target_index(self) -> Option<usize> {
        match self {
            Self::ScrollDown(index) | Self::ScrollUp(index) => Some(index),
            _ => None,
        }
    }
}

fn focused_times(
    entries: &[Entry],
    viewport: &Viewport,
    margin: f32,
) -> Option<TopBottom<DateTime<Utc>>> {
    let window = viewport.focus_window(margin)?;
    Some(TopBottom {
        top: entries.get(window.top)?.timestamp,
        bottom: entries.get(window.bottom)?.timestamp,
    })
}

/// Decides where the target pane should scroll so its focus window meets
/// the source pane's.
pub fn plan_sync(
    config: &SyncConfig,
    source_entries: &[Entry],
    source_view: &Viewport,
    target_entries: &[Entry],
    target_view: &Viewport,
) -> SyncPlan {
    let Some(source) = focused_times(source_entries, source_view, config.source_focus_margin) else {
        return SyncPlan::Unavailable;
    };
    let Some(target) = focused_times(target_entries, target_view, config.target_focus_margin) else {
        return SyncPlan::Unavailable;
    };

    // Everything the target shows is newer than the source's oldest focus.
    let show_older = source.top < target.bottom;
    // Everything the target shows is older than the source's newest focus.
    let show_newer = target.top < source.bottom;

    if show_older {
        if source_view.on_first_page() {
            return SyncPlan::HoldOnFirstPage;
        }
        // The entry just above the first one older than the source's newest.
        match target_entries.iter().position(|e| e.timestamp < source.top) {
            Some(index) if index > 0 => SyncPlan::ScrollDown(index - 1),
            _ => SyncPlan::NoTarget,
        }
    } else if show_newer {
        match target_entries.iter().position(|e| e.timestamp <= source.bottom) {
            Some(index) => SyncPlan::ScrollUp(index),
            None => SyncPlan::NoTarget,
        }
    } else {
        SyncPlan::InSync
    }
}

pub struct ScrollSynchronizer {
    source: Side,
    config: SyncConfig,
    animation: Option<ScrollAnimation>,
    suppression: SuppressionWindows,
    next_animation_id: u64,
}

impl ScrollSynchronizer {
    pub fn new(source: Side, config: SyncConfig) -> Self {
        let suppression = SuppressionWindows::new(config.scroll_duration, config.grace_period);
        Self {
            source,
            config,
            animation: None,
            suppression,
            next_animation_id: 1,
        }
    }

    pub fn source(&self) -> Side {
        self.source
    }

    pub fn target(&self) -> Side {
        self.source.other()
    }

    /// Maps a genuine scroll of the source pane onto the target pane.
    /// Returns the plan that was acted on.
    pub fn transmit(
        &mut self,
        source_entries: &[Entry],
        source_view: &Viewport,
        target_entries: &[Entry],
        target_view: &mut Viewport,
        now: Instant,
    ) -> SyncPlan {
        let plan = plan_sync(
            &self.config,
            source_entries,
            source_view,
            target_entries,
            target_view,
        );
        match plan.target_index() {
            Some(index) => {
                debug!(source = ?self.source, ?plan, "Synchronizing other pane");
                self.scroll_target_to(index, target_view, now);
            }
            None => trace!(source = ?self.source, ?plan, "No synchronization needed"),
        }
        plan
    }

    /// Centers the target pane on `index`, bypassing the focus comparison.
    pub fn center_on(&mut self, index: usize, target_view: &mut Viewport, now: Instant) -> bool {
        if index >= target_view.len() {
            return false;
        }
        debug!(target = ?self.target(), index, "Centering pane on entry");
        self.scroll_target_to(index, target_view, now);
        true
    }

    fn scroll_target_to(&mut self, index: usize, target_view: &mut Viewport, now: Instant) {
        let Some(offset) = target_view.centered_offset(index) else {
            return;
        };
        let destination = target_view.clamp(offset);

        self.end_animation(now, AnimationEnd::Cancelled);
        let id = self.next_animation_id;
        self.next_animation_id += 1;
        self.suppression.open(id, now);

        // Far targets are approached from one screen away so the animation
        // does not crawl across the whole list.
        let span = target_view.visible_span().max(1);
        let first = target_view.first_visible_index().unwrap_or(0);
        if first.abs_diff(index) > span * self.config.near_span_multiple {
            let approach = if destination > target_view.scroll_y() {
                destination - target_view.height()
            } else {
                destination + target_view.height()
            };
            trace!(index, approach, "Jumping near far target");
            target_view.scroll_to(approach);
        }

        self.animation = Some(ScrollAnimation::new(
            id,
            target_view.scroll_y(),
            destination,
            now,
            self.config.scroll_duration,
        ));
    }

    /// Steps the running animation. Returns whether the target scrolled.
    pub fn advance(&mut self, target_view: &mut Viewport, now: Instant) -> bool {
        let Some(animation) = &self.animation else {
            return false;
        };
        let changed = target_view.scroll_to(animation.value_at(now));
        if animation.is_finished(now) {
            self.end_animation(now, AnimationEnd::Completed);
        }
        changed
    }

    fn end_animation(&mut self, now: Instant, end: AnimationEnd) {
        if let Some(animation) = self.animation.take() {
            trace!(id = animation.id(), ?end, "Scroll animation ended");
            self.suppression.finish(animation.id(), now);
        }
    }

    /// The user touched the target pane: stop scrolling it and stop
    /// swallowing its scroll events.
    pub fn user_touched_target(&mut self, now: Instant) {
        self.end_animation(now, AnimationEnd::Cancelled);
        self.suppression.clear();
    }

    /// Whether scroll events on the target pane are currently self-induced.
    pub fn suppresses_target(&mut self, now: Instant) -> bool {
        self.suppression.is_active(now)
    }

    pub fn is_animating(&self) -> bool {
        self.animation.is_some()
    }

    pub fn animation_target(&self) -> Option<f32> {
        self.animation.as_ref().map(ScrollAnimation::target)
    }
}
