//! Bookkeeping for scroll events caused by our own smooth scrolls.
//!
//! Each programmatic scroll opens a window identified by its animation id.
//! While it runs the window lasts for the whole animation budget; once the
//! animation ends the window shrinks to a short grace period so trailing
//! scroll events are still swallowed. Expired windows are pruned whenever
//! the state is queried.

use std::time::{Duration, Instant};

use tracing::trace;

#[derive(Debug, Clone, Copy)]
struct Window {
    id: u64,
    deadline: Instant,
}

#[derive(Debug, Clone)]
pub struct SuppressionWindows {
    windows: Vec<Window>,
    budget: Duration,
    grace: Duration,
}

impl SuppressionWindows {
    /// `budget` is the longest an animation can run; `grace` is how long a
    /// window outlives the animation that opened it.
    pub fn new(budget: Duration, grace: Duration) -> Self {
        Self {
            windows: Vec::new(),
            budget,
            grace,
        }
    }

    /// Opens (or re-opens) the window for animation `id`.
    pub fn open(&mut self, id: u64, now: Instant) {
        let deadline = now + self.budget + self.grace;
        match self.windows.iter_mut().find(|w| w.id == id) {
            Some(window) => window.deadline = deadline,
            None => self.windows.push(Window { id, deadline }),
        }
        trace!(id, open = self.windows.len(), "Opened suppression window");
    }

    /// Marks animation `id` as ended; its window closes after the grace period.
    pub fn finish(&mut self, id: u64, now: Instant) {
        let closing = now + self.grace;
        if let Some(window) = self.windows.iter_mut().find(|w| w.id == id) {
            window.deadline = window.deadline.min(closing);
        }
    }

    pub fn is_active(&mut self, now: Instant) -> bool {
        self.windows.retain(|w| w.deadline > now);
        !self.windows.is_empty()
    }

    /// Drops every window at once; used when the user takes over.
    pub fn clear(&mut self) {
        self.windows.clear();
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}
