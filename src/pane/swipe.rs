//! Horizontal swipe recognition for a single list item.
//!
//! A pane only accepts swipes toward the other pane. The tracker turns raw
//! pointer positions into item translation and fade, and decides on release
//! whether the item is sent over, snaps back, or was simply clicked.

use std::time::Duration;

/// Pixels per millisecond for the fly-out animation.
const SWIPE_SPEED: f32 = 2.0;

/// Pixels per millisecond for collapsing the gap a sent item leaves.
const MOVE_SPEED: f32 = 2.0;

/// Default touch slop in pixels.
pub const DEFAULT_TOUCH_SLOP: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwipeDirection {
    LeftToRight,
    RightToLeft,
}

/// How to draw the item while it is being dragged.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SwipeFrame {
    pub translation_x: f32,
    pub alpha: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SwipeRelease {
    /// The pointer never left the slop; open the item.
    Click,
    /// Far enough: fly out to `end_x`, then move the file.
    Commit { end_x: f32, duration: Duration },
    /// Not far enough: animate back to rest.
    Revert { duration: Duration },
    /// Release of a pointer this tracker is not following.
    Ignored,
}

#[derive(Debug, Clone)]
pub struct SwipeTracker {
    direction: SwipeDirection,
    slop: f32,
    pressed: bool,
    swiping: bool,
    down_x: f32,
}

impl SwipeTracker {
    pub fn new(direction: SwipeDirection) -> Self {
        Self::with_slop(direction, DEFAULT_TOUCH_SLOP)
    }

    pub fn with_slop(direction: SwipeDirection, slop: f32) -> Self {
        Self {
            direction,
            slop,
            pressed: false,
            swiping: false,
            down_x: 0.0,
        }
    }

    /// Starts following a pointer. A second pointer while one is down is
    /// refused.
    pub fn down(&mut self, x: f32) -> bool {
        if self.pressed {
            return false;
        }
        self.pressed = true;
        self.swiping = false;
        self.down_x = x;
        true
    }

    /// Returns the frame to draw once the drag has become a swipe.
    pub fn moved(&mut self, x: f32, item_width: f32) -> Option<SwipeFrame> {
        if !self.pressed {
            return None;
        }
        let delta = x - self.down_x;
        if !self.swiping {
            let outward = match self.direction {
                SwipeDirection::LeftToRight => delta,
                SwipeDirection::RightToLeft => -delta,
            };
            self.swiping = outward > self.slop;
        }
        self.swiping.then(|| SwipeFrame {
            translation_x: delta,
            alpha: if item_width > 0.0 {
                (1.0 - delta.abs() / item_width).clamp(0.0, 1.0)
            } else {
                1.0
            },
        })
    }

    pub fn up(&mut self, x: f32, item_width: f32) -> SwipeRelease {
        if !self.pressed {
            return SwipeRelease::Ignored;
        }
        let swiping = self.swiping;
        self.reset();
        if !swiping {
            return SwipeRelease::Click;
        }

        let width = item_width.max(1.0);
        let delta = x - self.down_x;
        let covered = delta.abs() / width;
        if delta.abs() > width / 4.0 {
            SwipeRelease::Commit {
                end_x: if delta < 0.0 { -width } else { width },
                duration: animation_duration(covered, width),
            }
        } else {
            SwipeRelease::Revert {
                duration: animation_duration(1.0 - covered, width),
            }
        }
    }

    pub fn cancel(&mut self) {
        self.reset();
    }

    pub fn is_swiping(&self) -> bool {
        self.swiping
    }

    fn reset(&mut self) {
        self.pressed = false;
        self.swiping = false;
    }
}

fn animation_duration(fraction_covered: f32, width: f32) -> Duration {
    let millis = ((1.0 - fraction_covered) * width / SWIPE_SPEED).round().max(1.0);
    Duration::from_millis(millis as u64)
}

/// Time to collapse the slot of an item that was sent away.
pub fn collapse_duration(item_height: f32) -> Duration {
    Duration::from_millis((item_height.max(0.0) / MOVE_SPEED) as u64)
}
