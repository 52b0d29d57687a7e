//! One side of the triage screen.

pub mod bindings;
pub mod controller;
pub mod refresh;
pub mod swipe;

pub use bindings::BindingTable;
pub use controller::PaneController;
pub use refresh::{RefreshResult, RefreshWorker};
pub use swipe::{collapse_duration, SwipeDirection, SwipeFrame, SwipeRelease, SwipeTracker};

/// Which pane. Items swipe from `From` into `To` and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    From,
    To,
}

impl Side {
    pub const BOTH: [Side; 2] = [Side::From, Side::To];

    pub fn other(self) -> Self {
        match self {
            Self::From => Self::To,
            Self::To => Self::From,
        }
    }

    pub fn index(self) -> usize {
        match self {
            Self::From => 0,
            Self::To => 1,
        }
    }

    /// Key under which the pane's directory is persisted.
    pub fn preference_key(self) -> &'static str {
        match self {
            Self::From => "from_path",
            Self::To => "to_path",
        }
    }

    /// The `From` pane sits on the left and sends items right.
    pub fn swipe_direction(self) -> SwipeDirection {
        match self {
            Self::From => SwipeDirection::LeftToRight,
            Self::To => SwipeDirection::RightToLeft,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::From => "from",
            Self::To => "to",
        }
    }
}
