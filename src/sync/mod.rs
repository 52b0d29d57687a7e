//! Cross-pane scroll synchronization.

pub mod animation;
pub mod suppression;
pub mod synchronizer;
pub mod viewport;

pub use animation::{AnimationEnd, ScrollAnimation};
pub use suppression::SuppressionWindows;
pub use synchronizer::{plan_sync, ScrollSynchronizer, SyncPhase, SyncPlan};
pub use viewport::{TopBottom, Viewport};
