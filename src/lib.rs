pub mod app;
pub mod config;
pub mod decode;
pub mod error;
pub mod events;
pub mod models;
pub mod pane;
pub mod scanner;
pub mod sync;
pub mod transfer;

pub use app::{Notification, SwipeOutcome, TriageEngine};
pub use config::EngineConfig;
pub use error::MoveError;
pub use pane::Side;
