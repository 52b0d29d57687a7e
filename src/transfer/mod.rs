pub mod compare;
pub mod mover;
pub mod worker;

pub use compare::files_identical;
pub use mover::{move_file, MoveOutcome, MovedFile};
pub use worker::{MediaIndex, MoveReport, MoveRequest, NoopMediaIndex, TransferWorker};
