pub mod media_item;
pub mod preferences;
pub mod registry;

pub use media_item::*;
pub use preferences::*;
pub use registry::*;
