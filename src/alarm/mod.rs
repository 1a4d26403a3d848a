pub mod disabled;
pub mod engine;
pub mod format;
pub mod list;
pub mod model;
pub mod toggle;
