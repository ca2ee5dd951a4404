//! Output stage: compaction and persistence of sanitized documents

pub mod save_compactor;

pub use save_compactor::{partial_path, SaveCompactor, SaveStats};
