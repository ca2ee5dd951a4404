//! Main Library File for PDF Form Sanitization
//! Clears, purges and zone-redacts filled-in PDF forms so that the data a
//! user entered cannot be recovered from the saved file.

// Configuration and Core Pipeline
pub mod config;
pub mod error;
pub mod pdf_document;
pub mod pipeline;
pub mod types;

// Field, annotation and attachment passes
pub mod cleaner;

// Zone redaction
pub mod redaction;

// Compaction and saving
pub mod output;

// Directory runs and reporting
pub mod batch;
pub mod report;

// Shared Utilities
pub mod utils;

// Re-exports for crate consumers
pub use batch::{run_batch, BatchSelector};
pub use config::{AnnotationScope, BatchConfig, FileConfig, Method, Mode, SanitizeConfig};
pub use error::{Error, Result};
pub use output::SaveCompactor;
pub use pdf_document::PdfDocument;
pub use pipeline::{default_output_path, SanitizationEngine, SanitizeStrategy};
pub use redaction::{ZoneMap, ZoneRedactor};
pub use report::{BatchSummary, FileOutcome, SanitizeReport, StrategyKind};
pub use types::{FieldKind, FieldValue, Rect, RedactionZone};
