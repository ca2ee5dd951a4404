//! Zone-based true redaction

pub mod content_filter;
pub mod zone_redactor;
pub mod zones;

pub use content_filter::{ContentFilter, FilterStats, Matrix};
pub use zone_redactor::{PageRedaction, RedactionStats, ZoneRedactor};
pub use zones::ZoneMap;
