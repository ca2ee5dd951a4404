//! Cleaner passes operating on a loaded document

pub mod annotation_purger;
pub mod embedded_file_purger;
pub mod field_clearer;
pub mod structure_cleaner;
pub mod verification_pass;
pub mod widget_flattener;
pub mod widget_purger;

pub use annotation_purger::{AnnotationPurger, AnnotationStats};
pub use embedded_file_purger::{EmbeddedFilePurger, EmbeddedFileStats};
pub use field_clearer::{ClearOutcome, ClearStats, FieldClearer};
pub use structure_cleaner::{StructureCleanStats, StructureCleaner};
pub use verification_pass::{VerificationPass, VerificationStats};
pub use widget_flattener::{FlattenStats, WidgetFlattener};
pub use widget_purger::{WidgetPurgeStats, WidgetPurger};
