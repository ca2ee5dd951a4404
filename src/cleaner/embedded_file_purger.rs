//! Embedded File Purger
//!
//! Removes every document-level attachment. Names are collected by index
//! first and deleted by name afterwards, so the shrinking table never skips
//! an entry.

use tracing::{debug, instrument, warn};

use crate::error::EmbeddedFileError;
use crate::pdf_document::PdfDocument;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddedFileStats {
    pub found: usize,
    pub removed: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default)]
pub struct EmbeddedFilePurger;

impl EmbeddedFilePurger {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, doc))]
    pub fn run(&self, doc: &mut PdfDocument) -> EmbeddedFileStats {
        let count = match doc.embedded_file_count() {
            Ok(count) => count,
            Err(EmbeddedFileError::Unsupported) => {
                debug!("Document has no embedded files");
                return EmbeddedFileStats::default();
            }
            Err(e) => {
                warn!("Cannot enumerate embedded files: {}", e);
                return EmbeddedFileStats::default();
            }
        };

        let mut stats = EmbeddedFileStats {
            found: count,
            ..EmbeddedFileStats::default()
        };

        let mut names = Vec::with_capacity(count);
        for index in 0..count {
            match doc.embedded_file(index) {
                Ok(file) => names.push(file.name),
                Err(e) => {
                    warn!("{}", e);
                    stats.failed += 1;
                }
            }
        }

        for name in names {
            match doc.remove_embedded_file(&name) {
                Ok(()) => {
                    debug!("Removed embedded file '{}'", name);
                    stats.removed += 1;
                }
                Err(e) => {
                    warn!("{}", e);
                    stats.failed += 1;
                }
            }
        }

        if stats.failed == 0 {
            doc.detach_embedded_file_table();
        }
        stats
    }
}
