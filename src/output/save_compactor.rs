//! Save Compactor
//!
//! Final pass for every document: unreachable objects are pruned, empty
//! streams dropped, objects renumbered densely and streams compressed before
//! a complete file is written with a fresh cross-reference table. The file is
//! written beside the destination first and renamed into place.

use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::error::{Error, Result};
use crate::pdf_document::PdfDocument;

/// Trailer keys that point into previous revisions of the file
const STALE_TRAILER_KEYS: [&[u8]; 2] = [b"Prev", b"XRefStm"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveStats {
    pub objects_pruned: usize,
    pub objects_written: usize,
    pub bytes_written: usize,
}

#[derive(Debug, Clone)]
pub struct SaveCompactor {
    compress: bool,
}

impl Default for SaveCompactor {
    fn default() -> Self {
        Self { compress: true }
    }
}

impl SaveCompactor {
    pub fn new(compress: bool) -> Self {
        Self { compress }
    }

    /// Compacts the document and serializes it to memory.
    #[instrument(skip(self, doc))]
    pub fn to_bytes(&self, doc: PdfDocument) -> Result<(Vec<u8>, SaveStats)> {
        let mut inner = doc.into_inner();

        let pruned = inner.prune_objects();
        inner.delete_zero_length_streams();
        inner.renumber_objects();
        if self.compress {
            inner.compress();
        }
        for key in STALE_TRAILER_KEYS {
            inner.trailer.remove(key);
        }

        let mut buffer = Vec::new();
        inner.save_to(&mut buffer)?;

        let stats = SaveStats {
            objects_pruned: pruned.len(),
            objects_written: inner.objects.len(),
            bytes_written: buffer.len(),
        };
        debug!(
            "Pruned {} objects, {} written in {} bytes",
            stats.objects_pruned, stats.objects_written, stats.bytes_written
        );
        Ok((buffer, stats))
    }

    /// Compacts the document and writes it to `output`.
    ///
    /// An existing `output` is only replaced once the new file is complete.
    #[instrument(skip(self, doc))]
    pub async fn save(&self, doc: PdfDocument, output: &Path) -> Result<SaveStats> {
        let save_error = |reason: String| Error::SaveError {
            path: output.to_path_buf(),
            reason,
        };
        let (bytes, stats) = self.to_bytes(doc).map_err(|e| save_error(e.to_string()))?;

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| save_error(e.to_string()))?;
        }

        let partial = partial_path(output);
        if let Err(e) = tokio::fs::write(&partial, &bytes).await {
            discard(&partial).await;
            return Err(save_error(e.to_string()));
        }
        if let Err(e) = tokio::fs::rename(&partial, output).await {
            discard(&partial).await;
            return Err(save_error(e.to_string()));
        }

        info!("💾 Saved {} ({} bytes)", output.display(), stats.bytes_written);
        Ok(stats)
    }
}

/// Sibling file the output is staged in: `<name>.partial`.
pub fn partial_path(output: &Path) -> PathBuf {
    let mut name = output
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".partial");
    output.with_file_name(name)
}

async fn discard(partial: &Path) {
    if let Err(e) = tokio::fs::remove_file(partial).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!("Could not remove {}: {}", partial.display(), e);
        }
    }
}
