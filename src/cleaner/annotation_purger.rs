//! Annotation Purger
//!
//! Deletes markup annotations that may carry user-entered content. The page's
//! annotation list is read in full before anything is removed, so deletions
//! never shift what is left to visit. Popups owned by a removed annotation go
//! with it.

use std::collections::HashSet;

use lopdf::{Object, ObjectId};
use tracing::{debug, instrument, warn};

use crate::config::AnnotationScope;
use crate::error::AnnotationError;
use crate::pdf_document::PdfDocument;
use crate::types::{Annotation, AnnotationKind, AnnotationRef};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnnotationStats {
    pub removed: usize,
    pub failed: usize,
    pub kept: usize,
}

impl AnnotationStats {
    fn absorb(&mut self, other: AnnotationStats) {
        self.removed += other.removed;
        self.failed += other.failed;
        self.kept += other.kept;
    }
}

#[derive(Debug, Clone)]
pub struct AnnotationPurger {
    scope: AnnotationScope,
}

impl AnnotationPurger {
    pub fn new(scope: AnnotationScope) -> Self {
        Self { scope }
    }

    fn selects(&self, kind: &AnnotationKind) -> bool {
        match self.scope {
            AnnotationScope::Removable => kind.is_removable(),
            AnnotationScope::All => *kind != AnnotationKind::Widget,
        }
    }

    /// Purges every page. Pages whose list cannot be read count as one failure.
    #[instrument(skip(self, doc))]
    pub fn run(&self, doc: &mut PdfDocument) -> AnnotationStats {
        let mut stats = AnnotationStats::default();
        for index in 0..doc.page_count() {
            match self.purge_page(doc, index) {
                Ok(page_stats) => stats.absorb(page_stats),
                Err(e) => {
                    warn!("Skipping annotations of page {}: {}", index, e);
                    stats.failed += 1;
                }
            }
        }
        debug!("Removed {} annotations, {} failed", stats.removed, stats.failed);
        stats
    }

    pub fn purge_page(&self, doc: &mut PdfDocument, index: usize) -> Result<AnnotationStats, AnnotationError> {
        let annotations = doc
            .annotations(index)
            .map_err(|_| AnnotationError::UnreadableList(index))?;

        let targets: Vec<&Annotation> = annotations.iter().filter(|a| self.selects(&a.kind)).collect();
        let mut stats = AnnotationStats {
            kept: annotations.len() - targets.len(),
            ..AnnotationStats::default()
        };
        if targets.is_empty() {
            return Ok(stats);
        }

        let mut doomed: HashSet<AnnotationRef> = targets.iter().map(|a| a.reference).collect();
        let mut popups: HashSet<ObjectId> = HashSet::new();
        for target in &targets {
            if let AnnotationRef::Indirect(id) = target.reference {
                if let Some(popup) = popup_of(doc, id) {
                    doomed.insert(AnnotationRef::Indirect(popup));
                    popups.insert(popup);
                }
            }
        }

        let removed = {
            let array = doc
                .annotation_array_mut(index)
                .map_err(|_| AnnotationError::UnreadableList(index))?
                .ok_or(AnnotationError::UnreadableList(index))?;
            let before = array.len();
            let mut position = 0;
            array.retain(|entry| {
                let reference = match entry {
                    Object::Reference(id) => AnnotationRef::Indirect(*id),
                    _ => AnnotationRef::Inline(position),
                };
                position += 1;
                !doomed.contains(&reference)
            });
            before - array.len()
        };

        for target in &targets {
            if let AnnotationRef::Indirect(id) = target.reference {
                if popups.contains(&id) {
                    stats.removed += 1;
                    continue;
                }
                if let Err(e) = self.release(doc, id) {
                    warn!("{}", e);
                    stats.failed += 1;
                    continue;
                }
            }
            stats.removed += 1;
        }

        for popup in popups {
            doc.inner_mut().objects.remove(&popup);
        }
        debug!("Page {}: removed {} entries from /Annots", index, removed);
        Ok(stats)
    }

    /// Drops the annotation object so nothing can still reach its content.
    fn release(&self, doc: &mut PdfDocument, id: ObjectId) -> Result<(), AnnotationError> {
        doc.inner_mut()
            .objects
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| AnnotationError::Detach(id, "object no longer exists".into()))
    }
}

fn popup_of(doc: &PdfDocument, id: ObjectId) -> Option<ObjectId> {
    doc.dict(id)?.get(b"Popup").ok()?.as_reference().ok()
}
