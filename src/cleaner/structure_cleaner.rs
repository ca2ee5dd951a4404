//! Structure Cleaner
//!
//! Type-agnostic form clearing used by the fallback strategy. Value entries
//! are deleted directly from the field tree, page widgets are blanked, and
//! the document's interactive form is replaced by an empty one.

use std::collections::HashSet;

use lopdf::{Object, ObjectId, StringFormat};
use tracing::{debug, instrument, warn};

use super::widget_purger::install_empty_form;
use crate::error::{Result, StructureError};
use crate::pdf_document::{PdfDocument, MAX_TREE_DEPTH};

/// Entries carrying a field's value or its rendering
const VALUE_KEYS: [&[u8]; 6] = [b"V", b"DV", b"RV", b"I", b"AP", b"AS"];

const BLANKED_KEYS: [&[u8]; 2] = [b"V", b"DV"];

/// Appearance streams and the selected appearance state
const APPEARANCE_KEYS: [&[u8]; 2] = [b"AP", b"AS"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StructureCleanStats {
    /// Field dictionaries visited in the form tree
    pub fields_visited: usize,
    /// Field dictionaries that lost at least one value entry
    pub fields_cleared: usize,
    pub widgets_blanked: usize,
}

#[derive(Debug, Clone, Default)]
pub struct StructureCleaner;

impl StructureCleaner {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, doc))]
    pub fn clean_form(&self, doc: &mut PdfDocument) -> Result<StructureCleanStats> {
        let mut stats = StructureCleanStats::default();

        let roots = form_roots(doc)?;
        let mut visited = HashSet::new();
        for root in roots {
            self.clear_subtree(doc, root, 0, &mut visited, &mut stats);
        }

        for index in 0..doc.page_count() {
            let widget_ids: Vec<ObjectId> = match doc.widgets(index) {
                Ok(widgets) => widgets.into_iter().map(|widget| widget.annot_id).collect(),
                Err(e) => {
                    warn!("Skipping widgets of page {}: {}", index, e);
                    continue;
                }
            };
            for id in widget_ids {
                if self.blank_widget(doc, id) {
                    stats.widgets_blanked += 1;
                }
            }
        }

        install_empty_form(doc)?;
        debug!(
            "Fallback cleared {} of {} fields, blanked {} widgets",
            stats.fields_cleared, stats.fields_visited, stats.widgets_blanked
        );
        Ok(stats)
    }

    fn clear_subtree(
        &self,
        doc: &mut PdfDocument,
        id: ObjectId,
        depth: usize,
        visited: &mut HashSet<ObjectId>,
        stats: &mut StructureCleanStats,
    ) {
        if depth >= MAX_TREE_DEPTH {
            warn!("Field tree deeper than {} levels, stopping at {:?}", MAX_TREE_DEPTH, id);
            return;
        }
        if !visited.insert(id) {
            return;
        }

        let kids: Vec<ObjectId> = match doc.dict_mut(id) {
            Some(field) => {
                stats.fields_visited += 1;
                let mut touched = false;
                for key in VALUE_KEYS {
                    touched |= field.remove(key).is_some();
                }
                if touched {
                    stats.fields_cleared += 1;
                }
                field
                    .get(b"Kids")
                    .and_then(Object::as_array)
                    .map(|kids| kids.iter().filter_map(|kid| kid.as_reference().ok()).collect())
                    .unwrap_or_default()
            }
            None => return,
        };

        for kid in kids {
            self.clear_subtree(doc, kid, depth + 1, visited, stats);
        }
    }

    /// Empties any value still attached to a page widget. Returns whether it
    /// held one.
    fn blank_widget(&self, doc: &mut PdfDocument, id: ObjectId) -> bool {
        let Some(widget) = doc.dict_mut(id) else {
            return false;
        };
        let mut blanked = false;
        for key in BLANKED_KEYS {
            if widget.has(key) {
                widget.set(key.to_vec(), Object::String(Vec::new(), StringFormat::Literal));
                blanked = true;
            }
        }
        for key in APPEARANCE_KEYS {
            blanked |= widget.remove(key).is_some();
        }
        blanked
    }
}

/// Top-level field references of the current form, if any.
fn form_roots(doc: &PdfDocument) -> Result<Vec<ObjectId>> {
    let catalog = doc.catalog()?;
    let Ok(form) = catalog.get(b"AcroForm") else {
        return Ok(Vec::new());
    };
    let form = doc
        .resolve(form)
        .and_then(|obj| obj.as_dict().ok())
        .ok_or_else(|| StructureError::Corrupted("/AcroForm is not a dictionary".into()))?;
    let fields = match form.get(b"Fields").ok().and_then(|obj| doc.resolve(obj)) {
        Some(Object::Array(fields)) => fields,
        _ => return Ok(Vec::new()),
    };
    Ok(fields.iter().filter_map(|field| field.as_reference().ok()).collect())
}
