//! Widget Purger
//!
//! Purge mode: form widgets are deleted outright instead of being emptied,
//! and the interactive form is replaced by an empty one. Widgets that cannot
//! be detached from their page are cleared in place.

use std::collections::HashSet;

use lopdf::{dictionary, Object, ObjectId};
use tracing::{debug, instrument, warn};

use super::field_clearer::{ClearStats, FieldClearer};
use crate::error::Result;
use crate::pdf_document::PdfDocument;
use crate::types::Widget;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WidgetPurgeStats {
    pub removed: usize,
    /// Widgets cleared in place because their page list could not be edited
    pub cleared_instead: ClearStats,
}

#[derive(Debug, Clone, Default)]
pub struct WidgetPurger;

impl WidgetPurger {
    pub fn new() -> Self {
        Self
    }

    /// Removes every widget and installs an empty form dictionary.
    #[instrument(skip(self, doc))]
    pub fn run(&self, doc: &mut PdfDocument) -> Result<WidgetPurgeStats> {
        let mut stats = WidgetPurgeStats::default();
        let mut stranded: Vec<Widget> = Vec::new();

        for index in 0..doc.page_count() {
            let widgets = doc.widgets(index)?;
            if widgets.is_empty() {
                continue;
            }
            let ids: HashSet<ObjectId> = widgets.iter().map(|w| w.annot_id).collect();

            let detached = match doc.annotation_array_mut(index)? {
                Some(array) => {
                    let before = array.len();
                    array.retain(|entry| !matches!(entry, Object::Reference(id) if ids.contains(id)));
                    before - array.len()
                }
                None => 0,
            };
            if detached < widgets.len() {
                warn!(
                    "Page {}: {} widgets could not be detached, clearing them instead",
                    index,
                    widgets.len() - detached
                );
                stranded.extend(widgets);
                continue;
            }

            for widget in &widgets {
                doc.inner_mut().objects.remove(&widget.annot_id);
            }
            stats.removed += detached;
        }

        if !stranded.is_empty() {
            stats.cleared_instead = FieldClearer::new().clear_all(doc, &stranded);
        }

        install_empty_form(doc)?;
        debug!("Purged {} widgets", stats.removed);
        Ok(stats)
    }
}

/// Replaces the catalog's `/AcroForm` with an empty form dictionary.
pub(crate) fn install_empty_form(doc: &mut PdfDocument) -> Result<()> {
    let catalog = doc.catalog_mut()?;
    catalog.set(
        "AcroForm",
        dictionary! {
            "Fields" => Vec::<Object>::new(),
        },
    );
    Ok(())
}
