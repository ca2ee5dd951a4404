//! Verification Pass
//!
//! Second sweep over every widget after clearing. Anything that still reads
//! as filled is forced empty based on the value it holds, not on the declared
//! field type.

use tracing::{debug, instrument, warn};

use super::field_clearer::{strip_value, write_empty, EmptyForm};
use crate::pdf_document::PdfDocument;
use crate::types::{FieldValue, Widget};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct VerificationStats {
    pub checked: usize,
    pub forced: usize,
    /// Fields still holding a value after forcing
    pub residual: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VerificationPass;

impl VerificationPass {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, doc, widgets), fields(widgets = widgets.len()))]
    pub fn run(&self, doc: &mut PdfDocument, widgets: &[Widget]) -> VerificationStats {
        let mut stats = VerificationStats::default();

        for widget in widgets {
            stats.checked += 1;
            let value = doc.field_value(widget);
            if value.is_empty() {
                continue;
            }

            let forced = match value {
                FieldValue::Text(_) => write_empty(doc, widget, EmptyForm::Text),
                FieldValue::Bool(_) => write_empty(doc, widget, EmptyForm::Off),
                FieldValue::List(_) | FieldValue::Opaque => strip_value(doc, widget),
                FieldValue::Absent => Ok(()),
            };
            match forced {
                Ok(()) => stats.forced += 1,
                Err(e) => warn!("Could not force field '{}' empty: {}", widget.name, e),
            }

            if !doc.field_value(widget).is_empty() {
                warn!("Field '{}' still reads as filled", widget.name);
                stats.residual += 1;
            }
        }

        debug!("Verification forced {} of {} fields", stats.forced, stats.checked);
        stats
    }
}
