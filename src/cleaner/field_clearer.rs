//! Field Clearer
//!
//! Drives one widget's field to the empty value of its kind, confirms the
//! write by reading the value back, and retries once. Fields whose kind cannot
//! be determined get the text form first and the toggle form second. A field
//! that still refuses to clear is structurally reset.

use lopdf::{Object, ObjectId, StringFormat};
use tracing::{debug, instrument, warn};

use crate::error::FieldError;
use crate::pdf_document::PdfDocument;
use crate::types::{FieldKind, Widget};

/// The two empty representations a field can be driven to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyForm {
    /// Empty string (text, choice, signature)
    Text,
    /// `/Off` (checkbox, radio)
    Off,
}

/// What happened to a single field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    AlreadyEmpty,
    Cleared,
    /// The first write did not stick; the second did
    ClearedOnRetry,
}

/// Counters for one clearing pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClearStats {
    pub seen: usize,
    pub cleared: usize,
    pub already_empty: usize,
    pub retried: usize,
    pub failed: usize,
    pub reset: usize,
}

#[derive(Debug, Clone, Default)]
pub struct FieldClearer;

impl FieldClearer {
    pub fn new() -> Self {
        Self
    }

    /// Clears every widget, absorbing per-field failures into the counters.
    #[instrument(skip(self, doc, widgets), fields(widgets = widgets.len()))]
    pub fn clear_all(&self, doc: &mut PdfDocument, widgets: &[Widget]) -> ClearStats {
        let mut stats = ClearStats {
            seen: widgets.len(),
            ..ClearStats::default()
        };

        for widget in widgets {
            match self.clear(doc, widget) {
                Ok(ClearOutcome::AlreadyEmpty) => stats.already_empty += 1,
                Ok(ClearOutcome::Cleared) => stats.cleared += 1,
                Ok(ClearOutcome::ClearedOnRetry) => {
                    stats.cleared += 1;
                    stats.retried += 1;
                }
                Err(e) => {
                    warn!("Failed to clear field '{}' ({:?}): {}", widget.name, widget.field_id, e);
                    stats.failed += 1;
                    match reset_field(doc, widget) {
                        Ok(()) => stats.reset += 1,
                        Err(reset_err) => warn!(
                            "Structural reset of '{}' failed: {}",
                            widget.name, reset_err
                        ),
                    }
                }
            }
        }

        debug!(
            "Cleared {} of {} fields ({} already empty, {} failed, {} reset)",
            stats.cleared, stats.seen, stats.already_empty, stats.failed, stats.reset
        );
        stats
    }

    /// Clears one widget's field according to its kind. An empty field still
    /// has this widget's appearance brought in line, since a sibling widget
    /// may have emptied the shared value first.
    pub fn clear(&self, doc: &mut PdfDocument, widget: &Widget) -> Result<ClearOutcome, FieldError> {
        if doc.field_value(widget).is_empty() {
            scrub_appearance(doc, widget)?;
            return Ok(ClearOutcome::AlreadyEmpty);
        }

        let forms: &[EmptyForm] = match widget.kind {
            FieldKind::Text | FieldKind::Combobox | FieldKind::Listbox | FieldKind::Signature => {
                &[EmptyForm::Text]
            }
            FieldKind::Checkbox | FieldKind::Radio => &[EmptyForm::Off],
            FieldKind::Unknown => &[EmptyForm::Text, EmptyForm::Off],
        };

        for attempt in 0..2 {
            for form in forms {
                write_empty(doc, widget, *form)?;
                if doc.field_value(widget).is_empty() {
                    return Ok(if attempt == 0 {
                        ClearOutcome::Cleared
                    } else {
                        ClearOutcome::ClearedOnRetry
                    });
                }
            }
        }
        Err(FieldError::StillFilled(widget.field_id))
    }
}

/// The object that carries the widget's `/V`, or the field itself.
fn value_holder(doc: &PdfDocument, widget: &Widget) -> ObjectId {
    doc.inherited_with_owner(widget.field_id, b"V")
        .map(|(owner, _)| owner)
        .unwrap_or(widget.field_id)
}

/// Writes one empty representation into the field and its widget.
pub(crate) fn write_empty(doc: &mut PdfDocument, widget: &Widget, form: EmptyForm) -> Result<(), FieldError> {
    let holder = value_holder(doc, widget);
    let signature = widget.kind == FieldKind::Signature;
    {
        let field = doc
            .dict_mut(holder)
            .ok_or(FieldError::NotADictionary(holder))?;
        match form {
            // A signature value must be a dictionary, so it is dropped instead.
            EmptyForm::Text if signature => {
                field.remove(b"V");
            }
            EmptyForm::Text => field.set("V", Object::String(Vec::new(), StringFormat::Literal)),
            EmptyForm::Off => field.set("V", Object::Name(b"Off".to_vec())),
        }
        field.remove(b"RV");
        field.remove(b"I");
    }
    if holder != widget.field_id {
        if let Some(field) = doc.dict_mut(widget.field_id) {
            field.remove(b"I");
        }
    }

    let annot = doc
        .dict_mut(widget.annot_id)
        .ok_or(FieldError::Missing(widget.annot_id))?;
    match form {
        // The stored appearance still renders the old text.
        EmptyForm::Text => {
            annot.remove(b"AP");
            if annot.has(b"AS") {
                annot.set("AS", Object::Name(b"Off".to_vec()));
            }
        }
        EmptyForm::Off => annot.set("AS", Object::Name(b"Off".to_vec())),
    }
    Ok(())
}

/// Drops a widget's rendered value: text-like widgets lose their appearance
/// streams, toggles are switched to their off state. Push buttons and other
/// unknown widgets keep their appearance.
pub(crate) fn scrub_appearance(doc: &mut PdfDocument, widget: &Widget) -> Result<(), FieldError> {
    let annot = doc
        .dict_mut(widget.annot_id)
        .ok_or(FieldError::Missing(widget.annot_id))?;
    match widget.kind {
        FieldKind::Text | FieldKind::Combobox | FieldKind::Listbox | FieldKind::Signature => {
            annot.remove(b"AP");
        }
        FieldKind::Checkbox | FieldKind::Radio | FieldKind::Unknown => {}
    }
    if widget.kind != FieldKind::Unknown && annot.has(b"AS") {
        annot.set("AS", Object::Name(b"Off".to_vec()));
    }
    Ok(())
}

/// Empties a multi-select or opaque value regardless of the declared kind.
pub(crate) fn strip_value(doc: &mut PdfDocument, widget: &Widget) -> Result<(), FieldError> {
    let holder = value_holder(doc, widget);
    let field = doc
        .dict_mut(holder)
        .ok_or(FieldError::NotADictionary(holder))?;
    field.remove(b"V");
    field.remove(b"RV");
    field.remove(b"I");
    Ok(())
}

const VALUE_KEYS: [&[u8]; 3] = [b"V", b"RV", b"I"];

/// Last resort: drop every value-bearing entry of the field and its widget.
pub(crate) fn reset_field(doc: &mut PdfDocument, widget: &Widget) -> Result<(), FieldError> {
    let holder = value_holder(doc, widget);
    for id in [holder, widget.field_id] {
        let field = doc.dict_mut(id).ok_or(FieldError::Missing(id))?;
        for key in VALUE_KEYS {
            field.remove(key);
        }
    }

    let has_off_state = doc
        .dict(widget.annot_id)
        .and_then(|annot| annot.get(b"AP").ok())
        .and_then(|ap| doc.resolve(ap))
        .and_then(|ap| ap.as_dict().ok())
        .and_then(|ap| ap.get(b"N").ok())
        .and_then(|n| doc.resolve(n))
        .and_then(|n| n.as_dict().ok())
        .is_some_and(|states| states.has(b"Off"));

    let annot = doc
        .dict_mut(widget.annot_id)
        .ok_or(FieldError::Missing(widget.annot_id))?;
    if has_off_state {
        annot.set("AS", Object::Name(b"Off".to_vec()));
    } else {
        annot.remove(b"AS");
        annot.remove(b"AP");
    }
    Ok(())
}
