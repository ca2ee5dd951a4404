//! Form field, annotation and attachment model

use lopdf::ObjectId;
use serde::{Deserialize, Serialize};

/// Field flag bits (PDF 32000-1, tables 226 and 230)
pub const FLAG_RADIO: i64 = 1 << 15;
pub const FLAG_PUSHBUTTON: i64 = 1 << 16;
pub const FLAG_COMBO: i64 = 1 << 17;

/// Kind of an interactive form field, decided from `/FT` and `/Ff`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldKind {
    Text,
    Checkbox,
    Radio,
    Combobox,
    Listbox,
    Signature,
    Unknown,
}

impl FieldKind {
    /// Maps an (inherited) field type name and flag word onto a kind.
    /// Push buttons carry no value and are treated as unknown.
    pub fn classify(field_type: Option<&[u8]>, flags: i64) -> Self {
        match field_type {
            Some(b"Tx") => FieldKind::Text,
            Some(b"Btn") if flags & FLAG_PUSHBUTTON != 0 => FieldKind::Unknown,
            Some(b"Btn") if flags & FLAG_RADIO != 0 => FieldKind::Radio,
            Some(b"Btn") => FieldKind::Checkbox,
            Some(b"Ch") if flags & FLAG_COMBO != 0 => FieldKind::Combobox,
            Some(b"Ch") => FieldKind::Listbox,
            Some(b"Sig") => FieldKind::Signature,
            _ => FieldKind::Unknown,
        }
    }

    /// Whether the empty representation of this kind is `false`.
    pub fn is_toggle(self) -> bool {
        matches!(self, FieldKind::Checkbox | FieldKind::Radio)
    }
}

/// Current value of a field as read back from the document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    /// No `/V` anywhere up the field hierarchy
    Absent,
    Text(String),
    Bool(bool),
    /// Multi-select choice state
    List(Vec<String>),
    /// A value that is neither text, name nor array (e.g. a signature dictionary)
    Opaque,
}

impl FieldValue {
    /// True when the value is the empty representation of some field kind.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Absent => true,
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::Bool(b) => !b,
            FieldValue::List(items) => items.is_empty(),
            FieldValue::Opaque => false,
        }
    }
}

/// A widget annotation placed on a page, tied to the field that owns its value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Widget {
    pub page_index: usize,
    /// The widget annotation object
    pub annot_id: ObjectId,
    /// The terminal field (the widget itself when field and widget are merged)
    pub field_id: ObjectId,
    pub kind: FieldKind,
    /// Fully qualified field name, dot-joined
    pub name: String,
}

/// Annotation subtypes the sanitizer distinguishes
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AnnotationKind {
    Text,
    FreeText,
    Ink,
    Stamp,
    Highlight,
    Underline,
    Squiggly,
    StrikeOut,
    Widget,
    Link,
    Other(String),
}

impl AnnotationKind {
    pub fn from_subtype(subtype: &[u8]) -> Self {
        match subtype {
            b"Text" => AnnotationKind::Text,
            b"FreeText" => AnnotationKind::FreeText,
            b"Ink" => AnnotationKind::Ink,
            b"Stamp" => AnnotationKind::Stamp,
            b"Highlight" => AnnotationKind::Highlight,
            b"Underline" => AnnotationKind::Underline,
            b"Squiggly" => AnnotationKind::Squiggly,
            b"StrikeOut" => AnnotationKind::StrikeOut,
            b"Widget" => AnnotationKind::Widget,
            b"Link" => AnnotationKind::Link,
            other => AnnotationKind::Other(String::from_utf8_lossy(other).into_owned()),
        }
    }

    /// Markup that can carry user-entered data.
    pub fn is_removable(&self) -> bool {
        matches!(
            self,
            AnnotationKind::Text
                | AnnotationKind::FreeText
                | AnnotationKind::Ink
                | AnnotationKind::Stamp
                | AnnotationKind::Highlight
                | AnnotationKind::Underline
                | AnnotationKind::Squiggly
                | AnnotationKind::StrikeOut
        )
    }
}

/// Where an annotation lives inside a page's `/Annots` array
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnnotationRef {
    Indirect(ObjectId),
    /// Direct dictionary, addressed by its position in the array
    Inline(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    pub page_index: usize,
    pub reference: AnnotationRef,
    pub kind: AnnotationKind,
}

/// One entry of the document's embedded-file name tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedFile {
    pub name: String,
}
