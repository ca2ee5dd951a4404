//! PDF Document abstraction
//!
//! Wraps a `lopdf::Document` and exposes the entities the sanitizer works on:
//! zero-based pages with their geometry, widgets, annotations and the
//! embedded-file name tree. All lookups tolerate indirect and direct objects.

use std::path::{Path, PathBuf};

use lopdf::{Dictionary, Object, ObjectId};
use tracing::debug;

use crate::error::{EmbeddedFileError, Error, Result, StructureError};
use crate::types::{
    Annotation, AnnotationKind, AnnotationRef, EmbeddedFile, FieldKind, FieldValue, Rect, Widget,
};

/// Parent chains deeper than this are treated as cyclic
pub const MAX_TREE_DEPTH: usize = 64;

/// US Letter, used when a page has no usable box
const DEFAULT_PAGE_BOX: [f64; 4] = [0.0, 0.0, 612.0, 792.0];

const PAGE_BOX_KEYS: [&[u8]; 2] = [b"CropBox", b"MediaBox"];

/// PDF Document wrapper for loading and processing
#[derive(Debug, Clone)]
pub struct PdfDocument {
    inner: lopdf::Document,
    source: Option<PathBuf>,
    /// Page object ids in page order
    pages: Vec<ObjectId>,
}

/// Location of the embedded-file name tree root
#[derive(Debug, Clone, Copy)]
enum TreeRoot {
    Object(ObjectId),
    InNamesObject(ObjectId),
    InCatalog,
}

impl PdfDocument {
    /// Load a PDF document from a file path
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let inner = lopdf::Document::load_mem(&bytes).map_err(|source| Error::OpenError {
            path: path.to_path_buf(),
            source,
        })?;
        let mut doc = Self::from_lopdf(inner);
        doc.source = Some(path.to_path_buf());
        Ok(doc)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let inner = lopdf::Document::load_mem(bytes)?;
        Ok(Self::from_lopdf(inner))
    }

    pub fn from_lopdf(inner: lopdf::Document) -> Self {
        let pages = inner.get_pages().into_values().collect();
        Self {
            inner,
            source: None,
            pages,
        }
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    pub fn inner(&self) -> &lopdf::Document {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut lopdf::Document {
        &mut self.inner
    }

    pub fn into_inner(self) -> lopdf::Document {
        self.inner
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn page_id(&self, index: usize) -> Result<ObjectId> {
        self.pages
            .get(index)
            .copied()
            .ok_or_else(|| StructureError::PageOutOfRange(index).into())
    }

    // -------------------- Object helpers --------------------

    /// Follows references until a non-reference object is reached.
    pub fn resolve<'a>(&'a self, obj: &'a Object) -> Option<&'a Object> {
        let mut current = obj;
        for _ in 0..MAX_TREE_DEPTH {
            match current {
                Object::Reference(id) => current = self.inner.get_object(*id).ok()?,
                other => return Some(other),
            }
        }
        None
    }

    pub fn dict(&self, id: ObjectId) -> Option<&Dictionary> {
        self.inner.get_object(id).ok()?.as_dict().ok()
    }

    pub fn dict_mut(&mut self, id: ObjectId) -> Option<&mut Dictionary> {
        self.inner.get_object_mut(id).ok()?.as_dict_mut().ok()
    }

    /// Resolved value of `key`, walking `/Parent` links for inheritable entries.
    pub fn inherited(&self, id: ObjectId, key: &[u8]) -> Option<&Object> {
        self.inherited_with_owner(id, key).map(|(_, obj)| obj)
    }

    /// Like [`Self::inherited`] but also reports which object carries the entry.
    pub fn inherited_with_owner(&self, id: ObjectId, key: &[u8]) -> Option<(ObjectId, &Object)> {
        let mut current = id;
        for _ in 0..MAX_TREE_DEPTH {
            let dict = self.dict(current)?;
            if let Ok(obj) = dict.get(key) {
                return self.resolve(obj).map(|resolved| (current, resolved));
            }
            current = dict.get(b"Parent").ok()?.as_reference().ok()?;
        }
        None
    }

    pub fn catalog_id(&self) -> Result<ObjectId> {
        self.inner
            .trailer
            .get(b"Root")
            .and_then(Object::as_reference)
            .map_err(|_| StructureError::MissingObject("document catalog".into()).into())
    }

    pub fn catalog(&self) -> Result<&Dictionary> {
        let id = self.catalog_id()?;
        self.dict(id)
            .ok_or_else(|| StructureError::WrongType(id, "dictionary").into())
    }

    pub fn catalog_mut(&mut self) -> Result<&mut Dictionary> {
        let id = self.catalog_id()?;
        self.dict_mut(id)
            .ok_or_else(|| StructureError::WrongType(id, "dictionary").into())
    }

    /// The interactive form dictionary, if the document has one.
    pub fn acroform_mut(&mut self) -> Option<&mut Dictionary> {
        let catalog_id = self.catalog_id().ok()?;
        let form_ref = match self.dict(catalog_id)?.get(b"AcroForm").ok()? {
            Object::Reference(id) => Some(*id),
            _ => None,
        };
        match form_ref {
            Some(id) => self.dict_mut(id),
            None => self
                .dict_mut(catalog_id)?
                .get_mut(b"AcroForm")
                .ok()?
                .as_dict_mut()
                .ok(),
        }
    }

    // -------------------- Pages --------------------

    /// Raw page box in PDF user space: CropBox, else MediaBox, else Letter.
    pub fn page_box(&self, index: usize) -> Result<[f64; 4]> {
        let page_id = self.page_id(index)?;
        let page_box = PAGE_BOX_KEYS
            .iter()
            .find_map(|key| self.inherited(page_id, key).and_then(|obj| self.rect_of(obj)))
            .unwrap_or(DEFAULT_PAGE_BOX);
        Ok(page_box)
    }

    /// Page bounding rectangle with the origin at the top-left corner.
    pub fn page_rect(&self, index: usize) -> Result<Rect> {
        let [x0, y0, x1, y1] = self.page_box(index)?;
        Ok(Rect::new(0.0, 0.0, (x1 - x0).abs(), (y1 - y0).abs()))
    }

    /// Converts a top-left-origin rectangle into PDF user space for `index`.
    pub fn to_user_space(&self, index: usize, rect: &Rect) -> Result<Rect> {
        let [x0, y0, x1, y1] = self.page_box(index)?;
        let (left, top) = (x0.min(x1), y0.max(y1));
        Ok(Rect::new(
            left + rect.x0,
            top - rect.y1,
            left + rect.x1,
            top - rect.y0,
        ))
    }

    /// Normalized `[x0 y0 x1 y1]` from a four-number array.
    pub fn rect_of(&self, obj: &Object) -> Option<[f64; 4]> {
        let items = self.resolve(obj)?.as_array().ok()?;
        if items.len() != 4 {
            return None;
        }
        let mut out = [0.0; 4];
        for (slot, item) in out.iter_mut().zip(items) {
            *slot = number(self.resolve(item)?)?;
        }
        let [a, b, c, d] = out;
        Some([a.min(c), b.min(d), a.max(c), b.max(d)])
    }

    // -------------------- Annotations and widgets --------------------

    /// The page's `/Annots` entries, resolved to the array itself.
    pub fn annotation_entries(&self, index: usize) -> Result<Vec<Object>> {
        let page_id = self.page_id(index)?;
        let page = self
            .dict(page_id)
            .ok_or(StructureError::WrongType(page_id, "page dictionary"))?;
        let Ok(annots) = page.get(b"Annots") else {
            return Ok(Vec::new());
        };
        match self.resolve(annots) {
            Some(Object::Array(items)) => Ok(items.clone()),
            Some(Object::Null) => Ok(Vec::new()),
            _ => Err(StructureError::Corrupted(format!("/Annots of page {index} is not an array")).into()),
        }
    }

    /// Mutable access to the array holding the page's annotations.
    pub fn annotation_array_mut(&mut self, index: usize) -> Result<Option<&mut Vec<Object>>> {
        let page_id = self.page_id(index)?;
        let annots_ref = match self.dict(page_id).and_then(|page| page.get(b"Annots").ok()) {
            None => return Ok(None),
            Some(Object::Reference(id)) => Some(*id),
            Some(_) => None,
        };
        let target = match annots_ref {
            Some(id) => self.inner.get_object_mut(id).ok(),
            None => self
                .dict_mut(page_id)
                .and_then(|page| page.get_mut(b"Annots").ok()),
        };
        Ok(target.and_then(|obj| obj.as_array_mut().ok()))
    }

    pub fn annotations(&self, index: usize) -> Result<Vec<Annotation>> {
        let entries = self.annotation_entries(index)?;
        let mut annotations = Vec::with_capacity(entries.len());
        for (position, entry) in entries.iter().enumerate() {
            let (reference, dict) = match entry {
                Object::Reference(id) => match self.dict(*id) {
                    Some(dict) => (AnnotationRef::Indirect(*id), dict),
                    None => {
                        debug!("Skipping unresolvable annotation {:?} on page {}", id, index);
                        continue;
                    }
                },
                Object::Dictionary(dict) => (AnnotationRef::Inline(position), dict),
                _ => continue,
            };
            let kind = dict
                .get(b"Subtype")
                .ok()
                .and_then(|obj| self.resolve(obj))
                .and_then(|obj| obj.as_name().ok())
                .map(AnnotationKind::from_subtype)
                .unwrap_or_else(|| AnnotationKind::Other(String::new()));
            annotations.push(Annotation {
                page_index: index,
                reference,
                kind,
            });
        }
        Ok(annotations)
    }

    /// Widgets on one page, in annotation order.
    pub fn widgets(&self, index: usize) -> Result<Vec<Widget>> {
        let mut widgets = Vec::new();
        for annotation in self.annotations(index)? {
            if annotation.kind != AnnotationKind::Widget {
                continue;
            }
            let AnnotationRef::Indirect(annot_id) = annotation.reference else {
                debug!("Skipping direct widget dictionary on page {}", index);
                continue;
            };
            widgets.push(self.widget(index, annot_id)?);
        }
        Ok(widgets)
    }

    /// Widgets on every page, page by page.
    pub fn all_widgets(&self) -> Result<Vec<Widget>> {
        let mut widgets = Vec::new();
        for index in 0..self.page_count() {
            widgets.extend(self.widgets(index)?);
        }
        Ok(widgets)
    }

    /// Moves widget dictionaries written directly into a page's `/Annots`
    /// into objects of their own, so every widget has an id to be cleared
    /// through. Returns how many were moved.
    pub fn promote_direct_widgets(&mut self) -> usize {
        let mut promoted = 0;
        for index in 0..self.page_count() {
            let direct: Vec<(usize, Dictionary)> = match self.annotation_array_mut(index) {
                Ok(Some(array)) => array
                    .iter()
                    .enumerate()
                    .filter_map(|(position, entry)| match entry {
                        Object::Dictionary(dict)
                            if dict.get(b"Subtype").and_then(Object::as_name).ok() == Some(&b"Widget"[..]) =>
                        {
                            Some((position, dict.clone()))
                        }
                        _ => None,
                    })
                    .collect(),
                _ => continue,
            };
            if direct.is_empty() {
                continue;
            }

            let moved: Vec<(usize, ObjectId)> = direct
                .into_iter()
                .map(|(position, dict)| (position, self.inner.add_object(dict)))
                .collect();
            if let Ok(Some(array)) = self.annotation_array_mut(index) {
                for (position, id) in moved {
                    array[position] = Object::Reference(id);
                    promoted += 1;
                }
            }
            debug!("Page {}: gave direct widgets their own objects", index);
        }
        promoted
    }

    fn widget(&self, page_index: usize, annot_id: ObjectId) -> Result<Widget> {
        let dict = self
            .dict(annot_id)
            .ok_or(StructureError::WrongType(annot_id, "widget dictionary"))?;
        let parent = dict.get(b"Parent").and_then(Object::as_reference).ok();
        let field_id = match parent {
            Some(parent_id) if !dict.has(b"T") => parent_id,
            _ => annot_id,
        };

        let field_type = self
            .inherited(annot_id, b"FT")
            .and_then(|obj| obj.as_name().ok());
        let flags = self
            .inherited(annot_id, b"Ff")
            .and_then(|obj| obj.as_i64().ok())
            .unwrap_or(0);

        Ok(Widget {
            page_index,
            annot_id,
            field_id,
            kind: FieldKind::classify(field_type, flags),
            name: self.qualified_name(field_id),
        })
    }

    /// Dot-joined partial names from the root of the field tree down.
    pub fn qualified_name(&self, field_id: ObjectId) -> String {
        let mut parts = Vec::new();
        let mut current = Some(field_id);
        for _ in 0..MAX_TREE_DEPTH {
            let Some(dict) = current.and_then(|id| self.dict(id)) else {
                break;
            };
            if let Some(Object::String(bytes, _)) = dict.get(b"T").ok().and_then(|t| self.resolve(t)) {
                parts.push(decode_text(bytes));
            }
            current = dict.get(b"Parent").and_then(Object::as_reference).ok();
        }
        parts.reverse();
        parts.join(".")
    }

    /// Current value of a widget's field, as a viewer would present it.
    pub fn field_value(&self, widget: &Widget) -> FieldValue {
        let value = match self.inherited(widget.field_id, b"V") {
            None | Some(Object::Null) => FieldValue::Absent,
            Some(Object::String(bytes, _)) => FieldValue::Text(decode_text(bytes)),
            Some(Object::Name(name)) => {
                if widget.kind.is_toggle() || widget.kind == FieldKind::Unknown {
                    FieldValue::Bool(name.as_slice() != b"Off")
                } else {
                    FieldValue::Text(String::from_utf8_lossy(name).into_owned())
                }
            }
            Some(Object::Boolean(b)) => FieldValue::Bool(*b),
            Some(Object::Array(items)) => FieldValue::List(
                items
                    .iter()
                    .filter_map(|item| match self.resolve(item)? {
                        Object::String(bytes, _) => Some(decode_text(bytes)),
                        Object::Name(name) => Some(String::from_utf8_lossy(name).into_owned()),
                        _ => None,
                    })
                    .collect(),
            ),
            Some(Object::Integer(n)) => FieldValue::Text(n.to_string()),
            Some(Object::Real(r)) => FieldValue::Text(r.to_string()),
            Some(_) => FieldValue::Opaque,
        };
        if !value.is_empty() {
            return value;
        }

        // A value-less toggle may still be drawn in its on state.
        if widget.kind.is_toggle() || widget.kind == FieldKind::Unknown {
            if let Some(Object::Name(state)) = self
                .dict(widget.annot_id)
                .and_then(|dict| dict.get(b"AS").ok())
                .and_then(|obj| self.resolve(obj))
            {
                if state.as_slice() != b"Off" {
                    return FieldValue::Bool(true);
                }
            }
        }

        // A choice field can keep its selection in /I alone.
        if matches!(widget.kind, FieldKind::Combobox | FieldKind::Listbox) {
            if let Some(Object::Array(indices)) = self.inherited(widget.field_id, b"I") {
                if !indices.is_empty() {
                    return FieldValue::List(indices.iter().map(|i| format!("{:?}", i)).collect());
                }
            }
        }
        value
    }

    // -------------------- Embedded files --------------------

    fn embedded_tree_root(&self) -> Option<TreeRoot> {
        let catalog = self.catalog().ok()?;
        match catalog.get(b"Names").ok()? {
            Object::Reference(names_id) => match self.dict(*names_id)?.get(b"EmbeddedFiles").ok()? {
                Object::Reference(id) => Some(TreeRoot::Object(*id)),
                Object::Dictionary(_) => Some(TreeRoot::InNamesObject(*names_id)),
                _ => None,
            },
            Object::Dictionary(names) => match names.get(b"EmbeddedFiles").ok()? {
                Object::Reference(id) => Some(TreeRoot::Object(*id)),
                Object::Dictionary(_) => Some(TreeRoot::InCatalog),
                _ => None,
            },
            _ => None,
        }
    }

    fn embedded_tree_root_dict(&self, root: TreeRoot) -> Option<&Dictionary> {
        match root {
            TreeRoot::Object(id) => self.dict(id),
            TreeRoot::InNamesObject(names_id) => self.dict(names_id)?.get(b"EmbeddedFiles").ok()?.as_dict().ok(),
            TreeRoot::InCatalog => self
                .catalog()
                .ok()?
                .get(b"Names")
                .ok()?
                .as_dict()
                .ok()?
                .get(b"EmbeddedFiles")
                .ok()?
                .as_dict()
                .ok(),
        }
    }

    fn embedded_tree_root_dict_mut(&mut self, root: TreeRoot) -> Option<&mut Dictionary> {
        match root {
            TreeRoot::Object(id) => self.dict_mut(id),
            TreeRoot::InNamesObject(names_id) => self
                .dict_mut(names_id)?
                .get_mut(b"EmbeddedFiles")
                .ok()?
                .as_dict_mut()
                .ok(),
            TreeRoot::InCatalog => self
                .catalog_mut()
                .ok()?
                .get_mut(b"Names")
                .ok()?
                .as_dict_mut()
                .ok()?
                .get_mut(b"EmbeddedFiles")
                .ok()?
                .as_dict_mut()
                .ok(),
        }
    }

    /// Collects `(name, holder)` pairs from a name tree node; `None` holder is the root.
    fn collect_tree_names(
        &self,
        node: &Dictionary,
        holder: Option<ObjectId>,
        depth: usize,
        out: &mut Vec<(String, Option<ObjectId>)>,
    ) {
        if depth >= MAX_TREE_DEPTH {
            return;
        }
        if let Some(Object::Array(pairs)) = node.get(b"Names").ok().and_then(|n| self.resolve(n)) {
            for key in pairs.iter().step_by(2) {
                if let Some(Object::String(bytes, _)) = self.resolve(key) {
                    out.push((decode_text(bytes), holder));
                }
            }
        }
        if let Some(Object::Array(kids)) = node.get(b"Kids").ok().and_then(|k| self.resolve(k)) {
            for kid in kids {
                if let Ok(kid_id) = kid.as_reference() {
                    if let Some(kid_dict) = self.dict(kid_id) {
                        self.collect_tree_names(kid_dict, Some(kid_id), depth + 1, out);
                    }
                }
            }
        }
    }

    fn embedded_entries(&self) -> std::result::Result<Vec<(String, Option<ObjectId>)>, EmbeddedFileError> {
        let root = self.embedded_tree_root().ok_or(EmbeddedFileError::Unsupported)?;
        let root_dict = self
            .embedded_tree_root_dict(root)
            .ok_or(EmbeddedFileError::Unsupported)?;
        let mut entries = Vec::new();
        self.collect_tree_names(root_dict, None, 0, &mut entries);
        Ok(entries)
    }

    /// Number of entries in the embedded-file name tree.
    pub fn embedded_file_count(&self) -> std::result::Result<usize, EmbeddedFileError> {
        self.embedded_entries().map(|entries| entries.len())
    }

    /// Metadata of the `index`-th embedded file, in name-tree order.
    pub fn embedded_file(&self, index: usize) -> std::result::Result<EmbeddedFile, EmbeddedFileError> {
        let entries = self.embedded_entries()?;
        let (name, _) = entries.get(index).ok_or(EmbeddedFileError::Unnamed(index))?;
        if name.is_empty() {
            return Err(EmbeddedFileError::Unnamed(index));
        }
        Ok(EmbeddedFile { name: name.clone() })
    }

    /// Removes the named entry (key and file specification) from the name tree.
    pub fn remove_embedded_file(&mut self, name: &str) -> std::result::Result<(), EmbeddedFileError> {
        let root = self.embedded_tree_root().ok_or(EmbeddedFileError::Unsupported)?;
        let holder = self
            .embedded_entries()?
            .into_iter()
            .find(|(entry, _)| entry == name)
            .map(|(_, holder)| holder)
            .ok_or_else(|| EmbeddedFileError::NotRemoved(name.to_string()))?;

        let node = match holder {
            Some(id) => self.dict_mut(id),
            None => self.embedded_tree_root_dict_mut(root),
        }
        .ok_or_else(|| EmbeddedFileError::NotRemoved(name.to_string()))?;
        let pairs = node
            .get_mut(b"Names")
            .ok()
            .and_then(|obj| obj.as_array_mut().ok())
            .ok_or_else(|| EmbeddedFileError::NotRemoved(name.to_string()))?;

        let position = pairs
            .chunks(2)
            .position(|pair| matches!(&pair[0], Object::String(bytes, _) if decode_text(bytes) == name))
            .ok_or_else(|| EmbeddedFileError::NotRemoved(name.to_string()))?;
        let start = position * 2;
        let end = (start + 2).min(pairs.len());
        pairs.drain(start..end);
        Ok(())
    }

    /// Drops the `/EmbeddedFiles` tree and the catalog's associated-files list.
    pub fn detach_embedded_file_table(&mut self) {
        let names_ref = self
            .catalog()
            .ok()
            .and_then(|catalog| catalog.get(b"Names").ok())
            .and_then(|obj| obj.as_reference().ok());
        let names = match names_ref {
            Some(id) => self.dict_mut(id),
            None => self
                .catalog_mut()
                .ok()
                .and_then(|catalog| catalog.get_mut(b"Names").ok())
                .and_then(|obj| obj.as_dict_mut().ok()),
        };
        if let Some(names) = names {
            names.remove(b"EmbeddedFiles");
        }
        if let Ok(catalog) = self.catalog_mut() {
            catalog.remove(b"AF");
        }
    }
}

/// Numeric value of an integer or real object.
pub fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(f64::from(*r)),
        _ => None,
    }
}

/// Decodes a PDF text string: UTF-16BE with BOM, otherwise byte-per-char.
pub fn decode_text(bytes: &[u8]) -> String {
    if bytes.len() >= 2 && bytes[0] == 0xFE && bytes[1] == 0xFF {
        let units: Vec<u16> = bytes[2..]
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        String::from_utf16_lossy(&units)
    } else if let Ok(text) = std::str::from_utf8(bytes) {
        text.to_string()
    } else {
        bytes.iter().map(|&b| b as char).collect()
    }
}
