//! Widget Flattener
//!
//! Flatten mode: once the fields are cleared, the current normal appearance
//! of every visible widget is drawn into its page's content, so the emptied
//! form prints as it looks without staying interactive. The widgets are
//! removed afterwards by the widget purger.

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};
use tracing::{debug, instrument, warn};

use crate::error::{FlattenError, Result};
use crate::pdf_document::PdfDocument;
use crate::redaction::Matrix;
use crate::types::Rect;

/// Annotation flags that keep a widget off the page (Hidden, NoView)
const INVISIBLE_FLAGS: i64 = (1 << 1) | (1 << 5);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FlattenStats {
    /// Appearances drawn into page content
    pub drawn: usize,
    /// Hidden widgets and widgets without a usable appearance
    pub skipped: usize,
    pub pages_failed: usize,
}

/// One appearance stream and where it lands on the page
#[derive(Debug, Clone, Copy)]
struct Placement {
    appearance: ObjectId,
    matrix: Matrix,
}

#[derive(Debug, Clone, Default)]
pub struct WidgetFlattener;

impl WidgetFlattener {
    pub fn new() -> Self {
        Self
    }

    /// Draws every page's widget appearances into that page. Widgets are
    /// left in place.
    #[instrument(skip(self, doc))]
    pub fn run(&self, doc: &mut PdfDocument) -> Result<FlattenStats> {
        let mut stats = FlattenStats::default();

        for index in 0..doc.page_count() {
            let widgets = doc.widgets(index)?;
            let mut placements = Vec::with_capacity(widgets.len());
            for widget in &widgets {
                match placement(doc, widget.annot_id) {
                    Some(placement) => placements.push(placement),
                    None => stats.skipped += 1,
                }
            }
            if placements.is_empty() {
                continue;
            }

            let count = placements.len();
            match stamp_page(doc, index, &placements) {
                Ok(()) => stats.drawn += count,
                Err(e) => {
                    warn!("{}", e);
                    stats.pages_failed += 1;
                }
            }
        }

        debug!(
            "Flattened {} widget appearances, skipped {}",
            stats.drawn, stats.skipped
        );
        Ok(stats)
    }
}

/// What to draw for one widget, or `None` when it shows nothing.
fn placement(doc: &PdfDocument, annot_id: ObjectId) -> Option<Placement> {
    let annot = doc.dict(annot_id)?;
    let flags = annot
        .get(b"F")
        .ok()
        .and_then(|obj| doc.resolve(obj))
        .and_then(|obj| obj.as_i64().ok())
        .unwrap_or(0);
    if flags & INVISIBLE_FLAGS != 0 {
        return None;
    }

    let normal = annot
        .get(b"AP")
        .ok()
        .and_then(|obj| doc.resolve(obj))
        .and_then(|obj| obj.as_dict().ok())?
        .get(b"N")
        .ok()?;
    let appearance = match normal {
        Object::Reference(id) => match doc.inner().get_object(*id).ok()? {
            Object::Stream(_) => *id,
            Object::Dictionary(states) => selected_state(annot, states)?,
            _ => return None,
        },
        Object::Dictionary(states) => selected_state(annot, states)?,
        _ => return None,
    };
    let stream = doc.inner().get_object(appearance).ok()?.as_stream().ok()?;

    let [x0, y0, x1, y1] = stream.dict.get(b"BBox").ok().and_then(|obj| doc.rect_of(obj))?;
    let form_matrix = stream
        .dict
        .get(b"Matrix")
        .ok()
        .and_then(|obj| doc.resolve(obj))
        .and_then(|obj| obj.as_array().ok())
        .and_then(|operands| Matrix::from_operands(operands))
        .unwrap_or(Matrix::IDENTITY);
    let shown = form_matrix.transform_rect(&Rect::new(x0, y0, x1, y1));

    let [x0, y0, x1, y1] = annot.get(b"Rect").ok().and_then(|obj| doc.rect_of(obj))?;
    let target = Rect::new(x0, y0, x1, y1);
    if shown.is_empty() || target.is_empty() {
        return None;
    }

    // Maps the transformed bounding box onto the annotation rectangle
    let sx = target.width() / shown.width();
    let sy = target.height() / shown.height();
    Some(Placement {
        appearance,
        matrix: Matrix::new(sx, 0.0, 0.0, sy, target.x0 - shown.x0 * sx, target.y0 - shown.y0 * sy),
    })
}

/// The appearance of a multi-state widget picked by its `/AS`.
fn selected_state(annot: &Dictionary, states: &Dictionary) -> Option<ObjectId> {
    let state = annot.get(b"AS").ok()?.as_name().ok()?;
    states.get(state).ok()?.as_reference().ok()
}

/// Appends one stream drawing `placements` to the page. The existing content
/// is wrapped in `q`/`Q` so its graphics state cannot leak into the stamp.
fn stamp_page(doc: &mut PdfDocument, index: usize, placements: &[Placement]) -> std::result::Result<(), FlattenError> {
    let page_id = doc.page_id(index).map_err(|_| FlattenError::NotAPage(index))?;
    let mut resources = doc
        .inherited(page_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default();
    let mut xobjects = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| doc.resolve(obj))
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default();

    let real = |v: f64| Object::Real(v as f32);
    let mut operations = vec![Operation::new("Q", vec![])];
    let mut counter = 0;
    for placement in placements {
        let name = loop {
            counter += 1;
            let candidate = format!("FlatW{}", counter);
            if !xobjects.has(candidate.as_bytes()) {
                break candidate.into_bytes();
            }
        };
        if let Ok(Object::Stream(stream)) = doc.inner_mut().get_object_mut(placement.appearance) {
            stream.dict.set("Type", "XObject");
            stream.dict.set("Subtype", "Form");
        }
        xobjects.set(name.clone(), Object::Reference(placement.appearance));

        let m = placement.matrix;
        operations.push(Operation::new("q", vec![]));
        operations.push(Operation::new(
            "cm",
            vec![real(m.a), real(m.b), real(m.c), real(m.d), real(m.e), real(m.f)],
        ));
        operations.push(Operation::new("Do", vec![Object::Name(name)]));
        operations.push(Operation::new("Q", vec![]));
    }

    // Readers that join content streams byte for byte need the separators
    let mut stamp = b"\n".to_vec();
    stamp.extend(
        Content { operations }
            .encode()
            .map_err(|e| FlattenError::Content {
                page: index,
                reason: e.to_string(),
            })?,
    );
    let save_id = doc.inner_mut().add_object(Stream::new(dictionary! {}, b"q\n".to_vec()));
    let stamp_id = doc.inner_mut().add_object(Stream::new(dictionary! {}, stamp));

    let mut contents = page_contents(doc, page_id);
    contents.insert(0, Object::Reference(save_id));
    contents.push(Object::Reference(stamp_id));
    resources.set("XObject", xobjects);

    let page = doc.dict_mut(page_id).ok_or(FlattenError::NotAPage(index))?;
    page.set("Contents", contents);
    page.set("Resources", resources);
    Ok(())
}

/// The page's content streams as a list of references.
fn page_contents(doc: &PdfDocument, page_id: ObjectId) -> Vec<Object> {
    match doc.dict(page_id).and_then(|page| page.get(b"Contents").ok()) {
        Some(Object::Reference(id)) => match doc.inner().get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Some(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}
