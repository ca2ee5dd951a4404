//! Content-stream filter
//!
//! Interprets a decoded content stream just far enough to know where text and
//! images land in user space, and drops whatever intersects a redaction zone.
//! Text is removed glyph by glyph: each removed run is replaced by a `TJ`
//! displacement of the same width, so text that follows keeps its position.
//! Form XObjects that partially overlap a zone are rewritten into new streams.

use std::collections::HashMap;

use lopdf::content::{Content, Operation};
use lopdf::{Dictionary, Object, Stream, StringFormat};
use tracing::{debug, warn};

use crate::pdf_document::{number, PdfDocument};
use crate::types::Rect;

/// Nesting limit for form XObjects drawn from form XObjects
pub const MAX_FORM_DEPTH: usize = 8;

/// Width assumed for glyphs of fonts without metrics, in thousandths of an em
const FALLBACK_GLYPH_WIDTH: f64 = 600.0;

/// Glyphs narrower than this still occupy a hit-testable box
const MIN_GLYPH_WIDTH: f64 = 0.01;

/// Portion of the em box below the baseline
const DESCENT: f64 = 0.25;

/// Highest code a two-byte string can carry
const MAX_CID: u32 = 0xFFFF;

/// Affine transform `[a b c d e f]` in PDF row-vector convention
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Matrix {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    pub fn new(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self { a, b, c, d, e, f }
    }

    pub fn translate(tx: f64, ty: f64) -> Self {
        Self::new(1.0, 0.0, 0.0, 1.0, tx, ty)
    }

    /// Six numeric operands, as taken by `cm` and `Tm`.
    pub fn from_operands(operands: &[Object]) -> Option<Self> {
        if operands.len() != 6 {
            return None;
        }
        let mut v = [0.0; 6];
        for (slot, operand) in v.iter_mut().zip(operands) {
            *slot = number(operand)?;
        }
        Some(Self::new(v[0], v[1], v[2], v[3], v[4], v[5]))
    }

    /// `self` applied first, then `other`.
    pub fn then(self, other: Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    pub fn apply(self, x: f64, y: f64) -> (f64, f64) {
        (x * self.a + y * self.c + self.e, x * self.b + y * self.d + self.f)
    }

    /// Bounding box of the transformed rectangle.
    pub fn transform_rect(self, rect: &Rect) -> Rect {
        let corners = [
            self.apply(rect.x0, rect.y0),
            self.apply(rect.x1, rect.y0),
            self.apply(rect.x0, rect.y1),
            self.apply(rect.x1, rect.y1),
        ];
        let (mut x0, mut y0) = corners[0];
        let (mut x1, mut y1) = corners[0];
        for (x, y) in &corners[1..] {
            x0 = x0.min(*x);
            y0 = y0.min(*y);
            x1 = x1.max(*x);
            y1 = y1.max(*y);
        }
        Rect::new(x0, y0, x1, y1)
    }
}

/// Text state parameters that live in the graphics state
#[derive(Debug, Clone)]
struct TextParams {
    font: Option<Vec<u8>>,
    size: f64,
    char_spacing: f64,
    word_spacing: f64,
    /// `Tz / 100`
    scale: f64,
    leading: f64,
    rise: f64,
}

impl Default for TextParams {
    fn default() -> Self {
        Self {
            font: None,
            size: 0.0,
            char_spacing: 0.0,
            word_spacing: 0.0,
            scale: 1.0,
            leading: 0.0,
            rise: 0.0,
        }
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    ctm: Matrix,
    text: TextParams,
}

/// Glyph advance widths of one font resource
#[derive(Debug, Clone)]
struct FontMetrics {
    widths: HashMap<u32, f64>,
    /// `c_first c_last w` runs of a CIDFont `/W` array, inclusive
    ranges: Vec<(u32, u32, f64)>,
    default_width: f64,
    /// Composite fonts use two-byte codes
    two_byte: bool,
    /// Multiplier taking widths to thousandths of text space (Type3)
    scale: f64,
}

impl FontMetrics {
    fn fallback() -> Self {
        Self {
            widths: HashMap::new(),
            ranges: Vec::new(),
            default_width: FALLBACK_GLYPH_WIDTH,
            two_byte: false,
            scale: 1.0,
        }
    }

    fn load(doc: &PdfDocument, font: &Dictionary) -> Self {
        let name_of = |key: &[u8]| {
            font.get(key)
                .ok()
                .and_then(|obj| doc.resolve(obj))
                .and_then(|obj| obj.as_name().ok())
                .map(<[u8]>::to_vec)
        };
        let num_of = |dict: &Dictionary, key: &[u8]| {
            dict.get(key).ok().and_then(|obj| doc.resolve(obj)).and_then(number)
        };

        let mut metrics = Self::fallback();
        if name_of(b"Subtype").as_deref() == Some(&b"Type0"[..]) {
            metrics.two_byte = true;
            metrics.default_width = 1000.0;
            let descendant = font
                .get(b"DescendantFonts")
                .ok()
                .and_then(|obj| doc.resolve(obj))
                .and_then(|obj| obj.as_array().ok())
                .and_then(|fonts| fonts.first())
                .and_then(|obj| doc.resolve(obj))
                .and_then(|obj| obj.as_dict().ok());
            if let Some(cid_font) = descendant {
                if let Some(dw) = num_of(cid_font, b"DW") {
                    metrics.default_width = dw;
                }
                if let Some(Object::Array(w)) = cid_font.get(b"W").ok().and_then(|obj| doc.resolve(obj)) {
                    (metrics.widths, metrics.ranges) = cid_widths(doc, w);
                }
            }
            return metrics;
        }

        if name_of(b"Subtype").as_deref() == Some(&b"Type3"[..]) {
            if let Some(Object::Array(m)) = font.get(b"FontMatrix").ok().and_then(|obj| doc.resolve(obj)) {
                if let Some(a) = m.first().and_then(number) {
                    metrics.scale = a * 1000.0;
                }
            }
        }

        if let Some(missing) = font
            .get(b"FontDescriptor")
            .ok()
            .and_then(|obj| doc.resolve(obj))
            .and_then(|obj| obj.as_dict().ok())
            .and_then(|descriptor| num_of(descriptor, b"MissingWidth"))
        {
            metrics.default_width = missing;
        }

        let first_char = num_of(font, b"FirstChar").unwrap_or(0.0) as u32;
        if let Some(Object::Array(widths)) = font.get(b"Widths").ok().and_then(|obj| doc.resolve(obj)) {
            for (offset, width) in widths.iter().enumerate() {
                if let Some(width) = doc.resolve(width).and_then(number) {
                    metrics.widths.insert(first_char + offset as u32, width);
                }
            }
        }
        metrics
    }

    /// Advance of one glyph code, in thousandths of an em.
    fn width(&self, code: u32) -> f64 {
        self.widths
            .get(&code)
            .copied()
            .or_else(|| {
                self.ranges
                    .iter()
                    .find(|(first, last, _)| (*first..=*last).contains(&code))
                    .map(|(_, _, width)| *width)
            })
            .unwrap_or(self.default_width)
            * self.scale
    }
}

/// Parses a CIDFont `/W` array: `c [w1 w2 ...]` and `c_first c_last w` forms.
/// Codes above [`MAX_CID`] and reversed runs are ignored.
fn cid_widths(doc: &PdfDocument, w: &[Object]) -> (HashMap<u32, f64>, Vec<(u32, u32, f64)>) {
    let mut widths = HashMap::new();
    let mut ranges = Vec::new();
    let mut i = 0;
    while i < w.len() {
        let Some(first) = number(&w[i]) else { break };
        let first = first as u32;
        match w.get(i + 1).and_then(|obj| doc.resolve(obj)) {
            Some(Object::Array(list)) => {
                for (offset, width) in list.iter().enumerate() {
                    let Some(code) = first.checked_add(offset as u32).filter(|code| *code <= MAX_CID) else {
                        break;
                    };
                    if let Some(width) = number(width) {
                        widths.insert(code, width);
                    }
                }
                i += 2;
            }
            Some(last) => {
                let (Some(last), Some(width)) = (number(last), w.get(i + 2).and_then(number)) else {
                    break;
                };
                let last = (last as u32).min(MAX_CID);
                if first <= last {
                    ranges.push((first, last, width));
                } else {
                    debug!("Ignoring /W run {}..{}", first, last);
                }
                i += 3;
            }
            None => break,
        }
    }
    (widths, ranges)
}

/// What a content filter removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterStats {
    pub glyphs_removed: usize,
    pub images_removed: usize,
    pub forms_removed: usize,
    pub forms_rewritten: usize,
}

impl FilterStats {
    fn total(&self) -> usize {
        self.glyphs_removed + self.images_removed + self.forms_removed + self.forms_rewritten
    }
}

enum XObject {
    Image,
    Form(Stream),
    Other,
}

/// Removes content intersecting a set of user-space zones
#[derive(Debug, Clone, Copy)]
pub struct ContentFilter<'z> {
    zones: &'z [Rect],
}

impl<'z> ContentFilter<'z> {
    pub fn new(zones: &'z [Rect]) -> Self {
        Self { zones }
    }

    fn hits(&self, rect: &Rect) -> bool {
        self.zones.iter().any(|zone| zone.intersects(rect))
    }

    fn covers(&self, rect: &Rect) -> bool {
        self.zones.iter().any(|zone| zone.contains(rect))
    }

    /// Filters one content stream drawn with `base` as its initial CTM.
    ///
    /// `resources` is an owned copy of the stream's resource dictionary; it
    /// is updated in place when a form XObject is replaced by a rewritten copy.
    pub fn filter(
        &self,
        doc: &mut PdfDocument,
        operations: Vec<Operation>,
        resources: &mut Dictionary,
        base: Matrix,
        depth: usize,
        stats: &mut FilterStats,
    ) -> Vec<Operation> {
        let mut state = GraphicsState {
            ctm: base,
            text: TextParams::default(),
        };
        let mut saved: Vec<GraphicsState> = Vec::new();
        let mut tm = Matrix::IDENTITY;
        let mut tlm = Matrix::IDENTITY;
        let mut fonts: HashMap<Vec<u8>, FontMetrics> = HashMap::new();
        let mut out = Vec::with_capacity(operations.len());

        for op in operations {
            let operands = &op.operands;
            match op.operator.as_str() {
                "q" => saved.push(state.clone()),
                "Q" => {
                    if let Some(previous) = saved.pop() {
                        state = previous;
                    }
                }
                "cm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        state.ctm = m.then(state.ctm);
                    }
                }
                "BT" => {
                    tm = Matrix::IDENTITY;
                    tlm = Matrix::IDENTITY;
                }
                "Tf" => {
                    state.text.font = operands.first().and_then(|o| o.as_name().ok()).map(<[u8]>::to_vec);
                    state.text.size = operands.get(1).and_then(number).unwrap_or(0.0);
                }
                "Tc" => state.text.char_spacing = first_number(operands).unwrap_or(0.0),
                "Tw" => state.text.word_spacing = first_number(operands).unwrap_or(0.0),
                "Tz" => state.text.scale = first_number(operands).unwrap_or(100.0) / 100.0,
                "TL" => state.text.leading = first_number(operands).unwrap_or(0.0),
                "Ts" => state.text.rise = first_number(operands).unwrap_or(0.0),
                "Td" | "TD" => {
                    let tx = operands.first().and_then(number).unwrap_or(0.0);
                    let ty = operands.get(1).and_then(number).unwrap_or(0.0);
                    if op.operator == "TD" {
                        state.text.leading = -ty;
                    }
                    tlm = Matrix::translate(tx, ty).then(tlm);
                    tm = tlm;
                }
                "Tm" => {
                    if let Some(m) = Matrix::from_operands(operands) {
                        tlm = m;
                        tm = m;
                    }
                }
                "T*" => {
                    tlm = Matrix::translate(0.0, -state.text.leading).then(tlm);
                    tm = tlm;
                }
                "Tj" | "TJ" | "'" | "\"" => {
                    if op.operator == "\"" {
                        state.text.word_spacing = operands.first().and_then(number).unwrap_or(0.0);
                        state.text.char_spacing = operands.get(1).and_then(number).unwrap_or(0.0);
                    }
                    if op.operator == "'" || op.operator == "\"" {
                        tlm = Matrix::translate(0.0, -state.text.leading).then(tlm);
                        tm = tlm;
                    }

                    let elements: Vec<Object> = match (op.operator.as_str(), operands.last()) {
                        ("TJ", Some(Object::Array(items))) => items.clone(),
                        (_, Some(text @ Object::String(..))) => vec![text.clone()],
                        _ => {
                            out.push(op);
                            continue;
                        }
                    };
                    let metrics = self.font_metrics(doc, resources, &state.text, &mut fonts);
                    match self.show(&elements, &state, &metrics, &mut tm, stats) {
                        None => out.push(op),
                        Some(kept) => {
                            if op.operator == "\"" {
                                let (aw, ac) = (state.text.word_spacing, state.text.char_spacing);
                                out.push(Operation::new("Tw", vec![Object::Real(aw as f32)]));
                                out.push(Operation::new("Tc", vec![Object::Real(ac as f32)]));
                            }
                            if op.operator == "'" || op.operator == "\"" {
                                out.push(Operation::new("T*", vec![]));
                            }
                            out.push(Operation::new("TJ", vec![Object::Array(kept)]));
                        }
                    }
                    continue;
                }
                "Do" => {
                    let Some(name) = operands.first().and_then(|o| o.as_name().ok()).map(<[u8]>::to_vec) else {
                        out.push(op);
                        continue;
                    };
                    if !self.keep_xobject(doc, &name, resources, state.ctm, depth, stats) {
                        continue;
                    }
                }
                "BI" => {
                    let placement = state.ctm.transform_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
                    if self.hits(&placement) {
                        stats.images_removed += 1;
                        continue;
                    }
                }
                _ => {}
            }
            out.push(op);
        }
        out
    }

    fn font_metrics(
        &self,
        doc: &PdfDocument,
        resources: &Dictionary,
        text: &TextParams,
        cache: &mut HashMap<Vec<u8>, FontMetrics>,
    ) -> FontMetrics {
        let Some(name) = &text.font else {
            return FontMetrics::fallback();
        };
        if let Some(metrics) = cache.get(name) {
            return metrics.clone();
        }
        let metrics = resources
            .get(b"Font")
            .ok()
            .and_then(|obj| doc.resolve(obj))
            .and_then(|obj| obj.as_dict().ok())
            .and_then(|fonts| fonts.get(name).ok())
            .and_then(|obj| doc.resolve(obj))
            .and_then(|obj| obj.as_dict().ok())
            .map(|font| FontMetrics::load(doc, font))
            .unwrap_or_else(FontMetrics::fallback);
        cache.insert(name.clone(), metrics.clone());
        metrics
    }

    /// Walks one show operation glyph by glyph, advancing `tm`. Returns the
    /// replacement `TJ` array when any glyph fell inside a zone.
    fn show(
        &self,
        elements: &[Object],
        state: &GraphicsState,
        metrics: &FontMetrics,
        tm: &mut Matrix,
        stats: &mut FilterStats,
    ) -> Option<Vec<Object>> {
        let text = &state.text;
        let em = if text.size == 0.0 { 1.0 } else { text.size };
        let (bottom, top) = (text.rise - DESCENT * em, text.rise + em);
        let unit = text.size * text.scale;
        let step = if metrics.two_byte { 2 } else { 1 };

        let mut kept: Vec<Object> = Vec::new();
        let mut segment: Vec<u8> = Vec::new();
        let mut format = StringFormat::Literal;
        let mut pending = 0.0;
        let mut removed_any = false;

        for element in elements {
            match element {
                Object::String(bytes, string_format) => {
                    for code_bytes in bytes.chunks(step) {
                        let code = code_bytes.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b));
                        let mut advance = metrics.width(code) / 1000.0 * text.size + text.char_spacing;
                        if step == 1 && code == 32 {
                            advance += text.word_spacing;
                        }
                        advance *= text.scale;

                        let width = if advance.abs() < MIN_GLYPH_WIDTH { MIN_GLYPH_WIDTH } else { advance };
                        let glyph = tm.then(state.ctm).transform_rect(&Rect::new(0.0, bottom, width, top));
                        if self.hits(&glyph) {
                            removed_any = true;
                            stats.glyphs_removed += 1;
                            if unit != 0.0 {
                                pending -= advance * 1000.0 / unit;
                            }
                        } else {
                            if pending != 0.0 {
                                flush(&mut kept, &mut segment, format.clone());
                                kept.push(Object::Real(pending as f32));
                                pending = 0.0;
                            }
                            segment.extend_from_slice(code_bytes);
                            format = string_format.clone();
                        }
                        *tm = Matrix::translate(advance, 0.0).then(*tm);
                    }
                    flush(&mut kept, &mut segment, format.clone());
                }
                other => {
                    if let Some(adjust) = number(other) {
                        pending += adjust;
                        *tm = Matrix::translate(-adjust / 1000.0 * unit, 0.0).then(*tm);
                    }
                }
            }
        }

        if !removed_any {
            return None;
        }
        flush(&mut kept, &mut segment, format);
        if pending != 0.0 {
            kept.push(Object::Real(pending as f32));
        }
        Some(kept)
    }

    /// Decides whether a `Do` survives. Overlapping forms may be rewritten,
    /// in which case `resources` is repointed at the copy.
    fn keep_xobject(
        &self,
        doc: &mut PdfDocument,
        name: &[u8],
        resources: &mut Dictionary,
        ctm: Matrix,
        depth: usize,
        stats: &mut FilterStats,
    ) -> bool {
        let form = match lookup_xobject(doc, resources, name) {
            XObject::Image => {
                let placement = ctm.transform_rect(&Rect::new(0.0, 0.0, 1.0, 1.0));
                if self.hits(&placement) {
                    debug!("Removing image /{}", String::from_utf8_lossy(name));
                    stats.images_removed += 1;
                    return false;
                }
                return true;
            }
            XObject::Form(stream) => stream,
            XObject::Other => return true,
        };

        let form_matrix = form
            .dict
            .get(b"Matrix")
            .ok()
            .and_then(|obj| doc.resolve(obj))
            .and_then(|obj| obj.as_array().ok())
            .and_then(|m| Matrix::from_operands(m))
            .unwrap_or(Matrix::IDENTITY);
        let form_ctm = form_matrix.then(ctm);
        let bbox = form
            .dict
            .get(b"BBox")
            .ok()
            .and_then(|obj| doc.rect_of(obj))
            .map(|[x0, y0, x1, y1]| form_ctm.transform_rect(&Rect::new(x0, y0, x1, y1)));

        if let Some(bbox) = bbox {
            if !self.hits(&bbox) {
                return true;
            }
            if self.covers(&bbox) {
                stats.forms_removed += 1;
                return false;
            }
        }
        if depth >= MAX_FORM_DEPTH {
            warn!("Form XObject nesting too deep, removing /{}", String::from_utf8_lossy(name));
            stats.forms_removed += 1;
            return false;
        }

        let content = form.decompressed_content().unwrap_or_else(|_| form.content.clone());
        let operations = match Content::decode(&content) {
            Ok(content) => content.operations,
            Err(e) => {
                warn!("Unreadable form XObject /{} ({}), removing it", String::from_utf8_lossy(name), e);
                stats.forms_removed += 1;
                return false;
            }
        };

        let mut form_resources = form
            .dict
            .get(b"Resources")
            .ok()
            .and_then(|obj| doc.resolve(obj))
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_else(|| resources.clone());

        let before = stats.total();
        let filtered = self.filter(doc, operations, &mut form_resources, form_ctm, depth + 1, stats);
        if stats.total() == before {
            return true;
        }

        let encoded = match (Content { operations: filtered }).encode() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot re-encode form XObject /{} ({}), removing it", String::from_utf8_lossy(name), e);
                stats.forms_removed += 1;
                return false;
            }
        };
        let mut dict = form.dict.clone();
        dict.remove(b"Filter");
        dict.remove(b"DecodeParms");
        dict.set("Resources", form_resources);
        let copy_id = doc.inner_mut().add_object(Stream::new(dict, encoded));

        let mut xobjects = resources
            .get(b"XObject")
            .ok()
            .and_then(|obj| doc.resolve(obj))
            .and_then(|obj| obj.as_dict().ok())
            .cloned()
            .unwrap_or_default();
        xobjects.set(name.to_vec(), Object::Reference(copy_id));
        resources.set("XObject", xobjects);
        stats.forms_rewritten += 1;
        true
    }
}

fn first_number(operands: &[Object]) -> Option<f64> {
    operands.first().and_then(number)
}

fn flush(kept: &mut Vec<Object>, segment: &mut Vec<u8>, format: StringFormat) {
    if !segment.is_empty() {
        kept.push(Object::String(std::mem::take(segment), format));
    }
}

fn lookup_xobject(doc: &PdfDocument, resources: &Dictionary, name: &[u8]) -> XObject {
    let stream = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| doc.resolve(obj))
        .and_then(|obj| obj.as_dict().ok())
        .and_then(|xobjects| xobjects.get(name).ok())
        .and_then(|obj| doc.resolve(obj))
        .and_then(|obj| obj.as_stream().ok());
    let Some(stream) = stream else {
        return XObject::Other;
    };
    match stream.dict.get(b"Subtype").and_then(Object::as_name) {
        Ok(b"Image") => XObject::Image,
        Ok(b"Form") => XObject::Form(stream.clone()),
        _ => XObject::Other,
    }
}
