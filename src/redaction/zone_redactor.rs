//! Zone Redactor
//!
//! True redaction of caller-specified page areas. Every rectangle of a page
//! is clipped to the page first; the surviving ones are applied together in
//! one rewrite of the page's content: text and images underneath are removed
//! from the stream and the area is painted white.

use std::collections::HashSet;

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Object, ObjectId, Stream};
use tracing::{debug, info, instrument, warn};

use super::content_filter::{ContentFilter, FilterStats, Matrix};
use super::zones::ZoneMap;
use crate::error::RedactionError;
use crate::pdf_document::PdfDocument;
use crate::types::{Rect, RedactionZone};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedactionStats {
    /// Rectangles that were applied
    pub applied: usize,
    /// Rectangles dropped: page out of range, or nothing left after clipping
    pub skipped: usize,
    /// Pages whose content could not be rewritten
    pub pages_failed: usize,
    pub content: FilterStats,
}

/// Outcome of redacting one page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageRedaction {
    pub applied: usize,
    pub skipped: usize,
    pub content: FilterStats,
}

#[derive(Debug, Clone, Default)]
pub struct ZoneRedactor;

impl ZoneRedactor {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, doc, zones), fields(zones = zones.len()))]
    pub fn apply(&self, doc: &mut PdfDocument, zones: &ZoneMap) -> RedactionStats {
        let mut stats = RedactionStats::default();

        for (page_index, rects) in zones.pages() {
            match self.redact_page(doc, page_index, rects) {
                Ok(page) => {
                    stats.applied += page.applied;
                    stats.skipped += page.skipped;
                    stats.content.glyphs_removed += page.content.glyphs_removed;
                    stats.content.images_removed += page.content.images_removed;
                    stats.content.forms_removed += page.content.forms_removed;
                    stats.content.forms_rewritten += page.content.forms_rewritten;
                }
                Err(RedactionError::PageOutOfRange(index)) => {
                    warn!("Skipping {} zones for page {}: no such page", rects.len(), index);
                    stats.skipped += rects.len();
                }
                Err(e) => {
                    warn!("{}", e);
                    stats.pages_failed += 1;
                    stats.skipped += rects.len();
                }
            }
        }

        info!(
            "Redaction: {} zones applied, {} skipped, {} glyphs and {} images removed",
            stats.applied, stats.skipped, stats.content.glyphs_removed, stats.content.images_removed
        );
        stats
    }

    /// Redacts one page. `rects` use the top-left-origin page coordinates of
    /// the zone file and are clipped here.
    pub fn redact_page(
        &self,
        doc: &mut PdfDocument,
        page_index: usize,
        rects: &[Rect],
    ) -> Result<PageRedaction, RedactionError> {
        let page_rect = doc
            .page_rect(page_index)
            .map_err(|_| RedactionError::PageOutOfRange(page_index))?;

        let mut marked = Vec::with_capacity(rects.len());
        for rect in rects {
            match RedactionZone::new(page_index, *rect).clip_to(&page_rect) {
                Some(clipped) => marked.push(clipped),
                None => debug!("Zone {:?} on page {} is empty after clipping", rect, page_index),
            }
        }
        let mut outcome = PageRedaction {
            skipped: rects.len() - marked.len(),
            ..PageRedaction::default()
        };
        if marked.is_empty() {
            return Ok(outcome);
        }

        let content_error = |reason: String| RedactionError::Content {
            page: page_index,
            reason,
        };
        let user_zones = marked
            .iter()
            .map(|rect| doc.to_user_space(page_index, rect))
            .collect::<crate::error::Result<Vec<Rect>>>()
            .map_err(|e| content_error(e.to_string()))?;

        let page_id = doc
            .page_id(page_index)
            .map_err(|_| RedactionError::PageOutOfRange(page_index))?;
        let raw = doc
            .inner()
            .get_page_content(page_id)
            .map_err(|e| content_error(e.to_string()))?;
        let operations = if raw.iter().all(u8::is_ascii_whitespace) {
            Vec::new()
        } else {
            Content::decode(&raw)
                .map_err(|e| content_error(e.to_string()))?
                .operations
        };

        let mut resources = page_resources(doc, page_id);
        let filtered = ContentFilter::new(&user_zones).filter(
            doc,
            operations,
            &mut resources,
            Matrix::IDENTITY,
            0,
            &mut outcome.content,
        );
        if outcome.content.images_removed + outcome.content.forms_removed > 0 {
            drop_unused_xobjects(doc, &mut resources, &filtered);
        }

        let mut rewritten = Vec::with_capacity(filtered.len() + 2 + user_zones.len() * 5);
        rewritten.push(Operation::new("q", vec![]));
        let open_saves = unbalanced_saves(&filtered);
        rewritten.extend(filtered);
        for _ in 0..open_saves {
            rewritten.push(Operation::new("Q", vec![]));
        }
        rewritten.push(Operation::new("Q", vec![]));
        for zone in &user_zones {
            rewritten.extend(white_fill(zone));
        }

        let encoded = Content { operations: rewritten }
            .encode()
            .map_err(|e| content_error(e.to_string()))?;
        let stream_id = doc.inner_mut().add_object(Stream::new(dictionary! {}, encoded));

        let page = doc
            .dict_mut(page_id)
            .ok_or_else(|| content_error("page is not a dictionary".into()))?;
        page.set("Contents", Object::Reference(stream_id));
        page.set("Resources", resources);

        outcome.applied = marked.len();
        debug!(
            "Page {}: {} zones applied, {} glyphs removed",
            page_index, outcome.applied, outcome.content.glyphs_removed
        );
        Ok(outcome)
    }
}

/// Owned copy of the resources in effect for a page, inherited if need be.
fn page_resources(doc: &PdfDocument, page_id: ObjectId) -> Dictionary {
    doc.inherited(page_id, b"Resources")
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
        .unwrap_or_default()
}

/// Narrows the page's `/XObject` resources to the names still drawn, so
/// removed images stop being reachable and are pruned on save.
fn drop_unused_xobjects(doc: &PdfDocument, resources: &mut Dictionary, operations: &[Operation]) {
    let drawn: HashSet<&[u8]> = operations
        .iter()
        .filter(|op| op.operator == "Do")
        .filter_map(|op| op.operands.first())
        .filter_map(|name| name.as_name().ok())
        .collect();
    let Some(mut xobjects) = resources
        .get(b"XObject")
        .ok()
        .and_then(|obj| doc.resolve(obj))
        .and_then(|obj| obj.as_dict().ok())
        .cloned()
    else {
        return;
    };
    let unused: Vec<Vec<u8>> = xobjects
        .iter()
        .map(|(name, _)| name)
        .filter(|name| !drawn.contains(name.as_slice()))
        .cloned()
        .collect();
    for name in &unused {
        xobjects.remove(name);
    }
    debug!("Dropped {} unused XObject resources", unused.len());
    resources.set("XObject", Object::Dictionary(xobjects));
}

/// `q` operators left open at the end of a content stream.
fn unbalanced_saves(operations: &[Operation]) -> usize {
    let mut depth: usize = 0;
    for op in operations {
        match op.operator.as_str() {
            "q" => depth += 1,
            "Q" => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    depth
}

/// `q 1 1 1 rg x y w h re f Q`
fn white_fill(zone: &Rect) -> [Operation; 5] {
    let real = |v: f64| Object::Real(v as f32);
    [
        Operation::new("q", vec![]),
        Operation::new("rg", vec![1.into(), 1.into(), 1.into()]),
        Operation::new(
            "re",
            vec![real(zone.x0), real(zone.y0), real(zone.width()), real(zone.height())],
        ),
        Operation::new("f", vec![]),
        Operation::new("Q", vec![]),
    ]
}
