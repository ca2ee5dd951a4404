//! Zone file parsing
//!
//! A zone file is a JSON object mapping zero-based page indexes (as strings)
//! to arrays of `{"x1", "y1", "x2", "y2"}` rectangles with a top-left origin.
//! Only a non-object top level rejects the file; everything else that is
//! malformed is skipped with a warning.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::types::{Rect, RedactionZone};

/// Zones grouped by page index, in page order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ZoneMap {
    pages: BTreeMap<usize, Vec<Rect>>,
}

#[derive(Debug, Deserialize)]
struct ZoneEntry {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
}

impl ZoneMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, zone: RedactionZone) {
        self.pages.entry(zone.page_index).or_default().push(zone.rect);
    }

    pub fn is_empty(&self) -> bool {
        self.pages.values().all(Vec::is_empty)
    }

    /// Total number of rectangles across all pages.
    pub fn len(&self) -> usize {
        self.pages.values().map(Vec::len).sum()
    }

    pub fn pages(&self) -> impl Iterator<Item = (usize, &[Rect])> {
        self.pages.iter().map(|(index, rects)| (*index, rects.as_slice()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(content)
            .map_err(|e| Error::ZoneFileError(format!("invalid JSON: {}", e)))?;
        let Value::Object(entries) = value else {
            return Err(Error::ZoneFileError(
                "top level must be an object mapping page index to rectangles".into(),
            ));
        };

        let mut zones = ZoneMap::new();
        for (key, rects) in entries {
            let Ok(page_index) = key.trim().parse::<usize>() else {
                warn!("Skipping zone key '{}': not a page index", key);
                continue;
            };
            let Value::Array(rects) = rects else {
                warn!("Skipping zones for page {}: not an array", page_index);
                continue;
            };
            for (position, rect) in rects.into_iter().enumerate() {
                match serde_json::from_value::<ZoneEntry>(rect) {
                    Ok(ZoneEntry { x1, y1, x2, y2 }) => {
                        zones.insert(RedactionZone::new(page_index, Rect::new(x1, y1, x2, y2)));
                    }
                    Err(e) => warn!("Skipping zone {} on page {}: {}", position, page_index, e),
                }
            }
        }
        debug!("Parsed {} zones", zones.len());
        Ok(zones)
    }

    pub async fn load(path: &Path) -> Result<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| Error::ZoneFileError(format!("cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
    }
}

impl FromIterator<RedactionZone> for ZoneMap {
    fn from_iter<I: IntoIterator<Item = RedactionZone>>(iter: I) -> Self {
        let mut zones = ZoneMap::new();
        for zone in iter {
            zones.insert(zone);
        }
        zones
    }
}
