//! Word Index
//!
//! Turns raw OCR detections into word records and per-page summaries, and
//! holds the per-page indices that get persisted at the end of a run.

use serde::de::{self, DeserializeOwned, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::vision::Detection;

/// Minimum OCR confidence for a detection to become a word record
pub const DEFAULT_MIN_CONFIDENCE: f32 = 0.4;

/// Class name of the single synthetic section in each page summary
pub const FULL_PAGE_CLASS: &str = "FullPage";

/// One accepted OCR detection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WordRecord {
    pub text: String,
    /// Axis-aligned pixel box `[x_min, y_min, x_max, y_max]`
    pub bbox: [i32; 4],
}

/// Section of a page summary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    /// Unit placeholder box, not pixel coordinates
    pub bbox: [u32; 4],
    pub class: String,
    pub score: f64,
    pub text: String,
}

/// Per-page metadata with one full-page text section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageSummary {
    pub image_name: String,
    pub width: u32,
    pub height: u32,
    pub sections: Vec<Section>,
}

/// Filter detections into word records, keeping detector order.
///
/// Drops blank text and anything below `min_confidence`. The box is the
/// envelope of the quadrilateral with coordinates truncated toward zero.
pub fn build_word_records(detections: &[Detection], min_confidence: f32) -> Vec<WordRecord> {
    detections
        .iter()
        .filter(|d| !d.text.trim().is_empty() && d.confidence >= min_confidence)
        .map(|d| WordRecord {
            text: d.text.clone(),
            bbox: quad_envelope(&d.quad),
        })
        .collect()
}

fn quad_envelope(quad: &[(f32, f32); 4]) -> [i32; 4] {
    let min_x = quad.iter().map(|p| p.0).fold(f32::INFINITY, f32::min);
    let min_y = quad.iter().map(|p| p.1).fold(f32::INFINITY, f32::min);
    let max_x = quad.iter().map(|p| p.0).fold(f32::NEG_INFINITY, f32::max);
    let max_y = quad.iter().map(|p| p.1).fold(f32::NEG_INFINITY, f32::max);

    [min_x as i32, min_y as i32, max_x as i32, max_y as i32]
}

/// Build the summary record for one page
pub fn page_summary(page: usize, width: u32, height: u32, words: &[WordRecord]) -> PageSummary {
    let text = words
        .iter()
        .map(|w| w.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    PageSummary {
        image_name: format!("page-{}.jpg", page),
        width,
        height,
        sections: vec![Section {
            bbox: [0, 0, 1, 1],
            class: FULL_PAGE_CLASS.to_string(),
            score: 1.0,
            text,
        }],
    }
}

/// Values indexed by zero-based page number.
///
/// Stored as a dense vector; on disk it is a JSON object keyed by the page
/// index as a string.
#[derive(Debug, Clone, PartialEq)]
pub struct PageMap<T> {
    pages: Vec<T>,
}

/// Word records per page
pub type WordIndex = PageMap<Vec<WordRecord>>;

/// Summary record per page
pub type SummaryIndex = PageMap<PageSummary>;

impl<T> PageMap<T> {
    pub fn new() -> Self {
        Self { pages: Vec::new() }
    }

    /// Append the entry for the next page, returning its index
    pub fn push(&mut self, value: T) -> usize {
        self.pages.push(value);
        self.pages.len() - 1
    }

    pub fn get(&self, page: usize) -> Option<&T> {
        self.pages.get(page)
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn clear(&mut self) {
        self.pages.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.pages.iter().enumerate()
    }
}

impl<T> Default for PageMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> From<Vec<T>> for PageMap<T> {
    fn from(pages: Vec<T>) -> Self {
        Self { pages }
    }
}

impl<T: Serialize> Serialize for PageMap<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.pages.len()))?;
        for (page, value) in self.pages.iter().enumerate() {
            map.serialize_entry(&page.to_string(), value)?;
        }
        map.end()
    }
}

impl<'de, T: DeserializeOwned> Deserialize<'de> for PageMap<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // serde_json parses the string keys into integers
        let entries = BTreeMap::<usize, T>::deserialize(deserializer)?;
        let mut pages = Vec::with_capacity(entries.len());
        for (expected, (page, value)) in entries.into_iter().enumerate() {
            if page != expected {
                return Err(de::Error::custom(format!(
                    "page {} missing from index (next key is {})",
                    expected, page
                )));
            }
            pages.push(value);
        }
        Ok(Self { pages })
    }
}
