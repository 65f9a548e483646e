//! Keyword Highlighting
//!
//! Draws outlined boxes over words whose text contains one of the user's
//! keywords (case-insensitive substring match).

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;
use tracing::debug;

use crate::config::RenderSettings;
use crate::index::WordRecord;

/// Maximum number of keywords considered
pub const MAX_QUERIES: usize = 5;

/// Normalized keyword list: blanks removed, lowercased, at most five
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySet {
    queries: Vec<String>,
}

impl QuerySet {
    pub fn new<I, S>(raw: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let queries = raw
            .into_iter()
            .filter(|q| !q.as_ref().trim().is_empty())
            .take(MAX_QUERIES)
            .map(|q| q.as_ref().to_lowercase())
            .collect();
        Self { queries }
    }

    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Does `text` contain any keyword, ignoring case
    pub fn matches(&self, text: &str) -> bool {
        let text = text.to_lowercase();
        self.queries.iter().any(|q| text.contains(q.as_str()))
    }
}

/// Outline appearance
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HighlightStyle {
    pub color: Rgb<u8>,
    /// Outline width in pixels, drawn inward from the box edge
    pub width: u32,
}

impl Default for HighlightStyle {
    fn default() -> Self {
        Self {
            color: Rgb([255, 0, 0]),
            width: 2,
        }
    }
}

impl From<&RenderSettings> for HighlightStyle {
    fn from(settings: &RenderSettings) -> Self {
        Self {
            color: Rgb(settings.highlight_color),
            width: settings.highlight_width,
        }
    }
}

/// Outline every word matching `queries`, returning how many were drawn.
///
/// With no queries nothing is drawn.
pub fn render_highlights(
    image: &mut RgbImage,
    words: &[WordRecord],
    queries: &QuerySet,
    style: &HighlightStyle,
) -> usize {
    if queries.is_empty() {
        return 0;
    }

    let mut drawn = 0;
    for word in words.iter().filter(|w| queries.matches(&w.text)) {
        draw_outline(image, word.bbox, style);
        drawn += 1;
    }

    debug!("Highlighted {} of {} words", drawn, words.len());
    drawn
}

/// Draw an unfilled rectangle covering the inclusive box `[x0, y0, x1, y1]`
fn draw_outline(image: &mut RgbImage, bbox: [i32; 4], style: &HighlightStyle) {
    let [x0, y0, x1, y1] = bbox;
    let (x0, x1) = (x0.min(x1), x0.max(x1));
    let (y0, y1) = (y0.min(y1), y0.max(y1));

    for inset in 0..style.width as i32 {
        let w = x1 - x0 + 1 - 2 * inset;
        let h = y1 - y0 + 1 - 2 * inset;
        if w <= 0 || h <= 0 {
            break;
        }
        let rect = Rect::at(x0 + inset, y0 + inset).of_size(w as u32, h as u32);
        draw_hollow_rect_mut(image, rect, style.color);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WHITE: Rgb<u8> = Rgb([255, 255, 255]);
    const RED: Rgb<u8> = Rgb([255, 0, 0]);

    fn word(text: &str, bbox: [i32; 4]) -> WordRecord {
        WordRecord {
            text: text.to_string(),
            bbox,
        }
    }

    fn blank(width: u32, height: u32) -> RgbImage {
        RgbImage::from_pixel(width, height, WHITE)
    }

    fn red_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| **p == RED).count()
    }

    #[test]
    fn test_case_insensitive_substring_match() {
        let queries = QuerySet::new(["voice"]);
        assert!(queries.matches("Invoice"));

        let queries = QuerySet::new(["INVOICE"]);
        assert!(queries.matches("Invoice"));

        let queries = QuerySet::new(["invoices!"]);
        assert!(!queries.matches("Invoice"));
    }

    #[test]
    fn test_query_set_drops_blanks_and_caps_at_five() {
        let queries = QuerySet::new(["", "  ", "a", "b", "c", "d", "e", "f"]);
        assert_eq!(queries.len(), 5);
        assert!(queries.matches("E"));
        assert!(!queries.matches("f"));

        assert!(QuerySet::new(["", "\t"]).is_empty());
        assert!(QuerySet::new(Vec::<String>::new()).is_empty());
    }

    #[test]
    fn test_no_queries_draws_nothing() {
        let mut image = blank(50, 50);
        let words = vec![word("Invoice", [5, 5, 20, 15])];

        let queries = QuerySet::default();
        let drawn = render_highlights(&mut image, &words, &queries, &HighlightStyle::default());

        assert_eq!(drawn, 0);
        assert_eq!(image, blank(50, 50));
    }

    #[test]
    fn test_outline_is_two_pixels_inward() {
        let mut image = blank(40, 40);
        let words = vec![word("Total", [10, 10, 19, 19])];

        let queries = QuerySet::new(["total"]);
        let drawn = render_highlights(&mut image, &words, &queries, &HighlightStyle::default());

        assert_eq!(drawn, 1);
        // Border and first inset ring are red
        assert_eq!(*image.get_pixel(10, 10), RED);
        assert_eq!(*image.get_pixel(19, 19), RED);
        assert_eq!(*image.get_pixel(11, 15), RED);
        assert_eq!(*image.get_pixel(18, 15), RED);
        // Interior and exterior untouched
        assert_eq!(*image.get_pixel(12, 12), WHITE);
        assert_eq!(*image.get_pixel(9, 10), WHITE);
        assert_eq!(*image.get_pixel(20, 19), WHITE);
        // 10x10 ring of width 2: 100 - 36
        assert_eq!(red_pixels(&image), 64);
    }

    #[test]
    fn test_only_matching_words_drawn() {
        let mut image = blank(100, 40);
        let words = vec![
            word("Invoice", [2, 2, 30, 12]),
            word("Receipt", [40, 2, 70, 12]),
            word("invoiced", [2, 20, 30, 30]),
        ];

        let queries = QuerySet::new(["invoice"]);
        let drawn = render_highlights(&mut image, &words, &queries, &HighlightStyle::default());

        assert_eq!(drawn, 2);
        assert_eq!(*image.get_pixel(2, 2), RED);
        assert_eq!(*image.get_pixel(40, 2), WHITE);
        assert_eq!(*image.get_pixel(2, 20), RED);
    }

    #[test]
    fn test_overlapping_boxes_both_drawn() {
        let mut image = blank(40, 40);
        let words = vec![word("ab", [5, 5, 20, 20]), word("abc", [5, 5, 20, 20])];

        let queries = QuerySet::new(["ab"]);
        let drawn = render_highlights(&mut image, &words, &queries, &HighlightStyle::default());
        assert_eq!(drawn, 2);
    }

    #[test]
    fn test_zero_area_box_and_out_of_bounds() {
        let mut image = blank(10, 10);
        let words = vec![word("dot", [4, 4, 4, 4]), word("edge", [8, 8, 30, 30])];

        let queries = QuerySet::new(["dot", "edge"]);
        let drawn = render_highlights(&mut image, &words, &queries, &HighlightStyle::default());

        assert_eq!(drawn, 2);
        assert_eq!(*image.get_pixel(4, 4), RED);
        assert_eq!(*image.get_pixel(9, 9), RED);
    }

    #[test]
    fn test_style_from_settings() {
        let settings = RenderSettings {
            highlight_width: 3,
            highlight_color: [0, 128, 255],
            ..RenderSettings::default()
        };
        let style = HighlightStyle::from(&settings);
        assert_eq!(style.width, 3);
        assert_eq!(style.color, Rgb([0, 128, 255]));
    }
}
