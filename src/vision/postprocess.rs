//! Postprocessing of PaddleOCR model outputs
//!
//! DBNet probability maps become text boxes; CRNN logits become strings via
//! greedy CTC decoding.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use ndarray::ArrayView2;

/// Thresholds for turning the detection probability map into boxes
#[derive(Debug, Clone)]
pub struct DbPostprocessConfig {
    /// Pixels above this probability are text
    pub binary_threshold: f32,
    /// Minimum mean probability inside a region
    pub box_threshold: f32,
    /// Box expansion factor, compensating for DBNet's shrunk text kernels
    pub unclip_ratio: f32,
    /// Regions with a shorter side (in model pixels) are dropped
    pub min_size: f32,
    /// Upper bound on regions considered per page
    pub max_candidates: usize,
}

impl Default for DbPostprocessConfig {
    fn default() -> Self {
        Self {
            binary_threshold: 0.3,
            box_threshold: 0.6,
            unclip_ratio: 1.5,
            min_size: 3.0,
            max_candidates: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Region {
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
    score_sum: f32,
    pixels: u32,
}

impl Region {
    fn empty() -> Self {
        Self {
            min_x: u32::MAX,
            min_y: u32::MAX,
            max_x: 0,
            max_y: 0,
            score_sum: 0.0,
            pixels: 0,
        }
    }

    fn add(&mut self, x: u32, y: u32, score: f32) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
        self.score_sum += score;
        self.pixels += 1;
    }
}

/// Extract text boxes from a DBNet probability map.
///
/// `scale` is the factor the page was resized by before inference; boxes
/// are mapped back to source pixels and clamped to the page.
pub fn boxes_from_probability_map(
    prob: ArrayView2<f32>,
    scale: f32,
    image_width: u32,
    image_height: u32,
    config: &DbPostprocessConfig,
) -> Vec<[(f32, f32); 4]> {
    let (h, w) = prob.dim();
    let bitmap = GrayImage::from_fn(w as u32, h as u32, |x, y| {
        if prob[[y as usize, x as usize]] > config.binary_threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    });

    let labels = connected_components(&bitmap, Connectivity::Eight, Luma([0u8]));

    let mut regions: Vec<Region> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let id = label.0[0];
        if id == 0 {
            continue;
        }
        let idx = (id - 1) as usize;
        if idx >= regions.len() {
            regions.resize(idx + 1, Region::empty());
        }
        regions[idx].add(x, y, prob[[y as usize, x as usize]]);
    }

    let scale = if scale > 0.0 { scale } else { 1.0 };
    let max_x = image_width as f32;
    let max_y = image_height as f32;

    let mut boxes: Vec<[(f32, f32); 4]> = regions
        .iter()
        .filter(|r| r.pixels > 0)
        .take(config.max_candidates)
        .filter(|r| r.score_sum / r.pixels as f32 >= config.box_threshold)
        .filter_map(|r| {
            let width = (r.max_x - r.min_x + 1) as f32;
            let height = (r.max_y - r.min_y + 1) as f32;
            if width.min(height) < config.min_size {
                return None;
            }

            let distance = width * height * config.unclip_ratio / (2.0 * (width + height));
            let x0 = ((r.min_x as f32 - distance) / scale).clamp(0.0, max_x);
            let y0 = ((r.min_y as f32 - distance) / scale).clamp(0.0, max_y);
            let x1 = ((r.max_x as f32 + 1.0 + distance) / scale).clamp(0.0, max_x);
            let y1 = ((r.max_y as f32 + 1.0 + distance) / scale).clamp(0.0, max_y);

            Some([(x0, y0), (x1, y0), (x1, y1), (x0, y1)])
        })
        .collect();

    sort_reading_order(&mut boxes);
    boxes
}

/// Top-to-bottom, then left-to-right for boxes on roughly the same line
pub fn sort_reading_order(boxes: &mut [[(f32, f32); 4]]) {
    const SAME_LINE_TOLERANCE: f32 = 10.0;

    boxes.sort_by(|a, b| {
        a[0].1
            .total_cmp(&b[0].1)
            .then(a[0].0.total_cmp(&b[0].0))
    });

    for i in 0..boxes.len().saturating_sub(1) {
        for j in (0..=i).rev() {
            let (cur, next) = (boxes[j], boxes[j + 1]);
            if (next[0].1 - cur[0].1).abs() < SAME_LINE_TOLERANCE && next[0].0 < cur[0].0 {
                boxes.swap(j, j + 1);
            } else {
                break;
            }
        }
    }
}

/// Parse a recognition dictionary: one symbol per line, plus the space symbol
pub fn load_charset(content: &str) -> Vec<String> {
    let mut charset: Vec<String> = content
        .lines()
        .map(|line| line.trim_end_matches('\r').to_string())
        .filter(|line| !line.is_empty())
        .collect();
    charset.push(" ".to_string());
    charset
}

/// Greedy CTC decode of a `[time, classes]` probability matrix.
///
/// Class 0 is the blank; class `i` maps to `charset[i - 1]`. Confidence is
/// the mean probability of the emitted symbols.
pub fn ctc_greedy_decode(probs: ArrayView2<f32>, charset: &[String]) -> (String, f32) {
    let mut text = String::new();
    let mut score_sum = 0.0f32;
    let mut emitted = 0u32;
    let mut previous = 0usize;

    for row in probs.rows() {
        let (best, best_prob) = row
            .iter()
            .enumerate()
            .fold((0usize, f32::NEG_INFINITY), |acc, (i, &p)| if p > acc.1 { (i, p) } else { acc });

        if best != 0 && best != previous {
            if let Some(symbol) = charset.get(best - 1) {
                text.push_str(symbol);
                score_sum += best_prob;
                emitted += 1;
            }
        }
        previous = best;
    }

    let confidence = if emitted > 0 { score_sum / emitted as f32 } else { 0.0 };
    (text, confidence)
}
