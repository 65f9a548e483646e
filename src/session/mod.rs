//! Session Orchestrator
//!
//! Drives one document through rasterization, OCR and indexing, persists the
//! indices, and renders the processed pages with keyword highlights.

pub mod state;

pub use state::SessionState;

use image::RgbImage;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::error::PipelineError;
use crate::highlight::{render_highlights, HighlightStyle, QuerySet};
use crate::index::{
    build_word_records, page_summary, SummaryIndex, WordIndex, DEFAULT_MIN_CONFIDENCE,
};
use crate::raster::{validate_scale, PageSource, RasterCache};
use crate::storage::IndexStore;
use crate::vision::WordDetector;

/// Knobs for a processing run
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Pixels per native page unit
    pub scale: f32,
    /// Detections below this confidence are dropped
    pub min_confidence: f32,
    /// Continue with an empty word list when OCR fails on a page
    pub isolate_page_failures: bool,
    /// Highlight outline appearance
    pub style: HighlightStyle,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            scale: 1.0,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            isolate_page_failures: false,
            style: HighlightStyle::default(),
        }
    }
}

impl From<&AppConfig> for SessionSettings {
    fn from(config: &AppConfig) -> Self {
        Self {
            scale: config.render.scale,
            min_confidence: config.ocr.min_confidence,
            isolate_page_failures: config.session.isolate_page_failures,
            style: HighlightStyle::from(&config.render),
        }
    }
}

/// Outcome of a processing run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    /// Every page was processed
    Complete,
    /// OCR failed on some pages; they were indexed with no words
    Partial { failed_pages: Vec<usize> },
}

/// Summary of a processing run
#[derive(Debug, Clone)]
pub struct ProcessReport {
    pub pages_processed: usize,
    pub page_count: usize,
    pub words: usize,
    pub status: RunStatus,
}

/// A page image ready to show the caller
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub page_index: usize,
    /// "Page N", 1-based
    pub caption: String,
    pub image: RgbImage,
    /// Number of outlines drawn on this page
    pub highlights: usize,
}

impl RenderedPage {
    fn new(page_index: usize, image: RgbImage, highlights: usize) -> Self {
        Self {
            page_index,
            caption: format!("Page {}", page_index + 1),
            image,
            highlights,
        }
    }

    pub fn file_name(&self) -> String {
        format!("page-{}.png", self.page_index + 1)
    }

    /// Write the image as PNG into `dir`
    pub fn save(&self, dir: &Path) -> Result<PathBuf, PipelineError> {
        let path = dir.join(self.file_name());
        std::fs::create_dir_all(dir).map_err(|e| PipelineError::Render {
            path: path.clone(),
            source: image::ImageError::IoError(e),
        })?;
        self.image.save(&path).map_err(|source| PipelineError::Render {
            path: path.clone(),
            source,
        })?;
        Ok(path)
    }
}

/// One document's trip through the pipeline.
///
/// The detector is borrowed so a single engine serves many sessions.
pub struct Session<'d, S, D: ?Sized> {
    detector: &'d mut D,
    store: IndexStore,
    settings: SessionSettings,
    state: SessionState,
    source: Option<S>,
    rasters: RasterCache,
    words: WordIndex,
    summaries: SummaryIndex,
}

impl<'d, S: PageSource, D: WordDetector + ?Sized> Session<'d, S, D> {
    pub fn new(detector: &'d mut D, store: IndexStore, settings: SessionSettings) -> Self {
        Self {
            detector,
            store,
            settings,
            state: SessionState::Idle,
            source: None,
            rasters: RasterCache::new(),
            words: WordIndex::new(),
            summaries: SummaryIndex::new(),
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn word_index(&self) -> &WordIndex {
        &self.words
    }

    pub fn summary_index(&self) -> &SummaryIndex {
        &self.summaries
    }

    pub fn store(&self) -> &IndexStore {
        &self.store
    }

    fn check_transition(
        &self,
        next: SessionState,
        action: &'static str,
    ) -> Result<(), PipelineError> {
        if self.state.can_transition(next) {
            Ok(())
        } else {
            Err(PipelineError::InvalidState {
                state: self.state,
                action,
            })
        }
    }

    /// Load a document, discarding results of any previous run
    pub fn upload(&mut self, source: S) -> Result<(), PipelineError> {
        self.check_transition(SessionState::Uploaded, "upload a document")?;

        self.rasters.clear();
        self.words.clear();
        self.summaries.clear();
        self.source = Some(source);
        self.state = SessionState::Uploaded;
        Ok(())
    }

    /// Index the first `max_pages` pages and persist both indices.
    ///
    /// `progress` is called with (pages done, pages to do) after each page.
    /// Any failure aborts the run, leaving the document loaded.
    pub fn process<F>(
        &mut self,
        max_pages: usize,
        mut progress: F,
    ) -> Result<ProcessReport, PipelineError>
    where
        F: FnMut(usize, usize),
    {
        if max_pages == 0 {
            return Err(PipelineError::input("page limit must be at least 1"));
        }
        validate_scale(self.settings.scale)?;
        self.check_transition(SessionState::Processing, "process")?;
        self.state = SessionState::Processing;

        match self.run_pages(max_pages, &mut progress) {
            Ok(report) => {
                self.state = SessionState::Processed;
                Ok(report)
            }
            Err(e) => {
                self.words.clear();
                self.summaries.clear();
                self.rasters.clear();
                self.state = SessionState::Uploaded;
                Err(e)
            }
        }
    }

    fn run_pages(
        &mut self,
        max_pages: usize,
        progress: &mut dyn FnMut(usize, usize),
    ) -> Result<ProcessReport, PipelineError> {
        let source = self.source.as_ref().ok_or(PipelineError::InvalidState {
            state: self.state,
            action: "process without a document",
        })?;

        let page_count = source.page_count();
        let total = max_pages.min(page_count);
        info!("Processing {} of {} page(s)", total, page_count);

        let start = Instant::now();
        self.words.clear();
        self.summaries.clear();
        let mut failed_pages = Vec::new();
        let mut word_total = 0;

        for page in 0..total {
            let image = self.rasters.get_or_render(source, page, self.settings.scale)?;
            let (width, height) = image.dimensions();

            let records = match self.detector.detect(image) {
                Ok(detections) => {
                    let records = build_word_records(&detections, self.settings.min_confidence);
                    debug!(
                        "Page {}: kept {} of {} detections",
                        page,
                        records.len(),
                        detections.len()
                    );
                    records
                }
                Err(e) if self.settings.isolate_page_failures => {
                    warn!("OCR failed on page {}, continuing without words: {:#}", page, e);
                    failed_pages.push(page);
                    Vec::new()
                }
                Err(e) => {
                    return Err(PipelineError::Detection {
                        page,
                        source: e.into(),
                    })
                }
            };

            word_total += records.len();
            self.summaries.push(page_summary(page, width, height, &records));
            self.words.push(records);
            progress(page + 1, total);
        }

        self.store.save(&self.words, &self.summaries)?;

        let status = if failed_pages.is_empty() {
            RunStatus::Complete
        } else {
            RunStatus::Partial { failed_pages }
        };

        info!(
            "Processed {} page(s), {} word(s) in {:?} ({:?})",
            total,
            word_total,
            start.elapsed(),
            status
        );

        Ok(ProcessReport {
            pages_processed: total,
            page_count,
            words: word_total,
            status,
        })
    }

    /// Render results for the caller.
    ///
    /// With keywords, every processed page is returned with matching words
    /// outlined. Without keywords only the first page is returned, untouched.
    pub fn render(&mut self, queries: &QuerySet) -> Result<Vec<RenderedPage>, PipelineError> {
        let next = if queries.is_empty() {
            SessionState::Preview
        } else {
            SessionState::Highlighting
        };
        self.check_transition(next, "render")?;

        let source = self.source.as_ref().ok_or(PipelineError::InvalidState {
            state: self.state,
            action: "render without a document",
        })?;
        let scale = self.settings.scale;

        let pages = if queries.is_empty() {
            if source.page_count() == 0 {
                Vec::new()
            } else {
                let image = self.rasters.get_or_render(source, 0, scale)?.clone();
                vec![RenderedPage::new(0, image, 0)]
            }
        } else {
            let mut pages = Vec::with_capacity(self.words.len());
            for (page, words) in self.words.iter() {
                let mut image = self.rasters.get_or_render(source, page, scale)?.clone();
                let highlights =
                    render_highlights(&mut image, words, queries, &self.settings.style);
                pages.push(RenderedPage::new(page, image, highlights));
            }
            let total: usize = pages.iter().map(|p| p.highlights).sum();
            info!("Highlighted {} word(s) across {} page(s)", total, pages.len());
            pages
        };

        self.state = next;
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::testing::MemoryPages;
    use crate::vision::testing::{word, ScriptedDetector};
    use image::Rgb;
    use tempfile::TempDir;

    const RED: Rgb<u8> = Rgb([255, 0, 0]);

    fn store(dir: &TempDir) -> IndexStore {
        IndexStore::new(dir.path().join("output"))
    }

    fn red_pixels(image: &RgbImage) -> usize {
        image.pixels().filter(|p| **p == RED).count()
    }

    #[test]
    fn test_end_to_end_invoice_example() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new()
            .then(vec![word("Invoice", 0.9, 40.0, 50.0, 120.0, 70.0)])
            .then(vec![word("Receipt", 0.2, 40.0, 50.0, 120.0, 70.0)]);

        let mut session = Session::new(&mut detector, store(&dir), SessionSettings::default());
        session.upload(MemoryPages::uniform(2, 200, 300)).unwrap();

        let report = session.process(5, |_, _| {}).unwrap();
        assert_eq!(report.pages_processed, 2);
        assert_eq!(report.words, 1);
        assert_eq!(report.status, RunStatus::Complete);

        let words = session.word_index();
        assert_eq!(words.len(), 2);
        assert_eq!(words.get(0).unwrap().len(), 1);
        assert_eq!(words.get(0).unwrap()[0].text, "Invoice");
        assert_eq!(words.get(0).unwrap()[0].bbox, [40, 50, 120, 70]);
        assert!(words.get(1).unwrap().is_empty());

        let summaries = session.summary_index();
        assert_eq!(summaries.get(0).map(|s| s.sections[0].text.as_str()), Some("Invoice"));
        assert_eq!(summaries.get(1).map(|s| s.sections[0].text.as_str()), Some(""));
        assert_eq!(summaries.get(0).unwrap().width, 200);
        assert_eq!(summaries.get(0).unwrap().height, 300);

        let rendered = session.render(&QuerySet::new(["invoice"])).unwrap();
        assert_eq!(session.state(), SessionState::Highlighting);
        assert_eq!(rendered.len(), 2);
        assert_eq!(rendered[0].caption, "Page 1");
        assert_eq!(rendered[1].caption, "Page 2");
        assert_eq!(rendered[0].highlights, 1);
        assert_eq!(rendered[1].highlights, 0);
        assert!(red_pixels(&rendered[0].image) > 0);
        assert_eq!(red_pixels(&rendered[1].image), 0);
    }

    #[test]
    fn test_persists_both_documents() {
        let dir = TempDir::new().unwrap();
        let mut detector =
            ScriptedDetector::new().then(vec![word("Total", 0.8, 1.0, 2.0, 3.0, 4.0)]);
        let mut session = Session::new(&mut detector, store(&dir), SessionSettings::default());
        session.upload(MemoryPages::uniform(1, 50, 50)).unwrap();
        session.process(1, |_, _| {}).unwrap();

        let on_disk_words = session.store().load_words().unwrap();
        let on_disk_summaries = session.store().load_summaries().unwrap();
        assert_eq!(&on_disk_words, session.word_index());
        assert_eq!(&on_disk_summaries, session.summary_index());

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(session.store().words_path()).unwrap())
                .unwrap();
        assert_eq!(raw["0"][0]["text"], "Total");
        assert!(dir.path().join("output/layout.json").exists());
    }

    #[test]
    fn test_page_limit_bounds_processing() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new();
        let mut session = Session::new(&mut detector, store(&dir), SessionSettings::default());
        session.upload(MemoryPages::uniform(6, 20, 20)).unwrap();

        let mut ticks = Vec::new();
        let report = session.process(3, |done, total| ticks.push((done, total))).unwrap();

        assert_eq!(report.pages_processed, 3);
        assert_eq!(report.page_count, 6);
        assert_eq!(ticks, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(session.word_index().len(), 3);
        assert!(session.word_index().get(3).is_none());
        assert!(session.summary_index().get(3).is_none());

        let on_disk = session.store().load_summaries().unwrap();
        assert_eq!(on_disk.len(), 3);
        drop(session);
        assert_eq!(detector.calls.len(), 3);
    }

    #[test]
    fn test_page_limit_larger_than_document() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new();
        let mut session = Session::new(&mut detector, store(&dir), SessionSettings::default());
        session.upload(MemoryPages::uniform(2, 20, 20)).unwrap();

        let report = session.process(10, |_, _| {}).unwrap();
        assert_eq!(report.pages_processed, 2);
        assert_eq!(session.word_index().len(), 2);
    }

    #[test]
    fn test_zero_page_limit_rejected() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new();
        let mut session = Session::new(&mut detector, store(&dir), SessionSettings::default());
        session.upload(MemoryPages::uniform(1, 20, 20)).unwrap();

        let err = session.process(0, |_, _| {}).unwrap_err();
        assert!(matches!(err, PipelineError::Input { .. }));
        assert_eq!(session.state(), SessionState::Uploaded);
    }

    #[test]
    fn test_detection_failure_aborts_run() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new()
            .then(vec![word("ok", 0.9, 0.0, 0.0, 5.0, 5.0)])
            .then_fail("model crashed");
        let mut session = Session::new(&mut detector, store(&dir), SessionSettings::default());
        session.upload(MemoryPages::uniform(3, 20, 20)).unwrap();

        let err = session.process(3, |_, _| {}).unwrap_err();

        assert!(matches!(err, PipelineError::Detection { page: 1, .. }));
        assert_eq!(session.state(), SessionState::Uploaded);
        assert!(session.word_index().is_empty());
        assert!(!dir.path().join("output/wordjson.json").exists());
        assert!(session.render(&QuerySet::new(["ok"])).is_err());
    }

    #[test]
    fn test_isolated_failure_reports_partial() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new()
            .then_fail("model crashed")
            .then(vec![word("fine", 0.9, 0.0, 0.0, 5.0, 5.0)]);
        let settings = SessionSettings {
            isolate_page_failures: true,
            ..SessionSettings::default()
        };
        let mut session = Session::new(&mut detector, store(&dir), settings);
        session.upload(MemoryPages::uniform(2, 20, 20)).unwrap();

        let report = session.process(2, |_, _| {}).unwrap();

        assert_eq!(report.status, RunStatus::Partial { failed_pages: vec![0] });
        assert!(session.word_index().get(0).unwrap().is_empty());
        assert_eq!(session.word_index().get(1).unwrap()[0].text, "fine");
        assert_eq!(session.state(), SessionState::Processed);
    }

    #[test]
    fn test_no_queries_previews_first_page() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new()
            .then(vec![word("Invoice", 0.9, 2.0, 2.0, 10.0, 10.0)])
            .then(vec![word("Invoice", 0.9, 2.0, 2.0, 10.0, 10.0)]);
        let mut session = Session::new(&mut detector, store(&dir), SessionSettings::default());
        session.upload(MemoryPages::uniform(2, 30, 30)).unwrap();
        session.process(5, |_, _| {}).unwrap();

        let rendered = session.render(&QuerySet::new(["", "  "])).unwrap();

        assert_eq!(session.state(), SessionState::Preview);
        assert_eq!(rendered.len(), 1);
        assert_eq!(rendered[0].caption, "Page 1");
        assert_eq!(rendered[0].highlights, 0);
        assert_eq!(red_pixels(&rendered[0].image), 0);
    }

    #[test]
    fn test_rasters_shared_between_passes() {
        let dir = TempDir::new().unwrap();
        let pages = MemoryPages::uniform(2, 30, 30);
        let mut detector = ScriptedDetector::new();
        let mut session: Session<'_, &MemoryPages, _> =
            Session::new(&mut detector, store(&dir), SessionSettings::default());

        session.upload(&pages).unwrap();
        session.process(5, |_, _| {}).unwrap();
        session.render(&QuerySet::new(["x"])).unwrap();
        session.render(&QuerySet::default()).unwrap();

        assert_eq!(pages.renders.get(), 2);
    }

    #[test]
    fn test_scale_applies_to_raster() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new();
        let settings = SessionSettings {
            scale: 2.0,
            ..SessionSettings::default()
        };
        let mut session = Session::new(&mut detector, store(&dir), settings);
        session.upload(MemoryPages::uniform(1, 30, 40)).unwrap();
        session.process(1, |_, _| {}).unwrap();

        let summary = session.summary_index().get(0).unwrap();
        assert_eq!((summary.width, summary.height), (60, 80));
        drop(session);
        assert_eq!(detector.calls, vec![(60, 80)]);
    }

    #[test]
    fn test_invalid_state_transitions() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new();
        let mut session: Session<'_, MemoryPages, _> =
            Session::new(&mut detector, store(&dir), SessionSettings::default());

        assert!(matches!(
            session.process(1, |_, _| {}),
            Err(PipelineError::InvalidState { state: SessionState::Idle, .. })
        ));
        assert!(matches!(
            session.render(&QuerySet::default()),
            Err(PipelineError::InvalidState { .. })
        ));

        session.upload(MemoryPages::uniform(1, 10, 10)).unwrap();
        assert!(session.render(&QuerySet::new(["a"])).is_err());
    }

    #[test]
    fn test_reupload_resets_results() {
        let dir = TempDir::new().unwrap();
        let mut detector = ScriptedDetector::new().then(vec![word("one", 0.9, 0.0, 0.0, 1.0, 1.0)]);
        let mut session = Session::new(&mut detector, store(&dir), SessionSettings::default());
        session.upload(MemoryPages::uniform(1, 10, 10)).unwrap();
        session.process(1, |_, _| {}).unwrap();
        assert_eq!(session.word_index().len(), 1);

        session.upload(MemoryPages::uniform(4, 10, 10)).unwrap();
        assert_eq!(session.state(), SessionState::Uploaded);
        assert!(session.word_index().is_empty());

        session.process(4, |_, _| {}).unwrap();
        assert_eq!(session.word_index().len(), 4);
        assert_eq!(session.store().load_words().unwrap().len(), 4);
    }

    #[test]
    fn test_rendered_page_save() {
        let dir = TempDir::new().unwrap();
        let page = RenderedPage::new(2, RgbImage::new(4, 4), 0);

        let path = page.save(&dir.path().join("renders")).unwrap();

        assert_eq!(path.file_name().unwrap(), "page-3.png");
        assert!(path.exists());
    }

    #[test]
    fn test_rendered_page_save_into_unusable_dir() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("renders");
        std::fs::write(&blocker, "not a directory").unwrap();
        let page = RenderedPage::new(0, RgbImage::new(4, 4), 0);

        let err = page.save(&blocker).unwrap_err();

        match err {
            PipelineError::Render { path, .. } => assert_eq!(path, blocker.join("page-1.png")),
            other => panic!("expected render error, got {:?}", other),
        }
    }

    #[test]
    fn test_settings_from_config() {
        let mut config = AppConfig::default();
        config.render.scale = 1.5;
        config.ocr.min_confidence = 0.7;
        config.session.isolate_page_failures = true;

        let settings = SessionSettings::from(&config);
        assert_eq!(settings.scale, 1.5);
        assert_eq!(settings.min_confidence, 0.7);
        assert!(settings.isolate_page_failures);
        assert_eq!(settings.style, HighlightStyle::default());
    }
}
