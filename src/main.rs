//! pdf-word-highlighter - OCR word extraction and keyword highlighting for PDFs
//!
//! Rasterizes the first pages of a document, runs OCR over them, writes the
//! word and layout indices as JSON, and renders the pages with every word
//! matching a keyword outlined.

mod config;
mod error;
mod highlight;
mod index;
mod raster;
mod session;
mod storage;
mod vision;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::config::AppConfig;
use crate::highlight::{QuerySet, MAX_QUERIES};
use crate::raster::{bind_pdfium, PdfDocumentSource};
use crate::session::{RunStatus, Session, SessionSettings};
use crate::storage::IndexStore;
use crate::vision::PaddleOcrEngine;

/// Extract OCR words from a PDF and highlight keywords
#[derive(Parser, Debug)]
#[command(name = "pdf-word-highlighter")]
#[command(about = "OCR the first pages of a PDF and outline words matching up to five keywords")]
struct Args {
    /// PDF file to process
    pdf: PathBuf,

    /// Number of pages to process (defaults to the configured limit)
    #[arg(short, long)]
    pages: Option<usize>,

    /// Keyword to highlight, may be repeated up to five times
    #[arg(short, long = "query")]
    query: Vec<String>,

    /// Directory for layout.json and wordjson.json
    #[arg(long)]
    output_dir: Option<PathBuf>,

    /// Write rendered pages as PNG files into this directory
    #[arg(long)]
    render_dir: Option<PathBuf>,

    /// Configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Save the effective configuration and continue
    #[arg(long)]
    write_config: bool,

    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let result = run(args);
    match &result {
        Ok(()) => info!("Run finished successfully"),
        Err(e) => error!("Run failed: {:#}", e),
    }
    result
}

fn run(args: Args) -> Result<()> {
    let queries = keyword_set(&args.query)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => storage::get_config_dir()?.join("config.toml"),
    };
    let must_exist = args.config.is_some() && !args.write_config;
    let mut config = load_or_default_config(&config_path, must_exist)?;

    if let Some(dir) = &args.output_dir {
        config.output.dir = dir.clone();
    }
    if let Some(dir) = &args.render_dir {
        config.output.render_dir = Some(dir.clone());
    }

    if args.write_config {
        config::save_config(&config, &config_path)
            .with_context(|| format!("Failed to write config {:?}", config_path))?;
        info!("Saved configuration to {:?}", config_path);
    }

    let max_pages = args.pages.unwrap_or(config.session.default_max_pages);

    let bytes =
        std::fs::read(&args.pdf).with_context(|| format!("Failed to read {:?}", args.pdf))?;
    let pdfium = bind_pdfium()?;
    let document = PdfDocumentSource::from_bytes(&pdfium, bytes)?;

    info!("Loading OCR engine...");
    let mut engine =
        PaddleOcrEngine::from_settings(&config.ocr).context("Failed to initialize OCR engine")?;

    let store = IndexStore::from_settings(&config.output);
    let mut session = Session::new(&mut engine, store, SessionSettings::from(&config));

    session.upload(document)?;
    let report = session.process(max_pages, |done, total| {
        info!("Page {}/{} done", done, total);
    })?;

    match &report.status {
        RunStatus::Complete => info!(
            "Indexed {} of {} page(s), {} word(s)",
            report.pages_processed, report.page_count, report.words
        ),
        RunStatus::Partial { failed_pages } => info!(
            "Indexed {} of {} page(s), {} word(s); OCR failed on pages {:?}",
            report.pages_processed, report.page_count, report.words, failed_pages
        ),
    }
    info!(
        "Wrote {:?} and {:?}",
        session.store().layout_path(),
        session.store().words_path()
    );

    if session.summary_index().is_empty() {
        warn!("Document has no pages to render");
    }
    for (page, summary) in session.summary_index().iter() {
        let words = session.word_index().get(page).map_or(0, Vec::len);
        debug!(
            "{} ({}x{}): {} word(s)",
            summary.image_name, summary.width, summary.height, words
        );
    }

    if !queries.is_empty() {
        info!("Highlighting {} keyword(s)", queries.len());
    }
    let rendered = session.render(&queries)?;
    debug!("Session is now {:?}", session.state());
    for page in &rendered {
        info!("{}: {} highlight(s)", page.caption, page.highlights);
        if let Some(dir) = &config.output.render_dir {
            let path = page.save(dir)?;
            info!("Saved {:?}", path);
        }
    }

    Ok(())
}

/// Normalize `--query` values, rejecting more than five real keywords
fn keyword_set(raw: &[String]) -> Result<QuerySet> {
    let given = raw.iter().filter(|q| !q.trim().is_empty()).count();
    if given > MAX_QUERIES {
        bail!("At most {} keywords are supported, got {}", MAX_QUERIES, given);
    }
    Ok(QuerySet::new(raw))
}

/// Load the config at `path`; a missing default file means defaults
fn load_or_default_config(path: &std::path::Path, explicit: bool) -> Result<AppConfig> {
    if path.exists() {
        let config = config::load_config(path)?;
        info!("Loaded configuration from {:?}", path);
        Ok(config)
    } else if explicit {
        bail!("Config file {:?} does not exist", path)
    } else {
        info!("Using default configuration");
        Ok(AppConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_blank_keywords_do_not_count_toward_limit() {
        let raw = strings(&["", "a", "b", " ", "c", "d", "e"]);

        let queries = keyword_set(&raw).unwrap();

        assert_eq!(queries.len(), 5);
        assert!(queries.matches("E"));
    }

    #[test]
    fn test_six_keywords_rejected() {
        let raw = strings(&["a", "b", "c", "d", "e", "f"]);
        let err = keyword_set(&raw).unwrap_err();
        assert!(err.to_string().contains("At most 5 keywords"));
    }

    #[test]
    fn test_no_keywords_is_preview() {
        assert!(keyword_set(&[]).unwrap().is_empty());
        assert!(keyword_set(&strings(&["", "  "])).unwrap().is_empty());
    }

    #[test]
    fn test_args_collect_repeated_queries() {
        let args = Args::try_parse_from([
            "pdf-word-highlighter",
            "doc.pdf",
            "-q",
            "invoice",
            "--query",
            "total",
            "-p",
            "2",
        ])
        .unwrap();
        assert_eq!(args.query, vec!["invoice", "total"]);
        assert_eq!(args.pages, Some(2));
        assert_eq!(args.pdf, PathBuf::from("doc.pdf"));
    }
}
