//! Ingest PDFs into document catalogs.
//!
//! Usage:
//!   ingest paper.pdf other.pdf --cache-dir data/cache --jobs 4
//!   ingest brochure.pdf --profile marketing --config overrides.json
//!   ingest paper.pdf --replay            # reuse saved raw_layouts.json
//!   ingest paper.pdf --model layout.onnx # requires the `ml` feature
//!   ingest scan.pdf --replay --ocr       # requires the `ocr` feature

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::{Arc, Mutex, PoisonError};

use clap::Parser;

use pdf_catalog::catalog::paths::doc_id;
use pdf_catalog::catalog::DocumentPaths;
use pdf_catalog::config::{IngestConfig, Profile};
use pdf_catalog::document::MemoryDocument;
use pdf_catalog::layout::replay::ReplayDetector;
use pdf_catalog::layout::LayoutDetector;
use pdf_catalog::ocr::OcrEngine;
use pdf_catalog::pipeline::{AdmissionGate, BatchRunner, IngestPipeline, IngestSummary, SystemMemory};
use pdf_catalog::rendering::pdfium::PdfiumBackend;
use pdf_catalog::{Error, Result};

/// Ingest PDFs into document catalogs
#[derive(Parser, Debug)]
#[command(name = "ingest")]
#[command(version, about, long_about = None)]
struct Args {
    /// PDF files to ingest
    #[arg(required = true)]
    pdfs: Vec<PathBuf>,

    /// Configuration profile (scientific, marketing)
    #[arg(short, long, default_value = "scientific")]
    profile: Profile,

    /// JSON object of option overrides
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache directory (overrides the configuration)
    #[arg(long)]
    cache_dir: Option<PathBuf>,

    /// Documents processed concurrently
    #[arg(short, long, default_value = "2")]
    jobs: usize,

    /// Use sanitized file names as document ids instead of content hashes
    #[arg(long)]
    readable_ids: bool,

    /// Replay each document's saved raw_layouts.json instead of running a model
    #[arg(long)]
    replay: bool,

    /// ONNX layout model
    #[cfg(feature = "ml")]
    #[arg(long)]
    model: Option<PathBuf>,

    /// Model input size (square)
    #[cfg(feature = "ml")]
    #[arg(long, default_value = "1024")]
    input_size: u32,

    /// Fall back to Tesseract OCR for blocks without usable embedded text
    #[cfg(feature = "ocr")]
    #[arg(long)]
    ocr: bool,

    /// Tesseract language
    #[cfg(feature = "ocr")]
    #[arg(long, default_value = "eng")]
    ocr_language: String,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn load_config(&self) -> Result<IngestConfig> {
        let mut config = match &self.config {
            Some(path) => IngestConfig::from_json_file(self.profile, path)?,
            None => self.profile.create_config(),
        };
        if let Some(dir) = &self.cache_dir {
            config = config.with_cache_dir(dir);
        }
        if self.readable_ids {
            config = config.with_human_readable_ids(true);
        }
        Ok(config)
    }

    #[cfg(feature = "ml")]
    fn model_detector(&self) -> Result<Option<Arc<dyn LayoutDetector>>> {
        use pdf_catalog::layout::onnx::OnnxLayoutDetector;
        match &self.model {
            Some(path) => Ok(Some(Arc::new(OnnxLayoutDetector::from_file(
                path,
                self.profile,
                self.input_size,
            )?))),
            None => Ok(None),
        }
    }

    #[cfg(not(feature = "ml"))]
    fn model_detector(&self) -> Result<Option<Arc<dyn LayoutDetector>>> {
        Ok(None)
    }

    #[cfg(feature = "ocr")]
    fn ocr_engine(&self) -> Result<Option<Arc<dyn OcrEngine>>> {
        use pdf_catalog::ocr::TesseractEngine;
        if !self.ocr {
            return Ok(None);
        }
        Ok(Some(Arc::new(TesseractEngine::new(self.ocr_language.clone())?)))
    }

    #[cfg(not(feature = "ocr"))]
    fn ocr_engine(&self) -> Result<Option<Arc<dyn OcrEngine>>> {
        Ok(None)
    }
}

/// Shared state of one run.
struct Ingestor {
    config: IngestConfig,
    model: Option<Arc<dyn LayoutDetector>>,
    ocr: Option<Arc<dyn OcrEngine>>,
    backend: Mutex<PdfiumBackend>,
}

impl Ingestor {
    fn ingest(&self, pdf: &Path) -> Result<IngestSummary> {
        let id = doc_id(pdf, self.config.human_readable_ids)?;
        let paths = DocumentPaths::new(&self.config.cache_dir, &id);

        let detector: Arc<dyn LayoutDetector> = match &self.model {
            Some(model) => Arc::clone(model),
            None => {
                let replay = ReplayDetector::from_file(&paths.raw_layouts())?;
                if replay.detection_dpi() != self.config.detection_dpi {
                    log::warn!(
                        "{}: replayed detections were made at {} dpi, pipeline runs at {}",
                        id,
                        replay.detection_dpi(),
                        self.config.detection_dpi
                    );
                }
                Arc::new(replay)
            },
        };

        // PDFium is not thread-safe: read the whole document under the lock,
        // then run the pipeline on the copy.
        let snapshot = {
            let backend = self.backend.lock().unwrap_or_else(PoisonError::into_inner);
            let doc = backend.open(pdf)?;
            MemoryDocument::snapshot(&doc, self.config.detection_dpi)?
        };

        let mut pipeline = IngestPipeline::new(self.config.clone(), detector);
        if let Some(engine) = &self.ocr {
            pipeline = pipeline.with_ocr(Arc::clone(engine));
        }
        pipeline.ingest_document(&snapshot, pdf, &id)
    }
}

fn run(args: Args) -> Result<bool> {
    let config = args.load_config()?;
    let model = args.model_detector()?;
    if model.is_none() && !args.replay {
        return Err(Error::Config(
            "no layout detector: pass --replay or --model (requires the `ml` feature)".to_string(),
        ));
    }

    let ocr = args.ocr_engine()?;

    let ingestor = Ingestor {
        config,
        model,
        ocr,
        backend: Mutex::new(PdfiumBackend::new()?),
    };

    let gate = AdmissionGate::new(args.jobs).with_memory_gauge(Arc::new(SystemMemory::new()));
    let runner = BatchRunner::new(args.jobs, Arc::new(gate));
    let results = runner.run(&args.pdfs, |pdf| ingestor.ingest(pdf));

    let mut failed = 0;
    for (pdf, result) in args.pdfs.iter().zip(results) {
        match result {
            Ok(summary) => println!("{}", summary),
            Err(e) => {
                eprintln!("{}: {}", pdf.display(), e);
                failed += 1;
            },
        }
    }
    println!("{} of {} documents ingested", args.pdfs.len() - failed, args.pdfs.len());
    Ok(failed == 0)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let level = if args.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        },
    }
}
