//! Document ingestion pipeline.
//!
//! ```text
//! PDF / SourceDocument
//!     ↓
//! [Rasterizer] (pages/page-NNN.png, PageInfo)
//!     ↓
//! [LayoutDetector] → [DetectionFilter] (raw regions, detector order)
//!     ↓
//! [Consolidator] + [IdManager] (canonical regions, final ids)
//!     ↓
//! [LayoutRefiner] (optional, rate limited)
//!     ↓
//! [ReadingOrderStrategy] (per-page id sequence)
//!     ↓
//! [TextExtractor] (embedded text, OCR fallback, spacing repair)
//!     ↓
//! [CatalogWriter] (validate, figures, content.json, renderings)
//! ```
//!
//! Stages run one after another for a document; many documents may run in
//! parallel through [`batch::BatchRunner`] and [`gate::AdmissionGate`]. The
//! [`cancel::CancellationToken`] is checked between stages, and nothing is
//! written to `content.json` unless the whole document made it through.

pub mod batch;
pub mod cancel;
pub mod gate;
pub mod reading_order;
pub mod timeout;

pub use batch::BatchRunner;
pub use cancel::CancellationToken;
pub use gate::{AdmissionGate, MemoryGauge, SystemMemory};
pub use reading_order::{
    OrderItem, ReadingOrderContext, ReadingOrderStrategy, SingleColumnStrategy, TwoColumnStrategy,
};
pub use timeout::run_with_timeout;

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::catalog::reader::CatalogReader;
use crate::catalog::writer::write_json;
use crate::catalog::{
    Block, BlockRole, Catalog, CatalogMetadata, CatalogWriter, DocumentPaths, ErrorRecord, ExtractionMethod,
    Stage, PIPELINE_VERSION,
};
use crate::config::IngestConfig;
use crate::consolidate::{ConsolidationReport, Consolidator, Region};
use crate::debug::DebugVisualizer;
use crate::document::SourceDocument;
use crate::error::{Error, Result};
use crate::extractors::{BlockRequest, TextExtractor};
use crate::geometry::BBox;
use crate::ids::IdManager;
use crate::layout::replay::PageDetections;
use crate::layout::{DetectionFilter, LabelMap, LayoutDetector, RawLayoutSnapshot, RawRegion};
use crate::ocr::OcrEngine;
use crate::refine::{apply_proposals, LayoutRefiner, RateLimiter};
use crate::rendering::{Rasterizer, RenderedPage};

use reading_order::create_strategy;

/// One consolidated region as written to `merged/merged_boxes.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedRegion {
    /// Final block id
    pub id: String,
    /// Catalog role
    pub role: BlockRole,
    /// Detector label
    pub label: String,
    /// Pixel box
    pub bbox: BBox,
    /// Max score of its sources
    pub score: f32,
    /// Container of a caption
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
}

/// Consolidated regions of one page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergedPage {
    /// Page index (0-based)
    pub page_index: usize,
    /// Regions after consolidation and refinement
    pub regions: Vec<MergedRegion>,
}

/// Contents of `merged_boxes.json`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MergedSnapshot {
    /// Per-page regions
    pub pages: Vec<MergedPage>,
    /// Totals over all pages
    pub report: ConsolidationReport,
}

/// Everything [`IngestPipeline::build_catalog`] produces before writing.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// The validated-to-be catalog
    pub catalog: Catalog,
    /// Page rasters, for figure crops
    pub pages: Vec<RenderedPage>,
    /// Filtered detector output
    pub raw_layouts: RawLayoutSnapshot,
    /// Consolidated regions
    pub merged: MergedSnapshot,
}

/// One-line result of an ingested document.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IngestSummary {
    /// Document id
    pub doc_id: String,
    /// Written catalog
    pub content_json: PathBuf,
    /// Pages in the document
    pub pages: usize,
    /// Blocks in the catalog
    pub blocks: usize,
    /// Blocks per role
    pub roles: IndexMap<String, usize>,
    /// Blocks per extraction method
    pub methods: IndexMap<String, usize>,
    /// Soft errors recorded
    pub errors: usize,
}

impl IngestSummary {
    /// Summarize a written catalog.
    pub fn new(doc_id: impl Into<String>, content_json: PathBuf, catalog: &Catalog) -> Self {
        let stats = CatalogReader::from_catalog(catalog.clone()).statistics();
        Self {
            doc_id: doc_id.into(),
            content_json,
            pages: stats.pages,
            blocks: stats.blocks,
            roles: stats.by_role,
            methods: stats.by_method,
            errors: stats.errors,
        }
    }
}

impl fmt::Display for IngestSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |counts: &IndexMap<String, usize>| {
            counts
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect::<Vec<_>>()
                .join(" ")
        };
        write!(
            f,
            "{}: {} pages, {} blocks [{}] methods [{}]",
            self.doc_id,
            self.pages,
            self.blocks,
            join(&self.roles),
            join(&self.methods)
        )?;
        if self.errors > 0 {
            write!(f, " errors={}", self.errors)?;
        }
        Ok(())
    }
}

/// The ingestion pipeline for one configuration.
///
/// Detector, OCR engine and refiner are long-lived and shared; the pipeline
/// itself holds no per-document state and can serve many documents, from
/// many threads.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use pdf_catalog::config::IngestConfig;
/// use pdf_catalog::document::MemoryDocument;
/// use pdf_catalog::geometry::BBox;
/// use pdf_catalog::layout::{FixedDetector, RawRegion};
/// use pdf_catalog::pipeline::IngestPipeline;
///
/// let detector = FixedDetector::new()
///     .with_page(0, vec![RawRegion::new(BBox::new(20.0, 20.0, 120.0, 60.0), "Title", 0.9)]);
/// let config = IngestConfig::default().with_dpi(72).with_timestamp(false);
/// let pipeline = IngestPipeline::new(config, Arc::new(detector));
///
/// let doc = MemoryDocument::new().with_page(200.0, 200.0);
/// let output = pipeline.build_catalog(&doc, "memory.pdf", "doc", None).unwrap();
/// assert_eq!(output.catalog.reading_order, vec![vec!["block_0_000".to_string()]]);
/// ```
pub struct IngestPipeline {
    config: IngestConfig,
    detector: Arc<dyn LayoutDetector>,
    extractor: TextExtractor,
    refiner: Option<(Arc<dyn LayoutRefiner>, Arc<RateLimiter>)>,
    cancel: CancellationToken,
}

impl fmt::Debug for IngestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestPipeline")
            .field("profile", &self.config.profile)
            .field("detector", &self.detector.name())
            .field("extractor", &self.extractor)
            .field("refiner", &self.refiner.as_ref().map(|(r, _)| r.name().to_string()))
            .finish()
    }
}

impl IngestPipeline {
    /// Pipeline with embedded-text extraction only.
    pub fn new(config: IngestConfig, detector: Arc<dyn LayoutDetector>) -> Self {
        let extractor = TextExtractor::new(&config);
        Self {
            config,
            detector,
            extractor,
            refiner: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Enable the OCR fallback.
    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.extractor = self.extractor.with_ocr(engine);
        self
    }

    /// Enable external refinement through a shared rate limiter.
    pub fn with_refiner(mut self, refiner: Arc<dyn LayoutRefiner>, limiter: Arc<RateLimiter>) -> Self {
        self.refiner = Some((refiner, limiter));
        self
    }

    /// Observe `token` between stages.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Configuration in use.
    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Token checked between stages.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Ingest an open document into `<cache_dir>/<doc_id>/`.
    pub fn ingest_document(
        &self,
        doc: &dyn SourceDocument,
        source_path: &Path,
        doc_id: &str,
    ) -> Result<IngestSummary> {
        let paths = DocumentPaths::new(&self.config.cache_dir, doc_id);
        let source = source_path.display().to_string();
        let mut output = self.build_catalog(doc, &source, doc_id, Some(&paths))?;

        self.cancel.check()?;
        let writer = CatalogWriter::new(paths, self.config.merge_threshold)
            .with_renderings(self.config.write_renderings);
        let target = writer.write(&mut output.catalog, &output.pages)?;
        let summary = IngestSummary::new(doc_id, target, &output.catalog);
        log::info!("{}", summary);
        Ok(summary)
    }

    /// Open a PDF with PDFium and ingest it.
    #[cfg(feature = "pdfium")]
    pub fn ingest_pdf(&self, backend: &crate::rendering::pdfium::PdfiumBackend, path: &Path) -> Result<IngestSummary> {
        let id = crate::catalog::paths::doc_id(path, self.config.human_readable_ids)?;
        let doc = backend.open(path)?;
        self.ingest_document(&doc, path, &id)
    }

    /// Run every stage except the writer.
    ///
    /// With `paths`, page rasters are persisted and, when configured,
    /// snapshots and visualizations are written; the catalog itself is not.
    pub fn build_catalog(
        &self,
        doc: &dyn SourceDocument,
        source_path: &str,
        doc_id: &str,
        paths: Option<&DocumentPaths>,
    ) -> Result<PipelineOutput> {
        let config = &self.config;
        self.cancel.check()?;
        log::info!("{}: rasterizing at {} dpi", doc_id, config.detection_dpi);
        let pages = Rasterizer::new(config.detection_dpi).rasterize(doc, paths)?;

        let filter = DetectionFilter::from_config(config);
        let consolidator = Consolidator::new(config, LabelMap::for_profile(config.profile));
        let strategy = create_strategy(config.reading_order);
        let mut ids = IdManager::new();
        let mut errors = Vec::new();
        let mut raw_layouts = RawLayoutSnapshot {
            detector: self.detector.name().to_string(),
            detection_dpi: config.detection_dpi,
            pages: Vec::with_capacity(pages.len()),
        };
        let mut merged = MergedSnapshot::default();
        let mut blocks = Vec::new();
        let mut reading_order = Vec::with_capacity(pages.len());

        for page in &pages {
            let page_index = page.info.page_index;

            self.cancel.check()?;
            let raw = filter.apply(self.detect(page, &mut errors)?);
            raw_layouts.pages.push(PageDetections {
                page_index,
                regions: raw.clone(),
            });

            self.cancel.check()?;
            let (mut regions, report) = consolidator.consolidate(&page.info, &raw, &mut ids);
            merged.report.absorb(&report);
            self.refine(page, &mut regions, &mut errors);
            let parents = parent_indices(&regions, &ids);

            let items: Vec<OrderItem> = regions
                .iter()
                .zip(&parents)
                .map(|(region, parent)| {
                    let item = OrderItem::new(region.bbox, region.role);
                    match parent {
                        Some(p) => item.with_parent(*p),
                        None => item,
                    }
                })
                .collect();
            let context = ReadingOrderContext::new()
                .with_page(page_index)
                .with_size(page.info.pixel_width as f32, page.info.pixel_height as f32);
            let order = strategy.apply(&items, &context)?;
            let final_id = |index: usize| -> Result<String> {
                ids.final_id(regions[index].id)
                    .map(str::to_string)
                    .ok_or_else(|| Error::Catalog(format!("page {}: region {} has no live id", page_index, index)))
            };
            reading_order.push(order.iter().map(|&i| final_id(i)).collect::<Result<Vec<_>>>()?);

            merged.pages.push(MergedPage {
                page_index,
                regions: regions
                    .iter()
                    .enumerate()
                    .map(|(i, region)| {
                        Ok(MergedRegion {
                            id: final_id(i)?,
                            role: region.role,
                            label: region.label.clone(),
                            bbox: region.bbox,
                            score: region.score,
                            parent_id: parents[i].map(final_id).transpose()?,
                        })
                    })
                    .collect::<Result<Vec<_>>>()?,
            });

            self.cancel.check()?;
            let spans = match doc.text_spans(page_index) {
                Ok(spans) => spans,
                Err(e) => {
                    log::warn!("page {}: no embedded text: {}", page_index, e);
                    errors.push(ErrorRecord {
                        stage: Stage::Extract,
                        page_index: Some(page_index),
                        block_id: None,
                        message: e.to_string(),
                    });
                    Vec::new()
                },
            };

            let mut sequence = order.clone();
            let mut decorative: Vec<usize> = (0..regions.len()).filter(|i| !order.contains(i)).collect();
            decorative.sort_by(|&a, &b| regions[a].bbox.lexicographic_cmp(&regions[b].bbox).then(a.cmp(&b)));
            sequence.extend(decorative);

            for index in sequence {
                let region = &regions[index];
                let mut block = Block::new(final_id(index)?, page_index, region.role, region.bbox)
                    .with_score(region.score);
                block.metadata.label = Some(region.label.clone());
                block.metadata.parent_id = parents[index].map(final_id).transpose()?;
                block.metadata.merged_from = ids.merged_from(region.id).to_vec();
                block.metadata.caption_candidates = region.caption_candidates.clone();

                let mut request = BlockRequest::new(&page.info, &page.image, &spans, region.bbox, region.role)
                    .with_caption_candidates(&region.caption_candidates);
                if block.metadata.parent_id.is_some() {
                    request = request.as_caption();
                }
                let extracted = self.extractor.extract(&request);
                log::debug!(
                    "{}: {} via {}",
                    block.id,
                    block.role,
                    extracted.method.as_str()
                );
                if matches!(extracted.method, ExtractionMethod::Error | ExtractionMethod::Timeout) {
                    errors.push(ErrorRecord {
                        stage: Stage::Extract,
                        page_index: Some(page_index),
                        block_id: Some(block.id.clone()),
                        message: extracted.error.clone().unwrap_or_default(),
                    });
                }
                block.text = extracted.text.clone();
                extracted.apply_to(&mut block.metadata);
                blocks.push(block);
            }
            log::info!(
                "page {}: {} raw, {} blocks, {} in reading order",
                page_index,
                report.raw,
                regions.len(),
                order.len()
            );
        }

        let mut metadata = CatalogMetadata {
            doc_id: Some(doc_id.to_string()),
            source_path: source_path.to_string(),
            detection_dpi: config.detection_dpi,
            profile: config.profile,
            pipeline_version: PIPELINE_VERSION.to_string(),
            created_at: config.record_timestamp.then(|| chrono::Utc::now().to_rfc3339()),
            id_transformations: Some(ids.report()),
            errors,
            ..Default::default()
        };
        metadata
            .extra
            .insert("detector".to_string(), serde_json::Value::from(self.detector.name()));
        metadata
            .extra
            .insert("reading_order_strategy".to_string(), serde_json::Value::from(strategy.name()));
        metadata
            .extra
            .insert("consolidation".to_string(), serde_json::to_value(merged.report)?);

        let catalog = Catalog {
            metadata,
            pages: pages.iter().map(|p| p.info.clone()).collect(),
            blocks,
            reading_order,
        };

        if let Some(paths) = paths {
            if config.save_intermediate_states {
                write_json(&paths.raw_layouts(), &raw_layouts)?;
                write_json(&paths.merged_boxes(), &merged)?;
            }
            if config.create_visualizations {
                let visualizer = DebugVisualizer::default();
                for page in &pages {
                    visualizer.render_page_to_file(
                        &page.image,
                        &catalog,
                        page.info.page_index,
                        paths.visualization(page.info.page_index),
                    )?;
                }
            }
        }

        Ok(PipelineOutput {
            catalog,
            pages,
            raw_layouts,
            merged,
        })
    }

    /// Run the detector under its time budget. A timeout leaves the page empty.
    fn detect(&self, page: &RenderedPage, errors: &mut Vec<ErrorRecord>) -> Result<Vec<RawRegion>> {
        let page_index = page.info.page_index;
        let detector = Arc::clone(&self.detector);
        let image = page.image.clone();
        match run_with_timeout(self.config.detector_timeout, "detector", page_index, move |_| {
            detector.detect(page_index, &image)
        }) {
            Ok(regions) => {
                log::debug!("page {}: detector returned {} regions", page_index, regions.len());
                Ok(regions)
            },
            Err(err @ Error::Timeout { .. }) => {
                errors.push(ErrorRecord {
                    stage: Stage::Detect,
                    page_index: Some(page_index),
                    block_id: None,
                    message: err.to_string(),
                });
                Ok(Vec::new())
            },
            Err(err) => Err(err),
        }
    }

    /// Ask the refiner for corrections; its failures never fail the document.
    fn refine(&self, page: &RenderedPage, regions: &mut [Region], errors: &mut Vec<ErrorRecord>) {
        let Some((refiner, limiter)) = &self.refiner else {
            return;
        };
        let page_index = page.info.page_index;
        match limiter.run(|| refiner.propose(&page.info, &page.image, regions)) {
            Ok(proposals) => {
                let rejected = apply_proposals(&page.info, regions, &proposals, self.config.merge_threshold);
                log::info!(
                    "page {}: {} accepted {} of {} proposals",
                    page_index,
                    refiner.name(),
                    proposals.len() - rejected.len(),
                    proposals.len()
                );
            },
            Err(err) => {
                log::warn!("page {}: refinement failed: {}", page_index, err);
                errors.push(ErrorRecord {
                    stage: Stage::Refine,
                    page_index: Some(page_index),
                    block_id: None,
                    message: err.to_string(),
                });
            },
        }
    }
}

/// Index of each region's live parent within `regions`.
fn parent_indices(regions: &[Region], ids: &IdManager) -> Vec<Option<usize>> {
    regions
        .iter()
        .map(|region| {
            let parent = ids.resolve(region.parent?)?;
            regions.iter().position(|r| r.id == parent)
        })
        .collect()
}
