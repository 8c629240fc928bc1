//! Per-block text extraction.
//!
//! Two extractors are available for every block:
//!
//! - [`embedded::EmbeddedExtractor`]: the PDF's own text spans inside the block
//! - the raster path: [`raster::prepare_crop`] followed by an [`OcrEngine`]
//!
//! [`TextExtractor`] picks between them. Embedded text is used unless it is
//! empty or its confidence is below [`EMBEDDED_MIN_CONFIDENCE`]; then OCR
//! runs on the block crop. Embedded text below [`SPACING_REPAIR_BELOW`] is
//! passed through the spacing repairer when text processing is enabled.
//!
//! Failures never propagate: a block whose OCR fails or times out gets
//! `text = None` and the cause in its metadata.

pub mod embedded;
pub mod raster;

use std::sync::Arc;
use std::time::Duration;

use image::RgbImage;

pub use embedded::{EmbeddedExtractor, EmbeddedText};

use crate::catalog::{BlockMetadata, BlockRole, CaptionCandidate, ExtractionMethod, PageInfo};
use crate::config::IngestConfig;
use crate::document::TextSpan;
use crate::error::Error;
use crate::geometry::BBox;
use crate::ocr::OcrEngine;
use crate::pipeline::timeout::run_with_timeout;
use crate::text::{normalize, SpacingRepairer};

/// Embedded text below this confidence falls back to OCR.
pub const EMBEDDED_MIN_CONFIDENCE: f32 = 0.6;

/// Embedded text below this confidence gets spacing repair.
pub const SPACING_REPAIR_BELOW: f32 = 0.9;

/// Extra margin in pixels around an OCR crop.
const OCR_MARGIN: f32 = 2.0;

/// Everything needed to extract one block.
#[derive(Debug, Clone, Copy)]
pub struct BlockRequest<'a> {
    /// Page geometry
    pub page: &'a PageInfo,
    /// Page raster at the detection DPI
    pub image: &'a RgbImage,
    /// Embedded spans of the page
    pub spans: &'a [TextSpan],
    /// Block box in pixels
    pub bbox: BBox,
    /// Block role
    pub role: BlockRole,
    /// The block is a caption kept as a child of a figure or table
    pub is_caption: bool,
    /// Captions folded into this container
    pub caption_candidates: &'a [CaptionCandidate],
}

impl<'a> BlockRequest<'a> {
    /// Request for a top-level block.
    pub fn new(
        page: &'a PageInfo,
        image: &'a RgbImage,
        spans: &'a [TextSpan],
        bbox: BBox,
        role: BlockRole,
    ) -> Self {
        Self {
            page,
            image,
            spans,
            bbox,
            role,
            is_caption: false,
            caption_candidates: &[],
        }
    }

    /// Mark as a caption child.
    pub fn as_caption(mut self) -> Self {
        self.is_caption = true;
        self
    }

    /// Attach folded caption candidates.
    pub fn with_caption_candidates(mut self, candidates: &'a [CaptionCandidate]) -> Self {
        self.caption_candidates = candidates;
        self
    }
}

/// Extraction outcome of one block.
#[derive(Debug, Clone, PartialEq)]
pub struct BlockText {
    /// Text; `None` when no text is expected or extraction failed
    pub text: Option<String>,
    /// How the text was obtained
    pub method: ExtractionMethod,
    /// Confidence of the extractor that produced the text
    pub confidence: Option<f32>,
    /// Failure cause for `Timeout` and `Error`
    pub error: Option<String>,
    /// Spacing repair changed the text
    pub spacing_repaired: bool,
}

impl BlockText {
    /// No text expected.
    pub fn none() -> Self {
        Self {
            text: None,
            method: ExtractionMethod::None,
            confidence: None,
            error: None,
            spacing_repaired: false,
        }
    }

    fn failed(method: ExtractionMethod, error: String) -> Self {
        Self {
            method,
            error: Some(error),
            ..Self::none()
        }
    }

    /// Copy the outcome into a block's metadata.
    pub fn apply_to(&self, metadata: &mut BlockMetadata) {
        metadata.extraction_method = Some(self.method);
        metadata.extraction_confidence = self.confidence;
        metadata.extraction_error = self.error.clone();
        metadata.spacing_repaired = self.spacing_repaired;
    }
}

/// Chooses and runs the extractors for each block.
pub struct TextExtractor {
    embedded: EmbeddedExtractor,
    ocr: Option<Arc<dyn OcrEngine>>,
    repairer: SpacingRepairer,
    apply_text_processing: bool,
    ocr_timeout: Option<Duration>,
}

impl std::fmt::Debug for TextExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextExtractor")
            .field("ocr", &self.ocr.as_ref().map(|e| e.name().to_string()))
            .field("apply_text_processing", &self.apply_text_processing)
            .field("ocr_timeout", &self.ocr_timeout)
            .finish()
    }
}

impl TextExtractor {
    /// Embedded-only extractor configured from `config`.
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            embedded: EmbeddedExtractor::new(),
            ocr: None,
            repairer: SpacingRepairer::new().with_preserve_terms(&config.preserve_terms),
            apply_text_processing: config.apply_text_processing,
            ocr_timeout: config.ocr_timeout,
        }
    }

    /// Enable the raster fallback.
    pub fn with_ocr(mut self, engine: Arc<dyn OcrEngine>) -> Self {
        self.ocr = Some(engine);
        self
    }

    /// Is an OCR engine available?
    pub fn has_ocr(&self) -> bool {
        self.ocr.is_some()
    }

    /// Extract one block.
    pub fn extract(&self, request: &BlockRequest<'_>) -> BlockText {
        if request.role.is_decorative() {
            return BlockText::none();
        }
        if request.role.is_container() {
            return self.container_text(request);
        }

        let region = request.page.to_points(&request.bbox);
        let embedded = self.embedded.extract(request.spans, &region);
        if request.is_caption {
            return self.from_embedded(embedded);
        }
        if embedded.has_text() && embedded.confidence >= EMBEDDED_MIN_CONFIDENCE {
            return self.from_embedded(embedded);
        }

        // Without OCR the text layer is all there is, even when empty.
        match &self.ocr {
            Some(engine) => self.ocr_fallback(Arc::clone(engine), request, embedded),
            None => self.from_embedded(embedded),
        }
    }

    /// Figures and tables carry the text of their folded captions, if any.
    fn container_text(&self, request: &BlockRequest<'_>) -> BlockText {
        let mut parts = Vec::new();
        let mut confidence = 1.0f32;
        for candidate in request.caption_candidates {
            let region = request.page.to_points(&candidate.bbox);
            let caption = self.embedded.extract(request.spans, &region);
            if caption.has_text() {
                confidence = confidence.min(caption.confidence);
                parts.push(caption.text);
            }
        }
        if parts.is_empty() {
            return BlockText::none();
        }
        self.from_embedded(EmbeddedText {
            text: parts.join(" "),
            confidence,
            span_count: parts.len(),
        })
    }

    fn from_embedded(&self, embedded: EmbeddedText) -> BlockText {
        let mut text = embedded.text;
        let mut spacing_repaired = false;
        if self.apply_text_processing
            && embedded.confidence < SPACING_REPAIR_BELOW
            && !text.trim().is_empty()
        {
            let repaired = self.repairer.repair(&text);
            if repaired != text {
                log::debug!("spacing repair: {:?} -> {:?}", text, repaired);
                text = repaired;
                spacing_repaired = true;
            }
        }
        BlockText {
            text: Some(text),
            method: ExtractionMethod::Embedded,
            confidence: Some(embedded.confidence),
            error: None,
            spacing_repaired,
        }
    }

    fn ocr_fallback(
        &self,
        engine: Arc<dyn OcrEngine>,
        request: &BlockRequest<'_>,
        embedded: EmbeddedText,
    ) -> BlockText {
        let page_index = request.page.page_index;
        let Some(crop) = raster::prepare_crop(request.image, &request.bbox, OCR_MARGIN) else {
            return BlockText::failed(
                ExtractionMethod::Error,
                format!("empty crop for box {:?}", request.bbox),
            );
        };
        log::debug!(
            "page {}: OCR on {}x{} crop (embedded confidence {:.2})",
            page_index,
            crop.width(),
            crop.height(),
            embedded.confidence
        );

        let result = run_with_timeout(self.ocr_timeout, "ocr", page_index, move |_| {
            engine.recognize(&crop)
        });
        match result {
            Ok(output) if !output.text.trim().is_empty() => BlockText {
                text: Some(normalize(output.text.trim())),
                method: ExtractionMethod::Ocr,
                confidence: Some(output.confidence),
                error: None,
                spacing_repaired: false,
            },
            Ok(_) if embedded.has_text() => BlockText {
                method: ExtractionMethod::Mixed,
                ..self.from_embedded(embedded)
            },
            Ok(output) => BlockText {
                text: Some(String::new()),
                method: ExtractionMethod::Ocr,
                confidence: Some(output.confidence),
                error: None,
                spacing_repaired: false,
            },
            Err(err @ Error::Timeout { .. }) => {
                log::warn!("{}", err);
                BlockText::failed(ExtractionMethod::Timeout, err.to_string())
            },
            Err(err) => {
                log::warn!("page {}: OCR failed: {}", page_index, err);
                BlockText::failed(ExtractionMethod::Error, err.to_string())
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ocr::OcrOutput;
    use image::{GrayImage, Rgb};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedOcr {
        text: &'static str,
        calls: AtomicUsize,
    }

    impl ScriptedOcr {
        fn new(text: &'static str) -> Arc<Self> {
            Arc::new(Self {
                text,
                calls: AtomicUsize::new(0),
            })
        }
    }

    impl OcrEngine for ScriptedOcr {
        fn recognize(&self, _image: &GrayImage) -> crate::Result<OcrOutput> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(OcrOutput {
                text: self.text.to_string(),
                confidence: 0.8,
            })
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    struct FailingOcr;

    impl OcrEngine for FailingOcr {
        fn recognize(&self, _image: &GrayImage) -> crate::Result<OcrOutput> {
            Err(Error::Ocr("engine crashed".to_string()))
        }

        fn name(&self) -> &str {
            "failing"
        }
    }

    struct SlowOcr;

    impl OcrEngine for SlowOcr {
        fn recognize(&self, _image: &GrayImage) -> crate::Result<OcrOutput> {
            std::thread::sleep(Duration::from_millis(500));
            Ok(OcrOutput::empty())
        }

        fn name(&self) -> &str {
            "slow"
        }
    }

    // 72 dpi: pixels and points coincide.
    fn page() -> PageInfo {
        PageInfo::from_points(0, 600.0, 400.0, 72)
    }

    fn image() -> RgbImage {
        RgbImage::from_pixel(600, 400, Rgb([255, 255, 255]))
    }

    fn config() -> IngestConfig {
        IngestConfig::default()
    }

    #[test]
    fn test_confident_embedded_text_is_kept() {
        let ocr = ScriptedOcr::new("ignored");
        let extractor = TextExtractor::new(&config()).with_ocr(ocr.clone());
        let spans = vec![TextSpan::new("Clinical results", BBox::new(10.0, 10.0, 110.0, 22.0))];
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &spans, BBox::new(8.0, 8.0, 112.0, 24.0), BlockRole::Text);
        let out = extractor.extract(&request);
        assert_eq!(out.text.as_deref(), Some("Clinical results"));
        assert_eq!(out.method, ExtractionMethod::Embedded);
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_glued_text_is_repaired() {
        let extractor = TextExtractor::new(&config());
        let spans = vec![TextSpan::new(
            "Thesehighlightsdonotincludeall",
            BBox::new(10.0, 10.0, 210.0, 22.0),
        )];
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &spans, BBox::new(10.0, 10.0, 210.0, 22.0), BlockRole::Text);
        let out = extractor.extract(&request);
        assert_eq!(out.text.as_deref(), Some("These highlights do not include all"));
        assert_eq!(out.method, ExtractionMethod::Embedded);
        assert!(out.confidence.unwrap() < 0.9);
        assert!(out.spacing_repaired);
    }

    #[test]
    fn test_repair_disabled() {
        let extractor = TextExtractor::new(&config().with_text_processing(false));
        let spans = vec![TextSpan::new(
            "Thesehighlightsdonotincludeall",
            BBox::new(10.0, 10.0, 210.0, 22.0),
        )];
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &spans, BBox::new(10.0, 10.0, 210.0, 22.0), BlockRole::Text);
        let out = extractor.extract(&request);
        assert_eq!(out.text.as_deref(), Some("Thesehighlightsdonotincludeall"));
        assert!(!out.spacing_repaired);
    }

    #[test]
    fn test_sparse_embedded_text_falls_back_to_ocr() {
        let ocr = ScriptedOcr::new("Dosage and administration");
        let extractor = TextExtractor::new(&config()).with_ocr(ocr.clone());
        let spans = vec![TextSpan::new("Dos", BBox::new(10.0, 10.0, 30.0, 22.0))];
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &spans, BBox::new(10.0, 10.0, 410.0, 130.0), BlockRole::Text);
        let out = extractor.extract(&request);
        assert_eq!(out.method, ExtractionMethod::Ocr);
        assert_eq!(out.text.as_deref(), Some("Dosage and administration"));
        assert_eq!(out.confidence, Some(0.8));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_empty_ocr_keeps_embedded_as_mixed() {
        let extractor = TextExtractor::new(&config()).with_ocr(ScriptedOcr::new("  "));
        let spans = vec![TextSpan::new("Dos", BBox::new(10.0, 10.0, 30.0, 22.0))];
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &spans, BBox::new(10.0, 10.0, 410.0, 130.0), BlockRole::Text);
        let out = extractor.extract(&request);
        assert_eq!(out.method, ExtractionMethod::Mixed);
        assert_eq!(out.text.as_deref(), Some("Dos"));
    }

    #[test]
    fn test_ocr_failure_is_recorded() {
        let extractor = TextExtractor::new(&config()).with_ocr(Arc::new(FailingOcr));
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &[], BBox::new(10.0, 10.0, 200.0, 60.0), BlockRole::Title);
        let out = extractor.extract(&request);
        assert_eq!(out.method, ExtractionMethod::Error);
        assert_eq!(out.text, None);
        assert!(out.error.unwrap().contains("engine crashed"));
    }

    #[test]
    fn test_ocr_timeout_is_recorded() {
        let config = config().with_timeouts(None, Some(Duration::from_millis(20)));
        let extractor = TextExtractor::new(&config).with_ocr(Arc::new(SlowOcr));
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &[], BBox::new(10.0, 10.0, 200.0, 60.0), BlockRole::Text);
        let out = extractor.extract(&request);
        assert_eq!(out.method, ExtractionMethod::Timeout);
        assert_eq!(out.text, None);
        assert!(out.error.is_some());
    }

    #[test]
    fn test_figure_without_captions_has_no_text() {
        let extractor = TextExtractor::new(&config()).with_ocr(ScriptedOcr::new("chart"));
        let spans = vec![TextSpan::new("axis label", BBox::new(20.0, 20.0, 80.0, 30.0))];
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &spans, BBox::new(10.0, 10.0, 300.0, 300.0), BlockRole::Figure);
        let out = extractor.extract(&request);
        assert_eq!(out, BlockText::none());
    }

    #[test]
    fn test_figure_takes_folded_caption_text() {
        let extractor = TextExtractor::new(&config());
        let spans = vec![
            TextSpan::new("axis", BBox::new(20.0, 20.0, 50.0, 30.0)),
            TextSpan::new("Figure 1. Response rates", BBox::new(20.0, 280.0, 180.0, 292.0)),
        ];
        let candidates = vec![CaptionCandidate {
            bbox: BBox::new(18.0, 278.0, 182.0, 294.0),
            score: 0.7,
        }];
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &spans, BBox::new(10.0, 10.0, 300.0, 300.0), BlockRole::Figure)
            .with_caption_candidates(&candidates);
        let out = extractor.extract(&request);
        assert_eq!(out.text.as_deref(), Some("Figure 1. Response rates"));
        assert_eq!(out.method, ExtractionMethod::Embedded);
    }

    #[test]
    fn test_caption_child_never_uses_ocr() {
        let ocr = ScriptedOcr::new("ocr text");
        let extractor = TextExtractor::new(&config()).with_ocr(ocr.clone());
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &[], BBox::new(10.0, 10.0, 200.0, 40.0), BlockRole::Text)
            .as_caption();
        let out = extractor.extract(&request);
        assert_eq!(out.method, ExtractionMethod::Embedded);
        assert_eq!(out.text.as_deref(), Some(""));
        assert_eq!(ocr.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_empty_text_layer_without_ocr_is_embedded() {
        let extractor = TextExtractor::new(&config());
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &[], BBox::new(10.0, 10.0, 200.0, 60.0), BlockRole::Text);
        let out = extractor.extract(&request);
        assert_eq!(out.method, ExtractionMethod::Embedded);
        assert_eq!(out.text.as_deref(), Some(""));
        assert_eq!(out.confidence, Some(0.0));
        assert!(!out.spacing_repaired);
    }

    #[test]
    fn test_separator_is_skipped() {
        let extractor = TextExtractor::new(&config());
        let (page, image) = (page(), image());
        let request = BlockRequest::new(&page, &image, &[], BBox::new(0.0, 100.0, 600.0, 104.0), BlockRole::Separator);
        assert_eq!(extractor.extract(&request), BlockText::none());
    }

    #[test]
    fn test_metadata_is_filled() {
        let mut metadata = BlockMetadata::default();
        let text = BlockText {
            text: Some("x".to_string()),
            method: ExtractionMethod::Ocr,
            confidence: Some(0.5),
            error: None,
            spacing_repaired: false,
        };
        text.apply_to(&mut metadata);
        assert_eq!(metadata.extraction_method, Some(ExtractionMethod::Ocr));
        assert_eq!(metadata.extraction_confidence, Some(0.5));
    }
}
