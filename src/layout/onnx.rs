//! ONNX layout detector (YOLO-style exports) via ONNX Runtime.
//!
//! Two output layouts are understood:
//!
//! - `[1, N, 6]`: rows of `x1, y1, x2, y2, score, class` (exports with NMS baked in)
//! - `[1, 4 + C, A]`: raw YOLOv8 heads, `cx, cy, w, h` followed by `C` class scores
//!
//! Inputs are letterboxed to a square of `input_size` and normalized to [0, 1].

use std::path::Path;
use std::sync::Mutex;

use image::{imageops, Rgb, RgbImage};
use ndarray::Array4;
use ort::session::Session;
use ort::value::TensorRef;

use crate::config::Profile;
use crate::error::{Error, Result};
use crate::geometry::BBox;

use super::{LabelMap, LayoutDetector, RawRegion};

/// Letterbox padding value (YOLO convention).
const PAD_VALUE: u8 = 114;

/// Scores below this never leave the decoder; the pipeline applies the real threshold.
const DECODE_FLOOR: f32 = 0.05;

/// Layout detector backed by an ONNX model.
pub struct OnnxLayoutDetector {
    session: Mutex<Session>,
    labels: LabelMap,
    input_size: u32,
    name: String,
}

impl std::fmt::Debug for OnnxLayoutDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnnxLayoutDetector")
            .field("name", &self.name)
            .field("input_size", &self.input_size)
            .finish()
    }
}

struct Letterbox {
    scale: f32,
    pad_x: f32,
    pad_y: f32,
}

impl OnnxLayoutDetector {
    /// Load a model for the given profile's label map.
    pub fn from_file(model_path: &Path, profile: Profile, input_size: u32) -> Result<Self> {
        log::info!("Loading layout model from {}", model_path.display());
        let session = Session::builder()
            .map_err(|e| Error::Detector(e.to_string()))?
            .commit_from_file(model_path)
            .map_err(|e| Error::Detector(format!("{}: {}", model_path.display(), e)))?;
        let name = model_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());
        Ok(Self {
            session: Mutex::new(session),
            labels: LabelMap::for_profile(profile),
            input_size,
            name,
        })
    }

    fn preprocess(&self, image: &RgbImage) -> (Array4<f32>, Letterbox) {
        let size = self.input_size;
        let scale = (size as f32 / image.width() as f32).min(size as f32 / image.height() as f32);
        let new_w = ((image.width() as f32 * scale).round() as u32).clamp(1, size);
        let new_h = ((image.height() as f32 * scale).round() as u32).clamp(1, size);
        let resized = imageops::resize(image, new_w, new_h, imageops::FilterType::Triangle);

        let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE; 3]));
        let pad_x = (size - new_w) / 2;
        let pad_y = (size - new_h) / 2;
        imageops::replace(&mut canvas, &resized, i64::from(pad_x), i64::from(pad_y));

        let n = size as usize;
        let mut input = Array4::<f32>::zeros((1, 3, n, n));
        for (x, y, pixel) in canvas.enumerate_pixels() {
            for c in 0..3 {
                input[[0, c, y as usize, x as usize]] = f32::from(pixel[c]) / 255.0;
            }
        }
        (
            input,
            Letterbox {
                scale,
                pad_x: pad_x as f32,
                pad_y: pad_y as f32,
            },
        )
    }

    fn region(&self, corners: [f32; 4], score: f32, class_id: u32, lb: &Letterbox) -> Option<RawRegion> {
        let label = self.labels.label(class_id)?;
        let unmap = |v: f32, pad: f32| (v - pad) / lb.scale;
        let bbox = BBox::new(
            unmap(corners[0], lb.pad_x),
            unmap(corners[1], lb.pad_y),
            unmap(corners[2], lb.pad_x),
            unmap(corners[3], lb.pad_y),
        );
        bbox.is_valid().then(|| RawRegion::new(bbox, label, score.clamp(0.0, 1.0)))
    }

    fn decode(&self, dims: &[usize], data: &[f32], lb: &Letterbox) -> Result<Vec<RawRegion>> {
        if dims.len() != 3 {
            return Err(Error::Detector(format!(
                "expected a 3D output tensor, got shape {:?}",
                dims
            )));
        }
        let mut regions = Vec::new();
        if dims[2] == 6 {
            for row in data.chunks_exact(6).take(dims[1]) {
                if row[4] < DECODE_FLOOR {
                    continue;
                }
                let corners = [row[0], row[1], row[2], row[3]];
                if let Some(r) = self.region(corners, row[4], row[5].max(0.0) as u32, lb) {
                    regions.push(r);
                }
            }
        } else if dims[1] > 4 {
            let features = dims[1];
            let anchors = dims[2];
            let at = |feature: usize, anchor: usize| data[feature * anchors + anchor];
            for anchor in 0..anchors {
                let (mut best_class, mut best_score) = (0u32, 0.0f32);
                for class in 0..features - 4 {
                    let s = at(4 + class, anchor);
                    if s > best_score {
                        best_score = s;
                        best_class = class as u32;
                    }
                }
                if best_score < DECODE_FLOOR {
                    continue;
                }
                let (cx, cy, w, h) = (at(0, anchor), at(1, anchor), at(2, anchor), at(3, anchor));
                let corners = [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0];
                if let Some(r) = self.region(corners, best_score, best_class, lb) {
                    regions.push(r);
                }
            }
        } else {
            return Err(Error::Detector(format!("unsupported output shape {:?}", dims)));
        }
        Ok(regions)
    }
}

impl LayoutDetector for OnnxLayoutDetector {
    fn detect(&self, page_index: usize, image: &RgbImage) -> Result<Vec<RawRegion>> {
        let (input, letterbox) = self.preprocess(image);
        let tensor = TensorRef::from_array_view(input.view())
            .map_err(|e| Error::Detector(e.to_string()))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::Detector("session lock poisoned".to_string()))?;
        let outputs = session
            .run(ort::inputs![tensor])
            .map_err(|e| Error::Detector(format!("page {}: {}", page_index, e)))?;
        let (shape, data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::Detector(e.to_string()))?;
        let dims: Vec<usize> = shape.iter().map(|&d| d.max(0) as usize).collect();

        let regions = self.decode(&dims, data, &letterbox)?;
        log::debug!("page {}: {} raw regions from {}", page_index, regions.len(), self.name);
        Ok(regions)
    }

    fn name(&self) -> &str {
        &self.name
    }
}
