/// YOLO face detector using ONNX Runtime via `ort`.
///
/// Letterbox preprocessing, inference, confidence filtering and NMS. When the
/// model emits the five pose keypoints, a coarse face outline is derived from
/// them for contour masks.
use std::path::Path;

use crate::detection::domain::face_detector::FaceDetector;
use crate::profile::capability_profile::DetectorPerformanceMode;
use crate::shared::error::BoxError;
use crate::shared::frame::Frame;
use crate::shared::region::{FaceRegion, Point};

/// Fallback input resolution when the model's input shape is dynamic.
const DEFAULT_INPUT_SIZE: u32 = 640;

const NMS_IOU_THRESH: f64 = 0.45;

/// 5 landmarks x (x, y, conf).
const NUM_KEYPOINT_VALUES: usize = 15;

const KEYPOINT_CONF_THRESH: f64 = 0.5;

/// Letterbox padding value (YOLO convention).
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxYoloDetector {
    session: ort::session::Session,
    confidence: f64,
    input_size: u32,
}

impl OnnxYoloDetector {
    /// Loads a YOLO ONNX model. The input resolution is read from the model's
    /// NCHW input shape, falling back to 640.
    pub fn new(model_path: &Path, confidence: f64) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(preferred_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| match input.dtype() {
                ort::value::ValueType::Tensor { shape, .. } if shape.len() >= 4 && shape[2] > 0 => {
                    Some(shape[2] as u32)
                }
                _ => None,
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::debug!(
            "Loaded YOLO model {} (input {input_size}px, confidence {confidence})",
            model_path.display()
        );

        Ok(Self {
            session,
            confidence,
            input_size,
        })
    }

    /// Builds the detector configured for a performance mode.
    pub fn for_mode(
        model_path: &Path,
        mode: DetectorPerformanceMode,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        Self::new(model_path, mode.confidence_threshold())
    }
}

impl FaceDetector for OnnxYoloDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, BoxError> {
        if frame.channels() != 3 {
            return Err(format!("expected RGB frame, got {} channels", frame.channels()).into());
        }

        let letterboxed = letterbox(frame, self.input_size)?;

        let input_value = ort::value::Tensor::from_array(letterboxed.tensor.clone())?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("YOLO model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();
        if shape.len() != 3 {
            return Err(format!("Unexpected YOLO output shape: {shape:?}").into());
        }

        // Either [1, features, detections] or [1, detections, features].
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        let data = tensor.as_slice().ok_or("YOLO output is not contiguous")?;

        let mut raw = Vec::new();
        let mut row = vec![0.0f32; num_feats];
        for i in 0..num_dets {
            for (f, value) in row.iter_mut().enumerate() {
                *value = if transposed {
                    data[f * num_dets + i]
                } else {
                    data[i * num_feats + f]
                };
            }
            if let Some(det) = parse_row(&row, self.confidence, &letterboxed) {
                raw.push(det);
            }
        }

        let kept = nms(&mut raw, NMS_IOU_THRESH);
        let fw = frame.width() as f64;
        let fh = frame.height() as f64;
        Ok(kept.into_iter().map(|d| d.into_region(fw, fh)).collect())
    }
}

fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

struct Letterboxed {
    tensor: ndarray::Array4<f32>,
    scale: f64,
    pad_x: f64,
    pad_y: f64,
}

impl Letterboxed {
    fn to_frame(&self, x: f64, y: f64) -> Point {
        ((x - self.pad_x) / self.scale, (y - self.pad_y) / self.scale)
    }
}

/// Nearest-neighbour resize into a padded `target` x `target` NCHW tensor.
fn letterbox(frame: &Frame, target: u32) -> Result<Letterboxed, ndarray::ShapeError> {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let size = target as usize;

    let scale = (target as f64 / fw).min(target as f64 / fh);
    let new_w = ((fw * scale).round() as usize).min(size);
    let new_h = ((fh * scale).round() as usize).min(size);
    let pad_x = (size - new_w) / 2;
    let pad_y = (size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, size, size), PAD_VALUE);
    let src = frame.as_ndarray()?;
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;

    for y in 0..new_h {
        let sy = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w {
            let sx = ((x as f64 / scale) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, pad_y + y, pad_x + x]] = src[[sy, sx, c]] as f32 / 255.0;
            }
        }
    }

    Ok(Letterboxed {
        tensor,
        scale,
        pad_x: pad_x as f64,
        pad_y: pad_y as f64,
    })
}

// ---------------------------------------------------------------------------
// Postprocessing
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDetection {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
    /// Visible landmarks only, in frame coordinates.
    landmarks: Vec<Point>,
}

impl RawDetection {
    fn bbox(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Clamps to the frame and derives an outline when landmarks are present.
    fn into_region(self, frame_w: f64, frame_h: f64) -> FaceRegion {
        let x1 = self.x1.clamp(0.0, frame_w);
        let y1 = self.y1.clamp(0.0, frame_h);
        let x2 = self.x2.clamp(0.0, frame_w);
        let y2 = self.y2.clamp(0.0, frame_h);
        let region = FaceRegion::new(x1, y1, x2 - x1, y2 - y1, self.confidence);
        if self.landmarks.len() >= 3 {
            let outline = face_outline(&region, &self.landmarks);
            region.with_contour(outline)
        } else {
            region
        }
    }
}

/// `[cx, cy, w, h, conf, kp0_x, kp0_y, kp0_conf, ...]` in letterbox space.
fn parse_row(row: &[f32], min_confidence: f64, lb: &Letterboxed) -> Option<RawDetection> {
    if row.len() < 5 {
        return None;
    }
    let confidence = row[4] as f64;
    if confidence < min_confidence {
        return None;
    }

    let (cx, cy, w, h) = (row[0] as f64, row[1] as f64, row[2] as f64, row[3] as f64);
    let (x1, y1) = lb.to_frame(cx - w / 2.0, cy - h / 2.0);
    let (x2, y2) = lb.to_frame(cx + w / 2.0, cy + h / 2.0);

    let landmarks = if row.len() >= 5 + NUM_KEYPOINT_VALUES {
        row[5..5 + NUM_KEYPOINT_VALUES]
            .chunks_exact(3)
            .filter(|kp| kp[2] as f64 >= KEYPOINT_CONF_THRESH)
            .map(|kp| lb.to_frame(kp[0] as f64, kp[1] as f64))
            .collect()
    } else {
        Vec::new()
    };

    Some(RawDetection {
        x1,
        y1,
        x2,
        y2,
        confidence,
        landmarks,
    })
}

/// Twelve-point oval through the box, pulled towards the landmark centroid so
/// turned heads get an off-centre outline.
fn face_outline(region: &FaceRegion, landmarks: &[Point]) -> Vec<Point> {
    let n = landmarks.len() as f64;
    let lx = landmarks.iter().map(|p| p.0).sum::<f64>() / n;
    let ly = landmarks.iter().map(|p| p.1).sum::<f64>() / n;
    let (bx, by) = region.center();
    let cx = (bx + lx) / 2.0;
    let cy = (by + ly) / 2.0;
    let rx = region.width / 2.0;
    let ry = region.height / 2.0;

    (0..12)
        .map(|i| {
            let angle = i as f64 * std::f64::consts::TAU / 12.0;
            (cx + rx * angle.cos(), cy + ry * angle.sin())
        })
        .collect()
}

/// Greedy NMS: highest confidence first, suppress overlaps above `iou_thresh`.
fn nms(dets: &mut [RawDetection], iou_thresh: f64) -> Vec<RawDetection> {
    dets.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<RawDetection> = Vec::new();
    for det in dets.iter() {
        if keep
            .iter()
            .all(|k| bbox_iou(&k.bbox(), &det.bbox()) <= iou_thresh)
        {
            keep.push(det.clone());
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let inter = (a[2].min(b[2]) - a[0].max(b[0])).max(0.0)
        * (a[3].min(b[3]) - a[1].max(b[1])).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}
