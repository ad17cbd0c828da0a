#![cfg(feature = "backend-tract")]

use std::path::Path;

use anyhow::{anyhow, Context, Result};
use image::{imageops::FilterType, RgbImage};
use tract_onnx::prelude::*;

use crate::detect::backend::DetectorBackend;
use crate::detect::classify::{Classification, Classifier, WASTE_CATEGORIES};
use crate::detect::result::{non_maximum_suppression, Detection};
use crate::BBox;

type Plan = TypedRunnableModel<TypedModel>;

fn load_plan(model_path: &Path, width: u32, height: u32) -> Result<Plan> {
    tract_onnx::onnx()
        .model_for_path(model_path)
        .with_context(|| format!("failed to load ONNX model from {}", model_path.display()))?
        .with_input_fact(
            0,
            InferenceFact::dt_shape(
                f32::datum_type(),
                tvec!(1, 3, height as usize, width as usize),
            ),
        )
        .context("failed to set input fact")?
        .into_optimized()
        .context("failed to optimize ONNX model")?
        .into_runnable()
        .context("failed to build runnable ONNX model")
}

/// Stretch-resize an RGB image to the model input and lay it out as NCHW in `[0, 1]`.
fn build_input(image: &RgbImage, width: u32, height: u32) -> Tensor {
    let resized = if image.dimensions() == (width, height) {
        image.clone()
    } else {
        image::imageops::resize(image, width, height, FilterType::Triangle)
    };
    tract_ndarray::Array4::from_shape_fn(
        (1, 3, height as usize, width as usize),
        |(_, channel, y, x)| resized.get_pixel(x as u32, y as u32)[channel] as f32 / 255.0,
    )
    .into_tensor()
}

// ----------------------------------------------------------------------------
// YOLOv8 detector
// ----------------------------------------------------------------------------

/// Tract-based YOLOv8 detector.
///
/// Loads a local ONNX export with output layout `[1, 4 + classes, anchors]`
/// (`cx, cy, w, h` followed by per-class scores). No network I/O.
pub struct TractDetector {
    model: Plan,
    input_width: u32,
    input_height: u32,
    score_floor: f32,
    iou_threshold: f32,
}

impl TractDetector {
    /// Load an ONNX model from disk and prepare it for `input_width` x `input_height` inputs.
    pub fn new<P: AsRef<Path>>(model_path: P, input_width: u32, input_height: u32) -> Result<Self> {
        let model = load_plan(model_path.as_ref(), input_width, input_height)?;
        Ok(Self {
            model,
            input_width,
            input_height,
            score_floor: 0.25,
            iou_threshold: 0.45,
        })
    }

    /// Override the pre-NMS score floor. Session filtering applies its own threshold on top.
    pub fn with_score_floor(mut self, score_floor: f32) -> Self {
        self.score_floor = score_floor;
        self
    }

    pub fn with_iou_threshold(mut self, iou_threshold: f32) -> Self {
        self.iou_threshold = iou_threshold;
        self
    }

    fn decode(&self, outputs: TVec<TValue>, width: u32, height: u32) -> Result<Vec<Detection>> {
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let view = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?;
        let shape = view.shape().to_vec();
        if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
            return Err(anyhow!("unexpected YOLO output shape {:?}", shape));
        }
        let classes = shape[1] - 4;
        let anchors = shape[2];
        let sx = width as f32 / self.input_width as f32;
        let sy = height as f32 / self.input_height as f32;

        let mut detections = Vec::new();
        for i in 0..anchors {
            let (class_id, score) = (0..classes)
                .map(|c| (c, view[[0, 4 + c, i]]))
                .fold((0usize, f32::NEG_INFINITY), |best, cur| {
                    if cur.1 > best.1 {
                        cur
                    } else {
                        best
                    }
                });
            if !score.is_finite() || score < self.score_floor {
                continue;
            }
            let cx = view[[0, 0, i]];
            let cy = view[[0, 1, i]];
            let w = view[[0, 2, i]];
            let h = view[[0, 3, i]];
            let bbox = BBox::new(
                (cx - w / 2.0) * sx,
                (cy - h / 2.0) * sy,
                (cx + w / 2.0) * sx,
                (cy + h / 2.0) * sy,
            );
            detections.push(Detection::new(class_id as u32, score, bbox));
        }

        Ok(non_maximum_suppression(detections, self.iou_threshold))
    }
}

impl DetectorBackend for TractDetector {
    fn name(&self) -> &'static str {
        "tract-yolo"
    }

    fn detect(&mut self, pixels: &[u8], width: u32, height: u32) -> Result<Vec<Detection>> {
        let image = RgbImage::from_raw(width, height, pixels.to_vec())
            .ok_or_else(|| anyhow!("expected {}x{} RGB pixels", width, height))?;
        let input = build_input(&image, self.input_width, self.input_height);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        self.decode(outputs, width, height)
    }

    fn warm_up(&mut self) -> Result<()> {
        let blank = vec![0u8; (self.input_width * self.input_height * 3) as usize];
        self.detect(&blank, self.input_width, self.input_height)
            .map(|_| ())
    }
}

// ----------------------------------------------------------------------------
// Waste classifier
// ----------------------------------------------------------------------------

/// Tract-based image classifier for the waste categories.
pub struct TractClassifier {
    model: Plan,
    input_size: u32,
}

impl TractClassifier {
    /// Default square input edge of the classifier.
    pub const INPUT_SIZE: u32 = 260;

    pub fn new<P: AsRef<Path>>(model_path: P) -> Result<Self> {
        let model = load_plan(model_path.as_ref(), Self::INPUT_SIZE, Self::INPUT_SIZE)?;
        Ok(Self {
            model,
            input_size: Self::INPUT_SIZE,
        })
    }
}

impl Classifier for TractClassifier {
    fn classify(&mut self, image: &RgbImage) -> Result<Classification> {
        let input = build_input(image, self.input_size, self.input_size);
        let outputs = self
            .model
            .run(tvec!(input.into()))
            .context("ONNX inference failed")?;
        let output = outputs
            .first()
            .ok_or_else(|| anyhow!("model produced no outputs"))?;
        let logits: Vec<f32> = output
            .to_array_view::<f32>()
            .context("model output tensor was not f32")?
            .iter()
            .copied()
            .collect();
        softmax_argmax(&logits)
    }
}

fn softmax_argmax(logits: &[f32]) -> Result<Classification> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    if !max.is_finite() {
        return Err(anyhow!("classifier produced no finite scores"));
    }
    let exp: Vec<f32> = logits.iter().map(|v| (v - max).exp()).collect();
    let sum: f32 = exp.iter().sum();
    let (index, best) = exp
        .iter()
        .copied()
        .enumerate()
        .fold((0usize, f32::NEG_INFINITY), |acc, cur| {
            if cur.1 > acc.1 {
                cur
            } else {
                acc
            }
        });
    let label = WASTE_CATEGORIES
        .get(index)
        .map(|s| s.to_string())
        .unwrap_or_else(|| format!("class_{}", index));
    Ok(Classification {
        index,
        label,
        confidence: best / sum,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn softmax_argmax_picks_largest_logit() {
        let result = softmax_argmax(&[0.1, 3.0, 0.2, -1.0, 0.0]).unwrap();
        assert_eq!(result.index, 1);
        assert_eq!(result.label, "Glass");
        assert!(result.confidence > 0.5 && result.confidence <= 1.0);
    }

    #[test]
    fn build_input_is_nchw_unit_range() {
        let image = RgbImage::from_pixel(4, 2, image::Rgb([255, 0, 51]));
        let tensor = build_input(&image, 4, 2);
        assert_eq!(tensor.shape(), &[1, 3, 2, 4]);
        let view = tensor.to_array_view::<f32>().unwrap();
        assert_eq!(view[[0, 0, 1, 3]], 1.0);
        assert_eq!(view[[0, 1, 0, 0]], 0.0);
        assert!((view[[0, 2, 0, 0]] - 0.2).abs() < 1e-6);
    }
}
