use anyhow::Result;
use image::RgbImage;
use serde::Serialize;

/// Waste categories of the downstream classifier, indexed by model output.
pub const WASTE_CATEGORIES: [&str; 5] = [
    "Bio",
    "Glass",
    "Metals and Plastics",
    "Non-recyclable",
    "Paper",
];

/// Label produced by a downstream classifier.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub index: usize,
    pub label: String,
    pub confidence: f32,
}

/// Classification handoff boundary.
///
/// Consumes the cropped image of a `StableResult`. The stability pipeline
/// never calls this itself; callers decide what to do after a trigger.
pub trait Classifier {
    fn classify(&mut self, image: &RgbImage) -> Result<Classification>;
}
