pub mod detection;
pub mod segmentation;

pub use detection::{
    post_process_object_detection, Detection, DetectionLabel, ObjectDetectionOutput,
    DEFAULT_DETECTION_THRESHOLD,
};
pub use segmentation::{
    post_process_instance_segmentation, post_process_panoptic_segmentation,
    post_process_semantic_segmentation, MaskClassificationOutput, Segment, SegmentationOptions,
    SegmentationResult, SemanticSegmentationOutput, SemanticSegmentationResult, UNLABELED,
};

use ndarray::ArrayView1;

use crate::errors::{ProcessorError, Result};
use crate::pixel_buffer::HeightWidth;
use crate::traits::PostProcess;

/// Processor types whose detection heads match text queries.
const ZERO_SHOT_PROCESSOR_TYPES: &[&str] = &[
    "OwlViTImageProcessor",
    "OwlViTFeatureExtractor",
    "Owlv2ImageProcessor",
    "GroundingDinoImageProcessor",
];

/// Closed-set post-processing shared by most models.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultPostProcessor;

impl PostProcess for DefaultPostProcessor {}

/// Open-vocabulary detection (OWL-ViT, OWLv2, Grounding DINO).
#[derive(Debug, Clone, Copy, Default)]
pub struct ZeroShotPostProcessor;

impl PostProcess for ZeroShotPostProcessor {
    fn is_zero_shot(&self) -> bool {
        true
    }
}

/// Post-processing variant for an `image_processor_type` tag.
pub fn post_processor_for(image_processor_type: Option<&str>) -> Box<dyn PostProcess> {
    match image_processor_type {
        Some(tag) if ZERO_SHOT_PROCESSOR_TYPES.contains(&tag) => Box::new(ZeroShotPostProcessor),
        _ => Box::new(DefaultPostProcessor),
    }
}

#[inline]
pub(crate) fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

/// Numerically stable softmax of `logits`.
pub(crate) fn softmax(logits: ArrayView1<f32>) -> Vec<f32> {
    let max = logits.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
    let exps: Vec<f32> = logits.iter().map(|&v| (v - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Index and value of the first maximum. `None` for an empty slice.
pub(crate) fn argmax(values: &[f32]) -> Option<(usize, f32)> {
    values
        .iter()
        .copied()
        .enumerate()
        .fold(None, |best, (i, v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
}

/// Check that one target size was given per batch item.
pub(crate) fn check_target_sizes(target_sizes: Option<&[HeightWidth]>, batch: usize) -> Result<()> {
    match target_sizes {
        Some(sizes) if sizes.len() != batch => Err(ProcessorError::shape_mismatch(
            "target_sizes",
            format!("{batch} entries (one per batch item)"),
            format!("{} entries", sizes.len()),
        )),
        _ => Ok(()),
    }
}
