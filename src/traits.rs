use std::fmt::Debug;

use ndarray::ArrayView4;

use crate::errors::Result;
use crate::pixel_buffer::HeightWidth;
use crate::postprocess::{
    self, Detection, MaskClassificationOutput, ObjectDetectionOutput, SegmentationOptions,
    SegmentationResult, SemanticSegmentationOutput, SemanticSegmentationResult,
};

/// Raw outputs of a vision model, by head type.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelOutputs {
    ObjectDetection(ObjectDetectionOutput),
    SemanticSegmentation(SemanticSegmentationOutput),
    MaskClassification(MaskClassificationOutput),
}

/// Opaque tensor-in/tensor-out model runner.
///
/// Model loading and execution live outside this crate; implementors only
/// need to accept a `[batch, channels, height, width]` tensor.
pub trait InferenceEngine: Send + Sync {
    fn run(&self, pixel_values: ArrayView4<f32>) -> Result<ModelOutputs>;
}

/// Post-processing of raw model outputs.
///
/// Model families differ only in a few decisions (such as how detection
/// classes are scored), so implementors override what differs and inherit
/// the shared algorithms from the default methods.
pub trait PostProcess: Send + Sync + Debug {
    /// Score detection classes independently (sigmoid) instead of with a softmax.
    fn is_zero_shot(&self) -> bool {
        false
    }

    fn post_process_object_detection(
        &self,
        outputs: &ObjectDetectionOutput,
        threshold: f32,
        target_sizes: Option<&[HeightWidth]>,
    ) -> Result<Vec<Vec<Detection>>> {
        postprocess::post_process_object_detection(
            outputs.logits.view(),
            outputs.pred_boxes.view(),
            threshold,
            target_sizes,
            self.is_zero_shot(),
        )
    }

    fn post_process_semantic_segmentation(
        &self,
        outputs: &SemanticSegmentationOutput,
        target_sizes: Option<&[HeightWidth]>,
    ) -> Result<Vec<SemanticSegmentationResult>> {
        postprocess::post_process_semantic_segmentation(outputs.logits.view(), target_sizes)
    }

    fn post_process_instance_segmentation(
        &self,
        outputs: &MaskClassificationOutput,
        options: &SegmentationOptions,
        target_sizes: Option<&[HeightWidth]>,
    ) -> Result<Vec<SegmentationResult>> {
        postprocess::post_process_instance_segmentation(
            outputs.class_queries_logits.view(),
            outputs.masks_queries_logits.view(),
            options,
            target_sizes,
        )
    }

    fn post_process_panoptic_segmentation(
        &self,
        outputs: &MaskClassificationOutput,
        options: &SegmentationOptions,
        target_sizes: Option<&[HeightWidth]>,
    ) -> Result<Vec<SegmentationResult>> {
        postprocess::post_process_panoptic_segmentation(
            outputs.class_queries_logits.view(),
            outputs.masks_queries_logits.view(),
            options,
            target_sizes,
        )
    }
}
