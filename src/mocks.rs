use ndarray::prelude::*;

use crate::errors::Result;
use crate::postprocess::{MaskClassificationOutput, ObjectDetectionOutput, SemanticSegmentationOutput};
use crate::traits::{InferenceEngine, ModelOutputs};

/// Output head simulated by [`MockInferenceEngine`].
#[derive(Debug, Clone, PartialEq)]
pub enum MockHead {
    /// Zero logits and centered boxes.
    ObjectDetection { queries: usize, classes: usize },
    /// Zero logits at the input resolution.
    SemanticSegmentation { classes: usize },
    /// Zero logits, masks at the input resolution.
    MaskClassification { queries: usize, labels: usize },
    /// Returned as-is for every call.
    Canned(ModelOutputs),
}

/// Inference engine stand-in for tests: outputs have the right shapes for
/// the input batch but carry no information.
#[derive(Debug, Clone, PartialEq)]
pub struct MockInferenceEngine {
    pub head: MockHead,
}

impl MockInferenceEngine {
    pub const fn object_detection(queries: usize, classes: usize) -> Self {
        Self {
            head: MockHead::ObjectDetection { queries, classes },
        }
    }

    pub const fn semantic(classes: usize) -> Self {
        Self {
            head: MockHead::SemanticSegmentation { classes },
        }
    }

    pub const fn mask_classification(queries: usize, labels: usize) -> Self {
        Self {
            head: MockHead::MaskClassification { queries, labels },
        }
    }

    pub const fn canned(outputs: ModelOutputs) -> Self {
        Self {
            head: MockHead::Canned(outputs),
        }
    }
}

impl InferenceEngine for MockInferenceEngine {
    fn run(&self, pixel_values: ArrayView4<f32>) -> Result<ModelOutputs> {
        let (batch, _, height, width) = pixel_values.dim();
        let outputs = match &self.head {
            MockHead::ObjectDetection { queries, classes } => {
                ModelOutputs::ObjectDetection(ObjectDetectionOutput {
                    logits: Array3::zeros((batch, *queries, *classes)),
                    pred_boxes: Array3::from_elem((batch, *queries, 4), 0.5),
                })
            }
            MockHead::SemanticSegmentation { classes } => {
                ModelOutputs::SemanticSegmentation(SemanticSegmentationOutput {
                    logits: Array4::zeros((batch, *classes, height, width)),
                })
            }
            MockHead::MaskClassification { queries, labels } => {
                ModelOutputs::MaskClassification(MaskClassificationOutput {
                    class_queries_logits: Array3::zeros((batch, *queries, labels + 1)),
                    masks_queries_logits: Array4::zeros((batch, *queries, height, width)),
                })
            }
            MockHead::Canned(outputs) => outputs.clone(),
        };
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_semantic_shapes() -> Result<()> {
        let engine = MockInferenceEngine::semantic(5);
        let input = Array4::<f32>::zeros((2, 3, 8, 6));

        let ModelOutputs::SemanticSegmentation(output) = engine.run(input.view())? else {
            panic!("expected semantic segmentation outputs");
        };
        assert_eq!(output.logits.shape(), &[2, 5, 8, 6]);
        Ok(())
    }

    #[test]
    fn test_mock_mask_classification_adds_no_object_class() -> Result<()> {
        let engine = MockInferenceEngine::mask_classification(4, 2);
        let input = Array4::<f32>::zeros((1, 3, 2, 2));

        let ModelOutputs::MaskClassification(output) = engine.run(input.view())? else {
            panic!("expected mask classification outputs");
        };
        assert_eq!(output.class_queries_logits.shape(), &[1, 4, 3]);
        assert_eq!(output.masks_queries_logits.shape(), &[1, 4, 2, 2]);
        Ok(())
    }

    #[test]
    fn test_mock_canned_outputs() -> Result<()> {
        let canned = ModelOutputs::ObjectDetection(ObjectDetectionOutput {
            logits: array![[[2.0, 0.1]]],
            pred_boxes: array![[[0.5, 0.5, 0.2, 0.2]]],
        });
        let engine = MockInferenceEngine::canned(canned.clone());
        let input = Array4::<f32>::zeros((1, 3, 4, 4));

        assert_eq!(engine.run(input.view())?, canned);
        Ok(())
    }
}
