use ndarray::{Array3, ArrayView3, Axis};
use serde::{Deserialize, Serialize};

use crate::errors::{ProcessorError, Result};
use crate::pixel_buffer::HeightWidth;
use crate::postprocess::{argmax, check_target_sizes, sigmoid, softmax};

pub const DEFAULT_DETECTION_THRESHOLD: f32 = 0.5;

/// Raw detection head outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectDetectionOutput {
    /// `[batch, queries, classes]`
    pub logits: Array3<f32>,
    /// `[batch, queries, 4]`, normalized `(cx, cy, w, h)`
    pub pred_boxes: Array3<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetectionLabel {
    Class(usize),
    /// Zero-shot match of model query `query` against text query `text`.
    TextQuery { query: usize, text: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub score: f32,
    pub label: DetectionLabel,
    /// `[x1, y1, x2, y2]`, absolute when a target size was given, else normalized.
    pub bbox: [f32; 4],
}

/// Decode detection head outputs into per-image detections.
///
/// Standard mode takes a softmax over classes and treats the last class as
/// "no object"; a query whose best class is that sentinel yields nothing.
/// Zero-shot mode scores every text query independently with a sigmoid.
/// Detections keep query order.
#[tracing::instrument(level = "debug", skip_all, fields(shape = ?logits.shape(), zero_shot = is_zero_shot))]
pub fn post_process_object_detection(
    logits: ArrayView3<f32>,
    pred_boxes: ArrayView3<f32>,
    threshold: f32,
    target_sizes: Option<&[HeightWidth]>,
    is_zero_shot: bool,
) -> Result<Vec<Vec<Detection>>> {
    let (batch, queries, classes) = logits.dim();
    if pred_boxes.dim() != (batch, queries, 4) {
        return Err(ProcessorError::shape_mismatch(
            "pred_boxes",
            format!("[{batch}, {queries}, 4]"),
            format!("{:?}", pred_boxes.shape()),
        ));
    }
    check_target_sizes(target_sizes, batch)?;

    let mut results = Vec::with_capacity(batch);
    for (b, (image_logits, image_boxes)) in logits
        .axis_iter(Axis(0))
        .zip(pred_boxes.axis_iter(Axis(0)))
        .enumerate()
    {
        let scale = target_sizes.map_or((1.0, 1.0), |sizes| {
            (sizes[b].width as f32, sizes[b].height as f32)
        });

        let mut detections = Vec::new();
        for (q, query_logits) in image_logits.axis_iter(Axis(0)).enumerate() {
            let label_and_score = if is_zero_shot {
                let probs: Vec<f32> = query_logits.iter().map(|&v| sigmoid(v)).collect();
                argmax(&probs).map(|(text, score)| (DetectionLabel::TextQuery { query: q, text }, score))
            } else {
                let probs = softmax(query_logits);
                match argmax(&probs) {
                    Some((class, _)) if class + 1 == classes => None,
                    Some((class, score)) => Some((DetectionLabel::Class(class), score)),
                    None => None,
                }
            };

            let Some((label, score)) = label_and_score else {
                continue;
            };
            if score < threshold {
                continue;
            }

            let bbox = image_boxes.row(q);
            let [x1, y1, x2, y2] = cxcywh_to_xyxy(bbox[0], bbox[1], bbox[2], bbox[3]);
            detections.push(Detection {
                score,
                label,
                bbox: [x1 * scale.0, y1 * scale.1, x2 * scale.0, y2 * scale.1],
            });
        }

        tracing::trace!(image = b, kept = detections.len(), "decoded detections");
        results.push(detections);
    }

    Ok(results)
}

#[inline]
fn cxcywh_to_xyxy(cx: f32, cy: f32, w: f32, h: f32) -> [f32; 4] {
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}
