use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, ArrayView4, Axis, Zip};
use serde::{Deserialize, Serialize};

use crate::errors::{ProcessorError, Result};
use crate::imageops::resize_nearest;
use crate::pixel_buffer::HeightWidth;
use crate::postprocess::{argmax, check_target_sizes, sigmoid, softmax};

/// Map value of pixels no segment claimed.
pub const UNLABELED: i32 = -1;

/// Raw semantic segmentation head output.
#[derive(Debug, Clone, PartialEq)]
pub struct SemanticSegmentationOutput {
    /// `[batch, classes, height, width]`
    pub logits: Array4<f32>,
}

/// Raw mask-classification head outputs (MaskFormer family).
#[derive(Debug, Clone, PartialEq)]
pub struct MaskClassificationOutput {
    /// `[batch, queries, labels + 1]`; the last class is "no object".
    pub class_queries_logits: Array3<f32>,
    /// `[batch, queries, height, width]`
    pub masks_queries_logits: Array4<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SemanticSegmentationResult {
    /// Class id per pixel.
    pub segmentation: Array2<i32>,
    /// Class ids present in the map, ascending.
    pub labels: Vec<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Value of this segment's pixels in the map. Unique within a map, from 1.
    pub id: i32,
    pub label_id: usize,
    pub score: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationResult {
    /// Segment id per pixel, or [`UNLABELED`].
    pub segmentation: Array2<i32>,
    /// Accepted segments in acceptance order.
    pub segments: Vec<Segment>,
}

/// Thresholds for instance and panoptic mask fusion.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationOptions {
    /// Minimum class probability of a query.
    pub threshold: f32,
    /// Minimum mask probability of a pixel.
    pub mask_threshold: f32,
    /// Largest tolerated fraction of a candidate already claimed by earlier segments.
    pub overlap_mask_area_threshold: f32,
    /// Labels merged into one segment in panoptic mode.
    pub label_ids_to_fuse: BTreeSet<usize>,
}

impl Default for SegmentationOptions {
    fn default() -> Self {
        Self {
            threshold: 0.5,
            mask_threshold: 0.5,
            overlap_mask_area_threshold: 0.8,
            label_ids_to_fuse: BTreeSet::new(),
        }
    }
}

impl SegmentationOptions {
    pub const fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub const fn with_mask_threshold(mut self, mask_threshold: f32) -> Self {
        self.mask_threshold = mask_threshold;
        self
    }

    pub const fn with_overlap_mask_area_threshold(mut self, threshold: f32) -> Self {
        self.overlap_mask_area_threshold = threshold;
        self
    }

    pub fn with_label_ids_to_fuse(mut self, labels: impl IntoIterator<Item = usize>) -> Self {
        self.label_ids_to_fuse = labels.into_iter().collect();
        self
    }
}

/// Per-pixel argmax over classes, optionally resized (nearest) to `target_sizes`.
#[tracing::instrument(level = "debug", skip_all, fields(shape = ?logits.shape()))]
pub fn post_process_semantic_segmentation(
    logits: ArrayView4<f32>,
    target_sizes: Option<&[HeightWidth]>,
) -> Result<Vec<SemanticSegmentationResult>> {
    let (batch, classes, height, width) = logits.dim();
    if classes == 0 {
        return Err(ProcessorError::empty_input("semantic segmentation logits without classes"));
    }
    if height == 0 || width == 0 {
        return Err(ProcessorError::empty_input(format!(
            "semantic segmentation logits of {height}x{width} pixels"
        )));
    }
    check_target_sizes(target_sizes, batch)?;

    let mut results = Vec::with_capacity(batch);
    for (b, image_logits) in logits.axis_iter(Axis(0)).enumerate() {
        let mut segmentation = argmax_classes(image_logits);
        if let Some(sizes) = target_sizes {
            let size = sizes[b];
            segmentation = resize_nearest(segmentation.view(), size.height as usize, size.width as usize);
        }

        let labels: BTreeSet<i32> = segmentation.iter().copied().collect();
        results.push(SemanticSegmentationResult {
            segmentation,
            labels: labels.into_iter().collect(),
        });
    }
    Ok(results)
}

/// `[classes, height, width]` logits to a class-id map. The first maximum wins.
fn argmax_classes(logits: ArrayView3<f32>) -> Array2<i32> {
    let (_, height, width) = logits.dim();
    let mut best = logits.index_axis(Axis(0), 0).to_owned();
    let mut map = Array2::<i32>::zeros((height, width));

    for (class, plane) in logits.axis_iter(Axis(0)).enumerate().skip(1) {
        Zip::from(&mut best)
            .and(&mut map)
            .and(&plane)
            .for_each(|best, label, &v| {
                if v > *best {
                    *best = v;
                    *label = class as i32;
                }
            });
    }
    map
}

/// Instance segmentation: greedy mask fusion without label merging.
#[tracing::instrument(level = "debug", skip_all, fields(shape = ?class_queries_logits.shape()))]
pub fn post_process_instance_segmentation(
    class_queries_logits: ArrayView3<f32>,
    masks_queries_logits: ArrayView4<f32>,
    options: &SegmentationOptions,
    target_sizes: Option<&[HeightWidth]>,
) -> Result<Vec<SegmentationResult>> {
    post_process_mask_fusion(class_queries_logits, masks_queries_logits, options, target_sizes, false)
}

/// Panoptic segmentation: greedy mask fusion where segments of a label in
/// `options.label_ids_to_fuse` share one id.
#[tracing::instrument(level = "debug", skip_all, fields(shape = ?class_queries_logits.shape()))]
pub fn post_process_panoptic_segmentation(
    class_queries_logits: ArrayView3<f32>,
    masks_queries_logits: ArrayView4<f32>,
    options: &SegmentationOptions,
    target_sizes: Option<&[HeightWidth]>,
) -> Result<Vec<SegmentationResult>> {
    post_process_mask_fusion(class_queries_logits, masks_queries_logits, options, target_sizes, true)
}

fn post_process_mask_fusion(
    class_queries_logits: ArrayView3<f32>,
    masks_queries_logits: ArrayView4<f32>,
    options: &SegmentationOptions,
    target_sizes: Option<&[HeightWidth]>,
    fuse: bool,
) -> Result<Vec<SegmentationResult>> {
    let (batch, queries, classes) = class_queries_logits.dim();
    let (mask_batch, mask_queries, height, width) = masks_queries_logits.dim();

    if queries == 0 {
        return Err(ProcessorError::empty_input("mask classification output without queries"));
    }
    if height == 0 || width == 0 {
        return Err(ProcessorError::empty_input(format!(
            "query masks of {height}x{width} pixels"
        )));
    }
    if (mask_batch, mask_queries) != (batch, queries) {
        return Err(ProcessorError::shape_mismatch(
            "masks_queries_logits",
            format!("batch {batch} with {queries} queries"),
            format!("{:?}", masks_queries_logits.shape()),
        ));
    }
    if classes == 0 {
        return Err(ProcessorError::shape_mismatch(
            "class_queries_logits",
            "at least the no-object class",
            "0 classes",
        ));
    }
    check_target_sizes(target_sizes, batch)?;

    let mut results = Vec::with_capacity(batch);
    for (b, (class_logits, mask_logits)) in class_queries_logits
        .axis_iter(Axis(0))
        .zip(masks_queries_logits.axis_iter(Axis(0)))
        .enumerate()
    {
        let mut result = fuse_masks(class_logits, mask_logits, options, fuse);
        if let Some(sizes) = target_sizes {
            let size = sizes[b];
            result.segmentation = resize_nearest(
                result.segmentation.view(),
                size.height as usize,
                size.width as usize,
            );
        }
        results.push(result);
    }
    Ok(results)
}

/// Greedy fusion of one image's query masks into a single map.
///
/// Candidates are visited strictly in descending score order (ties keep
/// query order), and each one only claims pixels no earlier segment holds.
fn fuse_masks(
    class_logits: ArrayView2<f32>,
    mask_logits: ArrayView3<f32>,
    options: &SegmentationOptions,
    fuse: bool,
) -> SegmentationResult {
    let no_object = class_logits.ncols() - 1;
    let (_, height, width) = mask_logits.dim();

    let mut candidates: Vec<(usize, usize, f32)> = class_logits
        .axis_iter(Axis(0))
        .enumerate()
        .filter_map(|(query, logits)| {
            let (label, score) = argmax(&softmax(logits))?;
            (label != no_object && score >= options.threshold).then_some((query, label, score))
        })
        .collect();
    candidates.sort_by(|a, b| b.2.total_cmp(&a.2));

    let mut segmentation = Array2::from_elem((height, width), UNLABELED);
    let mut segments: Vec<Segment> = Vec::new();
    let mut fused: BTreeMap<usize, usize> = BTreeMap::new(); // label -> index into segments

    for (query, label, score) in candidates {
        let mask = mask_logits
            .index_axis(Axis(0), query)
            .mapv(|v| sigmoid(v) >= options.mask_threshold);

        let area = mask.iter().filter(|&&m| m).count();
        if area == 0 {
            tracing::trace!(query, "discarding empty mask");
            continue;
        }

        let overlap = Zip::from(&mask)
            .and(&segmentation)
            .fold(0usize, |acc, &m, &id| acc + usize::from(m && id != UNLABELED));
        let overlap_fraction = overlap as f32 / area as f32;
        if overlap == area || overlap_fraction > options.overlap_mask_area_threshold {
            tracing::trace!(query, overlap_fraction, "discarding overlapping mask");
            continue;
        }

        let merge_into = if fuse && options.label_ids_to_fuse.contains(&label) {
            fused.get(&label).copied()
        } else {
            None
        };
        let id = match merge_into {
            Some(index) => {
                let segment = &mut segments[index];
                segment.score = segment.score.max(score);
                segment.id
            }
            None => {
                let id = segments.len() as i32 + 1;
                if fuse && options.label_ids_to_fuse.contains(&label) {
                    fused.insert(label, segments.len());
                }
                segments.push(Segment {
                    id,
                    label_id: label,
                    score,
                });
                id
            }
        };

        Zip::from(&mut segmentation).and(&mask).for_each(|pixel, &m| {
            if m && *pixel == UNLABELED {
                *pixel = id;
            }
        });
    }

    SegmentationResult {
        segmentation,
        segments,
    }
}
