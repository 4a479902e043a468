use ndarray::{Array3, Array4, Axis};
use rayon::prelude::*;

use crate::config::{PadSize, PreprocessConfig, PreprocessOverrides};
use crate::errors::{ProcessorError, Result};
use crate::imageops::{
    center_crop, compute_resize_size, crop_margin, flip_channel_order, normalize, pad, rescale,
    resize, thumbnail, ConvertColor, PadOptions, ResizeOptions, DEFAULT_GRAY_THRESHOLD,
};
use crate::pixel_buffer::{HeightWidth, PixelBuffer};
use crate::postprocess::{
    post_processor_for, Detection, MaskClassificationOutput, ObjectDetectionOutput,
    SegmentationOptions, SegmentationResult, SemanticSegmentationOutput,
    SemanticSegmentationResult,
};
use crate::traits::{InferenceEngine, ModelOutputs, PostProcess};

/// One preprocessed image.
#[derive(Debug, Clone, PartialEq)]
pub struct PreprocessedImage {
    /// `[channels, height, width]`
    pub pixel_values: Array3<f32>,
    /// Size before any geometric step.
    pub original_size: HeightWidth,
    /// Size after resizing, center cropping and padding.
    ///
    /// Padding is included, so this is the spatial size of `pixel_values`.
    /// Detection boxes are rescaled with `original_size`, not with this.
    pub reshaped_input_size: HeightWidth,
}

/// Preprocessed images stacked along a leading batch axis, in input order.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchedResult {
    /// `[batch, channels, height, width]`
    pub pixel_values: Array4<f32>,
    pub original_sizes: Vec<HeightWidth>,
    pub reshaped_input_sizes: Vec<HeightWidth>,
}

/// Preprocessing pipeline plus the post-processing variant of one model.
///
/// The base configuration is never modified after construction; per-call
/// overrides are merged into a copy.
#[derive(Debug)]
pub struct ImageProcessor {
    config: PreprocessConfig,
    post_processor: Box<dyn PostProcess>,
}

impl ImageProcessor {
    pub fn new(config: PreprocessConfig) -> Result<Self> {
        config.validate()?;
        let post_processor = post_processor_for(config.image_processor_type.as_deref());
        tracing::debug!(
            processor_type = config.image_processor_type.as_deref().unwrap_or("default"),
            zero_shot = post_processor.is_zero_shot(),
            "created image processor"
        );
        Ok(Self {
            config,
            post_processor,
        })
    }

    /// Build from a `preprocessor_config.json` document.
    pub fn from_json(json: &str) -> Result<Self> {
        Self::new(PreprocessConfig::from_json(json)?)
    }

    pub fn config(&self) -> &PreprocessConfig {
        &self.config
    }

    pub fn post_processor(&self) -> &dyn PostProcess {
        self.post_processor.as_ref()
    }

    /// Run the preprocessing pipeline on one image.
    ///
    /// # Errors
    ///
    /// Fails with `UnsupportedChannels` for images that do not have 1, 3 or 4
    /// channels, and with the error of the first failing step otherwise.
    #[tracing::instrument(level = "debug", skip_all, fields(width = image.width(), height = image.height()))]
    pub fn preprocess(
        &self,
        image: &PixelBuffer,
        overrides: &PreprocessOverrides,
    ) -> Result<PreprocessedImage> {
        let config = self.config.with_overrides(overrides)?;
        run_pipeline(image, &config)
    }

    /// Preprocess every image and stack the results.
    ///
    /// All channel counts are checked before any image is processed. Images
    /// are processed in parallel; results keep input order.
    #[tracing::instrument(level = "debug", skip_all, fields(batch = images.len()))]
    pub fn batch_preprocess(
        &self,
        images: &[PixelBuffer],
        overrides: &PreprocessOverrides,
    ) -> Result<BatchedResult> {
        if images.is_empty() {
            return Err(ProcessorError::empty_input("batch of images"));
        }
        for image in images {
            check_channels(image)?;
        }
        let config = self.config.with_overrides(overrides)?;

        let processed = images
            .par_iter()
            .map(|image| run_pipeline(image, &config))
            .collect::<Result<Vec<_>>>()?;

        let expected = processed[0].pixel_values.shape();
        for (i, item) in processed.iter().enumerate() {
            if item.pixel_values.shape() != expected {
                return Err(ProcessorError::shape_mismatch(
                    format!("batch item {i}"),
                    format!("{expected:?}"),
                    format!("{:?}", item.pixel_values.shape()),
                ));
            }
        }

        let views: Vec<_> = processed.iter().map(|p| p.pixel_values.view()).collect();
        let pixel_values = ndarray::stack(Axis(0), &views)?;

        Ok(BatchedResult {
            pixel_values,
            original_sizes: processed.iter().map(|p| p.original_size).collect(),
            reshaped_input_sizes: processed.iter().map(|p| p.reshaped_input_size).collect(),
        })
    }

    /// Preprocess `images` and hand the batch to `engine`.
    pub fn infer<E: InferenceEngine + ?Sized>(
        &self,
        engine: &E,
        images: &[PixelBuffer],
        overrides: &PreprocessOverrides,
    ) -> Result<(BatchedResult, ModelOutputs)> {
        let batch = self.batch_preprocess(images, overrides)?;
        let outputs = engine.run(batch.pixel_values.view())?;
        Ok((batch, outputs))
    }

    /// Decode detections, keeping scores at or above `threshold`
    /// (usually [`DEFAULT_DETECTION_THRESHOLD`](crate::DEFAULT_DETECTION_THRESHOLD)).
    pub fn post_process_object_detection(
        &self,
        outputs: &ObjectDetectionOutput,
        threshold: f32,
        target_sizes: Option<&[HeightWidth]>,
    ) -> Result<Vec<Vec<Detection>>> {
        self.post_processor
            .post_process_object_detection(outputs, threshold, target_sizes)
    }

    pub fn post_process_semantic_segmentation(
        &self,
        outputs: &SemanticSegmentationOutput,
        target_sizes: Option<&[HeightWidth]>,
    ) -> Result<Vec<SemanticSegmentationResult>> {
        self.post_processor
            .post_process_semantic_segmentation(outputs, target_sizes)
    }

    pub fn post_process_instance_segmentation(
        &self,
        outputs: &MaskClassificationOutput,
        options: &SegmentationOptions,
        target_sizes: Option<&[HeightWidth]>,
    ) -> Result<Vec<SegmentationResult>> {
        self.post_processor
            .post_process_instance_segmentation(outputs, options, target_sizes)
    }

    pub fn post_process_panoptic_segmentation(
        &self,
        outputs: &MaskClassificationOutput,
        options: &SegmentationOptions,
        target_sizes: Option<&[HeightWidth]>,
    ) -> Result<Vec<SegmentationResult>> {
        self.post_processor
            .post_process_panoptic_segmentation(outputs, options, target_sizes)
    }
}

fn check_channels(image: &PixelBuffer) -> Result<()> {
    match image.channels() {
        1 | 3 | 4 => Ok(()),
        channels => Err(ProcessorError::UnsupportedChannels { channels }),
    }
}

/// Geometry first, then photometric steps, then padding.
fn run_pipeline(image: &PixelBuffer, config: &PreprocessConfig) -> Result<PreprocessedImage> {
    check_channels(image)?;
    let original_size = image.size();

    let mut image = if config.do_convert_rgb {
        image.to_rgb()?
    } else if config.do_convert_grayscale {
        image.to_grayscale()?
    } else {
        image.clone()
    };

    if config.do_crop_margin {
        image = crop_margin(&image, DEFAULT_GRAY_THRESHOLD)?;
    }

    // with `do_thumbnail` the resize scales the short side to min(height, width)
    // and the thumbnail then shrinks the result to fit inside `size`
    if config.resize_enabled() {
        let (width, height) =
            compute_resize_size(&image, config.size.as_ref(), &ResizeOptions::from(config))?;
        image = resize(&image, width, height, config.resample)?;
    }
    if config.do_thumbnail {
        let (height, width) = config
            .size
            .and_then(|size| size.height_width())
            .ok_or_else(|| {
                ProcessorError::invalid_size("thumbnail requires `size` with height and width")
            })?;
        image = thumbnail(&image, HeightWidth::new(height, width), config.resample)?;
    }

    if config.do_center_crop {
        let (height, width) = config
            .crop_size
            .and_then(|size| size.height_width())
            .ok_or_else(|| {
                ProcessorError::invalid_size("center crop requires `crop_size` with height and width")
            })?;
        image = center_crop(&image, width, height)?;
    }

    let channels = image.channels();
    if config.do_rescale {
        rescale(image.data_mut(), config.rescale_factor);
    }
    if config.do_normalize {
        normalize(image.data_mut(), channels, &config.image_mean, &config.image_std)?;
    }
    if config.do_flip_channel_order {
        flip_channel_order(image.data_mut(), channels);
    }

    if config.do_pad {
        let pad_size = padding_target(&image, config)?;
        image = pad(&image, pad_size, &PadOptions::default())?;
    }

    let reshaped_input_size = image.size();
    tracing::trace!(?original_size, ?reshaped_input_size, "preprocessed image");

    Ok(PreprocessedImage {
        pixel_values: image.to_chw(),
        original_size,
        reshaped_input_size,
    })
}

/// `pad_size`, else an explicit `size`, else the next multiple of `size_divisibility`.
fn padding_target(image: &PixelBuffer, config: &PreprocessConfig) -> Result<PadSize> {
    if let Some(pad_size) = config.effective_pad_size() {
        return Ok(pad_size);
    }
    match config.size_divisibility {
        Some(divisor) => Ok(PadSize::Dims {
            width: image.width().div_ceil(divisor) * divisor,
            height: image.height().div_ceil(divisor) * divisor,
        }),
        None => Err(ProcessorError::config(
            "`do_pad` requires `pad_size`, a `size` with height and width, or `size_divisibility`",
        )),
    }
}
