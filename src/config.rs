use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::errors::{ProcessorError, Result};
use crate::imageops::resize::Resample;

/// Resize request as written in a processor config: a bare number, or an
/// object carrying some of `height`, `width`, `shortest_edge`, `longest_edge`.
///
/// Which keys are required depends on the resize mode, so the keyed form keeps
/// every key optional and `compute_resize_size` reports missing ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SizeSpec {
    Scalar(u32),
    Keyed(SizeKeys),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SizeKeys {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shortest_edge: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longest_edge: Option<u32>,
}

impl SizeSpec {
    pub const fn exact(height: u32, width: u32) -> Self {
        Self::Keyed(SizeKeys {
            height: Some(height),
            width: Some(width),
            shortest_edge: None,
            longest_edge: None,
        })
    }

    pub const fn edges(shortest_edge: Option<u32>, longest_edge: Option<u32>) -> Self {
        Self::Keyed(SizeKeys {
            height: None,
            width: None,
            shortest_edge,
            longest_edge,
        })
    }

    /// `(height, width)` when the size names both, or a square for a scalar.
    pub fn height_width(&self) -> Option<(u32, u32)> {
        match *self {
            Self::Scalar(n) => Some((n, n)),
            Self::Keyed(SizeKeys {
                height: Some(h),
                width: Some(w),
                ..
            }) => Some((h, w)),
            Self::Keyed(_) => None,
        }
    }

    fn has_explicit_dims(&self) -> bool {
        matches!(
            self,
            Self::Keyed(SizeKeys {
                height: Some(_),
                width: Some(_),
                ..
            })
        )
    }
}

/// Target of a padding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawPadSize", into = "RawPadSize")]
pub enum PadSize {
    Dims { width: u32, height: u32 },
    /// Square of the given side.
    Scalar(u32),
    /// Square of side `max(width, height)` of the image being padded.
    Square,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(untagged)]
enum RawPadSize {
    Scalar(u32),
    Dims { width: u32, height: u32 },
    Keyword(PadKeyword),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum PadKeyword {
    Square,
}

impl From<RawPadSize> for PadSize {
    fn from(raw: RawPadSize) -> Self {
        match raw {
            RawPadSize::Scalar(n) => Self::Scalar(n),
            RawPadSize::Dims { width, height } => Self::Dims { width, height },
            RawPadSize::Keyword(PadKeyword::Square) => Self::Square,
        }
    }
}

impl From<PadSize> for RawPadSize {
    fn from(size: PadSize) -> Self {
        match size {
            PadSize::Scalar(n) => Self::Scalar(n),
            PadSize::Dims { width, height } => Self::Dims { width, height },
            PadSize::Square => Self::Keyword(PadKeyword::Square),
        }
    }
}

/// One value broadcast to every channel, or one value per channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ChannelValues {
    Scalar(f32),
    PerChannel(Vec<f32>),
}

impl ChannelValues {
    /// Expand to exactly `channels` values.
    pub fn resolve(&self, channels: usize, name: &str) -> Result<Vec<f32>> {
        match self {
            Self::Scalar(v) => Ok(vec![*v; channels]),
            Self::PerChannel(values) if values.len() == channels => Ok(values.clone()),
            Self::PerChannel(values) => Err(ProcessorError::config(format!(
                "`{name}` has {} values but the image has {channels} channels",
                values.len()
            ))),
        }
    }
}

impl From<f32> for ChannelValues {
    fn from(value: f32) -> Self {
        Self::Scalar(value)
    }
}

impl From<Vec<f32>> for ChannelValues {
    fn from(values: Vec<f32>) -> Self {
        Self::PerChannel(values)
    }
}

/// Resolved preprocessing options, deserializable from a `preprocessor_config.json`.
///
/// Unknown keys are collected into `unrecognized` and logged when the config is
/// loaded through [`PreprocessConfig::from_json`]; they never influence processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Tag selecting the post-processing variant (e.g. `DetrImageProcessor`).
    #[serde(alias = "feature_extractor_type")]
    pub image_processor_type: Option<String>,

    /// Defaults to `true` when `size` is present.
    pub do_resize: Option<bool>,
    #[serde(alias = "image_size")]
    pub size: Option<SizeSpec>,
    /// Longest-edge cap applied when `size` is a bare number.
    pub max_size: Option<u32>,
    pub resample: Resample,
    pub do_thumbnail: bool,
    pub keep_aspect_ratio: bool,
    pub ensure_multiple_of: Option<u32>,
    #[serde(alias = "size_divisor")]
    pub size_divisibility: Option<u32>,

    pub do_center_crop: bool,
    pub crop_size: Option<SizeSpec>,

    pub do_rescale: bool,
    pub rescale_factor: f32,
    pub do_normalize: bool,
    #[serde(alias = "mean")]
    pub image_mean: ChannelValues,
    #[serde(alias = "std")]
    pub image_std: ChannelValues,

    pub do_pad: bool,
    pub pad_size: Option<PadSize>,

    pub do_convert_rgb: bool,
    pub do_convert_grayscale: bool,
    pub do_crop_margin: bool,
    pub do_flip_channel_order: bool,

    #[serde(flatten)]
    pub unrecognized: BTreeMap<String, serde_json::Value>,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            image_processor_type: None,
            do_resize: None,
            size: None,
            max_size: None,
            resample: Resample::Bilinear,
            do_thumbnail: false,
            keep_aspect_ratio: false,
            ensure_multiple_of: None,
            size_divisibility: None,
            do_center_crop: false,
            crop_size: None,
            do_rescale: true,
            rescale_factor: 1.0 / 255.0,
            do_normalize: false,
            image_mean: ChannelValues::Scalar(0.5),
            image_std: ChannelValues::Scalar(0.5),
            do_pad: false,
            pad_size: None,
            do_convert_rgb: true,
            do_convert_grayscale: false,
            do_crop_margin: false,
            do_flip_channel_order: false,
            unrecognized: BTreeMap::new(),
        }
    }
}

impl PreprocessConfig {
    /// Parse a processor config document. Defaults fill every missing key.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        for key in config.unrecognized.keys() {
            tracing::debug!(key = %key, "ignoring unrecognized preprocessing option");
        }
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !self.rescale_factor.is_finite() || self.rescale_factor <= 0.0 {
            return Err(ProcessorError::config(format!(
                "`rescale_factor` must be a positive finite number, got {}",
                self.rescale_factor
            )));
        }
        self.resample.filter_type()?;
        if self.ensure_multiple_of == Some(0) {
            return Err(ProcessorError::config("`ensure_multiple_of` must be at least 1"));
        }
        if self.size_divisibility == Some(0) {
            return Err(ProcessorError::config("`size_divisibility` must be at least 1"));
        }
        if self.do_center_crop && self.crop_size.is_none() {
            return Err(ProcessorError::config(
                "`do_center_crop` is set but no `crop_size` was given",
            ));
        }
        Ok(())
    }

    pub fn resize_enabled(&self) -> bool {
        self.do_resize.unwrap_or(self.size.is_some())
    }

    /// Padding target: explicit `pad_size`, else an explicit `{height, width}` `size`.
    pub fn effective_pad_size(&self) -> Option<PadSize> {
        self.pad_size.or_else(|| {
            self.size
                .filter(SizeSpec::has_explicit_dims)
                .and_then(|size| size.height_width())
                .map(|(height, width)| PadSize::Dims { width, height })
        })
    }

    /// Copy of this config with every explicitly set override applied.
    ///
    /// `self` is never modified, so one base config can serve any number of
    /// calls with different overrides.
    pub fn with_overrides(&self, overrides: &PreprocessOverrides) -> Result<Self> {
        let mut merged = self.clone();

        macro_rules! apply {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = &overrides.$field {
                        merged.$field = value.clone();
                    }
                )*
            };
        }
        macro_rules! apply_optional {
            ($($field:ident),* $(,)?) => {
                $(
                    if let Some(value) = &overrides.$field {
                        merged.$field = Some(value.clone());
                    }
                )*
            };
        }

        apply!(
            resample,
            do_thumbnail,
            keep_aspect_ratio,
            do_center_crop,
            do_rescale,
            rescale_factor,
            do_normalize,
            image_mean,
            image_std,
            do_pad,
            do_convert_rgb,
            do_convert_grayscale,
            do_crop_margin,
            do_flip_channel_order,
        );
        apply_optional!(
            do_resize,
            size,
            max_size,
            ensure_multiple_of,
            size_divisibility,
            crop_size,
            pad_size,
        );

        merged.validate()?;
        Ok(merged)
    }
}

/// Per-call overrides. Only fields set to `Some` replace the base config.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessOverrides {
    pub do_resize: Option<bool>,
    pub size: Option<SizeSpec>,
    pub max_size: Option<u32>,
    pub resample: Option<Resample>,
    pub do_thumbnail: Option<bool>,
    pub keep_aspect_ratio: Option<bool>,
    pub ensure_multiple_of: Option<u32>,
    pub size_divisibility: Option<u32>,
    pub do_center_crop: Option<bool>,
    pub crop_size: Option<SizeSpec>,
    pub do_rescale: Option<bool>,
    pub rescale_factor: Option<f32>,
    pub do_normalize: Option<bool>,
    pub image_mean: Option<ChannelValues>,
    pub image_std: Option<ChannelValues>,
    pub do_pad: Option<bool>,
    pub pad_size: Option<PadSize>,
    pub do_convert_rgb: Option<bool>,
    pub do_convert_grayscale: Option<bool>,
    pub do_crop_margin: Option<bool>,
    pub do_flip_channel_order: Option<bool>,
}
