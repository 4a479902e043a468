use image::{imageops, imageops::FilterType, ImageBuffer, Luma, Pixel, Rgb, Rgba};
use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use crate::config::{PreprocessConfig, SizeKeys, SizeSpec};
use crate::errors::{ProcessorError, Result};
use crate::pixel_buffer::{HeightWidth, PixelBuffer};

/// Resampling filter, numbered the way PIL numbers them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum Resample {
    Nearest = 0,
    Lanczos = 1,
    Bilinear = 2,
    Bicubic = 3,
    Box = 4,
    Hamming = 5,
}

impl TryFrom<u8> for Resample {
    type Error = ProcessorError;

    fn try_from(id: u8) -> Result<Self> {
        match id {
            0 => Ok(Self::Nearest),
            1 => Ok(Self::Lanczos),
            2 => Ok(Self::Bilinear),
            3 => Ok(Self::Bicubic),
            4 => Ok(Self::Box),
            5 => Ok(Self::Hamming),
            other => Err(ProcessorError::config(format!(
                "unknown resample filter id {other}"
            ))),
        }
    }
}

impl From<Resample> for u8 {
    fn from(resample: Resample) -> Self {
        resample as u8
    }
}

impl Resample {
    pub fn filter_type(self) -> Result<FilterType> {
        match self {
            Self::Nearest => Ok(FilterType::Nearest),
            Self::Lanczos => Ok(FilterType::Lanczos3),
            Self::Bilinear => Ok(FilterType::Triangle),
            Self::Bicubic => Ok(FilterType::CatmullRom),
            Self::Box | Self::Hamming => Err(ProcessorError::config(format!(
                "resampling with {self:?} is not supported"
            ))),
        }
    }
}

/// Config knobs that influence the resize target besides `size` itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResizeOptions {
    pub do_thumbnail: bool,
    pub max_size: Option<u32>,
    pub size_divisibility: Option<u32>,
    pub keep_aspect_ratio: bool,
    pub ensure_multiple_of: Option<u32>,
}

impl From<&PreprocessConfig> for ResizeOptions {
    fn from(config: &PreprocessConfig) -> Self {
        Self {
            do_thumbnail: config.do_thumbnail,
            max_size: config.max_size,
            size_divisibility: config.size_divisibility,
            keep_aspect_ratio: config.keep_aspect_ratio,
            ensure_multiple_of: config.ensure_multiple_of,
        }
    }
}

/// Target `(width, height)` for resizing `image` according to `size`.
///
/// Edge constraints scale the short side to `shortest_edge` and then cap the
/// long side at `longest_edge`. A bare number is a shortest edge whose longest
/// edge defaults to the same number unless `max_size` is set. Explicit
/// `{height, width}` is taken as is, or aspect-preserved when
/// `keep_aspect_ratio` is set. `ensure_multiple_of` rounds every result to the
/// nearest multiple, ties rounding up.
pub fn compute_resize_size(
    image: &PixelBuffer,
    size: Option<&SizeSpec>,
    options: &ResizeOptions,
) -> Result<(u32, u32)> {
    let (src_width, src_height) = (image.width(), image.height());
    if src_width == 0 || src_height == 0 {
        return Err(ProcessorError::invalid_size("cannot resize an empty image"));
    }
    if options.size_divisibility == Some(0) {
        return Err(ProcessorError::config("`size_divisibility` must be at least 1"));
    }
    if options.ensure_multiple_of == Some(0) {
        return Err(ProcessorError::config("`ensure_multiple_of` must be at least 1"));
    }

    let (shortest_edge, longest_edge) = match size {
        _ if options.do_thumbnail => {
            let (height, width) = size.and_then(SizeSpec::height_width).ok_or_else(|| {
                ProcessorError::invalid_size("thumbnail requires `height` and `width` in `size`")
            })?;
            (Some(height.min(width)), None)
        }
        Some(SizeSpec::Scalar(n)) => (Some(*n), Some(options.max_size.unwrap_or(*n))),
        Some(SizeSpec::Keyed(SizeKeys {
            shortest_edge,
            longest_edge,
            ..
        })) if shortest_edge.is_some() || longest_edge.is_some() => (*shortest_edge, *longest_edge),
        _ => (None, None),
    };

    if shortest_edge.is_some() || longest_edge.is_some() {
        let (width, height) = edge_constrained_size(src_width, src_height, shortest_edge, longest_edge);
        let (width, height) = match options.size_divisibility {
            Some(divisor) => enforce_size_divisibility(width, height, divisor),
            None => (width, height),
        };
        return Ok(round_to_multiple(width, height, options.ensure_multiple_of));
    }

    match size {
        Some(SizeSpec::Keyed(SizeKeys {
            height: Some(height),
            width: Some(width),
            ..
        })) => {
            if options.keep_aspect_ratio {
                let multiple = options.ensure_multiple_of.unwrap_or(1);
                Ok(aspect_preserving_size(
                    src_width, src_height, *width, *height, multiple,
                ))
            } else {
                Ok(round_to_multiple(*width, *height, options.ensure_multiple_of))
            }
        }
        None if options.size_divisibility.is_some() => {
            let divisor = options.size_divisibility.unwrap_or(1);
            Ok(enforce_size_divisibility(src_width, src_height, divisor))
        }
        Some(SizeSpec::Keyed(keys)) => Err(ProcessorError::invalid_size(format!(
            "size {keys:?} needs both `height` and `width`, or `shortest_edge`/`longest_edge`"
        ))),
        _ => Err(ProcessorError::invalid_size(
            "resizing requires `size` or `size_divisibility`",
        )),
    }
}

fn edge_constrained_size(
    src_width: u32,
    src_height: u32,
    shortest_edge: Option<u32>,
    longest_edge: Option<u32>,
) -> (u32, u32) {
    let (src_width, src_height) = (f64::from(src_width), f64::from(src_height));

    let short_factor = shortest_edge.map_or(1.0, |edge| {
        let edge = f64::from(edge);
        (edge / src_width).max(edge / src_height)
    });
    let (width, height) = (src_width * short_factor, src_height * short_factor);

    let long_factor = longest_edge.map_or(1.0, |edge| {
        let edge = f64::from(edge);
        let factor = (edge / width).min(edge / height);
        // a cap only shrinks; a lone longest edge scales either way
        if shortest_edge.is_some() {
            factor.min(1.0)
        } else {
            factor
        }
    });

    (
        floor_hundredths(width * long_factor).max(1),
        floor_hundredths(height * long_factor).max(1),
    )
}

/// Floor after rounding to two decimals, so `223.99999` lands on 224.
fn floor_hundredths(value: f64) -> u32 {
    ((value * 100.0).round() / 100.0).floor() as u32
}

fn enforce_size_divisibility(width: u32, height: u32, divisor: u32) -> (u32, u32) {
    (
        (width / divisor).max(1) * divisor,
        (height / divisor).max(1) * divisor,
    )
}

fn aspect_preserving_size(
    src_width: u32,
    src_height: u32,
    width: u32,
    height: u32,
    multiple: u32,
) -> (u32, u32) {
    let mut scale_height = f64::from(height) / f64::from(src_height);
    let mut scale_width = f64::from(width) / f64::from(src_width);

    // scale as little as possible
    if (1.0 - scale_width).abs() < (1.0 - scale_height).abs() {
        scale_height = scale_width;
    } else {
        scale_width = scale_height;
    }

    (
        constrain_to_multiple_of(scale_width * f64::from(src_width), multiple),
        constrain_to_multiple_of(scale_height * f64::from(src_height), multiple),
    )
}

fn round_to_multiple(width: u32, height: u32, multiple: Option<u32>) -> (u32, u32) {
    match multiple {
        Some(m) if m > 1 => (
            constrain_to_multiple_of(f64::from(width), m),
            constrain_to_multiple_of(f64::from(height), m),
        ),
        _ => (width, height),
    }
}

/// Nearest multiple of `multiple`, ties rounding up, never below one multiple.
fn constrain_to_multiple_of(value: f64, multiple: u32) -> u32 {
    let multiple = multiple.max(1);
    let units = (value / f64::from(multiple) + 0.5).floor().max(1.0);
    units as u32 * multiple
}

/// Resample `image` to exactly `width` x `height`. Channel count is preserved.
pub fn resize(image: &PixelBuffer, width: u32, height: u32, resample: Resample) -> Result<PixelBuffer> {
    if width == 0 || height == 0 {
        return Err(ProcessorError::invalid_size(format!(
            "cannot resize to {width}x{height}"
        )));
    }
    if (image.width(), image.height()) == (width, height) {
        return Ok(image.clone());
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(ProcessorError::invalid_size("cannot resize an empty image"));
    }
    let filter = resample.filter_type()?;

    // The image crate clamps float samples to [0, 1] while filtering, so
    // samples are mapped into that range and back afterwards.
    let (low, high) = image
        .data()
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let span = high - low;
    if !(span > 0.0) {
        return Ok(PixelBuffer::filled(width, height, image.channels(), low));
    }
    let unit = image.data().iter().map(|v| (v - low) / span).collect();

    let (src_width, src_height) = (image.width(), image.height());
    let resized = match image.channels() {
        1 => resample_buffer::<Luma<f32>>(src_width, src_height, unit, width, height, filter)?,
        3 => resample_buffer::<Rgb<f32>>(src_width, src_height, unit, width, height, filter)?,
        4 => resample_buffer::<Rgba<f32>>(src_width, src_height, unit, width, height, filter)?,
        channels => return Err(ProcessorError::UnsupportedChannels { channels }),
    };

    let data = resized
        .into_iter()
        .map(|v| v.clamp(0.0, 1.0) * span + low)
        .collect();
    PixelBuffer::new(width, height, image.channels(), data)
}

fn resample_buffer<P>(
    src_width: u32,
    src_height: u32,
    data: Vec<f32>,
    width: u32,
    height: u32,
    filter: FilterType,
) -> Result<Vec<f32>>
where
    P: Pixel<Subpixel = f32> + 'static,
{
    let buffer = ImageBuffer::<P, Vec<f32>>::from_raw(src_width, src_height, data).ok_or_else(|| {
        ProcessorError::shape_mismatch(
            "resample buffer",
            format!("{src_width}x{src_height}x{}", P::CHANNEL_COUNT),
            "a shorter sample vector",
        )
    })?;
    Ok(imageops::resize(&buffer, width, height, filter).into_raw())
}

/// Shrink-only proportional resize so the image fits inside `size`.
pub fn thumbnail(image: &PixelBuffer, size: HeightWidth, resample: Resample) -> Result<PixelBuffer> {
    let (width, height) = (image.width(), image.height());
    if width == 0 || height == 0 {
        return Ok(image.clone());
    }

    let scale = 1.0_f64
        .min(f64::from(size.height) / f64::from(height))
        .min(f64::from(size.width) / f64::from(width));
    if scale >= 1.0 {
        return Ok(image.clone());
    }

    let new_width = ((f64::from(width) * scale).floor() as u32).clamp(1, width);
    let new_height = ((f64::from(height) * scale).floor() as u32).clamp(1, height);
    resize(image, new_width, new_height, resample)
}

/// Nearest-neighbor resize of an integer map; values are copied, never blended.
///
/// An empty source map yields a map filled with `T::default()`.
pub fn resize_nearest<T: Copy + Default>(map: ArrayView2<T>, height: usize, width: usize) -> Array2<T> {
    let (src_height, src_width) = map.dim();
    if (src_height, src_width) == (height, width) {
        return map.to_owned();
    }
    if src_height == 0 || src_width == 0 {
        return Array2::default((height, width));
    }
    Array2::from_shape_fn((height, width), |(y, x)| {
        let sy = (y * src_height / height).min(src_height.saturating_sub(1));
        let sx = (x * src_width / width).min(src_width.saturating_sub(1));
        map[[sy, sx]]
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn image(width: u32, height: u32) -> PixelBuffer {
        let data = (0..width * height * 3).map(|v| (v % 256) as f32).collect();
        PixelBuffer::new(width, height, 3, data).unwrap()
    }

    #[test]
    fn test_shortest_edge() {
        let size = SizeSpec::edges(Some(224), None);
        let target = compute_resize_size(&image(640, 480), Some(&size), &ResizeOptions::default());
        // 224 / 480 scales the short side
        assert_eq!(target.unwrap(), (298, 224));
    }

    #[test]
    fn test_shortest_and_longest_edge() {
        let size = SizeSpec::edges(Some(800), Some(1333));
        let target = compute_resize_size(&image(2000, 500), Some(&size), &ResizeOptions::default());
        // short side would become 800 -> long side 3200, capped to 1333
        assert_eq!(target.unwrap(), (1333, 333));
    }

    #[test]
    fn test_scalar_size_caps_long_side() {
        let size = SizeSpec::Scalar(100);
        let target = compute_resize_size(&image(400, 200), Some(&size), &ResizeOptions::default());
        assert_eq!(target.unwrap(), (100, 50));

        let options = ResizeOptions {
            max_size: Some(1000),
            ..Default::default()
        };
        let target = compute_resize_size(&image(400, 200), Some(&size), &options);
        assert_eq!(target.unwrap(), (200, 100));
    }

    #[test]
    fn test_size_divisibility_floors() {
        let size = SizeSpec::edges(Some(100), None);
        let options = ResizeOptions {
            size_divisibility: Some(32),
            ..Default::default()
        };
        let target = compute_resize_size(&image(300, 200), Some(&size), &options);
        // (150, 100) -> (128, 96)
        assert_eq!(target.unwrap(), (128, 96));

        let target = compute_resize_size(&image(20, 70), None, &options);
        assert_eq!(target.unwrap(), (32, 64));
    }

    #[test]
    fn test_zero_divisors_are_config_errors() {
        let src = PixelBuffer::filled(10, 10, 3, 1.0);
        let options = ResizeOptions {
            size_divisibility: Some(0),
            ..Default::default()
        };
        let err = compute_resize_size(&src, None, &options).unwrap_err();
        assert!(matches!(err, ProcessorError::Config { .. }));

        let options = ResizeOptions {
            ensure_multiple_of: Some(0),
            ..Default::default()
        };
        let err = compute_resize_size(&src, Some(&SizeSpec::exact(4, 4)), &options).unwrap_err();
        assert!(matches!(err, ProcessorError::Config { .. }));
    }

    #[test]
    fn test_thumbnail_mode_uses_smaller_side_as_shortest_edge() {
        let options = ResizeOptions {
            do_thumbnail: true,
            ..Default::default()
        };
        let target = compute_resize_size(&image(40, 20), Some(&SizeSpec::exact(10, 30)), &options);
        assert_eq!(target.unwrap(), (20, 10));

        let err = compute_resize_size(&image(40, 20), Some(&SizeSpec::edges(Some(10), None)), &options)
            .unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidSize { .. }));
    }

    #[test]
    fn test_keep_aspect_ratio_with_multiple() {
        let size = SizeSpec::exact(384, 384);
        let options = ResizeOptions {
            keep_aspect_ratio: true,
            ensure_multiple_of: Some(32),
            ..Default::default()
        };
        // scale 384/480 = 0.8 is closer to 1 than 384/640 = 0.6
        let target = compute_resize_size(&image(640, 480), Some(&size), &options);
        assert_eq!(target.unwrap(), (512, 384));
    }

    #[test]
    fn test_multiple_rounds_half_up_and_never_below_one_unit() {
        assert_eq!(constrain_to_multiple_of(48.0, 32), 64);
        assert_eq!(constrain_to_multiple_of(47.9, 32), 32);
        assert_eq!(constrain_to_multiple_of(3.0, 32), 32);
    }

    #[test]
    fn test_missing_keys_is_invalid_size() {
        let size = SizeSpec::Keyed(SizeKeys {
            height: Some(10),
            ..Default::default()
        });
        let err = compute_resize_size(&image(4, 4), Some(&size), &ResizeOptions::default()).unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidSize { .. }));

        let err = compute_resize_size(&image(4, 4), None, &ResizeOptions::default()).unwrap_err();
        assert!(matches!(err, ProcessorError::InvalidSize { .. }));
    }

    #[test]
    fn test_resize_exact_dimensions() {
        let src = image(17, 9);
        for resample in [
            Resample::Nearest,
            Resample::Bilinear,
            Resample::Bicubic,
            Resample::Lanczos,
        ] {
            for (w, h) in [(5, 3), (32, 20), (1, 1)] {
                let out = resize(&src, w, h, resample).unwrap();
                assert_eq!((out.width(), out.height()), (w, h));
                assert_eq!(out.channels(), 3);
            }
        }
    }

    #[test]
    fn test_resize_keeps_sample_range() {
        let src = PixelBuffer::new(2, 1, 1, vec![0.0, 255.0]).unwrap();
        let out = resize(&src, 8, 4, Resample::Lanczos).unwrap();
        assert!(out.data().iter().all(|v| (0.0..=255.0).contains(v)));
        assert!(out.data().iter().any(|v| *v > 200.0));
    }

    #[test]
    fn test_resize_same_size_is_noop() {
        let src = image(4, 4);
        assert_eq!(resize(&src, 4, 4, Resample::Bilinear).unwrap(), src);
    }

    #[test]
    fn test_box_filter_rejected() {
        let err = resize(&image(4, 4), 2, 2, Resample::Box).unwrap_err();
        assert!(matches!(err, ProcessorError::Config { .. }));
    }

    #[test]
    fn test_thumbnail_never_grows() {
        let src = image(40, 20);
        for (h, w) in [(10, 10), (100, 100), (20, 5), (1, 1000), (1000, 1)] {
            let out = thumbnail(&src, HeightWidth::new(h, w), Resample::Bilinear).unwrap();
            assert!(out.width() <= src.width());
            assert!(out.height() <= src.height());
            assert!(out.width() >= 1 && out.height() >= 1);
        }

        let out = thumbnail(&src, HeightWidth::new(10, 10), Resample::Bilinear).unwrap();
        assert_eq!((out.width(), out.height()), (10, 5));
    }

    #[test]
    fn test_resize_nearest_map() {
        let map = array![[1, 2], [3, 4]];
        let out = resize_nearest(map.view(), 4, 4);
        assert_eq!(out[[0, 0]], 1);
        assert_eq!(out[[1, 1]], 1);
        assert_eq!(out[[0, 3]], 2);
        assert_eq!(out[[3, 0]], 3);
        assert_eq!(out[[3, 3]], 4);
    }

    #[test]
    fn test_resize_nearest_empty_map() {
        let map = Array2::<i32>::zeros((0, 0));
        assert_eq!(resize_nearest(map.view(), 2, 3), Array2::<i32>::zeros((2, 3)));
    }
}
