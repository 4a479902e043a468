use crate::config::ChannelValues;
use crate::errors::{ProcessorError, Result};

/// Maps 8-bit samples onto `[0, 1]`.
pub const DEFAULT_RESCALE_FACTOR: f32 = 1.0 / 255.0;

/// Multiply every sample by `factor` in place.
pub fn rescale(pixels: &mut [f32], factor: f32) {
    pixels.iter_mut().for_each(|v| *v *= factor);
}

/// Per-channel `(x - mean) / std` over channel-interleaved samples.
///
/// # Errors
///
/// Returns [`ProcessorError::Config`] if a per-channel `mean` or `std` does not
/// have exactly `channels` values, or if any standard deviation is zero.
pub fn normalize(
    pixels: &mut [f32],
    channels: usize,
    mean: &ChannelValues,
    std: &ChannelValues,
) -> Result<()> {
    if channels == 0 {
        return Err(ProcessorError::UnsupportedChannels { channels });
    }
    let mean = mean.resolve(channels, "image_mean")?;
    let std = std.resolve(channels, "image_std")?;

    if let Some((i, s)) = std.iter().enumerate().find(|(_, s)| **s == 0.0) {
        return Err(ProcessorError::config(format!(
            "standard deviation at index {i} must be non-zero, got {s}"
        )));
    }

    for pixel in pixels.chunks_exact_mut(channels) {
        for ((v, m), s) in pixel.iter_mut().zip(&mean).zip(&std) {
            *v = (*v - m) / s;
        }
    }
    Ok(())
}

/// Reverse the channel order of every pixel (RGB <-> BGR).
pub fn flip_channel_order(pixels: &mut [f32], channels: usize) {
    if channels < 2 {
        return;
    }
    pixels
        .chunks_exact_mut(channels)
        .for_each(|pixel| pixel.reverse());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rescale_round_trip() {
        let original = vec![0.0, 17.0, 128.0, 255.0];
        let mut pixels = original.clone();

        rescale(&mut pixels, DEFAULT_RESCALE_FACTOR);
        assert!((pixels[3] - 1.0).abs() < 1e-6);

        rescale(&mut pixels, 255.0);
        for (a, b) in pixels.iter().zip(&original) {
            assert!((a - b).abs() < 1e-4, "{a} != {b}");
        }
    }

    #[test]
    fn test_normalize_per_channel() {
        let mut pixels = vec![0.5, 0.5, 0.5, 1.0, 0.0, 0.25];
        let mean = ChannelValues::PerChannel(vec![0.5, 0.0, 0.25]);
        let std = ChannelValues::Scalar(0.5);

        normalize(&mut pixels, 3, &mean, &std).unwrap();
        assert_eq!(pixels, vec![0.0, 1.0, 0.5, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_normalize_rejects_mismatched_lengths() {
        let mut pixels = vec![0.0; 4];
        let mean = ChannelValues::PerChannel(vec![0.5, 0.5, 0.5]);
        let err = normalize(&mut pixels, 1, &mean, &ChannelValues::Scalar(1.0)).unwrap_err();
        assert!(matches!(err, ProcessorError::Config { .. }));
    }

    #[test]
    fn test_normalize_rejects_zero_std() {
        let mut pixels = vec![0.0; 3];
        let std = ChannelValues::PerChannel(vec![1.0, 0.0, 1.0]);
        let err = normalize(&mut pixels, 3, &ChannelValues::Scalar(0.0), &std).unwrap_err();
        assert!(err.to_string().contains("index 1"));
    }

    #[test]
    fn test_flip_channel_order_permutes() {
        let mut pixels = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        flip_channel_order(&mut pixels, 3);
        assert_eq!(pixels, vec![3.0, 2.0, 1.0, 6.0, 5.0, 4.0]);

        let mut gray = vec![1.0, 2.0];
        flip_channel_order(&mut gray, 1);
        assert_eq!(gray, vec![1.0, 2.0]);
    }
}
