use image::{DynamicImage, ImageBuffer, Pixel, Primitive};
use ndarray::Array3;
use num_traits::AsPrimitive;
use serde::{Deserialize, Serialize};

use crate::errors::{ProcessorError, Result};

/// Named pair to make the (height, width) order explicit, even though most
/// image libraries talk in (width, height).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct HeightWidth {
    pub height: u32,
    pub width: u32,
}

impl HeightWidth {
    pub const fn new(height: u32, width: u32) -> Self {
        Self { height, width }
    }
}

impl From<[u32; 2]> for HeightWidth {
    fn from([height, width]: [u32; 2]) -> Self {
        Self { height, width }
    }
}

/// Decoded image held as channel-interleaved `f32` samples in row-major order.
///
/// Raw decoded images carry values in `[0, 255]`; after rescaling and
/// normalization the same buffer type carries arbitrary floats. Every
/// geometric operation returns a new buffer, so two buffers never alias.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    channels: usize,
    data: Vec<f32>,
}

impl PixelBuffer {
    pub fn new(width: u32, height: u32, channels: usize, data: Vec<f32>) -> Result<Self> {
        if channels == 0 {
            return Err(ProcessorError::UnsupportedChannels { channels });
        }
        let expected = width as usize * height as usize * channels;
        if data.len() != expected {
            return Err(ProcessorError::shape_mismatch(
                format!("pixel buffer {width}x{height}x{channels}"),
                expected,
                data.len(),
            ));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Buffer of the given dimensions with every sample set to `value`.
    pub fn filled(width: u32, height: u32, channels: usize, value: f32) -> Self {
        Self {
            width,
            height,
            channels,
            data: vec![value; width as usize * height as usize * channels],
        }
    }

    pub const fn width(&self) -> u32 {
        self.width
    }

    pub const fn height(&self) -> u32 {
        self.height
    }

    pub const fn channels(&self) -> usize {
        self.channels
    }

    pub const fn size(&self) -> HeightWidth {
        HeightWidth::new(self.height, self.width)
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn into_raw(self) -> Vec<f32> {
        self.data
    }

    /// Samples of the pixel at `(x, y)`.
    pub fn pixel(&self, x: u32, y: u32) -> &[f32] {
        let offset = self.offset(x, y);
        &self.data[offset..offset + self.channels]
    }

    pub(crate) fn offset(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.channels
    }

    /// Convert a decoded image, scaling every sample type to the `[0, 255]` range.
    pub fn from_dynamic(image: &DynamicImage) -> Self {
        match image {
            DynamicImage::ImageLuma8(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageLumaA8(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageRgb8(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageRgba8(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageLuma16(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageLumaA16(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageRgb16(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageRgba16(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageRgb32F(buffer) => Self::from_image_buffer(buffer),
            DynamicImage::ImageRgba32F(buffer) => Self::from_image_buffer(buffer),
            other => Self::from_image_buffer(&other.to_rgba8()),
        }
    }

    pub fn from_image_buffer<P, S>(buffer: &ImageBuffer<P, Vec<S>>) -> Self
    where
        P: Pixel<Subpixel = S>,
        S: Primitive + AsPrimitive<f32>,
    {
        let scale = 255.0 / S::DEFAULT_MAX_VALUE.as_();
        Self {
            width: buffer.width(),
            height: buffer.height(),
            channels: P::CHANNEL_COUNT as usize,
            data: buffer.as_raw().iter().map(|v| v.as_() * scale).collect(),
        }
    }

    /// Channel-first (C, H, W) tensor view of the samples.
    pub fn to_chw(&self) -> Array3<f32> {
        let (h, w, c) = (self.height as usize, self.width as usize, self.channels);
        Array3::from_shape_fn((c, h, w), |(k, y, x)| self.data[(y * w + x) * c + k])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb, RgbImage};

    #[test]
    fn test_length_invariant() {
        assert!(PixelBuffer::new(2, 2, 3, vec![0.0; 12]).is_ok());
        let err = PixelBuffer::new(2, 2, 3, vec![0.0; 11]).unwrap_err();
        assert!(matches!(err, ProcessorError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_from_dynamic_rgb8() {
        let mut img = RgbImage::new(2, 1);
        img.put_pixel(1, 0, Rgb([255, 128, 0]));
        let buffer = PixelBuffer::from_dynamic(&DynamicImage::ImageRgb8(img));

        assert_eq!(buffer.channels(), 3);
        assert_eq!(buffer.size(), HeightWidth::new(1, 2));
        assert_eq!(buffer.pixel(1, 0), &[255.0, 128.0, 0.0]);
    }

    #[test]
    fn test_from_dynamic_scales_16bit() {
        let img = ImageBuffer::from_pixel(1, 1, Luma([u16::MAX]));
        let buffer = PixelBuffer::from_dynamic(&DynamicImage::ImageLuma16(img));
        assert!((buffer.data()[0] - 255.0).abs() < 1e-3);
    }

    #[test]
    fn test_to_chw_layout() {
        // 2x1 image, pixels (1,2,3) and (4,5,6)
        let buffer = PixelBuffer::new(2, 1, 3, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]).unwrap();
        let chw = buffer.to_chw();

        assert_eq!(chw.shape(), &[3, 1, 2]);
        assert_eq!(chw[[0, 0, 0]], 1.0);
        assert_eq!(chw[[0, 0, 1]], 4.0);
        assert_eq!(chw[[2, 0, 1]], 6.0);
    }
}
