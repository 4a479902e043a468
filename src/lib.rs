pub mod config;
pub mod errors;
pub mod image_processor;
pub mod imageops;
pub mod pixel_buffer;
pub mod postprocess;
pub mod traits;

pub mod mocks;

use std::path::Path;

pub use config::{ChannelValues, PadSize, PreprocessConfig, PreprocessOverrides, SizeSpec};
pub use errors::{ProcessorError, Result};
pub use image_processor::{BatchedResult, ImageProcessor, PreprocessedImage};
pub use pixel_buffer::{HeightWidth, PixelBuffer};
pub use postprocess::{
    post_process_instance_segmentation, post_process_object_detection,
    post_process_panoptic_segmentation, post_process_semantic_segmentation, Detection,
    DetectionLabel, SegmentationOptions, SegmentationResult, SemanticSegmentationResult,
    DEFAULT_DETECTION_THRESHOLD,
};
pub use traits::*;

/// Decode an image file into a [`PixelBuffer`].
pub fn load_image(path: &Path) -> Result<PixelBuffer> {
    let image = image::open(path).map_err(|source| ProcessorError::ImageDecode {
        operation: format!("decoding {}", path.display()),
        source,
    })?;
    Ok(PixelBuffer::from_dynamic(&image))
}

/// Whether `path` has an extension of a format the enabled codecs can decode.
pub fn is_supported_image_format(path: &Path) -> bool {
    image::ImageFormat::from_path(path).is_ok_and(|format| format.reading_enabled())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_formats() {
        let test_cases = vec![
            ("test.png", true),
            ("test.jpeg", true),
            ("nested/dir/test.PNG", true),
            ("test.txt", false),
            ("test", false),
        ];

        for (filename, expected) in test_cases {
            assert_eq!(
                is_supported_image_format(Path::new(filename)),
                expected,
                "{filename}"
            );
        }
    }

    #[test]
    fn test_load_image_round_trip() -> Result<()> {
        use image::{Rgb, RgbImage};
        use tempfile::TempDir;

        let temp_dir = TempDir::new().map_err(|e| ProcessorError::config(e.to_string()))?;
        let path = temp_dir.path().join("pixel.png");
        RgbImage::from_pixel(3, 2, Rgb([10, 20, 30])).save(&path)?;

        let buffer = load_image(&path)?;
        assert_eq!(buffer.size(), HeightWidth::new(2, 3));
        assert_eq!(buffer.pixel(2, 1), &[10.0, 20.0, 30.0]);
        Ok(())
    }

    #[test]
    fn test_load_image_missing_file() {
        let err = load_image(Path::new("does/not/exist.png")).unwrap_err();
        assert!(matches!(err, ProcessorError::ImageDecode { .. }));
    }
}
