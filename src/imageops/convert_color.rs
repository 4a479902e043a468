use crate::errors::{ProcessorError, Result};
use crate::pixel_buffer::PixelBuffer;

/// ITU-R 601-2 luma weights.
const LUMA_WEIGHTS: [f32; 3] = [0.2989, 0.5870, 0.1140];

pub trait ConvertColor {
    /// Three-channel copy: gray is replicated, alpha is dropped.
    fn to_rgb(&self) -> Result<PixelBuffer>;
    /// Single-channel luminance copy. Alpha is ignored.
    fn to_grayscale(&self) -> Result<PixelBuffer>;
}

impl ConvertColor for PixelBuffer {
    fn to_rgb(&self) -> Result<PixelBuffer> {
        let data = match self.channels() {
            1 => self.data().iter().flat_map(|&v| [v, v, v]).collect(),
            3 => return Ok(self.clone()),
            4 => self
                .data()
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
            channels => return Err(ProcessorError::UnsupportedChannels { channels }),
        };
        PixelBuffer::new(self.width(), self.height(), 3, data)
    }

    fn to_grayscale(&self) -> Result<PixelBuffer> {
        if self.channels() == 1 {
            return Ok(self.clone());
        }
        PixelBuffer::new(self.width(), self.height(), 1, gray_values(self)?)
    }
}

/// Per-pixel luminance of `image`, one value per pixel.
pub(crate) fn gray_values(image: &PixelBuffer) -> Result<Vec<f32>> {
    match image.channels() {
        1 => Ok(image.data().to_vec()),
        channels @ (3 | 4) => Ok(image
            .data()
            .chunks_exact(channels)
            .map(|px| {
                px.iter()
                    .zip(LUMA_WEIGHTS)
                    .map(|(v, w)| v * w)
                    .sum::<f32>()
            })
            .collect()),
        channels => Err(ProcessorError::UnsupportedChannels { channels }),
    }
}
