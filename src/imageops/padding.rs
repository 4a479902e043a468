use crate::config::{ChannelValues, PadSize};
use crate::errors::{ProcessorError, Result};
use crate::pixel_buffer::PixelBuffer;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PadMode {
    /// Fill the new area with constant values.
    #[default]
    Constant,
    /// Mirror the image content into the new area.
    Symmetric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PadOptions {
    pub mode: PadMode,
    /// Split the padding between both sides instead of appending it.
    pub center: bool,
    pub constant_values: ChannelValues,
}

impl Default for PadOptions {
    fn default() -> Self {
        Self {
            mode: PadMode::Constant,
            center: false,
            constant_values: ChannelValues::Scalar(0.0),
        }
    }
}

impl PadOptions {
    pub const fn centered(mut self) -> Self {
        self.center = true;
        self
    }

    pub const fn with_mode(mut self, mode: PadMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_constant_values(mut self, values: impl Into<ChannelValues>) -> Self {
        self.constant_values = values.into();
        self
    }
}

/// Where the original content lands inside the padded canvas.
///
/// Centered placement puts `floor(extra / 2)` before the content, so an odd
/// extra pixel goes to the end. Returns `None` when the canvas is smaller than
/// the content.
pub fn to_offset(
    width: u32,
    height: u32,
    pad_width: u32,
    pad_height: u32,
    center: bool,
) -> Option<(u32, u32)> {
    if width > pad_width || height > pad_height {
        return None;
    }

    if center {
        Some(((pad_width - width) / 2, (pad_height - height) / 2))
    } else {
        Some((0, 0))
    }
}

fn target_dims(image: &PixelBuffer, pad_size: PadSize) -> (u32, u32) {
    match pad_size {
        PadSize::Dims { width, height } => (width, height),
        PadSize::Scalar(side) => (side, side),
        PadSize::Square => {
            let side = image.width().max(image.height());
            (side, side)
        }
    }
}

/// Pad `image` to `pad_size`.
pub fn pad(image: &PixelBuffer, pad_size: PadSize, options: &PadOptions) -> Result<PixelBuffer> {
    let (width, height) = (image.width(), image.height());
    let (pad_width, pad_height) = target_dims(image, pad_size);

    let (left, top) = to_offset(width, height, pad_width, pad_height, options.center).ok_or(
        ProcessorError::InvalidPadding {
            current_width: width,
            current_height: height,
            target_width: pad_width,
            target_height: pad_height,
        },
    )?;

    if (pad_width, pad_height) == (width, height) {
        return Ok(image.clone());
    }

    let channels = image.channels();
    let fill = options.constant_values.resolve(channels, "constant_values")?;

    match options.mode {
        PadMode::Constant => {
            let mut data = Vec::with_capacity(pad_width as usize * pad_height as usize * channels);
            for _ in 0..pad_width as usize * pad_height as usize {
                data.extend_from_slice(&fill);
            }
            let mut padded = PixelBuffer::new(pad_width, pad_height, channels, data)?;
            paste(&mut padded, image, left, top);
            Ok(padded)
        }
        PadMode::Symmetric => {
            if options.center {
                return Err(ProcessorError::config(
                    "centered padding is not supported in symmetric mode",
                ));
            }
            if width == 0 || height == 0 {
                return Err(ProcessorError::invalid_size(
                    "cannot mirror-pad an empty image",
                ));
            }
            let mut padded = PixelBuffer::filled(pad_width, pad_height, channels, 0.0);
            for y in 0..pad_height {
                let sy = reflect(y, height);
                for x in 0..pad_width {
                    let sx = reflect(x, width);
                    let dst = padded.offset(x, y);
                    padded.data_mut()[dst..dst + channels].copy_from_slice(image.pixel(sx, sy));
                }
            }
            Ok(padded)
        }
    }
}

/// Copy `image` into `canvas` with its top-left corner at `(left, top)`.
fn paste(canvas: &mut PixelBuffer, image: &PixelBuffer, left: u32, top: u32) {
    let row_len = image.width() as usize * image.channels();
    for y in 0..image.height() {
        let src = image.offset(0, y);
        let dst = canvas.offset(left, y + top);
        canvas.data_mut()[dst..dst + row_len].copy_from_slice(&image.data()[src..src + row_len]);
    }
}

/// Mirror index `i` into `[0, len)` without repeating the edge sample.
fn reflect(i: u32, len: u32) -> u32 {
    let last = i64::from(len) - 1;
    if last <= 0 {
        return 0;
    }
    ((i64::from(i) + last) % (2 * last) - last).unsigned_abs() as u32
}
