use crate::errors::{ProcessorError, Result};
use crate::imageops::convert_color::gray_values;
use crate::pixel_buffer::PixelBuffer;

/// Gray level separating content from margin in [`crop_margin`].
pub const DEFAULT_GRAY_THRESHOLD: f32 = 200.0;

/// Crop away uniform margins.
///
/// Content pixels are those whose gray value is at least `gray_threshold`
/// (on the 0-255 scale of raw samples). The image is cropped to the tightest
/// box holding every content pixel. An image without content is returned
/// unchanged.
pub fn crop_margin(image: &PixelBuffer, gray_threshold: f32) -> Result<PixelBuffer> {
    let gray = gray_values(image)?;
    match find_content_bounds(&gray, image.width(), image.height(), gray_threshold) {
        Some([x, y, w, h]) => crop(image, x, y, w, h),
        None => {
            tracing::debug!(
                width = image.width(),
                height = image.height(),
                "no content above gray threshold; keeping the full image"
            );
            Ok(image.clone())
        }
    }
}

/// `[x, y, width, height]` of the content box, or `None` without content.
fn find_content_bounds(gray: &[f32], width: u32, height: u32, threshold: f32) -> Option<[u32; 4]> {
    let mut bounds = [width, height, 0, 0]; // [x1, y1, x2, y2]
    let mut found = false;

    for y in 0..height {
        for x in 0..width {
            if gray[y as usize * width as usize + x as usize] >= threshold {
                update_bounds(&mut bounds, x, y);
                found = true;
            }
        }
    }

    found.then(|| {
        [
            bounds[0],
            bounds[1],
            bounds[2] - bounds[0] + 1,
            bounds[3] - bounds[1] + 1,
        ]
    })
}

fn update_bounds(bounds: &mut [u32; 4], x: u32, y: u32) {
    bounds[0] = bounds[0].min(x);
    bounds[1] = bounds[1].min(y);
    bounds[2] = bounds[2].max(x);
    bounds[3] = bounds[3].max(y);
}

/// Rectangular crop. The rectangle must lie inside the image.
pub fn crop(image: &PixelBuffer, x: u32, y: u32, width: u32, height: u32) -> Result<PixelBuffer> {
    let fits = x.checked_add(width).is_some_and(|right| right <= image.width())
        && y.checked_add(height).is_some_and(|bottom| bottom <= image.height());
    if !fits {
        return Err(ProcessorError::invalid_size(format!(
            "crop {width}x{height}+{x}+{y} exceeds image {}x{}",
            image.width(),
            image.height()
        )));
    }

    if (x, y, width, height) == (0, 0, image.width(), image.height()) {
        return Ok(image.clone());
    }

    let channels = image.channels();
    let row_len = width as usize * channels;
    let mut data = Vec::with_capacity(row_len * height as usize);
    for row in y..y + height {
        let start = image.offset(x, row);
        data.extend_from_slice(&image.data()[start..start + row_len]);
    }
    PixelBuffer::new(width, height, channels, data)
}

/// Crop the central `width` x `height` region.
///
/// Axes where the crop is larger than the image are zero-filled around the
/// centered content.
pub fn center_crop(image: &PixelBuffer, width: u32, height: u32) -> Result<PixelBuffer> {
    if width == 0 || height == 0 {
        return Err(ProcessorError::invalid_size(format!(
            "center crop to {width}x{height}"
        )));
    }
    if width <= image.width() && height <= image.height() {
        return crop(
            image,
            (image.width() - width) / 2,
            (image.height() - height) / 2,
            width,
            height,
        );
    }

    let left = centered_origin(image.width(), width);
    let top = centered_origin(image.height(), height);
    let channels = image.channels();
    let mut cropped = PixelBuffer::filled(width, height, channels, 0.0);

    for oy in 0..height {
        let sy = i64::from(oy) + top;
        if sy < 0 || sy >= i64::from(image.height()) {
            continue;
        }
        for ox in 0..width {
            let sx = i64::from(ox) + left;
            if sx < 0 || sx >= i64::from(image.width()) {
                continue;
            }
            let dst = cropped.offset(ox, oy);
            cropped.data_mut()[dst..dst + channels]
                .copy_from_slice(image.pixel(sx as u32, sy as u32));
        }
    }
    Ok(cropped)
}

/// Source coordinate of the first output sample along one axis.
fn centered_origin(size: u32, crop: u32) -> i64 {
    if size >= crop {
        i64::from((size - crop) / 2)
    } else {
        -i64::from((crop - size) / 2)
    }
}
