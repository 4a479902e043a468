pub mod convert_color;
pub mod crop;
pub mod normalize;
pub mod padding;
pub mod resize;

pub use convert_color::ConvertColor;
pub use crop::{center_crop, crop, crop_margin, DEFAULT_GRAY_THRESHOLD};
pub use normalize::{flip_channel_order, normalize, rescale, DEFAULT_RESCALE_FACTOR};
pub use padding::{pad, PadMode, PadOptions};
pub use resize::{compute_resize_size, resize, resize_nearest, thumbnail, Resample, ResizeOptions};
