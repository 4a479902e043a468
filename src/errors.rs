use thiserror::Error;

/// Structured error types for image preprocessing and output post-processing.
///
/// # Why structured errors
///
/// Each variant captures the context of one failure domain (configuration,
/// geometry, tensor shapes, channel layout), so callers can match on the kind
/// of failure instead of parsing strings. Every error is surfaced to the caller
/// synchronously; the only benign degenerate case (cropping the margin of an
/// image that is entirely margin) is handled without an error.
#[derive(Error, Debug)]
pub enum ProcessorError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid size: {reason}")]
    InvalidSize { reason: String },

    #[error("Invalid padding: cannot pad {current_width}x{current_height} to {target_width}x{target_height}")]
    InvalidPadding {
        current_width: u32,
        current_height: u32,
        target_width: u32,
        target_height: u32,
    },

    #[error("Shape mismatch in {context}: expected {expected}, got {actual}")]
    ShapeMismatch {
        context: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported channel count: {channels} (expected 1, 3 or 4)")]
    UnsupportedChannels { channels: usize },

    #[error("Empty input: {what}")]
    EmptyInput { what: String },

    #[error("Image decode error: {operation} failed")]
    ImageDecode {
        operation: String,
        #[source]
        source: image::ImageError,
    },
}

pub type Result<T> = std::result::Result<T, ProcessorError>;

impl ProcessorError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub(crate) fn invalid_size(reason: impl Into<String>) -> Self {
        Self::InvalidSize {
            reason: reason.into(),
        }
    }

    pub(crate) fn shape_mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        actual: impl ToString,
    ) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            actual: actual.to_string(),
        }
    }

    pub(crate) fn empty_input(what: impl Into<String>) -> Self {
        Self::EmptyInput { what: what.into() }
    }
}

/// Convert malformed configuration documents to configuration errors.
impl From<serde_json::Error> for ProcessorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Config {
            message: err.to_string(),
        }
    }
}

/// Convert image crate errors raised while decoding host images.
impl From<image::ImageError> for ProcessorError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageDecode {
            operation: "image decoding".to_string(),
            source: err,
        }
    }
}

/// Convert ndarray shape errors to shape mismatches.
///
/// # Why shape mismatch category
///
/// ndarray only fails to reshape or stack when the element count or the
/// per-item shapes disagree, which is exactly what `ShapeMismatch` reports for
/// hand-checked tensors. Keeping one category means callers handle both paths
/// the same way.
impl From<ndarray::ShapeError> for ProcessorError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::ShapeMismatch {
            context: "tensor reshape".to_string(),
            expected: "compatible shapes".to_string(),
            actual: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ProcessorError::UnsupportedChannels { channels: 2 };
        assert_eq!(
            err.to_string(),
            "Unsupported channel count: 2 (expected 1, 3 or 4)"
        );

        let err = ProcessorError::InvalidPadding {
            current_width: 10,
            current_height: 20,
            target_width: 5,
            target_height: 20,
        };
        assert_eq!(
            err.to_string(),
            "Invalid padding: cannot pad 10x20 to 5x20"
        );
    }

    #[test]
    fn test_json_error_becomes_config_error() {
        let err: ProcessorError = serde_json::from_str::<u32>("not json").unwrap_err().into();
        assert!(matches!(err, ProcessorError::Config { .. }));
    }
}
