// THEORY:
// Every failure the ingestion/export pipeline can surface lives here. Ingestion
// failures are caller-visible conditions (malformed or unsupported input), never
// transient faults, so nothing in the crate retries them. Unknown sample encodings
// are absent from this list: they degrade to pass-through with a
// warning instead of failing.

use std::fmt;
use std::process::ExitStatus;

/// A page's (width, height) pair, printed as `WxH`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels in one page.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Fatal errors raised while turning container bytes into a `Volume`.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("no image pages found in container")]
    NoPagesFound,

    #[error("could not determine image dimensions")]
    MissingDimensions,

    #[error("could not decode page #{index}: {reason}")]
    PageDecodeFailure { index: usize, reason: String },

    #[error("page {index} dimensions ({actual}) don't match first page ({expected})")]
    DimensionMismatch {
        index: usize,
        actual: Dimensions,
        expected: Dimensions,
    },

    #[error("unsupported container format")]
    UnsupportedContainer,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Rejections of a simulation parameter string or parameter values.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParamError {
    #[error("expected 5 '|'-separated fields, got {0}")]
    FieldCount(usize),

    #[error("illumination angle must be an 'x,y' pair, got '{0}'")]
    Angle(String),

    #[error("resolution must be exactly 3 numbers separated by commas (e.g. '0.1,0.1,0.1'), got '{0}'")]
    Resolution(String),

    #[error("NA must be a single number (e.g. '0.65'), got '{0}'")]
    NumericalAperture(String),

    #[error("output type must be 0 (amplitude), 1 (intensity) or 2 (complex), got '{0}'")]
    OutputType(String),

    #[error("n0 must be a single number (e.g. '1.33'), got '{0}'")]
    BackgroundIndex(String),
}

/// Failure reported by the external numeric procedure.
#[derive(Debug, thiserror::Error)]
pub enum ComputeError {
    #[error("compute procedure failed: {0}")]
    Failed(String),

    #[error("compute process exited with {status}: {stderr}")]
    ProcessFailed { status: ExitStatus, stderr: String },

    #[error("malformed compute result: {0}")]
    MalformedResult(String),

    #[error("invalid parameters: {0}")]
    Params(#[from] ParamError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors surfaced by `Session` operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no volume data loaded")]
    NoVolumeLoaded,

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error(transparent)]
    Params(#[from] ParamError),

    #[error(transparent)]
    Compute(#[from] ComputeError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimension_mismatch_names_page_and_both_sizes() {
        let err = IngestError::DimensionMismatch {
            index: 3,
            actual: Dimensions::new(4, 5),
            expected: Dimensions::new(2, 2),
        };
        assert_eq!(
            err.to_string(),
            "page 3 dimensions (4x5) don't match first page (2x2)"
        );
    }

    #[test]
    fn session_error_is_transparent_over_ingest() {
        let err: SessionError = IngestError::NoPagesFound.into();
        assert_eq!(err.to_string(), "no image pages found in container");
    }
}
