//! Error types for the drawing decoder.

use crate::localization::MarkerColor;
use thiserror::Error;

/// Main error type for the library
#[derive(Error, Debug)]
pub enum Error {
    /// No frame yielded three simultaneously valid markers
    #[error("Calibration failed: no frame with three valid markers after {frames_seen} frames")]
    CalibrationFailed {
        /// Frames examined while awaiting calibration
        frames_seen: usize,
    },

    /// The mask for a marker was empty or carried no weight
    #[error("Marker not detected: {0}")]
    MarkerNotDetected(MarkerColor),

    /// Near-zero denominator, collinear markers or a vanishing cross product
    #[error("Degenerate geometry: {0}")]
    DegenerateGeometry(String),

    /// Configuration rejected at startup
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Invalid input parameters provided
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation not allowed in the current pipeline state
    #[error("Invalid pipeline state: {0}")]
    InvalidState(String),

    /// File I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding failed
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Per-frame conditions that skip the frame instead of aborting the run
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MarkerNotDetected(_) | Self::DegenerateGeometry(_))
    }

    /// Conditions that abort the run
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::CalibrationFailed { .. } | Self::ConfigurationInvalid(_))
    }
}

/// Convenience type alias for Results with our Error type
pub type Result<T> = std::result::Result<T, Error>;
