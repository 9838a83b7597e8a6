//! Constants used throughout the decoder

use std::f64::consts::PI;

/// Number of tracked markers (red, green, blue)
pub const NUM_MARKERS: usize = 3;

/// Solid angle of the full sphere in steradians
pub const FULL_SPHERE_SR: f64 = 4.0 * PI;

/// Default physical ball radius (cm)
pub const DEFAULT_BALL_RADIUS: f64 = 3.0;

/// Default distance between marker centers (cm)
pub const DEFAULT_INTER_MARKER_DISTANCE: f64 = 9.0;

/// Default pen length below the marker rig (cm)
pub const DEFAULT_PEN_LENGTH: f64 = 18.0;

/// Default rig depth on the calibration frame (cm)
pub const DEFAULT_INITIAL_DEPTH: f64 = 18.0;

/// Default frame size
pub const DEFAULT_IMAGE_WIDTH: u32 = 1920;
pub const DEFAULT_IMAGE_HEIGHT: u32 = 1080;

/// Contact thresholds
pub const DEFAULT_GEOMETRIC_THRESHOLD: f64 = 1.0;
pub const DEFAULT_AUDIO_THRESHOLD: f64 = 0.0013;

/// Default smoothing window
pub const DEFAULT_SMOOTHING_WINDOW: usize = 10;

/// Segmentation thresholds
pub const DEFAULT_SATURATION_THRESHOLD: f64 = 75.0;
pub const DEFAULT_LIGHTNESS_THRESHOLD: u8 = 90;

/// Triangulation refinement defaults
pub const DEFAULT_TRIANGULATION_MIN_DENOMINATOR: f64 = 1e-9;
pub const DEFAULT_TRIANGULATION_MAX_ITERATIONS: usize = 20;
pub const DEFAULT_TRIANGULATION_TOLERANCE: f64 = 1e-12;
pub const DEFAULT_TRIANGULATION_MAX_RESIDUAL: f64 = 1e-6;

/// Cross product norms below this make the world frame undefined
pub const ORIENTATION_EPSILON: f64 = 1e-9;

/// Numeric precision epsilon
pub const EPSILON: f64 = 1e-12;
