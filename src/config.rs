//! Configuration management for the drawing decoder

use crate::{
    calibration::CalibrationMethod,
    camera::RadialCorrection,
    constants::{
        DEFAULT_AUDIO_THRESHOLD, DEFAULT_BALL_RADIUS, DEFAULT_GEOMETRIC_THRESHOLD, DEFAULT_IMAGE_HEIGHT,
        DEFAULT_IMAGE_WIDTH, DEFAULT_INITIAL_DEPTH, DEFAULT_INTER_MARKER_DISTANCE, DEFAULT_LIGHTNESS_THRESHOLD,
        DEFAULT_PEN_LENGTH, DEFAULT_SATURATION_THRESHOLD, DEFAULT_SMOOTHING_WINDOW,
        DEFAULT_TRIANGULATION_MAX_ITERATIONS, DEFAULT_TRIANGULATION_MAX_RESIDUAL,
        DEFAULT_TRIANGULATION_MIN_DENOMINATOR, DEFAULT_TRIANGULATION_TOLERANCE,
    },
    contact::ContactMode,
    distance::DistanceMethod,
    localization::LocalizerMethod,
    orientation::PenAxis,
    Error, Result,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Decoder configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Physical rig dimensions
    pub rig: RigConfig,

    /// Camera and image geometry
    pub camera: CameraConfig,

    /// Estimation method selection
    pub methods: MethodConfig,

    /// One-time calibration settings
    pub calibration: CalibrationConfig,

    /// Triangulation refinement settings
    pub triangulation: TriangulationConfig,

    /// Pen contact detection
    pub contact: ContactConfig,

    /// Trajectory smoothing
    pub smoothing: SmoothingConfig,

    /// RGB frame segmentation (used when feeding raw frames)
    pub segmentation: SegmentationConfig,
}

/// Physical rig dimensions, all in the same length unit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigConfig {
    /// Radius of each marker ball
    pub ball_radius: f64,

    /// Distance between any two marker centers
    pub inter_marker_distance: f64,

    /// Distance from the rig to the pen tip
    pub pen_length: f64,
}

/// Camera and image geometry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    /// Frame width in pixels
    pub image_width: u32,

    /// Frame height in pixels
    pub image_height: u32,

    /// Principal point override; defaults to the image center
    pub principal_point: Option<[f64; 2]>,

    /// Horizontal field of view in degrees, for FOV calibration
    pub horizontal_fov_deg: Option<f64>,

    /// Radial correction coefficient (division model, pixels⁻²)
    pub radial_k1: f64,
}

/// Estimation method selection
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MethodConfig {
    /// Marker localization method
    pub localizer: LocalizerMethod,

    /// Camera-to-marker distance method
    pub distance: DistanceMethod,

    /// Focal length calibration method
    pub calibration: CalibrationMethod,
}

/// One-time calibration settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Depth of the rig on the calibration frame
    pub initial_depth: Option<f64>,

    /// Re-estimate the ball radius from the calibration frame
    pub refine_ball_radius: bool,

    /// Give up if no calibration succeeds within this many frames
    pub max_frames: Option<usize>,
}

/// Triangulation refinement settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TriangulationConfig {
    /// Below this closed-form denominator the rays are treated as degenerate
    pub min_denominator: f64,

    /// Newton iterations after the closed-form estimate (0 disables refinement)
    pub max_iterations: usize,

    /// Stop when the largest distance update falls below this
    pub tolerance: f64,

    /// Reject the refined distances when any `|p_i - p_j|² - s²` exceeds
    /// this fraction of `s²`
    pub max_residual: f64,
}

/// Pen contact detection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContactConfig {
    /// Tip is touching when its world height is at most `-pen_length + threshold`
    pub geometric_threshold: f64,

    /// Tip is touching when the frame's audio RMS reaches this value
    pub audio_threshold: f64,

    /// Which signals decide contact
    pub mode: ContactMode,

    /// Axis along which the pen length is subtracted
    pub pen_axis: PenAxis,
}

/// Trajectory smoothing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmoothingConfig {
    /// Points per median window (1 disables smoothing)
    pub window_size: usize,

    /// Smooth each pen stroke independently
    pub per_stroke: bool,
}

/// RGB frame segmentation thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SegmentationConfig {
    /// Channel must exceed the pixel mean by this percentage, (0, 100]
    pub saturation_threshold: f64,

    /// Channel must exceed this absolute value (0-255)
    pub lightness_threshold: u8,
}

impl Default for RigConfig {
    fn default() -> Self {
        Self {
            ball_radius: DEFAULT_BALL_RADIUS,
            inter_marker_distance: DEFAULT_INTER_MARKER_DISTANCE,
            pen_length: DEFAULT_PEN_LENGTH,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            image_width: DEFAULT_IMAGE_WIDTH,
            image_height: DEFAULT_IMAGE_HEIGHT,
            principal_point: None,
            horizontal_fov_deg: None,
            radial_k1: 0.0,
        }
    }
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            initial_depth: Some(DEFAULT_INITIAL_DEPTH),
            refine_ball_radius: false,
            max_frames: None,
        }
    }
}

impl Default for TriangulationConfig {
    fn default() -> Self {
        Self {
            min_denominator: DEFAULT_TRIANGULATION_MIN_DENOMINATOR,
            max_iterations: DEFAULT_TRIANGULATION_MAX_ITERATIONS,
            tolerance: DEFAULT_TRIANGULATION_TOLERANCE,
            max_residual: DEFAULT_TRIANGULATION_MAX_RESIDUAL,
        }
    }
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            geometric_threshold: DEFAULT_GEOMETRIC_THRESHOLD,
            audio_threshold: DEFAULT_AUDIO_THRESHOLD,
            mode: ContactMode::default(),
            pen_axis: PenAxis::default(),
        }
    }
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_SMOOTHING_WINDOW,
            per_stroke: false,
        }
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            saturation_threshold: DEFAULT_SATURATION_THRESHOLD,
            lightness_threshold: DEFAULT_LIGHTNESS_THRESHOLD,
        }
    }
}

impl CameraConfig {
    /// Principal point, defaulting to the image center
    #[must_use]
    pub fn principal(&self) -> Point2<f64> {
        match self.principal_point {
            Some([x, y]) => Point2::new(x, y),
            None => Point2::new(f64::from(self.image_width) / 2.0, f64::from(self.image_height) / 2.0),
        }
    }

    /// Radial correction centered on the principal point
    #[must_use]
    pub fn radial(&self) -> RadialCorrection {
        let c = self.principal();
        RadialCorrection::new(self.radial_k1, [c.x, c.y])
    }
}

impl Config {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `ConfigurationInvalid` if it cannot be parsed.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the text is not a valid configuration.
    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| Error::ConfigurationInvalid(format!("Failed to parse config: {}", e)))
    }

    /// Save configuration to a YAML file
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = serde_yaml::to_string(self)
            .map_err(|e| Error::ConfigurationInvalid(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;

        Ok(())
    }

    /// Validate configuration
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(Error::ConfigurationInvalid(msg));

        // Rig geometry
        if !(self.rig.ball_radius.is_finite() && self.rig.ball_radius > 0.0) {
            return invalid(format!("Ball radius must be positive, got {}", self.rig.ball_radius));
        }
        if !(self.rig.inter_marker_distance.is_finite() && self.rig.inter_marker_distance > 0.0) {
            return invalid(format!(
                "Inter-marker distance must be positive, got {}",
                self.rig.inter_marker_distance
            ));
        }
        if !(self.rig.pen_length.is_finite() && self.rig.pen_length >= 0.0) {
            return invalid(format!("Pen length must be non-negative, got {}", self.rig.pen_length));
        }

        // Camera
        if self.camera.image_width == 0 || self.camera.image_height == 0 {
            return invalid("Image dimensions must be greater than 0".to_string());
        }
        if let Some([x, y]) = self.camera.principal_point {
            let inside = (0.0..=f64::from(self.camera.image_width)).contains(&x)
                && (0.0..=f64::from(self.camera.image_height)).contains(&y);
            if !inside {
                return invalid(format!("Principal point ({x}, {y}) lies outside the image"));
            }
        }
        if let Some(fov) = self.camera.horizontal_fov_deg {
            if !(fov > 0.0 && fov < 180.0) {
                return invalid(format!("Horizontal FOV must be in (0, 180) degrees, got {fov}"));
            }
        }
        if !self.camera.radial_k1.is_finite() {
            return invalid("Radial coefficient must be finite".to_string());
        }

        // Method combinations
        let has_depth = self.calibration.initial_depth.is_some_and(|z| z.is_finite() && z > 0.0);
        match self.methods.calibration {
            CalibrationMethod::Fov if self.camera.horizontal_fov_deg.is_none() => {
                return invalid("FOV calibration requires camera.horizontal_fov_deg".to_string());
            }
            CalibrationMethod::DistanceRatio if !has_depth => {
                return invalid("Distance-ratio calibration requires a positive calibration.initial_depth".to_string());
            }
            _ => {}
        }
        if self.calibration.refine_ball_radius && !has_depth {
            return invalid("Ball radius refinement requires a positive calibration.initial_depth".to_string());
        }
        if self.calibration.max_frames == Some(0) {
            return invalid("Calibration frame limit must be greater than 0".to_string());
        }

        // Triangulation
        if !(self.triangulation.min_denominator.is_finite() && self.triangulation.min_denominator >= 0.0) {
            return invalid("Triangulation minimum denominator must be non-negative".to_string());
        }
        if !(self.triangulation.tolerance.is_finite() && self.triangulation.tolerance >= 0.0) {
            return invalid("Triangulation tolerance must be non-negative".to_string());
        }
        if !(self.triangulation.max_residual.is_finite() && self.triangulation.max_residual > 0.0) {
            return invalid("Triangulation maximum residual must be positive".to_string());
        }

        // Contact
        if !self.contact.geometric_threshold.is_finite() {
            return invalid("Geometric contact threshold must be finite".to_string());
        }
        if !(self.contact.audio_threshold.is_finite() && self.contact.audio_threshold >= 0.0) {
            return invalid(format!(
                "Audio contact threshold must be non-negative, got {}",
                self.contact.audio_threshold
            ));
        }

        // Smoothing
        if self.smoothing.window_size == 0 {
            return invalid("Smoothing window size must be greater than 0".to_string());
        }

        // Segmentation
        let saturation = self.segmentation.saturation_threshold;
        if !(saturation > 0.0 && saturation <= 100.0) {
            return invalid(format!("Saturation threshold must be in (0, 100], got {saturation}"));
        }

        Ok(())
    }
}

/// Example configuration file content
pub const EXAMPLE_CONFIG: &str = r#"# Drawing Decoder Configuration

# Physical rig (centimetres)
rig:
  ball_radius: 3.0
  inter_marker_distance: 9.0
  pen_length: 18.0

# Camera geometry
camera:
  image_width: 1920
  image_height: 1080
  # principal_point: [960.0, 540.0]
  # horizontal_fov_deg: 70.0
  radial_k1: 0.0

# Method selection
methods:
  localizer: weighted        # unweighted | tangential | weighted
  distance: triangulation    # triangulation | trilateration
  calibration: distance_ratio  # distance_ratio | fov

# Calibration (first frame with all three markers)
calibration:
  initial_depth: 18.0
  refine_ball_radius: false
  # max_frames: 120

# Triangulation refinement
triangulation:
  min_denominator: 1.0e-9
  max_iterations: 20
  tolerance: 1.0e-12
  max_residual: 1.0e-6     # relative to inter_marker_distance squared

# Pen contact
contact:
  geometric_threshold: 1.0
  audio_threshold: 0.0013
  mode: either               # either | geometric | audio
  pen_axis: camera           # camera | world

# Trajectory smoothing
smoothing:
  window_size: 10
  per_stroke: false

# RGB segmentation
segmentation:
  saturation_threshold: 75.0
  lightness_threshold: 90
"#;
