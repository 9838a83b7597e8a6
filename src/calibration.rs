//! One-time camera self-calibration on the first frame with three valid markers.

use crate::{
    camera::{CalibrationState, RadialCorrection},
    config::Config,
    localization::MarkerObservation,
    Error, Result,
};
use log::info;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the focal length is obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalibrationMethod {
    /// Projected inter-marker distances at a known rig depth
    #[default]
    DistanceRatio,
    /// Supplied horizontal field of view
    Fov,
}

impl FromStr for CalibrationMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "distance_ratio" | "distanceratio" | "ratio" => Ok(Self::DistanceRatio),
            "fov" => Ok(Self::Fov),
            _ => Err(Error::ConfigurationInvalid(format!("Unknown calibration method: {s}"))),
        }
    }
}

impl fmt::Display for CalibrationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::DistanceRatio => "distance_ratio",
            Self::Fov => "fov",
        })
    }
}

/// `f = (image_width / 2) / tan(hfov / 2)`
///
/// # Errors
///
/// Returns `ConfigurationInvalid` for a field of view outside (0°, 180°).
pub fn focal_from_fov(image_width: u32, horizontal_fov_deg: f64) -> Result<f64> {
    if !(horizontal_fov_deg > 0.0 && horizontal_fov_deg < 180.0) {
        return Err(Error::ConfigurationInvalid(format!(
            "Horizontal FOV must be in (0, 180) degrees, got {horizontal_fov_deg}"
        )));
    }
    let half = (horizontal_fov_deg / 2.0).to_radians();
    Ok(f64::from(image_width) / 2.0 / half.tan())
}

/// `f = mean projected pair distance × depth / actual distance`
///
/// # Errors
///
/// Returns `DegenerateGeometry` when the projected markers coincide.
pub fn focal_from_distance_ratio(centers: &[Point2<f64>; 3], actual_distance: f64, depth: f64) -> Result<f64> {
    let projected_length = [(0, 1), (1, 2), (2, 0)]
        .iter()
        .map(|&(i, j)| (centers[i] - centers[j]).norm())
        .sum::<f64>()
        / 3.0;

    if projected_length <= 0.0 || !projected_length.is_finite() {
        return Err(Error::DegenerateGeometry(
            "projected markers coincide on the calibration frame".to_string(),
        ));
    }
    Ok(projected_length * depth / actual_distance)
}

/// Produces the frozen [`CalibrationState`] from one frame of observations
#[derive(Debug, Clone, PartialEq)]
pub struct CameraCalibrator {
    method: CalibrationMethod,
    image_width: u32,
    principal_point: Point2<f64>,
    horizontal_fov_deg: Option<f64>,
    initial_depth: Option<f64>,
    inter_marker_distance: f64,
    marker_radius: f64,
    refine_marker_radius: bool,
    radial: RadialCorrection,
}

impl CameraCalibrator {
    /// Build a calibrator from validated configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let principal_point = config.camera.principal();
        Self {
            method: config.methods.calibration,
            image_width: config.camera.image_width,
            principal_point,
            horizontal_fov_deg: config.camera.horizontal_fov_deg,
            initial_depth: config.calibration.initial_depth,
            inter_marker_distance: config.rig.inter_marker_distance,
            marker_radius: config.rig.ball_radius,
            refine_marker_radius: config.calibration.refine_ball_radius,
            radial: config.camera.radial(),
        }
    }

    /// Principal point used before and after calibration
    #[must_use]
    pub fn principal_point(&self) -> Point2<f64> {
        self.principal_point
    }

    /// Radial correction applied to mask coordinates
    #[must_use]
    pub fn radial(&self) -> RadialCorrection {
        self.radial
    }

    /// Configured physical marker radius
    #[must_use]
    pub fn marker_radius(&self) -> f64 {
        self.marker_radius
    }

    /// Calibrate from the unweighted observations of one frame.
    ///
    /// # Errors
    ///
    /// - `ConfigurationInvalid` when the method's inputs are missing
    /// - `DegenerateGeometry` when the observations cannot yield a focal length
    pub fn calibrate(&self, observations: &[MarkerObservation; 3]) -> Result<CalibrationState> {
        let focal_length = match self.method {
            CalibrationMethod::Fov => {
                let fov = self.horizontal_fov_deg.ok_or_else(|| {
                    Error::ConfigurationInvalid("FOV calibration requires camera.horizontal_fov_deg".to_string())
                })?;
                focal_from_fov(self.image_width, fov)?
            }
            CalibrationMethod::DistanceRatio => {
                let depth = self.require_depth()?;
                let centers = observations.map(|o| o.projected_center);
                focal_from_distance_ratio(&centers, self.inter_marker_distance, depth)?
            }
        };

        if !(focal_length.is_finite() && focal_length > 0.0) {
            return Err(Error::DegenerateGeometry(format!("focal length {focal_length} is not positive")));
        }

        let marker_radius = if self.refine_marker_radius {
            let depth = self.require_depth()?;
            let mean_radius = observations.iter().map(|o| o.projected_radius).sum::<f64>() / 3.0;
            mean_radius * depth / focal_length
        } else {
            self.marker_radius
        };

        info!(
            "Calibrated camera ({}): focal length {:.3}px, principal point ({:.1}, {:.1}), marker radius {:.3}",
            self.method, focal_length, self.principal_point.x, self.principal_point.y, marker_radius
        );

        Ok(CalibrationState {
            focal_length,
            principal_point: [self.principal_point.x, self.principal_point.y],
            marker_radius,
            radial: self.radial,
        })
    }

    fn require_depth(&self) -> Result<f64> {
        match self.initial_depth {
            Some(z) if z > 0.0 && z.is_finite() => Ok(z),
            _ => Err(Error::ConfigurationInvalid(
                "calibration.initial_depth must be a positive depth".to_string(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::localization::{LocalizerMethod, MarkerColor};
    use approx::assert_relative_eq;

    fn observation(color: MarkerColor, x: f64, y: f64, radius: f64) -> MarkerObservation {
        MarkerObservation {
            color,
            method: LocalizerMethod::Unweighted,
            projected_center: Point2::new(x, y),
            projected_radius: radius,
            fractional_area: 0.0,
            distance: None,
            pixel_count: 1.0,
        }
    }

    fn equilateral(side_px: f64, radius: f64) -> [MarkerObservation; 3] {
        let h = side_px * 3f64.sqrt() / 2.0;
        [
            observation(MarkerColor::Red, 320.0, 240.0 - h, radius),
            observation(MarkerColor::Green, 320.0 - side_px / 2.0, 240.0, radius),
            observation(MarkerColor::Blue, 320.0 + side_px / 2.0, 240.0, radius),
        ]
    }

    #[test]
    fn test_focal_from_fov() {
        let f = focal_from_fov(640, 90.0).unwrap();
        assert_relative_eq!(f, 320.0, epsilon = 1e-9);
        assert!(focal_from_fov(640, 0.0).is_err());
        assert!(focal_from_fov(640, 180.0).is_err());
    }

    #[test]
    fn test_distance_ratio() {
        let mut config = Config::default();
        config.rig.inter_marker_distance = 10.0;
        config.calibration.initial_depth = Some(50.0);
        let calibrator = CameraCalibrator::from_config(&config);

        // f = 800, s = 10, z = 50 → 160px sides
        let state = calibrator.calibrate(&equilateral(160.0, 16.0)).unwrap();
        assert_relative_eq!(state.focal_length, 800.0, epsilon = 1e-9);
        assert_eq!(state.marker_radius, config.rig.ball_radius);
    }

    #[test]
    fn test_radius_refinement() {
        let mut config = Config::default();
        config.rig.inter_marker_distance = 10.0;
        config.calibration.initial_depth = Some(50.0);
        config.calibration.refine_ball_radius = true;
        let calibrator = CameraCalibrator::from_config(&config);

        let state = calibrator.calibrate(&equilateral(160.0, 16.0)).unwrap();
        assert_relative_eq!(state.marker_radius, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn test_fov_requires_fov() {
        let mut config = Config::default();
        config.methods.calibration = CalibrationMethod::Fov;
        config.camera.horizontal_fov_deg = None;
        let calibrator = CameraCalibrator::from_config(&config);
        assert!(matches!(
            calibrator.calibrate(&equilateral(100.0, 5.0)),
            Err(Error::ConfigurationInvalid(_))
        ));
    }

    #[test]
    fn test_coincident_markers() {
        let centers = [Point2::new(5.0, 5.0); 3];
        assert!(matches!(
            focal_from_distance_ratio(&centers, 9.0, 18.0),
            Err(Error::DegenerateGeometry(_))
        ));
    }
}
