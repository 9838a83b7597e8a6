//! Marker localization from per-color pixel masks.
//!
//! Each mask is reduced to a projected center, a projected radius and the
//! fraction of the full sphere the marker covers, using one of three methods:
//!
//! - [`LocalizerMethod::Unweighted`]: plain pixel centroid, no ellipse correction
//! - [`LocalizerMethod::Tangential`]: bisector of the nearest and farthest tangent rays
//! - [`LocalizerMethod::Weighted`]: solid-angle weighted centroid (default)

/// Plain centroid and area-derived radius
pub mod unweighted;

/// Tangent-ray bisector localization
pub mod tangential;

/// Solid-angle weighted centroid with spherical-cap depth
pub mod weighted;

use crate::{
    camera::{CalibrationState, RadialCorrection},
    constants::NUM_MARKERS,
    mask::ColorMask,
    Error, Result,
};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three distinctly colored markers on the rig
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerColor {
    /// Red marker
    Red,
    /// Green marker
    Green,
    /// Blue marker
    Blue,
}

impl MarkerColor {
    /// All markers in canonical order
    pub const ALL: [Self; NUM_MARKERS] = [Self::Red, Self::Green, Self::Blue];

    /// Position in canonical order (and RGB channel index)
    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Red => 0,
            Self::Green => 1,
            Self::Blue => 2,
        }
    }
}

impl fmt::Display for MarkerColor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Red => "red",
            Self::Green => "green",
            Self::Blue => "blue",
        };
        f.write_str(name)
    }
}

/// Localization method, selected once from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalizerMethod {
    /// Arithmetic mean of mask pixels
    Unweighted,
    /// Angle bisector of the tangent rays (accurate but noisy)
    Tangential,
    /// Solid-angle weighted centroid
    #[default]
    Weighted,
}

impl FromStr for LocalizerMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "unweighted" | "centroid" => Ok(Self::Unweighted),
            "tangential" | "bisector" => Ok(Self::Tangential),
            "weighted" | "solid_angle" => Ok(Self::Weighted),
            _ => Err(Error::ConfigurationInvalid(format!("Unknown localizer method: {s}"))),
        }
    }
}

impl fmt::Display for LocalizerMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unweighted => "unweighted",
            Self::Tangential => "tangential",
            Self::Weighted => "weighted",
        };
        f.write_str(name)
    }
}

/// A localized marker in one frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MarkerObservation {
    /// Which marker
    pub color: MarkerColor,
    /// Method that produced this observation
    pub method: LocalizerMethod,
    /// Image position of the marker center (undistorted pixels)
    pub projected_center: Point2<f64>,
    /// Apparent radius in pixels
    pub projected_radius: f64,
    /// Fraction of the full sphere subtended by the marker (0 when unknown)
    pub fractional_area: f64,
    /// Along-ray distance to the marker center, when the method yields one
    pub distance: Option<f64>,
    /// Effective pixel count (sum of mask weights)
    pub pixel_count: f64,
}

/// Camera knowledge available to the localizer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocalizerContext {
    /// Principal point in pixels
    pub principal_point: Point2<f64>,
    /// Focal length; absent on the calibration frame
    pub focal_length: Option<f64>,
    /// Physical marker radius
    pub marker_radius: f64,
    /// Correction applied to raw mask coordinates
    pub radial: RadialCorrection,
}

impl LocalizerContext {
    /// Context before the focal length is known
    #[must_use]
    pub fn uncalibrated(principal_point: Point2<f64>, marker_radius: f64, radial: RadialCorrection) -> Self {
        Self {
            principal_point,
            focal_length: None,
            marker_radius,
            radial,
        }
    }

    /// Context from a frozen calibration
    #[must_use]
    pub fn from_calibration(calibration: &CalibrationState) -> Self {
        Self {
            principal_point: calibration.principal(),
            focal_length: Some(calibration.focal_length),
            marker_radius: calibration.marker_radius,
            radial: calibration.radial,
        }
    }

    /// Mask pixels with radial correction applied, paired with their weights
    pub(crate) fn corrected<'a>(&'a self, mask: &'a ColorMask) -> impl Iterator<Item = ([f64; 2], f64)> + 'a {
        mask.pixels()
            .iter()
            .map(move |p| (self.radial.undistort(p.center()), f64::from(p.weight)))
    }

    fn require_focal(&self, method: LocalizerMethod) -> Result<f64> {
        match self.focal_length {
            Some(f) if f.is_finite() && f > 0.0 => Ok(f),
            _ => Err(Error::InvalidInput(format!(
                "{method} localization requires a calibrated focal length"
            ))),
        }
    }
}

/// Localize one marker from its mask.
///
/// # Errors
///
/// - `MarkerNotDetected` for an empty or zero-weight mask
/// - `DegenerateGeometry` when the chosen method cannot recover a center
/// - `InvalidInput` when the method needs a focal length that is not known yet
pub fn localize(
    mask: &ColorMask,
    color: MarkerColor,
    method: LocalizerMethod,
    context: &LocalizerContext,
) -> Result<MarkerObservation> {
    if mask.is_empty() || mask.total_weight() <= 0.0 {
        return Err(Error::MarkerNotDetected(color));
    }
    match method {
        LocalizerMethod::Unweighted => Ok(unweighted::localize(mask, color, context)),
        LocalizerMethod::Tangential => {
            let f = context.require_focal(method)?;
            tangential::localize(mask, color, f, context)
        }
        LocalizerMethod::Weighted => {
            let f = context.require_focal(method)?;
            weighted::localize(mask, color, f, context)
        }
    }
}

/// Localize all three markers; each entry fails independently.
pub fn localize_markers(
    masks: &[ColorMask; 3],
    method: LocalizerMethod,
    context: &LocalizerContext,
) -> [Result<MarkerObservation>; 3] {
    MarkerColor::ALL.map(|color| localize(&masks[color.index()], color, method, context))
}
