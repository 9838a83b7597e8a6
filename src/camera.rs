//! Pinhole camera state and ray casting.
//!
//! Camera space has its origin at the pinhole, +x towards the image right,
//! +y towards the image bottom and +z along the optical axis.

use crate::{
    constants::{EPSILON, FULL_SPHERE_SR},
    Error, Result,
};
use nalgebra::{Point2, Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};

/// Single-parameter division model for simple radial correction.
///
/// `undistorted = center + (distorted - center) / (1 + k1 * r^2)` with `r` in pixels.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RadialCorrection {
    /// Radial coefficient (negative for barrel distortion)
    pub k1: f64,
    /// Distortion center (pixels)
    pub center: [f64; 2],
}

impl RadialCorrection {
    /// Correction centered on `center`
    #[must_use]
    pub fn new(k1: f64, center: [f64; 2]) -> Self {
        Self { k1, center }
    }

    /// Zero-distortion model
    #[must_use]
    pub fn identity() -> Self {
        Self::new(0.0, [0.0, 0.0])
    }

    /// True when the model leaves coordinates unchanged
    #[must_use]
    pub fn is_identity(&self) -> bool {
        self.k1 == 0.0
    }

    /// Map a distorted pixel to its undistorted position
    #[must_use]
    pub fn undistort(&self, xy: [f64; 2]) -> [f64; 2] {
        if self.is_identity() {
            return xy;
        }
        let dx = xy[0] - self.center[0];
        let dy = xy[1] - self.center[1];
        let denom = 1.0 + self.k1 * (dx * dx + dy * dy);
        if denom.abs() < EPSILON || !denom.is_finite() {
            return xy;
        }
        [self.center[0] + dx / denom, self.center[1] + dy / denom]
    }
}

impl Default for RadialCorrection {
    fn default() -> Self {
        Self::identity()
    }
}

/// Convert a projected center into a unit ray in camera space.
///
/// # Errors
///
/// Returns `DegenerateGeometry` if the ray has zero or non-finite length,
/// which only happens for a non-positive focal length or non-finite input.
pub fn cast_ray(center: Point2<f64>, focal_length: f64, principal_point: Point2<f64>) -> Result<Unit<Vector3<f64>>> {
    let v = Vector3::new(center.x - principal_point.x, center.y - principal_point.y, focal_length);
    let norm = v.norm();
    if !norm.is_finite() || norm < EPSILON {
        return Err(Error::DegenerateGeometry(format!(
            "cannot cast ray through ({}, {})",
            center.x, center.y
        )));
    }
    Ok(Unit::new_unchecked(v / norm))
}

/// Fraction of the full sphere subtended by a unit pixel at `(x, y)`:
/// `f / ((x - cx)^2 + (y - cy)^2 + f^2)^(3/2) / 4π`.
#[must_use]
pub fn pixel_sphere_fraction(xy: [f64; 2], focal_length: f64, principal_point: Point2<f64>) -> f64 {
    let ray_length = pixel_ray_length(xy, focal_length, principal_point);
    focal_length / ray_length.powi(3) / FULL_SPHERE_SR
}

/// Length of the un-normalized ray `(x - cx, y - cy, f)`
#[must_use]
pub fn pixel_ray_length(xy: [f64; 2], focal_length: f64, principal_point: Point2<f64>) -> f64 {
    let dx = xy[0] - principal_point.x;
    let dy = xy[1] - principal_point.y;
    (dx * dx + dy * dy + focal_length * focal_length).sqrt()
}

/// Calibrated camera, computed once and shared read-only for the rest of the stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationState {
    /// Focal length in pixels
    pub focal_length: f64,
    /// Principal point in pixels
    pub principal_point: [f64; 2],
    /// Effective physical marker radius used by radius-based estimators
    pub marker_radius: f64,
    /// Radial correction applied to raw pixel coordinates
    pub radial: RadialCorrection,
}

impl CalibrationState {
    /// Principal point as a nalgebra point
    #[must_use]
    pub fn principal(&self) -> Point2<f64> {
        Point2::new(self.principal_point[0], self.principal_point[1])
    }

    /// Unit ray through a projected center
    ///
    /// # Errors
    ///
    /// See [`cast_ray`].
    pub fn ray(&self, center: Point2<f64>) -> Result<Unit<Vector3<f64>>> {
        cast_ray(center, self.focal_length, self.principal())
    }

    /// Project a camera-space point to the image; `None` behind the camera.
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> Option<Point2<f64>> {
        project_point(point, self.focal_length, self.principal())
    }
}

/// Pinhole projection of a camera-space point with `z > 0`
#[must_use]
pub fn project_point(point: &Point3<f64>, focal_length: f64, principal_point: Point2<f64>) -> Option<Point2<f64>> {
    if point.z <= EPSILON {
        return None;
    }
    Some(Point2::new(
        principal_point.x + focal_length * point.x / point.z,
        principal_point.y + focal_length * point.y / point.z,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn state() -> CalibrationState {
        CalibrationState {
            focal_length: 800.0,
            principal_point: [320.0, 240.0],
            marker_radius: 1.0,
            radial: RadialCorrection::identity(),
        }
    }

    #[test]
    fn test_ray_through_principal_point_is_optical_axis() {
        let ray = state().ray(Point2::new(320.0, 240.0)).unwrap();
        assert_relative_eq!(ray.into_inner(), Vector3::z(), epsilon = 1e-12);
    }

    #[test]
    fn test_ray_is_unit_and_reprojects() {
        let cam = state();
        let pixel = Point2::new(500.0, 100.0);
        let ray = cam.ray(pixel).unwrap();
        assert_relative_eq!(ray.norm(), 1.0, epsilon = 1e-12);

        let back = cam.project(&Point3::from(ray.into_inner() * 37.0)).unwrap();
        assert_relative_eq!(back, pixel, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_ray() {
        assert!(cast_ray(Point2::new(0.0, 0.0), 0.0, Point2::new(0.0, 0.0)).is_err());
        assert!(cast_ray(Point2::new(f64::NAN, 0.0), 800.0, Point2::new(0.0, 0.0)).is_err());
    }

    #[test]
    fn test_project_behind_camera() {
        assert!(state().project(&Point3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_pixel_sphere_fraction_on_axis() {
        let f = 800.0;
        let frac = pixel_sphere_fraction([0.0, 0.0], f, Point2::new(0.0, 0.0));
        assert_relative_eq!(frac, 1.0 / (f * f) / FULL_SPHERE_SR, epsilon = 1e-18);

        let off_axis = pixel_sphere_fraction([400.0, 0.0], f, Point2::new(0.0, 0.0));
        assert!(off_axis < frac);
    }

    #[test]
    fn test_radial_correction() {
        let identity = RadialCorrection::identity();
        assert_eq!(identity.undistort([10.0, 20.0]), [10.0, 20.0]);

        let barrel = RadialCorrection::new(-1e-6, [320.0, 240.0]);
        let corrected = barrel.undistort([420.0, 240.0]);
        // 1 + k1 * r^2 = 0.99 pushes the point outwards
        assert_relative_eq!(corrected[0], 320.0 + 100.0 / 0.99, epsilon = 1e-9);
        assert_relative_eq!(corrected[1], 240.0, epsilon = 1e-12);
        assert_eq!(barrel.undistort([320.0, 240.0]), [320.0, 240.0]);
    }
}
