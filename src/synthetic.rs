//! Exact pinhole renderings of the marker rig.
//!
//! Masks are produced by intersecting sub-pixel rays with the marker spheres,
//! so the silhouettes carry the true projective ellipse distortion. Used by
//! the tests, the benchmarks and the `demo` command.

use crate::{
    camera::{project_point, CalibrationState, RadialCorrection},
    mask::ColorMask,
    orientation::{solve_pen, PenAxis, PenSolution},
    pipeline::FrameInput,
    Result,
};
use nalgebra::{Point2, Point3, Rotation3, Vector3};
use std::f64::consts::FRAC_PI_2;

/// Ideal pinhole camera
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticCamera {
    /// Focal length in pixels
    pub focal_length: f64,
    /// Principal point in pixels
    pub principal_point: Point2<f64>,
    /// Image width
    pub width: u32,
    /// Image height
    pub height: u32,
}

impl SyntheticCamera {
    /// Camera with the principal point at the image center
    #[must_use]
    pub fn centered(focal_length: f64, width: u32, height: u32) -> Self {
        Self {
            focal_length,
            principal_point: Point2::new(f64::from(width) / 2.0, f64::from(height) / 2.0),
            width,
            height,
        }
    }

    /// Image position of a camera-space point
    #[must_use]
    pub fn project(&self, point: &Point3<f64>) -> Option<Point2<f64>> {
        project_point(point, self.focal_length, self.principal_point)
    }

    /// The calibration this camera should be recovered as
    #[must_use]
    pub fn calibration(&self, marker_radius: f64) -> CalibrationState {
        CalibrationState {
            focal_length: self.focal_length,
            principal_point: [self.principal_point.x, self.principal_point.y],
            marker_radius,
            radial: RadialCorrection::identity(),
        }
    }

    /// Pixel range covering `[lo, hi]` image coordinates along one axis, clipped to `size`
    fn pixel_range(lo: f64, hi: f64, size: u32) -> Option<(u32, u32)> {
        let max = f64::from(size) - 1.0;
        let lo = (lo.floor() - 1.0).max(0.0);
        let hi = (hi.ceil() + 1.0).min(max);
        (lo <= hi).then(|| (lo as u32, hi as u32))
    }

    /// Image-space extent of a sphere along one axis, from its projection onto
    /// the plane spanned by that axis and the optical axis
    fn extent(&self, lateral: f64, depth: f64, radius: f64, principal: f64) -> Option<(f64, f64)> {
        let planar = lateral.hypot(depth);
        if planar <= radius {
            return None;
        }
        let mid = lateral.atan2(depth);
        let half = (radius / planar).asin();
        let (lo, hi) = (mid - half, mid + half);
        if lo <= -FRAC_PI_2 || hi >= FRAC_PI_2 {
            return None;
        }
        Some((
            principal + self.focal_length * lo.tan(),
            principal + self.focal_length * hi.tan(),
        ))
    }
}

/// Coverage-weighted mask of a sphere; `supersample²` rays per pixel.
///
/// Spheres behind the camera or enclosing it render as an empty mask.
#[must_use]
pub fn render_sphere_mask(camera: &SyntheticCamera, center: &Point3<f64>, radius: f64, supersample: u32) -> ColorMask {
    let mut mask = ColorMask::empty();
    if center.z <= radius || radius <= 0.0 {
        return mask;
    }
    let pp = camera.principal_point;
    let Some((x_lo, x_hi)) = camera.extent(center.x, center.z, radius, pp.x) else {
        return mask;
    };
    let Some((y_lo, y_hi)) = camera.extent(center.y, center.z, radius, pp.y) else {
        return mask;
    };
    let (Some((x0, x1)), Some((y0, y1))) = (
        SyntheticCamera::pixel_range(x_lo, x_hi, camera.width),
        SyntheticCamera::pixel_range(y_lo, y_hi, camera.height),
    ) else {
        return mask;
    };

    let n = supersample.max(1);
    let step = 1.0 / f64::from(n);
    let c = center.coords;
    let r2 = radius * radius;
    let c2 = c.norm_squared();

    for y in y0..=y1 {
        for x in x0..=x1 {
            let mut hits = 0u32;
            for j in 0..n {
                for i in 0..n {
                    let sx = f64::from(x) - 0.5 + (f64::from(i) + 0.5) * step;
                    let sy = f64::from(y) - 0.5 + (f64::from(j) + 0.5) * step;
                    let d = Vector3::new(sx - pp.x, sy - pp.y, camera.focal_length).normalize();
                    let along = d.dot(&c);
                    if along > 0.0 && c2 - along * along <= r2 {
                        hits += 1;
                    }
                }
            }
            if hits > 0 {
                mask.push(x, y, hits as f32 / (n * n) as f32);
            }
        }
    }
    mask
}

/// Three-marker rig at a known pose
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyntheticRig {
    /// Marker centroid in camera space
    pub centroid: Point3<f64>,
    /// Rig orientation relative to a frontal pose
    pub rotation: Rotation3<f64>,
    /// Distance between marker centers
    pub inter_marker_distance: f64,
    /// Marker ball radius
    pub ball_radius: f64,
}

impl SyntheticRig {
    /// Frontal rig (world frame equal to the camera frame) at `centroid`
    #[must_use]
    pub fn frontal(centroid: Point3<f64>, inter_marker_distance: f64, ball_radius: f64) -> Self {
        Self {
            centroid,
            rotation: Rotation3::identity(),
            inter_marker_distance,
            ball_radius,
        }
    }

    /// Same rig with a different orientation
    #[must_use]
    pub fn rotated(self, rotation: Rotation3<f64>) -> Self {
        Self { rotation, ..self }
    }

    /// Camera-space marker centers, `[red, green, blue]`.
    ///
    /// In the frontal pose red sits above the centroid and green/blue below
    /// it to the left/right, so blue − green points along +x.
    #[must_use]
    pub fn marker_positions(&self) -> [Point3<f64>; 3] {
        let s = self.inter_marker_distance;
        let r = s / 3f64.sqrt();
        [
            Vector3::new(0.0, -r, 0.0),
            Vector3::new(-s / 2.0, r / 2.0, 0.0),
            Vector3::new(s / 2.0, r / 2.0, 0.0),
        ]
        .map(|offset| self.centroid + self.rotation * offset)
    }

    /// Exact pen solution for this pose
    ///
    /// # Errors
    ///
    /// Only fails for a degenerate rig (zero inter-marker distance).
    pub fn pen_solution(&self, pen_length: f64, pen_axis: PenAxis) -> Result<PenSolution> {
        solve_pen(&self.marker_positions(), pen_length, pen_axis)
    }

    /// Render the three masks
    #[must_use]
    pub fn render(&self, camera: &SyntheticCamera, supersample: u32, audio_rms: Option<f64>) -> FrameInput {
        let masks = self
            .marker_positions()
            .map(|p| render_sphere_mask(camera, &p, self.ball_radius, supersample));
        FrameInput { masks, audio_rms }
    }
}
