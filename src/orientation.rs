//! Rig-anchored world frame and pen-tip solution.

use crate::{constants::ORIENTATION_EPSILON, Error, Result};
use nalgebra::{Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Axis along which the pen length is subtracted from the camera position
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PenAxis {
    /// Camera-space y
    #[default]
    Camera,
    /// The rig's own y axis
    World,
}

impl FromStr for PenAxis {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "camera" => Ok(Self::Camera),
            "world" | "rig" => Ok(Self::World),
            _ => Err(Error::ConfigurationInvalid(format!("Unknown pen axis: {s}"))),
        }
    }
}

impl fmt::Display for PenAxis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Camera => "camera",
            Self::World => "world",
        })
    }
}

/// Orthonormal right-handed basis anchored to the marker triangle,
/// expressed in camera space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldFrame {
    /// Green → blue
    pub x_axis: Unit<Vector3<f64>>,
    /// `z × x`
    pub y_axis: Unit<Vector3<f64>>,
    /// Normal of the marker triangle
    pub z_axis: Unit<Vector3<f64>>,
}

impl WorldFrame {
    /// Build the frame from camera-space marker positions in `[red, green, blue]` order.
    ///
    /// # Errors
    ///
    /// Returns `DegenerateGeometry` when green and blue coincide or the markers are collinear.
    pub fn from_markers(positions: &[Point3<f64>; 3]) -> Result<Self> {
        let [red, green, blue] = positions;

        let x_axis = Unit::try_new(blue - green, ORIENTATION_EPSILON)
            .ok_or_else(|| Error::DegenerateGeometry("green and blue markers coincide".to_string()))?;
        let z_axis = Unit::try_new(x_axis.cross(&(blue - red)), ORIENTATION_EPSILON)
            .ok_or_else(|| Error::DegenerateGeometry("markers are collinear".to_string()))?;
        let y_axis = Unit::new_normalize(z_axis.cross(&*x_axis));

        Ok(Self { x_axis, y_axis, z_axis })
    }

    /// Camera-aligned frame
    #[must_use]
    pub fn identity() -> Self {
        Self {
            x_axis: Vector3::x_axis(),
            y_axis: Vector3::y_axis(),
            z_axis: Vector3::z_axis(),
        }
    }

    /// Express a camera-space vector in this frame: `(x·v, y·v, z·v)`
    #[must_use]
    pub fn to_world(&self, v: &Vector3<f64>) -> Vector3<f64> {
        Vector3::new(self.x_axis.dot(v), self.y_axis.dot(v), self.z_axis.dot(v))
    }

    /// Unit length and mutually perpendicular within `tolerance`
    #[must_use]
    pub fn is_orthonormal(&self, tolerance: f64) -> bool {
        let axes = [self.x_axis, self.y_axis, self.z_axis];
        let unit = axes.iter().all(|a| (a.norm() - 1.0).abs() <= tolerance);
        let perpendicular = [(0, 1), (1, 2), (2, 0)]
            .iter()
            .all(|&(i, j)| axes[i].dot(&*axes[j]).abs() <= tolerance);
        unit && perpendicular
    }
}

/// Per-frame orientation output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PenSolution {
    /// Camera relative to the marker centroid, in camera axes
    pub camera_position: Point3<f64>,
    /// Rig-anchored frame
    pub world_frame: WorldFrame,
    /// Pen tip, camera axes, centroid origin
    pub pen_tip_camera: Point3<f64>,
    /// Pen tip in the world frame
    pub pen_tip_world: Point3<f64>,
}

/// Solve camera position, world frame and pen tip from three marker positions.
///
/// # Errors
///
/// Returns `DegenerateGeometry` when the world frame is undefined.
pub fn solve_pen(positions: &[Point3<f64>; 3], pen_length: f64, pen_axis: PenAxis) -> Result<PenSolution> {
    let world_frame = WorldFrame::from_markers(positions)?;

    let mean = (positions[0].coords + positions[1].coords + positions[2].coords) / 3.0;
    let camera_position = Point3::from(-mean);

    let offset = match pen_axis {
        PenAxis::Camera => Vector3::new(0.0, pen_length, 0.0),
        PenAxis::World => world_frame.y_axis.into_inner() * pen_length,
    };
    let pen_tip_camera = camera_position - offset;
    let pen_tip_world = Point3::from(world_frame.to_world(&pen_tip_camera.coords));

    Ok(PenSolution {
        camera_position,
        world_frame,
        pen_tip_camera,
        pen_tip_world,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn frontal(depth: f64) -> [Point3<f64>; 3] {
        let r = 10.0 / 3f64.sqrt();
        [
            Point3::new(0.0, -r, depth),
            Point3::new(-5.0, r / 2.0, depth),
            Point3::new(5.0, r / 2.0, depth),
        ]
    }

    #[test]
    fn test_frontal_rig_is_camera_aligned() {
        let frame = WorldFrame::from_markers(&frontal(50.0)).unwrap();
        assert_relative_eq!(frame.x_axis.into_inner(), Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(frame.y_axis.into_inner(), Vector3::y(), epsilon = 1e-12);
        assert_relative_eq!(frame.z_axis.into_inner(), Vector3::z(), epsilon = 1e-12);
        assert!(frame.is_orthonormal(1e-12));
    }

    #[test]
    fn test_pen_tip_frontal() {
        let solution = solve_pen(&frontal(50.0), 5.0, PenAxis::Camera).unwrap();
        assert_relative_eq!(solution.camera_position, Point3::new(0.0, 0.0, -50.0), epsilon = 1e-12);
        assert_relative_eq!(solution.pen_tip_world, Point3::new(0.0, -5.0, -50.0), epsilon = 1e-12);
    }

    #[test]
    fn test_pen_axis_world_follows_rig() {
        let rotation = Rotation3::from_axis_angle(&Vector3::z_axis(), 0.4);
        let positions = frontal(50.0).map(|p| Point3::from(rotation * p.coords));

        let solution = solve_pen(&positions, 5.0, PenAxis::World).unwrap();
        let expected_offset = rotation * Vector3::new(0.0, 5.0, 0.0);
        assert_relative_eq!(
            solution.pen_tip_camera,
            solution.camera_position - expected_offset,
            epsilon = 1e-9
        );
        // Along the rig's own axis the height drop is the full pen length
        let camera_world = solution.world_frame.to_world(&solution.camera_position.coords);
        assert_relative_eq!(solution.pen_tip_world.y, camera_world.y - 5.0, epsilon = 1e-9);
    }

    #[test]
    fn test_degenerate_markers() {
        let collinear = [
            Point3::new(0.0, 0.0, 10.0),
            Point3::new(1.0, 0.0, 10.0),
            Point3::new(2.0, 0.0, 10.0),
        ];
        assert!(matches!(
            WorldFrame::from_markers(&collinear),
            Err(Error::DegenerateGeometry(_))
        ));

        let coincident = [Point3::new(1.0, 2.0, 3.0); 3];
        assert!(solve_pen(&coincident, 1.0, PenAxis::Camera).is_err());
    }
}
