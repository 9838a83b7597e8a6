//! Camera-to-marker distances along the three rays.
//!
//! Two estimators are available. Triangulation couples the rays through the
//! known inter-marker distance; trilateration works per marker from its
//! apparent size.

use crate::{
    camera::CalibrationState,
    config::{Config, TriangulationConfig},
    localization::MarkerObservation,
    Error, Result,
};
use log::debug;
use nalgebra::{Matrix3, Point3, Unit, Vector3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Three unit rays in marker order
pub type Rays = [Unit<Vector3<f64>>; 3];

/// Distance estimation method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMethod {
    /// Law-of-cosines triangulation from the pairwise ray angles
    #[default]
    Triangulation,
    /// Per-marker depth from projected radius or solid angle
    Trilateration,
}

impl FromStr for DistanceMethod {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "triangulation" | "angular" => Ok(Self::Triangulation),
            "trilateration" | "radius" => Ok(Self::Trilateration),
            _ => Err(Error::ConfigurationInvalid(format!("Unknown distance method: {s}"))),
        }
    }
}

impl fmt::Display for DistanceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Triangulation => "triangulation",
            Self::Trilateration => "trilateration",
        })
    }
}

const PAIRS: [(usize, usize); 3] = [(0, 1), (1, 2), (2, 0)];

/// Symmetric closed-form distances:
/// `t_1 = s(1 - r2·r3) / sqrt(2(1 - r1·r2)(1 - r2·r3)(1 - r3·r1))` and cyclic.
///
/// Exact when the three distances are equal.
///
/// # Errors
///
/// Returns `DegenerateGeometry` when the denominator falls below `min_denominator`.
pub fn closed_form_distances(rays: &Rays, inter_marker_distance: f64, min_denominator: f64) -> Result<[f64; 3]> {
    let one_minus = PAIRS.map(|(i, j)| 1.0 - rays[i].dot(&*rays[j]));
    let product = 2.0 * one_minus[0] * one_minus[1] * one_minus[2];
    if !(product.is_finite() && product > 0.0) || product.sqrt() < min_denominator {
        return Err(Error::DegenerateGeometry(format!(
            "triangulation denominator {:.3e} below threshold",
            product.max(0.0).sqrt()
        )));
    }
    let denominator = product.sqrt();

    // t_1 pairs with the angle opposite it (rays 2 and 3), and so on
    Ok([
        inter_marker_distance * one_minus[1] / denominator,
        inter_marker_distance * one_minus[2] / denominator,
        inter_marker_distance * one_minus[0] / denominator,
    ])
}

/// Residuals `t_i² + t_j² - 2 t_i t_j c_ij - s²` for the pairs (1,2), (2,3), (3,1)
fn residuals(t: &Vector3<f64>, cosines: &[f64; 3], s: f64) -> Vector3<f64> {
    Vector3::from_fn(|k, _| {
        let (i, j) = PAIRS[k];
        t[i] * t[i] + t[j] * t[j] - 2.0 * t[i] * t[j] * cosines[k] - s * s
    })
}

/// Angular triangulation: Newton refinement of the three law-of-cosines
/// equations, started from `prior` when given and from the closed form otherwise.
///
/// A tilted rig can admit two exact solutions; the refinement settles on the
/// one whose basin contains the starting point, so a size-based `prior` picks
/// the physical one more reliably than the symmetric closed form. A prior
/// that does not converge falls back to the closed form. With
/// `max_iterations` at 0 the closed form is returned unrefined.
///
/// # Errors
///
/// Returns `DegenerateGeometry` for nearly coplanar rays, or when no start
/// converges to positive distances within `max_residual`.
pub fn triangulate(
    rays: &Rays,
    inter_marker_distance: f64,
    params: &TriangulationConfig,
    prior: Option<&[f64; 3]>,
) -> Result<[f64; 3]> {
    let closed_form = closed_form_distances(rays, inter_marker_distance, params.min_denominator)?;
    let cosines = PAIRS.map(|(i, j)| rays[i].dot(&*rays[j]));

    let prior = prior.filter(|p| p.iter().all(|d| d.is_finite() && *d > 0.0)).copied();
    let mut failure = None;
    for seed in prior.into_iter().chain([closed_form]) {
        match refine(seed, &cosines, inter_marker_distance, params) {
            Ok(t) => return Ok(t),
            Err(e) => {
                debug!("Triangulation from {seed:?} rejected: {e}");
                failure = Some(e);
            }
        }
    }
    Err(failure.unwrap_or_else(|| Error::DegenerateGeometry("triangulation did not converge".to_string())))
}

fn refine(seed: [f64; 3], cosines: &[f64; 3], s: f64, params: &TriangulationConfig) -> Result<[f64; 3]> {
    let mut t = Vector3::from(seed);
    for iteration in 0..params.max_iterations {
        let f = residuals(&t, cosines, s);
        if f.amax() <= params.tolerance * s * s {
            break;
        }
        let mut jacobian = Matrix3::zeros();
        for (k, &(i, j)) in PAIRS.iter().enumerate() {
            jacobian[(k, i)] = 2.0 * t[i] - 2.0 * t[j] * cosines[k];
            jacobian[(k, j)] = 2.0 * t[j] - 2.0 * t[i] * cosines[k];
        }

        let step = jacobian
            .lu()
            .solve(&(-f))
            .ok_or_else(|| Error::DegenerateGeometry("singular triangulation Jacobian".to_string()))?;
        t += step;

        if step.amax() <= params.tolerance * s.max(1.0) {
            debug!("Triangulation converged after {} iterations", iteration + 1);
            break;
        }
    }

    if t.iter().any(|d| !d.is_finite() || *d <= 0.0) {
        return Err(Error::DegenerateGeometry(format!(
            "triangulation produced non-positive distances ({:.3}, {:.3}, {:.3})",
            t[0], t[1], t[2]
        )));
    }
    if params.max_iterations > 0 {
        let residual = residuals(&t, cosines, s).amax() / (s * s);
        if residual.is_nan() || residual > params.max_residual {
            return Err(Error::DegenerateGeometry(format!(
                "triangulation did not converge (relative residual {residual:.3e})"
            )));
        }
    }
    Ok([t[0], t[1], t[2]])
}

/// Radius/solid-angle trilateration, independent per marker.
///
/// Uses the localizer's own distance when it has one, otherwise
/// `z = f · radius / projected_radius` projected onto the ray, `z / ray.z`.
///
/// # Errors
///
/// Returns `DegenerateGeometry` for a marker with no usable radius.
pub fn trilaterate(observations: &[MarkerObservation; 3], rays: &Rays, calibration: &CalibrationState) -> Result<[f64; 3]> {
    let mut distances = [0.0; 3];
    for (k, (obs, ray)) in observations.iter().zip(rays.iter()).enumerate() {
        let distance = match obs.distance {
            Some(d) => d,
            None => {
                if !(obs.projected_radius.is_finite() && obs.projected_radius > 0.0) {
                    return Err(Error::DegenerateGeometry(format!(
                        "{} marker has no projected radius",
                        obs.color
                    )));
                }
                let depth = calibration.focal_length * calibration.marker_radius / obs.projected_radius;
                depth / ray.z
            }
        };
        if !(distance.is_finite() && distance > 0.0) {
            return Err(Error::DegenerateGeometry(format!(
                "{} marker distance {distance} is not positive",
                obs.color
            )));
        }
        distances[k] = distance;
    }
    Ok(distances)
}

/// Camera-space marker centers `ray_i × distance_i`
#[must_use]
pub fn marker_positions(rays: &Rays, distances: &[f64; 3]) -> [Point3<f64>; 3] {
    [0, 1, 2].map(|k| Point3::from(rays[k].into_inner() * distances[k]))
}

/// Configured distance estimator
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceEstimator {
    method: DistanceMethod,
    inter_marker_distance: f64,
    triangulation: TriangulationConfig,
}

impl DistanceEstimator {
    /// Build from validated configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self {
            method: config.methods.distance,
            inter_marker_distance: config.rig.inter_marker_distance,
            triangulation: config.triangulation.clone(),
        }
    }

    /// Selected method
    #[must_use]
    pub fn method(&self) -> DistanceMethod {
        self.method
    }

    /// Distances along each ray
    ///
    /// # Errors
    ///
    /// Propagates `DegenerateGeometry` from the selected method.
    pub fn estimate(
        &self,
        observations: &[MarkerObservation; 3],
        rays: &Rays,
        calibration: &CalibrationState,
    ) -> Result<[f64; 3]> {
        match self.method {
            DistanceMethod::Triangulation => {
                let prior = trilaterate(observations, rays, calibration).ok();
                triangulate(rays, self.inter_marker_distance, &self.triangulation, prior.as_ref())
            }
            DistanceMethod::Trilateration => trilaterate(observations, rays, calibration),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use nalgebra::Rotation3;

    fn rays_to(points: &[Point3<f64>; 3]) -> Rays {
        points.map(|p| Unit::new_normalize(p.coords))
    }

    fn equilateral(centroid: Vector3<f64>, side: f64) -> [Point3<f64>; 3] {
        let r = side / 3f64.sqrt();
        [
            Point3::new(0.0, -r, 0.0) + centroid,
            Point3::new(-side / 2.0, r / 2.0, 0.0) + centroid,
            Point3::new(side / 2.0, r / 2.0, 0.0) + centroid,
        ]
    }

    #[test]
    fn test_closed_form_exact_for_equal_distances() {
        let points = equilateral(Vector3::new(0.0, 0.0, 50.0), 10.0);
        let expected = points[0].coords.norm();
        let t = closed_form_distances(&rays_to(&points), 10.0, 1e-9).unwrap();
        for d in t {
            assert_relative_eq!(d, expected, epsilon = 1e-9);
        }
    }

    fn tilted(centroid: Vector3<f64>, about_x: f64, about_y: f64) -> [Point3<f64>; 3] {
        let rotation = Rotation3::from_axis_angle(&Vector3::y_axis(), about_y)
            * Rotation3::from_axis_angle(&Vector3::x_axis(), about_x);
        equilateral(Vector3::zeros(), 10.0).map(|p| Point3::from(rotation * p.coords + centroid))
    }

    #[test]
    fn test_refinement_recovers_unequal_distances() {
        let points = tilted(Vector3::new(2.0, -1.0, 50.0), 0.3, 0.2);
        let t = triangulate(&rays_to(&points), 10.0, &TriangulationConfig::default(), None).unwrap();
        for (d, p) in t.iter().zip(points.iter()) {
            assert_relative_eq!(*d, p.coords.norm(), epsilon = 1e-8);
        }
    }

    #[test]
    fn test_prior_selects_physical_solution() {
        let points = tilted(Vector3::new(2.0, -1.0, 50.0), 1.0, 0.0);
        let truth = points.map(|p| p.coords.norm());
        let prior = truth.map(|d| d * 1.01);
        let t = triangulate(&rays_to(&points), 10.0, &TriangulationConfig::default(), Some(&prior)).unwrap();
        for (d, expected) in t.iter().zip(truth.iter()) {
            assert_relative_eq!(*d, *expected, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_closed_form_only() {
        let points = equilateral(Vector3::new(0.0, 0.0, 50.0), 10.0);
        let params = TriangulationConfig {
            max_iterations: 0,
            ..TriangulationConfig::default()
        };
        let t = triangulate(&rays_to(&points), 10.0, &params, None).unwrap();
        assert_relative_eq!(t[1], points[1].coords.norm(), epsilon = 1e-9);
    }

    #[test]
    fn test_unconverged_refinement_is_rejected() {
        let points = tilted(Vector3::new(2.0, -1.0, 50.0), 0.7, 0.5);
        let params = TriangulationConfig {
            max_iterations: 1,
            ..TriangulationConfig::default()
        };
        // One Newton step from the closed form leaves the sides far from 10
        assert!(matches!(
            triangulate(&rays_to(&points), 10.0, &params, None),
            Err(Error::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_diverging_prior_falls_back_to_closed_form() {
        let points = tilted(Vector3::new(2.0, -1.0, 50.0), 0.3, 0.2);
        let t = triangulate(&rays_to(&points), 10.0, &TriangulationConfig::default(), Some(&[1e-3, 5e3, 1e-3])).unwrap();
        for (d, p) in t.iter().zip(points.iter()) {
            assert_relative_eq!(*d, p.coords.norm(), epsilon = 1e-8);
        }
    }

    #[test]
    fn test_degenerate_coplanar_rays() {
        let x = Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0));
        let rays = [x, x, Unit::new_normalize(Vector3::new(0.1, 0.0, 1.0))];
        assert!(matches!(
            triangulate(&rays, 9.0, &TriangulationConfig::default(), None),
            Err(Error::DegenerateGeometry(_))
        ));
    }

    #[test]
    fn test_trilateration_from_radius() {
        let calibration = CalibrationState {
            focal_length: 800.0,
            principal_point: [0.0, 0.0],
            marker_radius: 1.0,
            radial: Default::default(),
        };
        let ray = Unit::new_normalize(Vector3::new(3.0, 4.0, 12.0));
        let obs = MarkerObservation {
            color: crate::localization::MarkerColor::Red,
            method: crate::localization::LocalizerMethod::Unweighted,
            projected_center: nalgebra::Point2::new(200.0, 266.7),
            projected_radius: 16.0,
            fractional_area: 0.0,
            distance: None,
            pixel_count: 800.0,
        };
        let d = trilaterate(&[obs; 3], &[ray; 3], &calibration).unwrap();
        // z = 800 / 16 = 50, along the ray 50 * 13 / 12
        assert_relative_eq!(d[0], 50.0 * 13.0 / 12.0, epsilon = 1e-9);

        let with_distance = MarkerObservation { distance: Some(33.0), ..obs };
        let d = trilaterate(&[with_distance; 3], &[ray; 3], &calibration).unwrap();
        assert_eq!(d, [33.0; 3]);
    }

    #[test]
    fn test_marker_positions() {
        let rays = [Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0)); 3];
        let p = marker_positions(&rays, &[1.0, 2.0, 3.0]);
        assert_eq!(p[2], Point3::new(0.0, 0.0, 3.0));
    }
}
