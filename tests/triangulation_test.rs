//! Distance estimation from exact rays


use drawing_decoder::{
    config::TriangulationConfig,
    distance::{closed_form_distances, marker_positions, triangulate, Rays},
    Error,
};
use nalgebra::{Point3, Unit, Vector3};
use proptest::prelude::*;
use test_helpers::*;

fn rays_to(points: &[Point3<f64>; 3]) -> Rays {
    points.map(|p| Unit::new_normalize(p.coords))
}

/// Rays through the projected centers after shifting each by `shifts` pixels
fn shifted_rays(points: &[Point3<f64>; 3], shifts: [[f64; 2]; 3]) -> Rays {
    [0, 1, 2].map(|k| {
        let p = points[k];
        Unit::new_normalize(Vector3::new(
            FOCAL_LENGTH * p.x / p.z + shifts[k][0],
            FOCAL_LENGTH * p.y / p.z + shifts[k][1],
            FOCAL_LENGTH,
        ))
    })
}

fn largest_side_error(rays: &Rays, distances: &[f64; 3], s: f64) -> f64 {
    let p = marker_positions(rays, distances);
    [(0, 1), (1, 2), (2, 0)]
        .iter()
        .map(|&(i, j)| ((p[i] - p[j]).norm() - s).abs())
        .fold(0.0, f64::max)
}

fn assert_positions_near(actual: &[Point3<f64>; 3], expected: &[Point3<f64>; 3], tolerance: f64) {
    for (a, e) in actual.iter().zip(expected.iter()) {
        assert_point_near(a, e, tolerance);
    }
}

#[test]
fn test_frontal_round_trip() {
    let expected = rig(Point3::new(0.0, 0.0, DEPTH)).marker_positions();
    let rays = rays_to(&expected);

    let distances = triangulate(&rays, INTER_MARKER_DISTANCE, &TriangulationConfig::default(), None).unwrap();
    assert_positions_near(&marker_positions(&rays, &distances), &expected, 1e-9);
}

#[test]
fn test_tilted_round_trip_from_closed_form() {
    for (about_x, about_y) in [(0.3, 0.2), (0.5, 0.4), (0.7, 0.5), (-0.4, 0.3)] {
        let expected = tilted_rig(Point3::new(2.0, -1.0, DEPTH), about_x, about_y).marker_positions();
        let rays = rays_to(&expected);

        let distances = triangulate(&rays, INTER_MARKER_DISTANCE, &TriangulationConfig::default(), None).unwrap();
        assert_positions_near(&marker_positions(&rays, &distances), &expected, 1e-8);
    }
}

#[test]
fn test_tilted_round_trip_from_size_prior() {
    for (about_x, about_y) in [(1.0, 0.0), (0.3, 0.2), (0.0, 0.3)] {
        let expected = tilted_rig(Point3::new(2.0, -1.0, DEPTH), about_x, about_y).marker_positions();
        let rays = rays_to(&expected);
        // A size cue a percent off on every marker
        let prior = [
            expected[0].coords.norm() * 1.01,
            expected[1].coords.norm() * 0.99,
            expected[2].coords.norm() * 1.005,
        ];

        let distances =
            triangulate(&rays, INTER_MARKER_DISTANCE, &TriangulationConfig::default(), Some(&prior)).unwrap();
        assert_positions_near(&marker_positions(&rays, &distances), &expected, 1e-8);
    }
}

#[test]
fn test_refinement_corrects_off_axis_closed_form() {
    let expected = rig(Point3::new(1.0, 2.0, DEPTH)).marker_positions();
    let closed = closed_form_distances(&rays_to(&expected), INTER_MARKER_DISTANCE, 1e-9).unwrap();
    // Off-axis frontal rigs have unequal distances, so the closed form only approximates
    let worst = closed
        .iter()
        .zip(expected.iter())
        .map(|(d, p)| (d - p.coords.norm()).abs())
        .fold(0.0, f64::max);
    assert!(worst > 1e-3 && worst < 0.5);

    let refined = triangulate(&rays_to(&expected), INTER_MARKER_DISTANCE, &TriangulationConfig::default(), None).unwrap();
    for (d, p) in refined.iter().zip(expected.iter()) {
        assert!((d - p.coords.norm()).abs() < 1e-8);
    }
}

#[test]
fn test_near_collinear_rays_are_degenerate() {
    let points = [
        Point3::new(0.0, 0.0, 50.0),
        Point3::new(1e-7, 0.0, 50.0),
        Point3::new(2e-7, 1e-7, 50.0),
    ];
    let result = triangulate(&rays_to(&points), INTER_MARKER_DISTANCE, &TriangulationConfig::default(), None);
    assert!(matches!(result, Err(Error::DegenerateGeometry(_))));
}

#[test]
fn test_scale_follows_inter_marker_distance() {
    let expected = rig(Point3::new(0.0, 0.0, DEPTH)).marker_positions();
    let rays = rays_to(&expected);

    let d10 = triangulate(&rays, 10.0, &TriangulationConfig::default(), None).unwrap();
    let d20 = triangulate(&rays, 20.0, &TriangulationConfig::default(), None).unwrap();
    for (a, b) in d10.iter().zip(d20.iter()) {
        assert!((b - 2.0 * a).abs() < 1e-9);
    }
}

#[test]
fn test_noisy_rays_never_yield_a_distorted_rig() {
    // Two pixels of error on red; the closed form starts Newton far from any root
    let points = tilted_rig(Point3::new(0.0, 0.0, DEPTH), -0.1, 0.05).marker_positions();
    let rays = shifted_rays(&points, [[2.0, -1.0], [0.0, 0.0], [0.0, 0.0]]);

    match triangulate(&rays, INTER_MARKER_DISTANCE, &TriangulationConfig::default(), None) {
        Ok(distances) => assert!(largest_side_error(&rays, &distances, INTER_MARKER_DISTANCE) < 1e-4),
        Err(Error::DegenerateGeometry(_)) => {}
        Err(e) => panic!("unexpected error {e}"),
    }

    let patient = TriangulationConfig {
        max_iterations: 200,
        ..TriangulationConfig::default()
    };
    let distances = triangulate(&rays, INTER_MARKER_DISTANCE, &patient, None).unwrap();
    assert!(largest_side_error(&rays, &distances, INTER_MARKER_DISTANCE) < 1e-4);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(512))]

    #[test]
    fn prop_accepted_distances_keep_the_rig_shape(
        about_x in -1.5..1.5f64,
        about_y in -1.5..1.5f64,
        x in -5.0..5.0f64,
        y in -5.0..5.0f64,
        noise in prop::array::uniform6(-2.0..2.0f64),
    ) {
        let points = tilted_rig(Point3::new(x, y, DEPTH), about_x, about_y).marker_positions();
        let rays = shifted_rays(&points, [[noise[0], noise[1]], [noise[2], noise[3]], [noise[4], noise[5]]]);

        match triangulate(&rays, INTER_MARKER_DISTANCE, &TriangulationConfig::default(), None) {
            Ok(distances) => {
                prop_assert!(distances.iter().all(|d| *d > 0.0));
                prop_assert!(largest_side_error(&rays, &distances, INTER_MARKER_DISTANCE) < 1e-4);
            }
            Err(e) => prop_assert!(matches!(e, Error::DegenerateGeometry(_)), "unexpected error {}", e),
        }
    }
}
