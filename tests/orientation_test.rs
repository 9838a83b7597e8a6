//! World frame and pen-tip properties


use approx::assert_relative_eq;
use drawing_decoder::{
    orientation::{solve_pen, PenAxis, WorldFrame},
    Error,
};
use nalgebra::{Point3, Vector3};
use proptest::prelude::*;
use test_helpers::*;

fn point() -> impl Strategy<Value = Point3<f64>> {
    (-50.0..50.0f64, -50.0..50.0f64, 1.0..200.0f64).prop_map(|(x, y, z)| Point3::new(x, y, z))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(256))]

    #[test]
    fn prop_world_frame_is_right_handed_orthonormal(red in point(), green in point(), blue in point()) {
        let baseline = blue - green;
        prop_assume!(baseline.norm() > 1e-2);
        prop_assume!(baseline.normalize().cross(&(blue - red)).norm() > 1e-2);

        let frame = WorldFrame::from_markers(&[red, green, blue]).unwrap();
        prop_assert!(frame.is_orthonormal(1e-9));

        let handedness = frame.x_axis.cross(&*frame.y_axis).dot(&*frame.z_axis);
        prop_assert!((handedness - 1.0).abs() < 1e-9);

        // x runs from green to blue
        prop_assert!((frame.x_axis.dot(&baseline.normalize()) - 1.0).abs() < 1e-9);
        // The whole triangle lies in the xy plane of the frame
        prop_assert!(frame.z_axis.dot(&(green - red)).abs() < 1e-6 * (green - red).norm().max(1.0));
    }

    #[test]
    fn prop_camera_position_is_negated_centroid(red in point(), green in point(), blue in point()) {
        let baseline = blue - green;
        prop_assume!(baseline.norm() > 1e-2);
        prop_assume!(baseline.normalize().cross(&(blue - red)).norm() > 1e-2);

        let solution = solve_pen(&[red, green, blue], PEN_LENGTH, PenAxis::Camera).unwrap();
        let centroid = (red.coords + green.coords + blue.coords) / 3.0;
        prop_assert!((solution.camera_position.coords + centroid).norm() < 1e-9);
        prop_assert!((solution.pen_tip_camera.y - (solution.camera_position.y - PEN_LENGTH)).abs() < 1e-9);
    }
}

#[test]
fn test_frontal_tip_sits_pen_length_below() {
    let positions = rig(Point3::new(0.0, 0.0, DEPTH)).marker_positions();
    let solution = solve_pen(&positions, PEN_LENGTH, PenAxis::Camera).unwrap();

    assert_relative_eq!(solution.pen_tip_world, Point3::new(0.0, -PEN_LENGTH, -DEPTH), epsilon = 1e-9);
    assert_relative_eq!(solution.world_frame.x_axis.into_inner(), Vector3::x(), epsilon = 1e-12);
}

#[test]
fn test_analytic_tilted_solution_matches_solver() {
    let tilted = tilted_rig(Point3::new(1.0, -2.0, DEPTH), 0.4, -0.2);
    let expected = tilted.pen_solution(PEN_LENGTH, PenAxis::World).unwrap();
    let solved = solve_pen(&tilted.marker_positions(), PEN_LENGTH, PenAxis::World).unwrap();

    assert_relative_eq!(solved.pen_tip_world, expected.pen_tip_world, epsilon = 1e-9);
    // Along the rig's own axis the tip drops by exactly the pen length
    let camera_world = solved.world_frame.to_world(&solved.camera_position.coords);
    assert_relative_eq!(solved.pen_tip_world.y, camera_world.y - PEN_LENGTH, epsilon = 1e-9);
}

#[test]
fn test_coincident_green_blue_is_degenerate() {
    let positions = [
        Point3::new(0.0, -5.0, DEPTH),
        Point3::new(3.0, 2.0, DEPTH),
        Point3::new(3.0, 2.0, DEPTH),
    ];
    assert!(matches!(
        solve_pen(&positions, PEN_LENGTH, PenAxis::Camera),
        Err(Error::DegenerateGeometry(_))
    ));
}
