use super::{LocalizerContext, LocalizerMethod, MarkerColor, MarkerObservation};
use crate::{
    camera::{cast_ray, project_point},
    constants::EPSILON,
    mask::ColorMask,
    Error, Result,
};
use nalgebra::{Point2, Point3, Unit, Vector2};
use std::f64::consts::PI;

/// Variance of a uniformly covered unit pixel along either axis
const PIXEL_VARIANCE: f64 = 1.0 / 12.0;

/// Bisector of the rays through the silhouette points nearest to and farthest
/// from the principal point.
///
/// A sphere projects to an ellipse whose major axis lies on the line through
/// the principal point, so both tangent points are the ends of that axis.
/// They are located from the weighted moments of the mask: the centroid gives
/// the ellipse center, the second moment along the radial direction gives the
/// semi-axis, rescaled so `π a b` matches the covered area. Both rays graze
/// the sphere, so their bisector points at its center and the tangent
/// geometry gives `distance = radius / sqrt(1 - (P·C)^2)`.
pub(super) fn localize(
    mask: &ColorMask,
    color: MarkerColor,
    focal_length: f64,
    context: &LocalizerContext,
) -> Result<MarkerObservation> {
    let pp = context.principal_point;
    let pixels: Vec<(Vector2<f64>, f64)> = context
        .corrected(mask)
        .map(|(xy, weight)| (Vector2::new(xy[0], xy[1]), weight))
        .collect();

    let area: f64 = pixels.iter().map(|(_, w)| w).sum();
    if area <= 0.0 {
        return Err(Error::MarkerNotDetected(color));
    }
    if pixels.len() < 2 {
        return Err(Error::DegenerateGeometry(format!("{color} tangent rays coincide")));
    }
    let centroid = pixels.iter().fold(Vector2::zeros(), |acc, (xy, w)| acc + xy * *w) / area;

    // Major axis direction; any diameter works for a circle on the optical axis
    let radial = Unit::try_new(centroid - pp.coords, EPSILON).unwrap_or_else(Vector2::x_axis);
    let across = Vector2::new(-radial.y, radial.x);
    let (along_sq, across_sq) = pixels.iter().fold((0.0, 0.0), |(u, v), (xy, w)| {
        let d = xy - centroid;
        (u + w * d.dot(&*radial).powi(2), v + w * d.dot(&across).powi(2))
    });
    let semi_major = 2.0 * (along_sq / area + PIXEL_VARIANCE).sqrt();
    let semi_minor = 2.0 * (across_sq / area + PIXEL_VARIANCE).sqrt();
    let semi_major = semi_major * (area / (PI * semi_major * semi_minor)).sqrt();

    let near = centroid - radial.into_inner() * semi_major;
    let far = centroid + radial.into_inner() * semi_major;
    let r_near = cast_ray(Point2::from(near), focal_length, pp)?;
    let r_far = cast_ray(Point2::from(far), focal_length, pp)?;
    let bisector = Unit::try_new(r_near.into_inner() + r_far.into_inner(), EPSILON)
        .ok_or_else(|| Error::DegenerateGeometry(format!("{color} tangent rays are opposite")))?;

    let cos_half = bisector.dot(&*r_near).clamp(-1.0, 1.0);
    let sin_sq = 1.0 - cos_half * cos_half;
    if sin_sq <= EPSILON {
        return Err(Error::DegenerateGeometry(format!("{color} tangent rays coincide")));
    }
    let sin_half = sin_sq.sqrt();

    let center = project_point(&Point3::from(bisector.into_inner()), focal_length, pp)
        .ok_or_else(|| Error::DegenerateGeometry(format!("{color} bisector points behind the camera")))?;

    Ok(MarkerObservation {
        color,
        method: LocalizerMethod::Tangential,
        projected_center: center,
        projected_radius: focal_length * sin_half / cos_half,
        fractional_area: (1.0 - cos_half) / 2.0,
        distance: Some(context.marker_radius / sin_half),
        pixel_count: area,
    })
}
