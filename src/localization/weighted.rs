use super::{LocalizerContext, LocalizerMethod, MarkerColor, MarkerObservation};
use crate::{
    camera::{pixel_ray_length, pixel_sphere_fraction},
    constants::EPSILON,
    mask::ColorMask,
    Error, Result,
};
use nalgebra::Point2;

/// Solid-angle weighted centroid.
///
/// Each pixel contributes its fraction of the full sphere
/// `dΩ / 4π = f / l³ / 4π`, with `l` the length of the pixel ray `(x - cx, y - cy, f)`.
/// Centroid weights are further divided by `l`, which makes the centroid the
/// projection of the solid-angle mean of the unit pixel rays. The summed
/// fraction `A` is a spherical cap of half-angle `θ = arccos(1 - 2A)`, hence
/// `distance = radius / sin θ`.
pub(super) fn localize(
    mask: &ColorMask,
    color: MarkerColor,
    focal_length: f64,
    context: &LocalizerContext,
) -> Result<MarkerObservation> {
    let pp = context.principal_point;
    let mut fraction = 0.0;
    let mut centroid_weight = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut area = 0.0;

    for (xy, weight) in context.corrected(mask) {
        let pixel_fraction = weight * pixel_sphere_fraction(xy, focal_length, pp);
        let w = pixel_fraction / pixel_ray_length(xy, focal_length, pp);
        fraction += pixel_fraction;
        centroid_weight += w;
        sum_x += w * xy[0];
        sum_y += w * xy[1];
        area += weight;
    }

    if centroid_weight <= 0.0 || !centroid_weight.is_finite() {
        return Err(Error::MarkerNotDetected(color));
    }
    if fraction <= 0.0 || fraction >= 0.5 {
        return Err(Error::DegenerateGeometry(format!(
            "{color} fractional area {fraction} outside (0, 0.5)"
        )));
    }

    let cos_theta = 1.0 - 2.0 * fraction;
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt();
    if sin_theta <= EPSILON {
        return Err(Error::DegenerateGeometry(format!("{color} subtends no solid angle")));
    }

    Ok(MarkerObservation {
        color,
        method: LocalizerMethod::Weighted,
        projected_center: Point2::new(sum_x / centroid_weight, sum_y / centroid_weight),
        projected_radius: focal_length * sin_theta / cos_theta,
        fractional_area: fraction,
        distance: Some(context.marker_radius / sin_theta),
        pixel_count: area,
    })
}
