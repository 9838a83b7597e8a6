use super::{LocalizerContext, LocalizerMethod, MarkerColor, MarkerObservation};
use crate::{camera::pixel_sphere_fraction, mask::ColorMask};
use nalgebra::Point2;
use std::f64::consts::PI;

/// Centroid of the mask and radius from `area = π r²`.
///
/// Does not correct for the elliptical stretch of off-axis markers. The caller
/// guarantees a non-empty mask with positive weight.
pub(super) fn localize(mask: &ColorMask, color: MarkerColor, context: &LocalizerContext) -> MarkerObservation {
    let mut area = 0.0;
    let mut sum_x = 0.0;
    let mut sum_y = 0.0;
    let mut fraction = 0.0;

    for (xy, weight) in context.corrected(mask) {
        area += weight;
        sum_x += weight * xy[0];
        sum_y += weight * xy[1];
        if let Some(f) = context.focal_length {
            fraction += weight * pixel_sphere_fraction(xy, f, context.principal_point);
        }
    }

    MarkerObservation {
        color,
        method: LocalizerMethod::Unweighted,
        projected_center: Point2::new(sum_x / area, sum_y / area),
        projected_radius: (area / PI).sqrt(),
        fractional_area: fraction,
        distance: None,
        pixel_count: area,
    }
}
