//! Accepted pen-tip points, stroke boundaries and the finalized trajectory.

use crate::smoothing::median_smooth;
use nalgebra::Point3;
use serde::{Deserialize, Serialize};

/// Collects accepted world-space points in arrival order
#[derive(Debug, Clone, Default)]
pub struct TrajectoryBuilder {
    points: Vec<Point3<f64>>,
    // Start index of each stroke in `points`
    stroke_starts: Vec<usize>,
    stroke_open: bool,
}

impl TrajectoryBuilder {
    /// Empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a touching pen tip
    pub fn push(&mut self, point: Point3<f64>) {
        if !self.stroke_open {
            self.stroke_starts.push(self.points.len());
            self.stroke_open = true;
        }
        self.points.push(point);
    }

    /// The pen was seen lifted; the next point starts a new stroke
    pub fn lift(&mut self) {
        self.stroke_open = false;
    }

    /// Accepted points so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// True when nothing has been accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Accepted points so far
    #[must_use]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    fn raw_strokes(&self) -> impl Iterator<Item = &[Point3<f64>]> + '_ {
        self.stroke_starts.iter().enumerate().map(move |(k, &start)| {
            let end = self.stroke_starts.get(k + 1).copied().unwrap_or(self.points.len());
            &self.points[start..end]
        })
    }

    /// Smooth and freeze.
    ///
    /// Without `per_stroke` the whole buffer is smoothed as one sequence and
    /// the result is a single stroke.
    #[must_use]
    pub fn finish(self, window_size: usize, per_stroke: bool) -> Trajectory {
        let raw_len = self.points.len();
        let strokes: Vec<Vec<Point3<f64>>> = if per_stroke {
            self.raw_strokes()
                .map(|stroke| median_smooth(stroke, window_size))
                .filter(|stroke| !stroke.is_empty())
                .collect()
        } else {
            let smoothed = median_smooth(&self.points, window_size);
            if smoothed.is_empty() {
                Vec::new()
            } else {
                vec![smoothed]
            }
        };

        Trajectory { strokes, raw_len }
    }
}

/// Finalized, smoothed trajectory in temporal order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trajectory {
    strokes: Vec<Vec<Point3<f64>>>,
    raw_len: usize,
}

impl Trajectory {
    /// All points, strokes concatenated
    #[must_use]
    pub fn points(&self) -> Vec<Point3<f64>> {
        self.strokes.iter().flatten().copied().collect()
    }

    /// Drawing-plane projection `(x, z)` of every point
    #[must_use]
    pub fn planar(&self) -> Vec<(f64, f64)> {
        self.strokes.iter().flatten().map(|p| (p.x, p.z)).collect()
    }

    /// Smoothed strokes
    #[must_use]
    pub fn strokes(&self) -> &[Vec<Point3<f64>>] {
        &self.strokes
    }

    /// Number of smoothed points
    #[must_use]
    pub fn len(&self) -> usize {
        self.strokes.iter().map(Vec::len).sum()
    }

    /// True when no point was accepted
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of accepted points before smoothing
    #[must_use]
    pub fn raw_len(&self) -> usize {
        self.raw_len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(x: f64) -> Point3<f64> {
        Point3::new(x, -18.0, x * 2.0)
    }

    #[test]
    fn test_strokes_split_on_lift() {
        let mut builder = TrajectoryBuilder::new();
        builder.push(p(1.0));
        builder.push(p(2.0));
        builder.lift();
        builder.lift();
        builder.push(p(3.0));

        let trajectory = builder.finish(1, true);
        assert_eq!(trajectory.strokes().len(), 2);
        assert_eq!(trajectory.strokes()[1], vec![p(3.0)]);
        assert_eq!(trajectory.len(), 3);
        assert_eq!(trajectory.planar()[2], (3.0, 6.0));
    }

    #[test]
    fn test_whole_buffer_smoothing() {
        let mut builder = TrajectoryBuilder::new();
        for x in [1.0, 2.0, 3.0] {
            builder.push(p(x));
        }
        builder.lift();
        for x in [4.0, 5.0] {
            builder.push(p(x));
        }

        let trajectory = builder.clone().finish(2, false);
        assert_eq!(trajectory.strokes().len(), 1);
        assert_eq!(trajectory.len(), 3);
        assert_eq!(trajectory.raw_len(), 5);
        assert_eq!(trajectory.points()[1], p(3.5));

        // Per stroke: [1,2] [3] | [4,5]
        let per_stroke = builder.finish(2, true);
        assert_eq!(per_stroke.len(), 3);
        assert_eq!(per_stroke.points()[1], p(3.0));
    }

    #[test]
    fn test_empty() {
        let trajectory = TrajectoryBuilder::new().finish(10, false);
        assert!(trajectory.is_empty());
        assert!(trajectory.strokes().is_empty());
    }
}
