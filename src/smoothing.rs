//! Window-median trajectory smoothing.
//!
//! Consecutive, non-overlapping windows of `N` points are each replaced by
//! their per-axis median, so `n` points smooth to `ceil(n / N)` points. The
//! final window may be shorter than `N`.

use nalgebra::Point3;

/// Median of a slice; the two central values are averaged for even lengths.
///
/// Returns `None` for an empty slice. NaN values sort last.
#[must_use]
pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let len = sorted.len();
    Some(if len % 2 == 0 {
        (sorted[len / 2 - 1] + sorted[len / 2]) / 2.0
    } else {
        sorted[len / 2]
    })
}

/// Per-axis median of a non-empty window
fn window_median(window: &[Point3<f64>]) -> Option<Point3<f64>> {
    let axis = |k: usize| median(&window.iter().map(|p| p[k]).collect::<Vec<_>>());
    Some(Point3::new(axis(0)?, axis(1)?, axis(2)?))
}

/// Batch smoothing; a window size of 0 is treated as 1.
#[must_use]
pub fn median_smooth(points: &[Point3<f64>], window_size: usize) -> Vec<Point3<f64>> {
    points
        .chunks(window_size.max(1))
        .filter_map(window_median)
        .collect()
}

/// Incremental form of [`median_smooth`]; pushing all points and flushing
/// yields exactly the batch output.
#[derive(Debug, Clone)]
pub struct StreamingSmoother {
    window_size: usize,
    buffer: Vec<Point3<f64>>,
}

impl StreamingSmoother {
    /// New smoother; a window size of 0 is treated as 1
    #[must_use]
    pub fn new(window_size: usize) -> Self {
        let window_size = window_size.max(1);
        Self {
            window_size,
            buffer: Vec::with_capacity(window_size),
        }
    }

    /// Window size in points
    #[must_use]
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Points waiting for their window to fill
    #[must_use]
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Add a point; returns the smoothed point when a window completes
    pub fn push(&mut self, point: Point3<f64>) -> Option<Point3<f64>> {
        self.buffer.push(point);
        if self.buffer.len() < self.window_size {
            return None;
        }
        let smoothed = window_median(&self.buffer);
        self.buffer.clear();
        smoothed
    }

    /// Emit the partial trailing window, if any
    pub fn flush(&mut self) -> Option<Point3<f64>> {
        if self.buffer.is_empty() {
            return None;
        }
        let smoothed = window_median(&self.buffer);
        self.buffer.clear();
        smoothed
    }

    /// Drop pending points
    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}
