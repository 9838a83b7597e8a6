//! Per-color pixel masks produced by color classification.

use image::GrayImage;

/// A single masked pixel with its coverage weight
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskPixel {
    /// Column
    pub x: u32,
    /// Row
    pub y: u32,
    /// Membership weight in [0, 1]
    pub weight: f32,
}

impl MaskPixel {
    /// Pixel center in image coordinates
    #[must_use]
    pub fn center(&self) -> [f64; 2] {
        [f64::from(self.x), f64::from(self.y)]
    }
}

/// Membership field of one marker color over the image
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ColorMask {
    pixels: Vec<MaskPixel>,
}

impl ColorMask {
    /// Empty mask (marker not visible)
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Binary mask from pixel coordinates
    #[must_use]
    pub fn from_pixels<I>(pixels: I) -> Self
    where
        I: IntoIterator<Item = (u32, u32)>,
    {
        Self {
            pixels: pixels
                .into_iter()
                .map(|(x, y)| MaskPixel { x, y, weight: 1.0 })
                .collect(),
        }
    }

    /// Weighted mask; non-positive and non-finite weights are dropped and
    /// weights above one are clamped.
    #[must_use]
    pub fn from_weighted<I>(pixels: I) -> Self
    where
        I: IntoIterator<Item = (u32, u32, f32)>,
    {
        Self {
            pixels: pixels
                .into_iter()
                .filter(|&(_, _, w)| w.is_finite() && w > 0.0)
                .map(|(x, y, w)| MaskPixel { x, y, weight: w.min(1.0) })
                .collect(),
        }
    }

    /// Mask of every pixel of a grayscale image strictly brighter than `threshold`
    #[must_use]
    pub fn from_luma(image: &GrayImage, threshold: u8) -> Self {
        Self::from_pixels(
            image
                .enumerate_pixels()
                .filter(|(_, _, p)| p[0] > threshold)
                .map(|(x, y, _)| (x, y)),
        )
    }

    /// Add one pixel
    pub fn push(&mut self, x: u32, y: u32, weight: f32) {
        if weight.is_finite() && weight > 0.0 {
            self.pixels.push(MaskPixel { x, y, weight: weight.min(1.0) });
        }
    }

    /// Masked pixels
    #[must_use]
    pub fn pixels(&self) -> &[MaskPixel] {
        &self.pixels
    }

    /// Number of masked pixels
    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// True when nothing is masked
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// Sum of pixel weights (effective pixel area)
    #[must_use]
    pub fn total_weight(&self) -> f64 {
        self.pixels.iter().map(|p| f64::from(p.weight)).sum()
    }
}
