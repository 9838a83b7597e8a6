//! Color thresholding of RGB frames into the three marker masks.
//!
//! A pixel belongs to a channel's marker when that channel exceeds both the
//! pixel's channel mean scaled by `100 / saturation_threshold` and the
//! absolute lightness threshold.

use crate::{config::SegmentationConfig, mask::ColorMask, Error, Result};
use image::RgbImage;

/// RGB frame segmenter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Segmenter {
    inv_saturation: f64,
    lightness_threshold: u8,
}

impl Segmenter {
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` when the saturation threshold is outside (0, 100].
    pub fn new(saturation_threshold: f64, lightness_threshold: u8) -> Result<Self> {
        if !(saturation_threshold > 0.0 && saturation_threshold <= 100.0) {
            return Err(Error::ConfigurationInvalid(format!(
                "Saturation threshold must be in (0, 100], got {saturation_threshold}"
            )));
        }
        Ok(Self {
            inv_saturation: 100.0 / saturation_threshold,
            lightness_threshold,
        })
    }

    /// # Errors
    ///
    /// See [`Segmenter::new`].
    pub fn from_config(config: &SegmentationConfig) -> Result<Self> {
        Self::new(config.saturation_threshold, config.lightness_threshold)
    }

    /// Which of the three channels of `rgb` pass the thresholds
    #[must_use]
    pub fn classify(&self, rgb: [u8; 3]) -> [bool; 3] {
        let mean = (f64::from(rgb[0]) + f64::from(rgb[1]) + f64::from(rgb[2])) / 3.0;
        let floor = mean * self.inv_saturation;
        rgb.map(|c| f64::from(c) > floor && c > self.lightness_threshold)
    }

    /// Red, green and blue masks of one frame
    #[must_use]
    pub fn segment(&self, frame: &RgbImage) -> [ColorMask; 3] {
        let mut masks = [ColorMask::empty(), ColorMask::empty(), ColorMask::empty()];
        for (x, y, pixel) in frame.enumerate_pixels() {
            for (mask, hit) in masks.iter_mut().zip(self.classify(pixel.0)) {
                if hit {
                    mask.push(x, y, 1.0);
                }
            }
        }
        masks
    }
}
