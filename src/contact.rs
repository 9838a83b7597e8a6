//! Pen contact detection from pen-tip height and audio loudness.

use crate::{config::Config, Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Which signals decide contact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactMode {
    /// Either signal asserts contact
    #[default]
    Either,
    /// Pen-tip height only
    Geometric,
    /// Audio only, geometric when the frame has no audio
    Audio,
}

impl FromStr for ContactMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "either" | "any" => Ok(Self::Either),
            "geometric" | "geometry" => Ok(Self::Geometric),
            "audio" => Ok(Self::Audio),
            _ => Err(Error::ConfigurationInvalid(format!("Unknown contact mode: {s}"))),
        }
    }
}

impl fmt::Display for ContactMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Either => "either",
            Self::Geometric => "geometric",
            Self::Audio => "audio",
        })
    }
}

/// Root mean square of an audio window; 0 for an empty window
#[must_use]
pub fn audio_rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| f64::from(s) * f64::from(s)).sum();
    (sum / samples.len() as f64).sqrt()
}

/// The two contact signals of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ContactSignals {
    /// Pen tip at or below the drawing surface
    pub geometric: bool,
    /// Audio window loud enough; `None` when the frame has no audio
    pub audio: Option<bool>,
}

/// Pure per-frame contact decision
#[derive(Debug, Clone, PartialEq)]
pub struct ContactDetector {
    pen_length: f64,
    geometric_threshold: f64,
    audio_threshold: f64,
    mode: ContactMode,
}

impl ContactDetector {
    /// Detector with explicit thresholds
    #[must_use]
    pub fn new(pen_length: f64, geometric_threshold: f64, audio_threshold: f64, mode: ContactMode) -> Self {
        Self {
            pen_length,
            geometric_threshold,
            audio_threshold,
            mode,
        }
    }

    /// Build from validated configuration
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.rig.pen_length,
            config.contact.geometric_threshold,
            config.contact.audio_threshold,
            config.contact.mode,
        )
    }

    /// `y ≤ -pen_length + threshold` for the world-space tip height `y`
    #[must_use]
    pub fn geometric(&self, tip_height: f64) -> bool {
        tip_height <= -self.pen_length + self.geometric_threshold
    }

    /// `rms ≥ threshold`
    #[must_use]
    pub fn audio(&self, rms: f64) -> bool {
        rms >= self.audio_threshold
    }

    /// Evaluate both signals
    #[must_use]
    pub fn signals(&self, tip_height: f64, audio_rms: Option<f64>) -> ContactSignals {
        ContactSignals {
            geometric: self.geometric(tip_height),
            audio: audio_rms.map(|rms| self.audio(rms)),
        }
    }

    /// Combine the signals according to the mode
    #[must_use]
    pub fn combine(&self, signals: ContactSignals) -> bool {
        match (self.mode, signals.audio) {
            (ContactMode::Either, Some(audio)) => signals.geometric || audio,
            (ContactMode::Audio, Some(audio)) => audio,
            (ContactMode::Geometric, _) | (_, None) => signals.geometric,
        }
    }

    /// Whether the pen touches the surface in this frame
    #[must_use]
    pub fn is_touching(&self, tip_height: f64, audio_rms: Option<f64>) -> bool {
        self.combine(self.signals(tip_height, audio_rms))
    }
}
