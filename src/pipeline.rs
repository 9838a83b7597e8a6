//! Frame-by-frame orchestration: calibration, per-frame geometry and
//! trajectory accumulation.
//!
//! The pipeline starts in [`PipelineState::AwaitingCalibration`]. The first
//! frame with three detected markers calibrates the camera and moves it to
//! [`PipelineState::Streaming`]; from then on every frame runs localization,
//! ray casting, distance estimation, orientation and contact detection.
//! Frames that fail any stage are reported as skipped and add nothing to the
//! trajectory. [`Pipeline::finish`] smooths the accepted points and moves to
//! [`PipelineState::Finalized`].

use crate::{
    calibration::CameraCalibrator,
    camera::CalibrationState,
    config::Config,
    contact::ContactDetector,
    distance::{marker_positions, DistanceEstimator},
    localization::{localize_markers, LocalizerContext, LocalizerMethod, MarkerColor, MarkerObservation},
    mask::ColorMask,
    orientation::{solve_pen, PenAxis, WorldFrame},
    trajectory::{Trajectory, TrajectoryBuilder},
    Error, Result,
};
use log::{debug, info, warn};
use nalgebra::Point3;
use rayon::prelude::*;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Orchestrator state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// No calibration yet
    AwaitingCalibration,
    /// Calibration frozen, estimating frames
    Streaming,
    /// Trajectory emitted; no more frames accepted
    Finalized,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AwaitingCalibration => "awaiting calibration",
            Self::Streaming => "streaming",
            Self::Finalized => "finalized",
        })
    }
}

/// One frame of input
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FrameInput {
    /// Red, green and blue masks
    pub masks: [ColorMask; 3],
    /// RMS of the frame-aligned audio window, when audio is available
    pub audio_rms: Option<f64>,
}

/// Why a frame produced no estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Not all markers were visible before calibration
    AwaitingCalibration,
    /// A marker mask was empty
    MarkerNotDetected(MarkerColor),
    /// Geometry could not be solved
    DegenerateGeometry,
}

impl SkipReason {
    fn from_error(error: &Error) -> Self {
        match error {
            Error::MarkerNotDetected(color) => Self::MarkerNotDetected(*color),
            _ => Self::DegenerateGeometry,
        }
    }
}

/// Outcome of one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// This frame calibrated the camera
    Calibrated,
    /// Pen tip estimated
    Estimated,
    /// Frame skipped
    Skipped(SkipReason),
}

/// Read-only per-frame record for overlays and diagnostics
#[derive(Debug, Clone, PartialEq)]
pub struct FrameResult {
    /// Zero-based frame counter
    pub frame_index: usize,
    /// Markers localized in this frame, in `[red, green, blue]` order
    pub marker_observations: [Option<MarkerObservation>; 3],
    /// Camera relative to the marker centroid
    pub camera_position: Option<Point3<f64>>,
    /// Rig-anchored frame
    pub world_frame: Option<WorldFrame>,
    /// Pen tip in the world frame
    pub pen_tip_world: Option<Point3<f64>>,
    /// Pen touching the surface
    pub touching: bool,
    /// True only for frames that produced a pen-tip estimate
    pub valid: bool,
    /// What happened to this frame
    pub status: FrameStatus,
}

impl FrameResult {
    fn skipped(frame_index: usize, marker_observations: [Option<MarkerObservation>; 3], reason: SkipReason) -> Self {
        Self {
            frame_index,
            marker_observations,
            camera_position: None,
            world_frame: None,
            pen_tip_world: None,
            touching: false,
            valid: false,
            status: FrameStatus::Skipped(reason),
        }
    }
}

/// Frame counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameStats {
    /// Frames fed to the pipeline
    pub processed: usize,
    /// Frames spent calibrating, including the calibrating frame
    pub calibration_frames: usize,
    /// Frames with a pen-tip estimate
    pub estimated: usize,
    /// Frames with a missing marker after calibration
    pub skipped_marker: usize,
    /// Frames with unsolvable geometry after calibration
    pub skipped_degenerate: usize,
    /// Estimated frames with the pen down
    pub touching: usize,
}

impl FrameStats {
    /// Streaming frames that produced no estimate
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.skipped_marker + self.skipped_degenerate
    }

    /// Fraction of streaming frames skipped
    #[must_use]
    pub fn skip_rate(&self) -> f64 {
        let streaming = self.estimated + self.skipped();
        if streaming == 0 {
            0.0
        } else {
            self.skipped() as f64 / streaming as f64
        }
    }

    fn record(&mut self, result: &FrameResult) {
        self.processed += 1;
        match result.status {
            FrameStatus::Calibrated | FrameStatus::Skipped(SkipReason::AwaitingCalibration) => {
                self.calibration_frames += 1;
            }
            FrameStatus::Estimated => {
                self.estimated += 1;
                if result.touching {
                    self.touching += 1;
                }
            }
            FrameStatus::Skipped(SkipReason::MarkerNotDetected(_)) => self.skipped_marker += 1,
            FrameStatus::Skipped(SkipReason::DegenerateGeometry) => self.skipped_degenerate += 1,
        }
    }
}

/// Per-frame geometry against a frozen calibration.
///
/// Holds no mutable state, so frames can be estimated in parallel.
#[derive(Debug, Clone)]
pub struct FrameEstimator {
    calibration: CalibrationState,
    localizer: LocalizerMethod,
    distance: DistanceEstimator,
    contact: ContactDetector,
    pen_length: f64,
    pen_axis: PenAxis,
}

impl FrameEstimator {
    /// Estimator for `config` with a known calibration
    #[must_use]
    pub fn new(config: &Config, calibration: CalibrationState) -> Self {
        Self {
            calibration,
            localizer: config.methods.localizer,
            distance: DistanceEstimator::from_config(config),
            contact: ContactDetector::from_config(config),
            pen_length: config.rig.pen_length,
            pen_axis: config.contact.pen_axis,
        }
    }

    /// Frozen calibration
    #[must_use]
    pub fn calibration(&self) -> &CalibrationState {
        &self.calibration
    }

    /// Run every geometry stage on one frame; recoverable failures become skips.
    ///
    /// # Errors
    ///
    /// Only non-recoverable conditions propagate.
    pub fn estimate(&self, frame_index: usize, input: &FrameInput) -> Result<FrameResult> {
        let context = LocalizerContext::from_calibration(&self.calibration);
        let localized = localize_markers(&input.masks, self.localizer, &context);
        let observations = localized.each_ref().map(|r| r.as_ref().ok().copied());

        match self.solve(&localized, input.audio_rms, frame_index, observations) {
            Ok(result) => Ok(result),
            Err(e) if e.is_recoverable() => {
                warn!("Skipping frame {}: {}", frame_index, e);
                Ok(FrameResult::skipped(frame_index, observations, SkipReason::from_error(&e)))
            }
            Err(e) => Err(e),
        }
    }

    fn solve(
        &self,
        localized: &[Result<MarkerObservation>; 3],
        audio_rms: Option<f64>,
        frame_index: usize,
        marker_observations: [Option<MarkerObservation>; 3],
    ) -> Result<FrameResult> {
        for result in localized {
            if let Err(e) = result {
                return Err(match e {
                    Error::MarkerNotDetected(color) => Error::MarkerNotDetected(*color),
                    Error::DegenerateGeometry(msg) => Error::DegenerateGeometry(msg.clone()),
                    other => Error::InvalidState(other.to_string()),
                });
            }
        }
        let [Some(red), Some(green), Some(blue)] = marker_observations else {
            return Err(Error::InvalidState("localization produced no observation".to_string()));
        };
        let observations = [red, green, blue];

        let rays = [
            self.calibration.ray(red.projected_center)?,
            self.calibration.ray(green.projected_center)?,
            self.calibration.ray(blue.projected_center)?,
        ];
        let distances = self.distance.estimate(&observations, &rays, &self.calibration)?;
        let positions = marker_positions(&rays, &distances);
        let pen = solve_pen(&positions, self.pen_length, self.pen_axis)?;
        let touching = self.contact.is_touching(pen.pen_tip_world.y, audio_rms);

        debug!(
            "Frame {}: tip ({:.3}, {:.3}, {:.3}), touching {}",
            frame_index, pen.pen_tip_world.x, pen.pen_tip_world.y, pen.pen_tip_world.z, touching
        );

        Ok(FrameResult {
            frame_index,
            marker_observations,
            camera_position: Some(pen.camera_position),
            world_frame: Some(pen.world_frame),
            pen_tip_world: Some(pen.pen_tip_world),
            touching,
            valid: true,
            status: FrameStatus::Estimated,
        })
    }
}

/// Drawing trajectory pipeline
#[derive(Debug)]
pub struct Pipeline {
    config: Config,
    state: PipelineState,
    calibrator: CameraCalibrator,
    estimator: Option<FrameEstimator>,
    trajectory: TrajectoryBuilder,
    stats: FrameStats,
    next_index: usize,
}

impl Pipeline {
    /// Create a pipeline awaiting calibration
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the configuration does not validate.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;
        info!(
            "Initializing pipeline: {} localizer, {} distance, {} calibration",
            config.methods.localizer, config.methods.distance, config.methods.calibration
        );
        Ok(Self {
            calibrator: CameraCalibrator::from_config(&config),
            config,
            state: PipelineState::AwaitingCalibration,
            estimator: None,
            trajectory: TrajectoryBuilder::new(),
            stats: FrameStats::default(),
            next_index: 0,
        })
    }

    /// Create a pipeline that starts streaming with a known calibration
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationInvalid` if the configuration does not validate.
    pub fn with_calibration(config: Config, calibration: CalibrationState) -> Result<Self> {
        let mut pipeline = Self::new(config)?;
        pipeline.estimator = Some(FrameEstimator::new(&pipeline.config, calibration));
        pipeline.state = PipelineState::Streaming;
        Ok(pipeline)
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Frame counters so far
    #[must_use]
    pub fn stats(&self) -> &FrameStats {
        &self.stats
    }

    /// Frozen calibration, once available
    #[must_use]
    pub fn calibration(&self) -> Option<&CalibrationState> {
        self.estimator.as_ref().map(FrameEstimator::calibration)
    }

    /// Active configuration
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Accepted (unsmoothed) points so far
    #[must_use]
    pub fn accepted_points(&self) -> &[Point3<f64>] {
        self.trajectory.points()
    }

    /// Process the next frame in arrival order.
    ///
    /// # Errors
    ///
    /// - `InvalidState` after [`Pipeline::finish`]
    /// - `CalibrationFailed` when `calibration.max_frames` frames pass without calibrating
    /// - `ConfigurationInvalid` when calibration inputs are missing
    pub fn process_frame(&mut self, input: &FrameInput) -> Result<FrameResult> {
        let frame_index = self.next_index;
        let result = match self.state {
            PipelineState::Finalized => {
                return Err(Error::InvalidState("cannot process frames after finalization".to_string()));
            }
            PipelineState::AwaitingCalibration => self.try_calibrate(frame_index, input)?,
            PipelineState::Streaming => match &self.estimator {
                Some(estimator) => estimator.estimate(frame_index, input)?,
                None => return Err(Error::InvalidState("streaming without calibration".to_string())),
            },
        };
        self.next_index += 1;
        self.accept(&result);
        Ok(result)
    }

    /// Process several frames; once calibrated, frames are estimated in
    /// parallel and accumulated in arrival order.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::process_frame`].
    pub fn process_batch(&mut self, inputs: &[FrameInput]) -> Result<Vec<FrameResult>> {
        let mut results = Vec::with_capacity(inputs.len());
        let mut remaining = inputs;

        while self.state == PipelineState::AwaitingCalibration {
            let Some((first, rest)) = remaining.split_first() else {
                return Ok(results);
            };
            results.push(self.process_frame(first)?);
            remaining = rest;
        }

        if self.state == PipelineState::Finalized {
            return Err(Error::InvalidState("cannot process frames after finalization".to_string()));
        }
        let estimator = self
            .estimator
            .clone()
            .ok_or_else(|| Error::InvalidState("streaming without calibration".to_string()))?;

        let start = self.next_index;
        let estimated: Vec<Result<FrameResult>> = remaining
            .par_iter()
            .enumerate()
            .map(|(k, input)| estimator.estimate(start + k, input))
            .collect();

        for result in estimated {
            let result = result?;
            self.next_index += 1;
            self.accept(&result);
            results.push(result);
        }
        Ok(results)
    }

    /// Smooth the accepted points and finalize.
    ///
    /// # Errors
    ///
    /// - `InvalidState` if already finalized
    /// - `CalibrationFailed` if the stream ended before calibration
    pub fn finish(&mut self) -> Result<Trajectory> {
        match self.state {
            PipelineState::Finalized => Err(Error::InvalidState("pipeline already finalized".to_string())),
            PipelineState::AwaitingCalibration => {
                self.state = PipelineState::Finalized;
                Err(Error::CalibrationFailed {
                    frames_seen: self.stats.calibration_frames,
                })
            }
            PipelineState::Streaming => Ok(self.finalize()),
        }
    }

    /// Feed frames until exhausted or `cancel` is set, then finalize.
    ///
    /// A cancelled run returns the smoothed prefix; a run cancelled before
    /// calibration returns an empty trajectory.
    ///
    /// # Errors
    ///
    /// See [`Pipeline::process_frame`] and [`Pipeline::finish`].
    pub fn run<I, F>(mut self, frames: I, cancel: &AtomicBool, mut on_frame: F) -> Result<Trajectory>
    where
        I: IntoIterator<Item = FrameInput>,
        F: FnMut(&FrameResult),
    {
        info!("Starting pipeline run");
        let mut cancelled = false;
        for frame in frames {
            if cancel.load(Ordering::Relaxed) {
                cancelled = true;
                break;
            }
            let result = self.process_frame(&frame)?;
            on_frame(&result);
        }

        if cancelled {
            info!("Run cancelled after {} frames", self.stats.processed);
            if self.state == PipelineState::AwaitingCalibration {
                self.state = PipelineState::Finalized;
                return Ok(Trajectory::default());
            }
        }
        self.finish()
    }

    fn try_calibrate(&mut self, frame_index: usize, input: &FrameInput) -> Result<FrameResult> {
        let context = LocalizerContext::uncalibrated(
            self.calibrator.principal_point(),
            self.calibrator.marker_radius(),
            self.calibrator.radial(),
        );
        let localized = localize_markers(&input.masks, LocalizerMethod::Unweighted, &context);
        let observations = localized.each_ref().map(|r| r.as_ref().ok().copied());

        let outcome = match observations {
            [Some(red), Some(green), Some(blue)] => match self.calibrator.calibrate(&[red, green, blue]) {
                Ok(calibration) => Some(calibration),
                Err(e) if e.is_recoverable() => {
                    warn!("Calibration attempt on frame {} failed: {}", frame_index, e);
                    None
                }
                Err(e) => return Err(e),
            },
            _ => {
                debug!("Frame {} lacks a marker, still awaiting calibration", frame_index);
                None
            }
        };

        match outcome {
            Some(calibration) => {
                self.estimator = Some(FrameEstimator::new(&self.config, calibration));
                self.state = PipelineState::Streaming;
                info!("Calibrated on frame {}, streaming", frame_index);
                Ok(FrameResult {
                    status: FrameStatus::Calibrated,
                    ..FrameResult::skipped(frame_index, observations, SkipReason::AwaitingCalibration)
                })
            }
            None => {
                let frames_seen = self.stats.calibration_frames + 1;
                if self.config.calibration.max_frames.is_some_and(|max| frames_seen >= max) {
                    self.state = PipelineState::Finalized;
                    return Err(Error::CalibrationFailed { frames_seen });
                }
                Ok(FrameResult::skipped(frame_index, observations, SkipReason::AwaitingCalibration))
            }
        }
    }

    fn accept(&mut self, result: &FrameResult) {
        self.stats.record(result);
        if !result.valid {
            return;
        }
        match result.pen_tip_world {
            Some(tip) if result.touching => self.trajectory.push(tip),
            _ => self.trajectory.lift(),
        }
    }

    fn finalize(&mut self) -> Trajectory {
        self.state = PipelineState::Finalized;
        let builder = std::mem::take(&mut self.trajectory);
        let trajectory = builder.finish(self.config.smoothing.window_size, self.config.smoothing.per_stroke);
        info!(
            "Finalized trajectory: {} points from {} accepted ({} frames, {:.1}% skipped)",
            trajectory.len(),
            trajectory.raw_len(),
            self.stats.processed,
            self.stats.skip_rate() * 100.0
        );
        trajectory
    }
}
