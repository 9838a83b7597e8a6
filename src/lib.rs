//! Drawing trajectory recovery from monocular video of a three-marker pen rig.
//!
//! A pen carries three colored balls (red, green, blue) in a rigid equilateral
//! triangle. From the per-color pixel masks of each frame this library
//! recovers the 3D position of the pen tip in a frame anchored to the rig,
//! decides whether the pen touches the surface, and emits a smoothed
//! trajectory of the drawing.
//!
//! The pipeline consists of:
//! 1. Marker localization (projected center, radius and solid angle per mask)
//! 2. One-time camera calibration on the first frame with three markers
//! 3. Ray casting through the projected centers
//! 4. Distance estimation by triangulation or trilateration
//! 5. World-frame construction and pen-tip solution
//! 6. Contact detection from tip height and audio loudness
//! 7. Median smoothing of the accepted points
//!
//! # Examples
//!
//! ```
//! use drawing_decoder::{
//!     config::Config,
//!     pipeline::Pipeline,
//!     synthetic::{SyntheticCamera, SyntheticRig},
//! };
//! use nalgebra::Point3;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut config = Config::default();
//! config.rig.ball_radius = 1.0;
//! config.rig.inter_marker_distance = 10.0;
//! config.rig.pen_length = 5.0;
//! config.camera.image_width = 640;
//! config.camera.image_height = 480;
//! config.calibration.initial_depth = Some(50.0);
//! config.smoothing.window_size = 1;
//!
//! let camera = SyntheticCamera::centered(800.0, 640, 480);
//! let rig = SyntheticRig::frontal(Point3::new(0.0, 0.0, 50.0), 10.0, 1.0);
//!
//! let mut pipeline = Pipeline::new(config)?;
//! pipeline.process_frame(&rig.render(&camera, 2, None))?; // calibrates
//! let result = pipeline.process_frame(&rig.render(&camera, 2, None))?;
//! assert!(result.valid && result.touching);
//!
//! let trajectory = pipeline.finish()?;
//! for (x, z) in trajectory.planar() {
//!     println!("{x:.3} {z:.3}");
//! }
//! # Ok(())
//! # }
//! ```

/// Error types and result handling
pub mod error;

/// Constants used throughout the decoder
pub mod constants;

/// Configuration management
pub mod config;

/// Per-color pixel masks
pub mod mask;

/// RGB frame to marker mask thresholding
pub mod segmentation;

/// Pinhole camera state and ray casting
pub mod camera;

/// Marker localization methods
pub mod localization;

/// Focal length self-calibration
pub mod calibration;

/// Camera-to-marker distance estimation
pub mod distance;

/// World frame and pen-tip solution
pub mod orientation;

/// Pen contact detection
pub mod contact;

/// Window-median smoothing
pub mod smoothing;

/// Trajectory accumulation and output
pub mod trajectory;

/// Frame pipeline state machine
pub mod pipeline;

/// Synthetic scenes for tests, benchmarks and demos
pub mod synthetic;

pub use error::{Error, Result};
