//! Drawing decoder: recover a pen drawing from frames of a three-marker rig.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use drawing_decoder::{
    config::{Config, EXAMPLE_CONFIG},
    mask::ColorMask,
    pipeline::{FrameInput, FrameStatus, Pipeline},
    segmentation::Segmenter,
    synthetic::{SyntheticCamera, SyntheticRig},
    trajectory::Trajectory,
};
use log::{info, warn};
use nalgebra::Point3;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;

/// Mask pixels brighter than this count as set
const MASK_LUMA_THRESHOLD: u8 = 127;

/// Frames loaded and estimated together
const BATCH_SIZE: usize = 64;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    /// Path to configuration file (YAML format)
    #[arg(short = 'C', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Decode a directory of frames into a trajectory
    Decode {
        /// Directory with NNNNN.png RGB frames or NNNNN_{red,green,blue}.png masks
        #[arg(short, long)]
        frames: PathBuf,

        /// File with one audio RMS value per frame and line
        #[arg(short, long)]
        audio: Option<PathBuf>,

        /// Output file for "x z" lines (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Stop after this many frames
        #[arg(long)]
        max_frames: Option<usize>,
    },

    /// Decode a synthetic circular stroke
    Demo {
        /// Number of frames after calibration
        #[arg(long, default_value = "120")]
        frames: usize,

        /// Circle radius
        #[arg(long, default_value = "4.0")]
        radius: f64,

        /// Rig depth on the calibration frame
        #[arg(long, default_value = "40.0")]
        depth: f64,

        /// Sub-pixel rays per pixel side
        #[arg(long, default_value = "1")]
        supersample: u32,

        /// Uniform hand tremor added to every rig position
        #[arg(long, default_value = "0.0")]
        jitter: f64,

        /// Seed for the tremor generator
        #[arg(long, default_value = "7")]
        seed: u64,
    },

    /// Print an example configuration file
    ExampleConfig,
}

/// Synthetic demo stroke parameters
#[derive(Debug, Clone, Copy)]
struct DemoScene {
    frames: usize,
    radius: f64,
    depth: f64,
    supersample: u32,
    jitter: f64,
    seed: u64,
}

/// One frame on disk
#[derive(Debug, Default)]
struct FrameFiles {
    rgb: Option<PathBuf>,
    masks: [Option<PathBuf>; 3],
}

fn main() -> Result<()> {
    let args = Args::parse();

    if args.debug {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("debug"));
    } else {
        env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));
    }

    let config = match &args.config {
        Some(path) => {
            info!("Loading configuration from: {}", path.display());
            Config::from_file(path).with_context(|| format!("loading {}", path.display()))?
        }
        None => Config::default(),
    };

    match args.command {
        Command::Decode {
            frames,
            audio,
            output,
            max_frames,
        } => decode(config, &frames, audio.as_deref(), output.as_deref(), max_frames),
        Command::Demo {
            frames,
            radius,
            depth,
            supersample,
            jitter,
            seed,
        } => demo(
            config,
            DemoScene {
                frames,
                radius,
                depth,
                supersample,
                jitter,
                seed,
            },
        ),
        Command::ExampleConfig => {
            print!("{EXAMPLE_CONFIG}");
            Ok(())
        }
    }
}

fn decode(
    config: Config,
    frames_dir: &Path,
    audio: Option<&Path>,
    output: Option<&Path>,
    max_frames: Option<usize>,
) -> Result<()> {
    let segmenter = Segmenter::from_config(&config.segmentation)?;
    let (width, height) = (config.camera.image_width, config.camera.image_height);
    let audio = match audio {
        Some(path) => read_audio(path)?,
        None => Vec::new(),
    };

    let mut files: Vec<FrameFiles> = list_frames(frames_dir)?.into_values().collect();
    if let Some(max) = max_frames {
        files.truncate(max);
    }
    if files.is_empty() {
        bail!("no frames found in {}", frames_dir.display());
    }
    info!("Decoding {} frames from {}", files.len(), frames_dir.display());

    let mut pipeline = Pipeline::new(config)?;
    let mut index = 0;
    for chunk in files.chunks(BATCH_SIZE) {
        let mut batch = Vec::with_capacity(chunk.len());
        for frame in chunk {
            let masks = load_masks(frame, &segmenter, (width, height))?;
            batch.push(FrameInput {
                masks,
                audio_rms: audio.get(index).copied(),
            });
            index += 1;
        }
        for result in pipeline.process_batch(&batch)? {
            if result.status == FrameStatus::Calibrated {
                if let Some(calibration) = pipeline.calibration() {
                    info!("Focal length {:.2}px", calibration.focal_length);
                }
            }
        }
    }

    let stats = *pipeline.stats();
    let trajectory = pipeline.finish()?;
    info!(
        "{} frames, {} estimated, {} touching, {} skipped",
        stats.processed,
        stats.estimated,
        stats.touching,
        stats.skipped()
    );
    write_trajectory(&trajectory, output)
}

fn demo(mut config: Config, scene: DemoScene) -> Result<()> {
    if !(scene.jitter.is_finite() && scene.jitter >= 0.0) {
        bail!("jitter must be non-negative, got {}", scene.jitter);
    }
    let hfov: f64 = 60.0;
    let camera = SyntheticCamera::centered(
        f64::from(config.camera.image_width) / 2.0 / (hfov / 2.0).to_radians().tan(),
        config.camera.image_width,
        config.camera.image_height,
    );
    config.calibration.initial_depth = Some(scene.depth);
    let pipeline = Pipeline::new(config.clone())?;

    let rig_at = |centroid: Point3<f64>| {
        SyntheticRig::frontal(centroid, config.rig.inter_marker_distance, config.rig.ball_radius)
    };
    let lift = config.contact.geometric_threshold + 1.0;
    let mut rng = StdRng::seed_from_u64(scene.seed);
    let DemoScene {
        frames,
        radius,
        depth,
        supersample,
        jitter,
        ..
    } = scene;

    // Calibration frame, a full circle with the pen lifted over its middle third
    let calibration = rig_at(Point3::new(0.0, 0.0, depth)).render(&camera, supersample, None);
    let stroke = (0..frames).map(|k| {
        let t = std::f64::consts::TAU * k as f64 / frames.max(1) as f64;
        let lifted = (frames / 3..2 * frames / 3).contains(&k);
        let mut tremor = || if jitter > 0.0 { rng.gen_range(-jitter..=jitter) } else { 0.0 };
        let centroid = Point3::new(
            radius * t.cos() + tremor(),
            (if lifted { -lift } else { 0.0 }) + tremor(),
            depth + radius * t.sin() + tremor(),
        );
        rig_at(centroid).render(&camera, supersample, (!lifted).then_some(0.01))
    });

    let cancel = AtomicBool::new(false);
    let mut skipped = 0usize;
    let trajectory = pipeline.run(std::iter::once(calibration).chain(stroke), &cancel, |result| {
        if matches!(result.status, FrameStatus::Skipped(_)) {
            skipped += 1;
        }
    })?;
    if skipped > 0 {
        warn!("{skipped} demo frames were skipped");
    }
    info!("Recovered {} strokes", trajectory.strokes().len());
    write_trajectory(&trajectory, None)
}

/// Group the directory's PNG files by frame number
fn list_frames(dir: &Path) -> Result<BTreeMap<u64, FrameFiles>> {
    let mut frames: BTreeMap<u64, FrameFiles> = BTreeMap::new();
    for entry in fs::read_dir(dir).with_context(|| format!("reading {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some("png") {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };
        let (number, channel) = match stem.split_once('_') {
            Some((n, "red")) => (n, Some(0)),
            Some((n, "green")) => (n, Some(1)),
            Some((n, "blue")) => (n, Some(2)),
            Some(_) => continue,
            None => (stem, None),
        };
        let Ok(number) = number.parse::<u64>() else {
            continue;
        };
        let entry = frames.entry(number).or_default();
        match channel {
            Some(c) => entry.masks[c] = Some(path),
            None => entry.rgb = Some(path),
        }
    }
    Ok(frames)
}

fn load_masks(frame: &FrameFiles, segmenter: &Segmenter, expected: (u32, u32)) -> Result<[ColorMask; 3]> {
    if let Some(path) = &frame.rgb {
        let image = image::open(path).with_context(|| format!("opening {}", path.display()))?.to_rgb8();
        if image.dimensions() != expected {
            warn!(
                "{} is {}x{}, configured camera is {}x{}",
                path.display(),
                image.width(),
                image.height(),
                expected.0,
                expected.1
            );
        }
        return Ok(segmenter.segment(&image));
    }

    let mut masks = [ColorMask::empty(), ColorMask::empty(), ColorMask::empty()];
    for (mask, path) in masks.iter_mut().zip(frame.masks.iter()) {
        if let Some(path) = path {
            let image = image::open(path).with_context(|| format!("opening {}", path.display()))?.to_luma8();
            *mask = ColorMask::from_luma(&image, MASK_LUMA_THRESHOLD);
        }
    }
    Ok(masks)
}

/// One RMS value per line; blank lines are skipped
fn read_audio(path: &Path) -> Result<Vec<f64>> {
    let content = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .enumerate()
        .map(|(i, line)| {
            line.parse::<f64>()
                .with_context(|| format!("{}:{}: invalid RMS value {line:?}", path.display(), i + 1))
        })
        .collect()
}

fn write_trajectory(trajectory: &Trajectory, output: Option<&Path>) -> Result<()> {
    let mut writer: Box<dyn Write> = match output {
        Some(path) => Box::new(BufWriter::new(
            fs::File::create(path).with_context(|| format!("creating {}", path.display()))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    for (x, z) in trajectory.planar() {
        writeln!(writer, "{x} {z}")?;
    }
    writer.flush()?;
    if let Some(path) = output {
        info!("Wrote {} points to {}", trajectory.len(), path.display());
    }
    Ok(())
}
