use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};

use facematch_core::capture::capture_loop::{CaptureConfig, CaptureLoop, CaptureUpdate};
use facematch_core::capture::domain::frame_source::FrameSource;
#[cfg(feature = "ffmpeg")]
use facematch_core::capture::infrastructure::ffmpeg_frame_source::FfmpegFrameSource;
use facematch_core::capture::infrastructure::image_sequence_source::{is_image, ImageSequenceSource};
use facematch_core::capture::infrastructure::paced_frame_source::PacedFrameSource;
use facematch_core::enrollment::domain::clock::SystemClock;
use facematch_core::enrollment::domain::enrollment_session::{EnrollmentEvent, EnrollmentStateMachine};
use facematch_core::gallery::domain::gallery_store::GalleryStore;
use facematch_core::gallery::infrastructure::sqlite_gallery_store::SqliteGalleryStore;
use facematch_core::recognition::domain::matching_engine::MatchingEngine;
use facematch_core::recognition::infrastructure::engine_factory::{create_detector, create_engine};
use facematch_core::shared::settings::{DetectorKind, MatchingStrategy, Settings};

/// Extra spacing on top of the debounce so paced stills are never debounced.
const ENROLL_PACING_MARGIN: Duration = Duration::from_millis(50);

/// Face enrollment and recognition against a local gallery.
#[derive(Parser)]
#[command(name = "facematch")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Matching strategy: embedding or histogram.
    #[arg(long, global = true)]
    strategy: Option<String>,

    /// Face detector: onnx or cascade.
    #[arg(long, global = true)]
    detector: Option<String>,

    /// OpenCV Haar cascade XML for the cascade detector; the stock frontal
    /// face cascade is downloaded when omitted.
    #[arg(long, global = true)]
    cascade: Option<PathBuf>,

    /// Match tolerance; defaults to the strategy's own (embedding 0.6,
    /// histogram 100). The 0.6 embedding default comes from 128-d dlib
    /// vectors; normalized ArcFace vectors of one person are often 0.8-1.1
    /// apart, so values near 1.0 usually suit the ONNX embedder better.
    #[arg(long, global = true)]
    tolerance: Option<f64>,

    /// Gallery database file.
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Persist the effective settings as the new defaults.
    #[arg(long, global = true)]
    save_settings: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Capture face samples for NAME from a frame source.
    Enroll {
        name: String,
        /// Image, directory of images, or (with ffmpeg) a video file.
        #[arg(long)]
        source: PathBuf,
        /// Number of samples to capture.
        #[arg(long)]
        samples: Option<usize>,
    },
    /// Identify the faces in every frame of a source.
    Recognize {
        #[arg(long)]
        source: PathBuf,
        /// Stop after this many frames.
        #[arg(long)]
        max_frames: Option<usize>,
    },
    /// List enrolled identities.
    List,
    /// Remove an identity and all of its samples.
    Delete { name: String },
    /// Remove every identity.
    Clear,
    /// Show gallery statistics.
    Stats,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let settings = apply_overrides(Settings::load(), &cli)?;
    if cli.save_settings {
        settings.save()?;
        log::info!("Settings saved");
    }

    let db_path = settings.database_path()?;
    let mut store = SqliteGalleryStore::open(&db_path)?;
    log::debug!("Gallery at {}", db_path.display());

    match cli.command {
        Command::Enroll {
            name,
            source,
            samples,
        } => {
            let target = samples.unwrap_or(settings.target_samples);
            let engine = build_engine(&settings, store)?;
            run_enroll(&settings, engine, &name, target, &source)
        }
        Command::Recognize { source, max_frames } => {
            let engine = build_engine(&settings, store)?;
            run_recognize(&settings, engine, &source, max_frames)
        }
        Command::List => run_list(&store),
        Command::Delete { name } => {
            if store.delete_person(&name)? {
                println!("Deleted {name}");
                Ok(())
            } else {
                Err(format!("No identity named {name}").into())
            }
        }
        Command::Clear => {
            store.clear_all()?;
            println!("Gallery cleared");
            Ok(())
        }
        Command::Stats => {
            println!("Identities: {}", store.person_count()?);
            println!("Samples:    {}", store.record_count()?);
            println!("Strategy:   {}", settings.strategy);
            println!("Tolerance:  {}", settings.effective_tolerance());
            Ok(())
        }
    }
}

fn run_enroll(
    settings: &Settings,
    engine: Arc<dyn MatchingEngine>,
    name: &str,
    target: usize,
    source: &Path,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut machine = enrollment_machine(settings, &engine);
    let outcome = machine.begin(name, target)?;
    if outcome.appending {
        eprintln!("{name} is already enrolled; adding samples");
    }

    // Files decode much faster than the debounce; space them like camera captures
    let pacing = Duration::from_millis(settings.debounce_ms) + ENROLL_PACING_MARGIN;
    let source = Box::new(PacedFrameSource::new(open_source(source)?, pacing));
    let mut capture = CaptureLoop::spawn(source, engine, machine, capture_config())?;
    let mut completed = false;
    for update in capture.updates().iter() {
        match update {
            CaptureUpdate::Enrollment { event, .. } => match event {
                EnrollmentEvent::Captured { count, target, .. } => {
                    eprint!("\rCaptured {count}/{target}");
                }
                EnrollmentEvent::Completed { identity, samples } => {
                    eprintln!("\rEnrolled {identity} with {samples} sample(s)");
                    completed = true;
                    break;
                }
                EnrollmentEvent::CaptureFailed { reason } => log::warn!("Capture failed: {reason}"),
                _ => {}
            },
            CaptureUpdate::Error { frame_index, message } => {
                log::warn!("Frame {frame_index}: {message}")
            }
            CaptureUpdate::Recognized { .. } => {}
        }
    }
    capture.stop();

    if completed {
        Ok(())
    } else {
        eprintln!();
        Err(format!("Source ran out before {target} samples of {name} were captured").into())
    }
}

fn run_recognize(
    settings: &Settings,
    engine: Arc<dyn MatchingEngine>,
    source: &Path,
    max_frames: Option<usize>,
) -> Result<(), Box<dyn std::error::Error>> {
    let machine = enrollment_machine(settings, &engine);
    let mut capture = CaptureLoop::spawn(open_source(source)?, engine, machine, capture_config())?;

    let mut frames = 0;
    for update in capture.updates().iter() {
        match update {
            CaptureUpdate::Recognized {
                frame_index,
                results,
            } => {
                let faces: Vec<String> = results
                    .iter()
                    .map(|r| {
                        format!(
                            "{} ({:.1}%) at [{}, {}, {}, {}]",
                            r.name(),
                            r.confidence,
                            r.region.top,
                            r.region.right,
                            r.region.bottom,
                            r.region.left
                        )
                    })
                    .collect();
                println!("frame {frame_index}: {}", if faces.is_empty() { "-".into() } else { faces.join(", ") });
            }
            CaptureUpdate::Error { frame_index, message } => {
                eprintln!("frame {frame_index}: error: {message}")
            }
            CaptureUpdate::Enrollment { .. } => {}
        }
        frames += 1;
        if max_frames.is_some_and(|max| frames >= max) {
            break;
        }
    }
    capture.stop();
    Ok(())
}

fn run_list(store: &dyn GalleryStore) -> Result<(), Box<dyn std::error::Error>> {
    let persons = store.persons()?;
    if persons.is_empty() {
        println!("No identities enrolled");
    }
    for person in persons {
        println!(
            "{:<24} {:>4} sample(s)  registered {}",
            person.name,
            person.record_count,
            person.registered.format("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

fn build_engine(
    settings: &Settings,
    store: SqliteGalleryStore,
) -> Result<Arc<dyn MatchingEngine>, Box<dyn std::error::Error>> {
    let detector = create_detector(settings, Some(Box::new(download_progress)))?;
    let engine = create_engine(settings, detector, Box::new(store), Some(Box::new(download_progress)))?;
    Ok(engine)
}

/// Updates are dropped when the channel is full, so give printing some slack.
fn capture_config() -> CaptureConfig {
    CaptureConfig {
        update_capacity: 256,
        ..CaptureConfig::default()
    }
}

fn enrollment_machine(settings: &Settings, engine: &Arc<dyn MatchingEngine>) -> EnrollmentStateMachine {
    EnrollmentStateMachine::new(
        engine.clone(),
        Arc::new(SystemClock),
        Duration::from_millis(settings.debounce_ms),
    )
}

fn open_source(path: &Path) -> Result<Box<dyn FrameSource>, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Source not found: {}", path.display()).into());
    }
    if path.is_dir() || is_image(path) {
        return Ok(Box::new(ImageSequenceSource::new(path)));
    }
    #[cfg(feature = "ffmpeg")]
    {
        Ok(Box::new(FfmpegFrameSource::new(path)))
    }
    #[cfg(not(feature = "ffmpeg"))]
    {
        Err(format!(
            "{} is not an image or directory; video sources need the ffmpeg feature",
            path.display()
        )
        .into())
    }
}

fn apply_overrides(mut settings: Settings, cli: &Cli) -> Result<Settings, Box<dyn std::error::Error>> {
    if let Some(strategy) = &cli.strategy {
        settings.strategy = match strategy.as_str() {
            "embedding" => MatchingStrategy::Embedding,
            "histogram" => MatchingStrategy::Histogram,
            other => {
                return Err(format!("Strategy must be 'embedding' or 'histogram', got '{other}'").into())
            }
        };
    }
    if let Some(detector) = &cli.detector {
        settings.detector = match detector.as_str() {
            "onnx" => DetectorKind::Onnx,
            "cascade" => DetectorKind::Cascade,
            other => return Err(format!("Detector must be 'onnx' or 'cascade', got '{other}'").into()),
        };
    }
    if let Some(path) = &cli.cascade {
        settings.cascade_path = Some(path.clone());
    }
    if let Some(tolerance) = cli.tolerance {
        if !tolerance.is_finite() || tolerance < 0.0 {
            return Err(format!("Tolerance must be a non-negative number, got {tolerance}").into());
        }
        settings.tolerance = Some(tolerance);
    }
    if let Some(path) = &cli.database {
        settings.database_path = Some(path.clone());
    }
    Ok(settings)
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = (downloaded as f64 / total as f64 * 100.0) as u32;
        eprint!("\rDownloading model... {pct}%");
    } else {
        eprint!("\rDownloading model... {downloaded} bytes");
    }
}
