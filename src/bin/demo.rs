//! demo - end-to-end synthetic run of the stability pipeline
//!
//! A stub camera feeds gradient frames while a scripted detector plays back a
//! cup that slides into view and then sits still with a few pixels of jitter,
//! next to a person (not allow-listed) and a low-confidence bottle.

use anyhow::{anyhow, Result};
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::PathBuf;

use settle_kernel::{
    BBox, CameraConfig, CameraSource, CancelToken, Detection, ScriptedBackend, Session,
    SessionConfig, SessionOutcome,
};

const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 240;
const CUP: u32 = 41;
const BOTTLE: u32 = 39;
const PERSON: u32 = 0;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Time budget in seconds.
    #[arg(long, default_value_t = 5)]
    seconds: u32,
    /// Frames per second of the stub camera.
    #[arg(long, default_value_t = 10)]
    fps: u32,
    /// Frames the cup spends sliding in before it settles.
    #[arg(long, default_value_t = 8)]
    approach_frames: usize,
    /// Maximum per-frame jitter of the settled cup, in pixels.
    #[arg(long, default_value_t = 4.0)]
    jitter: f32,
    /// Output directory for the captured crop.
    #[arg(long, default_value = "demo_out")]
    out: String,
    /// Optional deterministic seed for the jitter.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.fps == 0 {
        return Err(anyhow!("fps must be >= 1"));
    }
    if !(0.0..50.0).contains(&args.jitter) {
        return Err(anyhow!("jitter must be within 0..50 px"));
    }

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let total_frames = args.seconds as usize * args.fps as usize;

    stage("script detections");
    let script = (0..total_frames).map(|i| scripted_frame(i, &args, &mut rng));
    let detector = ScriptedBackend::new(script.collect::<Vec<_>>());

    stage("open stub camera");
    let source = CameraSource::new(CameraConfig {
        device: "stub://demo".to_string(),
        fps: args.fps,
        width: FRAME_WIDTH,
        height: FRAME_HEIGHT,
    })?;

    let config = SessionConfig {
        budget_secs: args.seconds,
        output_dir: PathBuf::from(&args.out),
        ..SessionConfig::default()
    };

    stage("run session");
    let outcome = Session::new(config, source, detector)?.run(&CancelToken::new())?;

    println!("demo complete");
    match &outcome {
        SessionOutcome::Triggered(result) => {
            println!("  settled: {} (class {})", result.class_name, result.class_id);
            println!("  frame: {}", result.frame_index);
            println!(
                "  bbox: ({:.1}, {:.1}, {:.1}, {:.1})",
                result.bbox.x1, result.bbox.y1, result.bbox.x2, result.bbox.y2
            );
            println!("  crop: {}", result.saved_path.display());
            println!("{}", serde_json::to_string_pretty(&result.summary())?);
        }
        SessionOutcome::Exhausted { frames_read } => {
            println!("  nothing settled within {} frames", frames_read);
        }
        SessionOutcome::Cancelled { frames_read } => {
            println!("  cancelled after {} frames", frames_read);
        }
    }
    Ok(())
}

fn stage(msg: &str) {
    eprintln!("demo: {}", msg);
}

/// Detections for frame `i`: the cup slides in 60 px per frame, then rests
/// near the center with random jitter.
fn scripted_frame(i: usize, args: &Args, rng: &mut StdRng) -> Vec<Detection> {
    let rest = BBox::new(130.0, 80.0, 190.0, 160.0);
    let cup = if i < args.approach_frames {
        let offset = (args.approach_frames - i) as f32 * 60.0;
        rest.translate(-offset, 0.0)
    } else if args.jitter > 0.0 {
        let dx = rng.gen_range(-args.jitter..=args.jitter);
        let dy = rng.gen_range(-args.jitter..=args.jitter);
        rest.translate(dx, dy)
    } else {
        rest
    };

    vec![
        Detection::new(PERSON, 0.97, BBox::new(240.0, 20.0, 310.0, 230.0)),
        Detection::new(CUP, rng.gen_range(0.7..0.95), cup),
        Detection::new(BOTTLE, 0.3, BBox::new(20.0, 150.0, 50.0, 220.0)),
    ]
}
