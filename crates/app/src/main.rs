use std::{path::PathBuf, time::Duration};

use clap::{Parser, Subcommand};
use serde_json::json;
use sound_button_core::{
    Appearance, ButtonConfig, ButtonId, ClipIdentity, ExclusivePlayback, FramePacer,
    IconGeometry, IconShape, ManualClock, PlaybackCoordinator, SimulatedEngine,
};
use tracing_subscriber::EnvFilter;

fn main() -> sound_button_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();

    match cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::Shapes { size, stroke } => run_shapes(size, stroke),
    }
}

fn run_simulate(args: SimulateArgs) -> sound_button_core::Result<()> {
    let config = match &args.config {
        Some(path) => ButtonConfig::from_json(&std::fs::read_to_string(path)?)?,
        None => ButtonConfig::new(ClipIdentity::new(&args.url, &args.format)),
    };
    tracing::info!(clip = %config.clip, fps = args.fps, "starting simulation");

    let clock = ManualClock::new();
    let engine = SimulatedEngine::new(clock.clone())
        .with_clip(config.clip.url.clone(), Duration::from_millis(args.clip_ms))
        .with_load_latency(Duration::from_millis(args.load_ms));
    let mut button =
        PlaybackCoordinator::new(ButtonId::new(&args.id), config, engine, clock.now())?;
    let mut owner = ExclusivePlayback::new();

    let mut presses: Vec<Duration> = args
        .press_at
        .iter()
        .map(|ms| Duration::from_millis(*ms))
        .collect();
    presses.sort();
    let mut presses = presses.into_iter().peekable();

    let pacer = FramePacer::from_fps(args.fps);
    let end = Duration::from_millis(args.length_ms);
    for now in pacer.frames(Duration::ZERO, end) {
        clock.set(now);

        let mut requests = Vec::new();
        while presses.next_if(|press| *press <= now).is_some() {
            requests.push(button.press());
        }

        let outcome = button.tick(now)?;
        requests.extend(outcome.requests);

        for request in &requests {
            for change in owner.apply(request) {
                if change.id == *button.id() {
                    button.set_active(change.active, now)?;
                }
            }
        }

        if outcome.changed || !requests.is_empty() || args.all_frames {
            let record = json!({
                "t_ms": now.as_secs_f64() * 1000.0,
                "requests": requests,
                "state": button.render_state(),
            });
            println!("{}", serde_json::to_string(&record)?);
        }
    }

    button.teardown();
    tracing::info!(calls = button.engine().log().calls().len(), "simulation finished");
    Ok(())
}

fn run_shapes(size: f32, stroke: f32) -> sound_button_core::Result<()> {
    let appearance = Appearance {
        size,
        progress_circle_width: stroke,
        ..Appearance::default()
    };
    let mut config = ButtonConfig::new(ClipIdentity::new("shapes", "none"));
    config.appearance = appearance;
    config.validate()?;

    let geometry = IconGeometry::from_appearance(&config.appearance);
    for shape in [IconShape::Play, IconShape::Stop] {
        let record = json!({
            "shape": shape,
            "points": geometry.points(shape).svg_points(),
        });
        println!("{}", serde_json::to_string(&record)?);
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless driver for the sound button core", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drive one button against the simulated engine and print render frames
    /// as JSON lines.
    Simulate(SimulateArgs),
    /// Print the play and stop polygons for a button geometry.
    Shapes {
        #[arg(long, default_value_t = 60.0)]
        size: f32,
        #[arg(long, default_value_t = 4.0)]
        stroke: f32,
    },
}

#[derive(clap::Args, Debug)]
struct SimulateArgs {
    /// JSON button configuration; overrides --url and --format.
    #[arg(short, long)]
    config: Option<PathBuf>,
    #[arg(long, default_value = "file:///demo/clip.mp3")]
    url: String,
    #[arg(long, default_value = "mp3")]
    format: String,
    #[arg(long, default_value = "demo")]
    id: String,
    /// Length of the simulated clip.
    #[arg(long, default_value_t = 3_000)]
    clip_ms: u64,
    /// Time the simulated engine takes to load the clip.
    #[arg(long, default_value_t = 120)]
    load_ms: u64,
    /// Times at which the button is pressed, comma separated.
    #[arg(long, value_delimiter = ',', default_value = "500")]
    press_at: Vec<u64>,
    #[arg(long, default_value_t = 60)]
    fps: u32,
    /// Total simulated time.
    #[arg(long, default_value_t = 4_000)]
    length_ms: u64,
    /// Print every frame, not only frames that changed something.
    #[arg(long)]
    all_frames: bool,
}
