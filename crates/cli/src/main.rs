use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use annotation::timecode::format_millis;
use annotation::Extent;
use media_io::FfmpegOpener;
use playback::{PlayState, PlaybackConfig, PlaybackEngine, PlaybackEvent};
use review::seek::SeekControl;
use review::ReviewConfig;
use review_client::{HttpReviewClient, ReviewClient};

#[derive(Parser)]
#[command(name = "annotator-cli")]
#[command(about = "Survey video annotation tools - headless playback and review-set inspection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file (defaults to the per-user data directory)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a video with the playback engine and report its length
    Probe {
        /// Video file or file:// URI
        file: String,
    },

    /// Fetch a review set and list its observations
    ShowSet {
        /// Set id
        id: i64,

        #[arg(short, long, env = "ANNOTATOR_USER")]
        user: String,

        #[arg(short, long, env = "ANNOTATOR_PASSWORD", hide_env_values = true)]
        password: String,

        /// Seek bar width used to place tick marks
        #[arg(long, default_value = "1000")]
        width: i32,
    },

    /// Parse polygon text and print the pixel rectangle
    Extent {
        /// e.g. "POLYGON ((0.1 0.1, 0.3 0.1, 0.3 0.3, 0.1 0.3, 0.1 0.1))"
        text: String,

        #[arg(long)]
        width: u32,

        #[arg(long)]
        height: u32,
    },

    /// Play a video headless, printing playback events
    Play {
        file: String,

        /// Stop after this many wall-clock seconds
        #[arg(long, default_value = "5")]
        seconds: f64,

        /// Playback speed
        #[arg(long, default_value = "1.0")]
        speed: f64,

        /// Start position in ms
        #[arg(long, default_value = "0")]
        start: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = ReviewConfig::load(cli.config.as_deref()).context("loading config")?;

    match cli.command {
        Commands::Probe { file } => probe_command(&config, &file),
        Commands::ShowSet {
            id,
            user,
            password,
            width,
        } => show_set_command(&config, id, &user, &password, width),
        Commands::Extent {
            text,
            width,
            height,
        } => extent_command(&text, width, height),
        Commands::Play {
            file,
            seconds,
            speed,
            start,
        } => play_command(&config, &file, seconds, speed, start),
    }
}

fn probe_command(config: &ReviewConfig, file: &str) -> Result<()> {
    let mut engine = PlaybackEngine::new(PlaybackConfig {
        spawn_ticker: false,
        ..config.playback()
    });
    engine
        .load(file, &FfmpegOpener)
        .with_context(|| format!("opening {file}"))?;
    let props = engine
        .properties()
        .context("engine has no media after load")?;

    let report = serde_json::json!({
        "file": file,
        "width": props.width,
        "height": props.height,
        "frame_rate": props.frame_rate,
        "frame_count": props.frame_count,
        "length_ms": engine.get_length(),
        "length": format_millis(engine.get_length()),
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn show_set_command(
    config: &ReviewConfig,
    set_id: i64,
    user: &str,
    password: &str,
    width: i32,
) -> Result<()> {
    let client = HttpReviewClient::new(&config.server_url);
    let profile = client
        .login(user, password)
        .with_context(|| format!("logging in to {}", config.server_url))?;
    let set = client
        .set_detail(set_id)
        .with_context(|| format!("fetching set {set_id}"))?;

    let media = config.find_media(&set.video_file);
    match &media {
        Some(path) => info!("Media: {}", path.display()),
        None => warn!("Media {} not found under {}", set.video_file, config.media_dir.display()),
    }

    // Tick placement needs the video length.
    let mut seek = SeekControl::new(width, config.click_to_seek);
    if let Some(path) = &media {
        let mut engine = PlaybackEngine::new(PlaybackConfig {
            spawn_ticker: false,
            ..config.playback()
        });
        match engine.load(&path.to_string_lossy(), &FfmpegOpener) {
            Ok(()) => seek.set_length(engine.get_length()),
            Err(e) => warn!("Could not open media: {}", e),
        }
    }
    seek.set_markers(
        set.observations
            .iter()
            .filter_map(|o| o.initial_time().map(|t| (o.key, t)))
            .collect(),
    );

    println!(
        "Set {} \"{}\" ({}), progress {}{}",
        set.id,
        set.name,
        set.video_file,
        format_millis(set.progress),
        if set.done { ", done" } else { "" }
    );
    println!(
        "Signed in as {}{}",
        profile.username,
        if profile.is_lead { " (lead)" } else { "" }
    );
    for obs in &set.observations {
        let tick = seek.ticks().iter().find(|t| t.key == obs.key);
        println!(
            "  #{:<6} {:<28} {}  events={} tick_x={}{}",
            obs.id.map(|id| id.to_string()).unwrap_or_else(|| "-".into()),
            obs.label(),
            obs.initial_time().map(format_millis).unwrap_or_default(),
            obs.events().len(),
            tick.map(|t| t.x.to_string()).unwrap_or_else(|| "-".into()),
            obs.duration
                .map(|d| format!(" duration={}", format_millis(d)))
                .unwrap_or_default()
        );
    }
    Ok(())
}

fn extent_command(text: &str, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        bail!("width and height must be positive");
    }
    let extent = Extent::parse(text)?;
    let rect = extent.as_rect(height as f64, width as f64);
    println!("normalized: {}", extent.polygon_text());
    println!(
        "pixels: x={} y={} width={} height={}",
        rect.x, rect.y, rect.width, rect.height
    );
    Ok(())
}

fn play_command(
    config: &ReviewConfig,
    file: &str,
    seconds: f64,
    speed: f64,
    start: i64,
) -> Result<()> {
    let mut engine = PlaybackEngine::new(config.playback());
    let events = engine.events();
    engine
        .load(file, &FfmpegOpener)
        .with_context(|| format!("opening {file}"))?;
    if start > 0 {
        engine.set_position(start)?;
    }
    if speed == 1.0 {
        engine.play()?;
    } else {
        engine.set_speed(speed)?;
    }

    let deadline = Instant::now() + Duration::from_secs_f64(seconds.max(0.0));
    let idle = config.playback().tick_interval / 4;
    while Instant::now() < deadline {
        if !engine.poll() {
            thread::sleep(idle);
        }
        for event in events.try_iter() {
            match event {
                PlaybackEvent::PositionChanged(_) => {}
                other => info!(?other, position = %format_millis(engine.get_position()), "playback"),
            }
        }
        if engine.state() == PlayState::EndOfStream {
            break;
        }
    }
    engine.pause();
    println!(
        "stopped at {} of {} ({:?})",
        format_millis(engine.get_position()),
        format_millis(engine.get_length()),
        engine.state()
    );
    Ok(())
}
