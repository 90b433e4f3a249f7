use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use clap::{Parser, Subcommand};
use ledsuit_core::{
    codec, config::ensure_config_files, AppConfig, AudioClip, AudioPlayer, ConfigPaths,
    DistributionClient, EditorSession, ImportMode, ScrollAction, SpectrogramEngine, SuitPart,
    WallClockDriver,
};
use tracing_subscriber::EnvFilter;

fn main() -> ledsuit_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let paths = ConfigPaths::new(cli.config_dir);

    match cli.command {
        Commands::InitConfig => run_init_config(&paths),
        Commands::Spectrogram {
            input,
            output,
            frames,
            bins,
            downmix,
        } => run_spectrogram(&paths, &input, output.as_deref(), frames, bins, downmix),
        Commands::Encode { waypoints, out_dir } => run_encode(&paths, &waypoints, &out_dir),
        Commands::Inspect { input } => run_inspect(&input),
        Commands::Send { waypoints } => run_send(&paths, &waypoints),
        Commands::Sync => run_sync(&paths),
        Commands::Follow {
            input,
            waypoints,
            width,
            downmix,
            headless,
        } => run_follow(&paths, &input, &waypoints, width, downmix, headless),
    }
}

fn run_init_config(paths: &ConfigPaths) -> ledsuit_core::Result<()> {
    ensure_config_files(paths)?;
    tracing::info!(dir = %paths.dir().display(), "configuration ready");
    Ok(())
}

fn run_spectrogram(
    paths: &ConfigPaths,
    input: &Path,
    output: Option<&Path>,
    frames: usize,
    bins: usize,
    downmix: bool,
) -> ledsuit_core::Result<()> {
    let config = AppConfig::load(&paths.app_config());
    let clip = load_clip(input, downmix)?;
    let spectrogram = SpectrogramEngine::new().compute(&clip, &config.spectrogram)?;

    println!(
        "{} frames x {} bins, {:.3}s at {} Hz",
        spectrogram.frames(),
        spectrogram.bins(),
        spectrogram.duration_seconds(),
        spectrogram.sample_rate()
    );

    if let Some(output) = output {
        let grid = spectrogram.downsample(frames.min(spectrogram.frames()), bins);
        fs::write(output, serde_json::to_vec(&grid)?)?;
        tracing::info!(?output, frames = grid.frames, bins = grid.bins, "wrote display grid");
    }
    Ok(())
}

fn load_clip(input: &Path, downmix: bool) -> ledsuit_core::Result<AudioClip> {
    let clip = AudioClip::load_wav(input)?;
    if downmix && clip.channels() > 1 {
        tracing::debug!(channels = clip.channels(), "downmixing to mono");
        return Ok(clip.to_mono());
    }
    Ok(clip)
}

fn run_encode(paths: &ConfigPaths, waypoints: &Path, out_dir: &Path) -> ledsuit_core::Result<()> {
    let mut session = EditorSession::open(paths, 0.0)?;
    session.import_waypoints(waypoints, ImportMode::Overwrite)?;
    let streams = session.export()?;

    fs::create_dir_all(out_dir)?;
    for (suit, stream) in streams.iter().enumerate() {
        let path = out_dir.join(format!("suit-{}.bin", suit + 1));
        fs::write(&path, stream)?;
        println!("{}: {} bytes", path.display(), stream.len());
    }
    Ok(())
}

fn run_inspect(input: &Path) -> ledsuit_core::Result<()> {
    let bytes = fs::read(input)?;
    for record in codec::decode_stream(&bytes)? {
        let lit: Vec<&str> = SuitPart::ALL
            .iter()
            .filter(|part| record.is_lit(**part))
            .map(|part| part.key())
            .collect();
        println!(
            "{:>10.3}s  0x{:02X}  {}",
            record.time_seconds(),
            record.mask,
            lit.join(" ")
        );
    }
    Ok(())
}

fn run_send(paths: &ConfigPaths, waypoints: &Path) -> ledsuit_core::Result<()> {
    let mut session = EditorSession::open(paths, 0.0)?;
    session.import_waypoints(waypoints, ImportMode::Overwrite)?;

    let client = DistributionClient::from_config(&session.config().network);
    let report = session.send(&client)?;
    for delivery in &report.deliveries {
        println!(
            "suit {} ({}): {} bytes",
            delivery.suit + 1,
            delivery.endpoint,
            delivery.bytes
        );
    }
    Ok(())
}

fn run_sync(paths: &ConfigPaths) -> ledsuit_core::Result<()> {
    let config = AppConfig::load(&paths.app_config());
    let client = DistributionClient::from_config(&config.network);
    client.synchronize()?;
    println!("start signal sent to {}", client.sync_target());
    Ok(())
}

fn run_follow(
    paths: &ConfigPaths,
    input: &Path,
    waypoints: &Path,
    width: f32,
    downmix: bool,
    headless: bool,
) -> ledsuit_core::Result<()> {
    let mut session = EditorSession::open(paths, width)?;
    let clip = load_clip(input, downmix)?;
    session.load_audio(&clip)?;
    session.import_waypoints(waypoints, ImportMode::Overwrite)?;

    let clock = session.clock().clone();
    let playback = if headless {
        Playback::Headless(WallClockDriver::spawn(clock.clone(), Duration::from_millis(1)))
    } else {
        Playback::Device(AudioPlayer::start(&clip, clock.clone())?)
    };
    clock.play();

    session.run_follow_loop(|output| {
        match output.scroll {
            ScrollAction::Stay => {}
            action => println!("{:>8.3}s  scroll {action:?}", output.position),
        }
        if let Some(states) = &output.states {
            let masks: Vec<String> = states
                .iter()
                .map(|state| format!("{:02X}", codec::compress_suit_state(state)))
                .collect();
            println!("{:>8.3}s  suits {}", output.position, masks.join(" "));
        }
    });

    match playback {
        Playback::Device(player) => drop(player),
        Playback::Headless(driver) => driver.stop()?,
    }
    tracing::info!(waypoints = session.timeline().len(), "follow run finished");
    Ok(())
}

/// Whatever advances the clock during `follow`.
enum Playback {
    Device(AudioPlayer),
    Headless(WallClockDriver),
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "LED suit show editor tools", long_about = None)]
struct Cli {
    /// Directory holding appconfig.json, suits.json and presets.json.
    #[arg(long, global = true, default_value = "config")]
    config_dir: PathBuf,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write default configuration files where they are missing.
    InitConfig,
    /// Analyse a WAV file and report the spectrogram shape.
    Spectrogram {
        /// Path to the WAV file that should be analysed.
        input: PathBuf,
        /// Write a downsampled display grid as JSON.
        #[arg(short, long)]
        output: Option<PathBuf>,
        #[arg(long, default_value_t = 800)]
        frames: usize,
        #[arg(long, default_value_t = 128)]
        bins: usize,
        /// Average multi-channel files down to mono before analysis.
        #[arg(long)]
        downmix: bool,
    },
    /// Encode a waypoint export into one binary stream per suit.
    Encode {
        waypoints: PathBuf,
        out_dir: PathBuf,
    },
    /// Decode a suit stream and print its records.
    Inspect { input: PathBuf },
    /// Encode a waypoint export and send it to every configured suit.
    Send { waypoints: PathBuf },
    /// Broadcast the start signal.
    Sync,
    /// Play a WAV file against a waypoint export and print what the suits
    /// would receive.
    Follow {
        input: PathBuf,
        waypoints: PathBuf,
        /// Width of the simulated spectrogram view in pixels.
        #[arg(long, default_value_t = 1200.0)]
        width: f32,
        /// Average multi-channel files down to mono before analysis.
        #[arg(long)]
        downmix: bool,
        /// Advance playback on a wall-clock thread instead of the audio device.
        #[arg(long)]
        headless: bool,
    },
}
