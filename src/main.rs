use motion_tempo::config::Config;
use motion_tempo::console_display;
use motion_tempo::control_loop::ControlLoop;
use motion_tempo::data_logger;
use motion_tempo::engine::{AudioEngine, HeadlessEngine};
use motion_tempo::osc_engine::OscEngine;
use motion_tempo::simulator;
use motion_tempo::types::*;

use clap::{Parser, ValueEnum};
use crossbeam_channel::bounded;
use log::{error, info};
use std::path::PathBuf;
use std::thread;
use std::time::Duration;

#[derive(Clone, Copy, ValueEnum)]
enum EngineKind {
    /// Validate the resource and track parameters without sound
    Headless,
    /// Forward transport and parameters to an OSC synthesis host
    Osc,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    /// Rate plus cancelling pitch shift (resampling engines)
    Pitch,
    /// Rate only (engines that already preserve pitch)
    RateOnly,
}

#[derive(Parser)]
#[command(name = "motion-tempo")]
#[command(about = "Adapt music playback speed to physical motion")]
struct Cli {
    /// JSON config file; flags below override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Audio resource (WAV) to play
    #[arg(long)]
    audio: Option<String>,

    /// Speed at which the audio plays at natural pitch
    #[arg(long)]
    base_speed: Option<f64>,

    /// Pitch handling mode
    #[arg(long, value_enum)]
    mode: Option<ModeArg>,

    /// Control loop rate (Hz)
    #[arg(long)]
    tick_hz: Option<u32>,

    /// Give up on engine initialization after this many milliseconds
    #[arg(long)]
    load_timeout_ms: Option<u64>,

    /// Audio engine backend
    #[arg(long, value_enum, default_value = "headless")]
    engine: EngineKind,

    /// OSC host address (with --engine osc)
    #[arg(long, default_value = "127.0.0.1:57120")]
    osc_target: String,

    /// Simulator scenario: "tour" (default), "still", or "sprint"
    #[arg(long, default_value = "tour")]
    scenario: String,

    /// Simulated sensor rate (Hz)
    #[arg(long, default_value_t = 60)]
    sensor_rate: u32,

    /// Simulate the user denying motion access
    #[arg(long)]
    deny_motion: bool,

    /// Enable console display
    #[arg(long)]
    console: bool,

    /// Console display refresh rate (Hz)
    #[arg(long, default_value_t = 10)]
    display_hz: u32,

    /// Record ticks to a session directory
    #[arg(long)]
    log_data: bool,

    /// Output directory for recorded sessions
    #[arg(long, default_value = "./sessions")]
    output_dir: PathBuf,

    /// Stop after this many seconds (runs until Ctrl+C when omitted)
    #[arg(long)]
    duration_secs: Option<u64>,
}

fn build_config(cli: &Cli) -> Result<Config, String> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path).map_err(|e| e.to_string())?,
        None => Config::default(),
    };
    if let Some(audio) = &cli.audio {
        config.base_audio_resource = audio.clone();
    }
    if let Some(speed) = cli.base_speed {
        config.base_speed = speed;
    }
    if let Some(mode) = cli.mode {
        config.pitch_mode = match mode {
            ModeArg::Pitch => PitchMode::PitchCorrection,
            ModeArg::RateOnly => PitchMode::RateOnly,
        };
    }
    if let Some(hz) = cli.tick_hz {
        config.tick_hz = hz;
    }
    if let Some(ms) = cli.load_timeout_ms {
        config.load_timeout_ms = ms;
    }
    // The simulator always answers the permission prompt.
    config.require_motion_permission = true;
    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn main() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .format_timestamp_millis()
    .init();

    let cli = Cli::parse();
    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            std::process::exit(2);
        }
    };
    let clock = SessionClock::new();
    let pitch_shift = config.pitch_mode == PitchMode::PitchCorrection;

    info!("═══════════════════════════════════════════════");
    info!("  MOTION TEMPO v{}", env!("CARGO_PKG_VERSION"));
    info!("  Audio: {} (base speed {:.2})", config.base_audio_resource, config.base_speed);
    info!("  Mode: {:?}", config.pitch_mode);
    match cli.engine {
        EngineKind::Headless => info!("  Engine: headless"),
        EngineKind::Osc => info!("  Engine: OSC → {}", cli.osc_target),
    }
    if cli.console { info!("  UI: Console TUI"); }
    info!("═══════════════════════════════════════════════");

    // Channel: inputs → control loop
    let (input_tx, input_rx) = bounded::<InputEvent>(1024);

    // Channels: control loop → sinks
    let mut frame_txs: Vec<crossbeam_channel::Sender<TickFrame>> = Vec::new();
    let mut handles = Vec::new();

    // ─── Console display ────────────────────────────────────────────
    if cli.console {
        let (tx, rx) = bounded::<TickFrame>(256);
        frame_txs.push(tx);
        let hz = cli.display_hz;
        let tick_hz = config.tick_hz;
        handles.push(thread::Builder::new().name("display".into()).spawn(move || {
            console_display::ConsoleDisplay::new(rx, hz, tick_hz).run();
        }).expect("spawn display thread"));
    }

    // ─── Session logger ─────────────────────────────────────────────
    if cli.log_data {
        let (tx, rx) = bounded::<TickFrame>(4096);
        match data_logger::DataLogger::new(rx, &cli.output_dir, config.clone()) {
            Ok(logger) => {
                frame_txs.push(tx);
                handles.push(thread::Builder::new().name("logger".into()).spawn(move || {
                    logger.run();
                }).expect("spawn logger thread"));
            }
            Err(e) => error!("Session logging disabled: {}", e),
        }
    }

    // ─── Control loop ───────────────────────────────────────────────
    let engine: Box<dyn AudioEngine> = match cli.engine {
        EngineKind::Headless => Box::new(HeadlessEngine::new(pitch_shift)),
        EngineKind::Osc => Box::new(OscEngine::new(cli.osc_target.clone(), pitch_shift)),
    };
    let loop_clock = clock.clone();
    let loop_config = config.clone();
    let control = thread::Builder::new().name("control".into()).spawn(move || {
        ControlLoop::new(&loop_config, engine, input_rx, frame_txs, loop_clock).run();
    }).expect("spawn control thread");

    // ─── Input source ───────────────────────────────────────────────
    info!("Starting simulator...");
    let sim_tx = input_tx.clone();
    let rate = cli.sensor_rate;
    let scenario = cli.scenario.clone();
    let permission = if cli.deny_motion { PermissionState::Denied } else { PermissionState::Granted };
    handles.push(thread::Builder::new().name("simulator".into()).spawn(move || {
        simulator::Simulator::new(clock, sim_tx, rate, permission).run(&scenario);
    }).expect("spawn simulator thread"));

    match cli.duration_secs {
        Some(secs) => {
            thread::sleep(Duration::from_secs(secs));
            info!("Run time elapsed, shutting down");
            let _ = input_tx.send(InputEvent::Shutdown);
        }
        None => info!("Running. Press Ctrl+C to stop."),
    }
    drop(input_tx);

    let _ = control.join();
    for h in handles {
        let _ = h.join();
    }
}
