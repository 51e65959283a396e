use visumusic::config::TranscriptConfig;
use visumusic::console_display;
use visumusic::coordinator::Coordinator;
use visumusic::pitch::EqualTemperament;
use visumusic::render::DisplayFanout;
use visumusic::replay::{Replay, SampleReader};
use visumusic::simulator;
use visumusic::types::*;
use visumusic::ws_server;

use clap::Parser;
use crossbeam_channel::bounded;
use log::{error, info};
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process;
use std::thread;

#[derive(Parser)]
#[command(name = "visumusic")]
#[command(about = "Live frequency-to-ABC notation transcriber")]
struct Cli {
    /// JSON config file (all fields optional)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulator demo melody: "scale", "arpeggio", "ode" or "sweep"
    #[arg(long, default_value = "scale")]
    demo: String,

    /// Replay a recorded JSONL frequency log instead of the simulator
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Simulator analyser rate (Hz)
    #[arg(long, default_value_t = 20)]
    sample_rate: u32,

    /// Note lines kept on screen
    #[arg(long)]
    max_lines: Option<usize>,

    /// Highest allowed number of ' octave marks
    #[arg(long)]
    octave_high: Option<u32>,

    /// Highest allowed number of , octave marks
    #[arg(long)]
    octave_low: Option<u32>,

    /// Live readout period (ms)
    #[arg(long)]
    fast_ms: Option<u64>,

    /// Transcript append period (ms)
    #[arg(long)]
    slow_ms: Option<u64>,

    /// Notation render scale
    #[arg(long)]
    scale: Option<f32>,

    /// Notation staff width (px)
    #[arg(long)]
    line_width: Option<u32>,

    /// Enable the terminal display (default when --ws is not given)
    #[arg(long)]
    console: bool,

    /// Console refresh rate (Hz)
    #[arg(long, default_value_t = 20)]
    display_hz: u32,

    /// Enable the HTTP + WebSocket server for the browser renderer
    #[arg(long)]
    ws: bool,

    /// WebSocket server bind address
    #[arg(long, default_value = "127.0.0.1:8080")]
    ws_addr: String,

    /// Readout broadcast rate (Hz)
    #[arg(long, default_value_t = 20)]
    ws_fps: u32,

    /// Notation page served at /
    #[arg(long, default_value = "www/index.html")]
    page: PathBuf,

    /// Suppress auto-opening the browser when --ws is active
    #[arg(long)]
    no_open: bool,
}

impl Cli {
    fn apply(&self, config: &mut TranscriptConfig) {
        if let Some(n) = self.max_lines {
            config.max_lines = n;
        }
        if let Some(n) = self.octave_high {
            config.max_octave_marks_high = n;
        }
        if let Some(n) = self.octave_low {
            config.max_octave_marks_low = n;
        }
        if let Some(ms) = self.fast_ms {
            config.fast_tick_ms = ms;
        }
        if let Some(ms) = self.slow_ms {
            config.slow_tick_ms = ms;
        }
        if let Some(s) = self.scale {
            config.render.scale = s;
        }
        if let Some(w) = self.line_width {
            config.render.line_width = w;
        }
    }
}

fn load_config(cli: &Cli) -> TranscriptConfig {
    let mut config = match &cli.config {
        Some(path) => TranscriptConfig::load(path).unwrap_or_else(|e| {
            error!("{}", e);
            process::exit(1);
        }),
        None => TranscriptConfig::default(),
    };
    cli.apply(&mut config);
    if let Err(e) = config.validate() {
        error!("{}", e);
        process::exit(1);
    }
    config
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli);
    let clock = SessionClock::new();
    let console_enabled = cli.console || !cli.ws;

    info!("═══════════════════════════════════════════════");
    info!("  VISUMUSIC v{}", env!("CARGO_PKG_VERSION"));
    match &cli.replay {
        Some(path) => info!("  Source: replay {}", path.display()),
        None => info!("  Source: simulator ({})", cli.demo),
    }
    info!("  Ticks: {} ms readout / {} ms transcript", config.fast_tick_ms, config.slow_tick_ms);
    info!("  Window: {} note lines", config.max_lines);
    if console_enabled { info!("  UI: Console"); }
    if cli.ws { info!("  UI: Browser on http://{}", cli.ws_addr); }
    info!("═══════════════════════════════════════════════");

    // Channel: source → coordinator
    let (sample_tx, sample_rx) = bounded::<FrequencySample>(1024);

    // Channels: coordinator → displays
    let mut display_txs = Vec::new();
    let mut handles = Vec::new();

    // ─── Console display ────────────────────────────────────────────
    if console_enabled {
        let (tx, rx) = bounded::<DisplayEvent>(256);
        display_txs.push(tx);
        let hz = cli.display_hz;
        handles.push(spawn("display", move || {
            console_display::ConsoleDisplay::new(rx, hz).run();
        }));
    }

    // ─── Browser renderer ───────────────────────────────────────────
    if cli.ws {
        let (tx, rx) = bounded::<DisplayEvent>(256);
        display_txs.push(tx);
        let addr = cli.ws_addr.clone();
        let fps = cli.ws_fps;
        let page = cli.page.clone();
        handles.push(spawn("ws-server", move || {
            ws_server::WsServer::new(rx, addr, fps, page).run();
        }));

        if !cli.no_open {
            let url = format!("http://{}", cli.ws_addr.replace("0.0.0.0", "localhost"));
            handles.push(spawn("browser-open", move || {
                thread::sleep(std::time::Duration::from_millis(800));
                #[cfg(target_os = "macos")]
                let _ = std::process::Command::new("open").arg(&url).spawn();
                #[cfg(target_os = "linux")]
                let _ = std::process::Command::new("xdg-open").arg(&url).spawn();
                info!("Browser opened at {}", url);
            }));
        }
    }

    // ─── Coordinator ────────────────────────────────────────────────
    let mut coord = match Coordinator::new(
        sample_rx,
        DisplayFanout::new(display_txs),
        EqualTemperament::default(),
        config.clone(),
    ) {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid transcript config: {}", e);
            process::exit(1);
        }
    };
    handles.push(spawn("coordinator", move || {
        coord.run();
    }));

    // ─── Frequency source ───────────────────────────────────────────
    match &cli.replay {
        Some(path) => {
            let samples = match File::open(path)
                .map_err(|e| e.to_string())
                .and_then(|f| SampleReader::open(BufReader::new(f)))
            {
                Ok(reader) => reader.read_all(),
                Err(e) => {
                    error!("Cannot replay {}: {}", path.display(), e);
                    process::exit(1);
                }
            };
            let replay_clock = clock.clone();
            handles.push(spawn("replay", move || {
                Replay::new(samples, replay_clock, sample_tx).run();
            }));
        }
        None => {
            info!("Starting simulator...");
            let sim_clock = clock.clone();
            let demo = cli.demo.clone();
            let rate = cli.sample_rate;
            let beat_ms = config.slow_tick_ms;
            handles.push(spawn("simulator", move || {
                simulator::Simulator::new(sim_clock, sample_tx, rate, beat_ms).run(&demo);
            }));
        }
    }

    for h in handles {
        let _ = h.join();
    }
}

fn spawn<F>(name: &str, f: F) -> thread::JoinHandle<()>
where
    F: FnOnce() + Send + 'static,
{
    thread::Builder::new()
        .name(name.into())
        .spawn(f)
        .unwrap_or_else(|e| {
            error!("Failed to spawn {} thread: {}", name, e);
            process::exit(1);
        })
}
