use std::{
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

use auralux_core::{
    AppConfig, AuraluxError, Hosts, Theme, ThemeStore, VisualMode, Visualizer,
};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

fn main() -> auralux_core::Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let store = theme_store();

    match cli.command {
        Commands::Export { ref file } => run_export(&cli.options, store.load(), file),
        Commands::Screenshot { ref file, at } => {
            run_screenshot(&cli.options, store.load(), file, at)
        }
        Commands::Live { seconds, record } => {
            run_live(&cli.options, store.load(), seconds, record)
        }
        Commands::Theme { choice } => run_theme(&store, choice),
    }
}

fn run_export(options: &Options, theme: Theme, file: &Path) -> auralux_core::Result<()> {
    let mut session = Session::new(options, theme)?;
    session.load(file)?;
    tracing::info!(file = %file.display(), "exporting full track");

    session.viz.export_full_track()?;
    while session.viz.is_recording() || session.viz.capture().is_finalizing() {
        session.step()?;
    }
    Ok(())
}

fn run_screenshot(
    options: &Options,
    theme: Theme,
    file: &Path,
    at: f64,
) -> auralux_core::Result<()> {
    let mut session = Session::new(options, theme)?;
    session.load(file)?;

    // Let the analyser settle before the requested position.
    session.viz.seek((at - 0.5).max(0.0));
    session.viz.play()?;
    while session.viz.state().is_playing && session.viz.state().current_time < at {
        session.step()?;
    }
    session.viz.pause();

    let path = session.viz.screenshot()?;
    println!("{}", path.display());
    Ok(())
}

fn run_live(
    options: &Options,
    theme: Theme,
    seconds: f64,
    record: bool,
) -> auralux_core::Result<()> {
    let mut session = Session::new(options, theme)?;
    session.realtime = true;
    session.viz.use_live_input()?;
    if record {
        session.viz.start_recording()?;
    }

    tracing::info!(seconds, record, "visualising microphone input");
    let started = Instant::now();
    while started.elapsed().as_secs_f64() < seconds {
        session.step()?;
    }

    session.viz.stop();
    while session.viz.capture().is_finalizing() {
        session.step()?;
    }
    Ok(())
}

fn run_theme(store: &ThemeStore, choice: Option<ThemeChoice>) -> auralux_core::Result<()> {
    let theme = match choice {
        None => store.load(),
        Some(ThemeChoice::Toggle) => store.toggle()?,
        Some(ThemeChoice::Dark) => {
            store.store(Theme::Dark)?;
            Theme::Dark
        }
        Some(ThemeChoice::Light) => {
            store.store(Theme::Light)?;
            Theme::Light
        }
    };
    println!("{}", theme.as_str());
    Ok(())
}

/// A visualiser plus the cooperative loop that drives it.
struct Session {
    viz: Visualizer,
    frame: f64,
    realtime: bool,
}

impl Session {
    fn new(options: &Options, theme: Theme) -> auralux_core::Result<Self> {
        let config = options.config()?;
        let frame = 1.0 / config.capture.fps as f64;
        let hosts = Hosts::native(&config, options.monitor);
        let viz = Visualizer::new(config, theme, hosts)?;
        Ok(Self {
            viz,
            frame,
            realtime: options.realtime,
        })
    }

    /// Starts decoding `file` and ticks until it is bound.
    fn load(&mut self, file: &Path) -> auralux_core::Result<()> {
        self.viz.load_file(file);
        while self.viz.is_loading() {
            self.viz.tick(0.0);
            thread::sleep(POLL_INTERVAL);
        }
        if let Some(err) = self.viz.take_notices().into_iter().next() {
            return Err(err);
        }
        if self.viz.state().source.is_none() {
            return Err(AuraluxError::NoSource);
        }
        Ok(())
    }

    fn step(&mut self) -> auralux_core::Result<()> {
        let started = Instant::now();
        let report = self.viz.tick(self.frame);
        for path in &report.artifacts {
            println!("{}", path.display());
        }
        for notice in self.viz.take_notices() {
            tracing::warn!(%notice, "recovered failure");
        }

        let idle = !self.viz.state().is_playing && !self.viz.is_recording();
        if self.realtime || idle {
            let budget = if idle {
                POLL_INTERVAL
            } else {
                Duration::from_secs_f64(self.frame)
            };
            if let Some(rest) = budget.checked_sub(started.elapsed()) {
                thread::sleep(rest);
            }
        }
        Ok(())
    }
}

fn theme_store() -> ThemeStore {
    let dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("auralux");
    ThemeStore::new(dir.join("preferences.json"))
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();
}

#[derive(Parser, Debug)]
#[command(author, version, about = "Real-time audio visualiser and recorder", long_about = None)]
struct Cli {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Options {
    /// JSON configuration file; flags below override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Visualisation mode: bars, ring or particles.
    #[arg(long, global = true)]
    mode: Option<VisualMode>,
    /// Sensitivity multiplier (0-2).
    #[arg(long, global = true)]
    sensitivity: Option<f32>,
    /// Output volume (0-2).
    #[arg(long, global = true)]
    volume: Option<f32>,
    /// Analysis FFT size, a power of two.
    #[arg(long, global = true)]
    fft_size: Option<usize>,
    #[arg(long, global = true)]
    width: Option<f32>,
    #[arg(long, global = true)]
    height: Option<f32>,
    /// Device pixel ratio, capped at 2.
    #[arg(long, global = true)]
    dpr: Option<f32>,
    /// Directory recordings and screenshots are saved to.
    #[arg(long, global = true)]
    out_dir: Option<String>,
    /// Pace the loop to wall-clock time instead of running as fast as possible.
    #[arg(long, global = true)]
    realtime: bool,
    /// Play audio through the default output device.
    #[arg(long, global = true)]
    monitor: bool,
}

impl Options {
    fn config(&self) -> auralux_core::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::load(path)?,
            None => AppConfig::default(),
        };
        if let Some(mode) = self.mode {
            config.visual.mode = mode;
        }
        if let Some(sensitivity) = self.sensitivity {
            config.visual.sensitivity = sensitivity.clamp(0.0, 2.0);
        }
        if let Some(volume) = self.volume {
            config.audio.volume = volume.clamp(0.0, 2.0);
        }
        if let Some(fft_size) = self.fft_size {
            config.audio.fft_size = fft_size;
        }
        if let Some(width) = self.width {
            config.visual.width = width;
        }
        if let Some(height) = self.height {
            config.visual.height = height;
        }
        if let Some(dpr) = self.dpr {
            config.visual.device_pixel_ratio = dpr;
        }
        if let Some(dir) = &self.out_dir {
            config.capture.output_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Record a file from start to end into a video.
    Export {
        /// Audio file to play and record.
        file: PathBuf,
    },
    /// Render a file at a position and save the frame as PNG.
    Screenshot {
        file: PathBuf,
        /// Playback position in seconds.
        #[arg(long, default_value_t = 0.0)]
        at: f64,
    },
    /// Visualise the default microphone.
    Live {
        /// How long to run.
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        /// Record the session.
        #[arg(long)]
        record: bool,
    },
    /// Show or change the persisted theme.
    Theme {
        #[arg(value_enum)]
        choice: Option<ThemeChoice>,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ThemeChoice {
    Dark,
    Light,
    Toggle,
}
