use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use crossterm::terminal;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use tracing::info;
use tracing_subscriber::EnvFilter;

use rowsynth::audio;
use rowsynth::config::{EngineConfig, load_config};
use rowsynth::middle::Middle;
use rowsynth::pipeline::track::ProjectState;
use rowsynth::pipeline::{Pipeline, bounce, persistence};
use rowsynth::shared::{LOG_FILE, MAX_BPM, MIN_BPM, PROJECT_DIR};
use rowsynth::tui;

#[derive(Parser)]
#[command(name = "rowsynth")]
#[command(about = "Live-editable multi-track step sequencer", long_about = None)]
struct Cli {
    /// Project directory; state is kept in <dir>/.rowsynth/
    project_dir: Option<PathBuf>,

    /// Start at this tempo instead of the saved one
    #[arg(short, long)]
    bpm: Option<f32>,

    /// Render the project to a WAV file instead of opening the terminal UI
    #[arg(short, long)]
    render: Option<PathBuf>,

    /// Grid ticks (eighth notes) to render with --render
    #[arg(short, long, default_value = "64")]
    ticks: u64,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let project_dir = match cli.project_dir {
        Some(dir) => dir,
        None => std::env::current_dir().context("no current directory")?,
    };
    init_logging(&project_dir)?;

    let config = load_config(&project_dir);
    let mut state = persistence::load_project(&project_dir).unwrap_or_default();
    if let Some(bpm) = cli.bpm {
        state.bpm = bpm.clamp(MIN_BPM, MAX_BPM);
    }
    info!("{} tracks at {} bpm from {}", state.tracks.len(), state.bpm, project_dir.display());

    if let Some(path) = cli.render {
        return bounce::bounce(&state, cli.ticks, &config, &path);
    }
    run_tui(project_dir, state, &config)
}

// the terminal belongs to the UI, so logs go to a file
fn init_logging(project_dir: &std::path::Path) -> anyhow::Result<()> {
    let dir = project_dir.join(PROJECT_DIR);
    std::fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let file = std::fs::File::create(dir.join(LOG_FILE)).context("opening log file")?;
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::sync::Mutex::new(file))
        .init();
    Ok(())
}

fn run_tui(project_dir: PathBuf, state: ProjectState, config: &EngineConfig) -> anyhow::Result<()> {
    let output = audio::start_audio(config)?;
    let pipeline = Pipeline::new(output.sink().clone(), config, state.bpm);
    let mut middle = Middle::new(state, pipeline, Duration::from_millis(config.poll_interval_ms.max(1)));

    terminal::enable_raw_mode()?;
    // Enable keyboard enhancement for real press/release detection.
    // Falls back gracefully if the terminal doesn't support it.
    let _ = crossterm::execute!(
        std::io::stdout(),
        crossterm::event::PushKeyboardEnhancementFlags(crossterm::event::KeyboardEnhancementFlags::REPORT_EVENT_TYPES)
    );
    let _guard = RawModeGuard; // auto drops when out of scope

    let backend = CrosstermBackend::new(std::io::stdout());
    let mut term = Terminal::new(backend)?;
    term.clear()?;

    let frame_time = Duration::from_millis(16); // ~60fps
    let mut tui_state = tui::mode::TuiState::default();

    loop {
        let ds = middle.display_state();
        tui_state.mode = ds.mode;

        term.draw(|frame| {
            tui::view::render(frame, frame.area(), &ds);
        })?;

        for event in tui::input::poll_input(frame_time, &mut tui_state)? {
            if middle.handle_input(event) {
                // save before quitting
                persistence::save_project(&project_dir, &middle.state)?;
                info!("saved, quitting");
                return Ok(());
            }
        }
    }
}

struct RawModeGuard;
impl Drop for RawModeGuard {
    fn drop(&mut self) {
        let _ = crossterm::execute!(std::io::stdout(), crossterm::event::PopKeyboardEnhancementFlags);
        let _ = terminal::disable_raw_mode();
    }
}
