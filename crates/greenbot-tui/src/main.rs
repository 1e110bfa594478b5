use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use greenbot_core::{Config, ConfigCredentialStore, CredentialStore};

mod app;
mod handler;
mod tui;
mod ui;

use app::App;

#[derive(Parser, Debug)]
#[command(name = "greenbot")]
#[command(version, about = "GreenBot: chat and image generation in your terminal")]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable trace logging
    #[arg(short, long)]
    verbose: bool,

    /// Forget the stored API key and prompt for a new one
    #[arg(long)]
    reset_key: bool,

    /// Path to the config file
    #[arg(long, env = "GREENBOT_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args)?;

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => Config::default_path()?,
    };
    let config = Config::load_from(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;
    let mut store = ConfigCredentialStore::new(config_path.clone());
    if args.reset_key {
        store.clear()?;
        tracing::info!("stored API key cleared");
    }

    let mut app = App::new(config, Box::new(store))?;

    tui::install_panic_hook();
    let mut terminal = tui::init()?;
    let result = run(&mut terminal, &mut app).await;
    tui::restore()?;

    if let Err(e) = &result {
        tracing::error!(error = %e, "exiting with error");
    }
    result
}

async fn run(terminal: &mut tui::Tui, app: &mut App) -> Result<()> {
    let mut events = tui::EventHandler::new();

    loop {
        terminal.draw(|frame| ui::render(app, frame))?;

        // Wake on input or on a finished service call, whichever comes first
        let event = match app.changes.as_mut() {
            Some(changes) => {
                tokio::select! {
                    event = events.next() => event,
                    _ = changes.changed() => None,
                }
            }
            None => events.next().await,
        };

        if let Some(event) = event {
            handler::handle_event(app, event).await?;
        }
        app.poll_tasks().await;

        if app.should_quit {
            break;
        }
    }

    Ok(())
}

/// Log to a file; the terminal belongs to the UI
fn init_logging(args: &Args) -> Result<()> {
    let default_filter = if args.verbose {
        "trace"
    } else if args.debug {
        "debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let log_path = log_file_path()?;
    if let Some(parent) = log_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {}", log_path.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .init();

    if args.debug || args.verbose {
        tracing::info!("Debug logging enabled");
    }
    Ok(())
}

fn log_file_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not find data directory")?;
    Ok(log_path_in(&data_dir))
}

fn log_path_in(data_dir: &Path) -> PathBuf {
    data_dir.join("greenbot").join("greenbot.log")
}
