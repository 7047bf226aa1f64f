use std::io;
use std::time::Duration;

use crossterm::event::KeyEventKind;
use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::prelude::*;

mod animation;
mod app;
mod config;
mod db;
mod error;
mod library;
mod models;
mod pointer;
mod remote;
mod tui;
mod viewer;

use app::App;
use config::Config;
use error::Result;
use tui::{draw, handle_key_event};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging (only show warnings and errors by default)
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    // Parse command line arguments
    let args: Vec<String> = std::env::args().collect();
    let scan_only = args.len() >= 2 && args[1] == "--scan";

    // Load configuration
    let config = Config::load()?;

    // Initialize app
    let mut app = App::new(config).await?;

    // If --scan, import the mirrored folders and exit
    if scan_only {
        let summaries = app.import_library().await?;
        if summaries.is_empty() {
            println!(
                "No platform folders configured in {}",
                Config::config_path().display()
            );
        }
        for (platform, summary) in summaries {
            println!(
                "{}: {} artists, {} posts imported ({} failed)",
                platform.label(),
                summary.artists,
                summary.posts,
                summary.failed
            );
        }
        return Ok(());
    }

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    // Run the app
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture
    )?;
    terminal.show_cursor()?;

    if let Err(e) = result {
        eprintln!("Error: {}", e);
    }

    Ok(())
}

async fn run_app<B: Backend>(terminal: &mut Terminal<B>, app: &mut App) -> Result<()> {
    loop {
        terminal.draw(|frame| draw(frame, app))?;

        // Apply decodes, playback and viewed updates from the open viewer
        app.poll_viewer().await;

        // Poll for completed comments/tags fetches
        app.poll_details_result();

        // Poll for events with timeout to allow async operations
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    if let Some(action) = handle_key_event(key, app.screen, app.show_help) {
                        let should_quit = app.handle_action(action).await?;
                        if should_quit {
                            return Ok(());
                        }
                    }
                }
            }
        }
    }
}
