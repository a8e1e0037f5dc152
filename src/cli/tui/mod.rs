//! Interactive TUI for tracewatch.
//!
//! Renders the merged view of one job: the snapshot's status badge, the
//! connection indicator, and the newest-first activity timeline.

mod app;
mod input;
mod ui;

use std::io::{self, stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event, execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};

use crate::core::JobWatcher;
use app::WatchApp;

/// How long to wait for input before checking for a new view.
const INPUT_POLL: Duration = Duration::from_millis(100);

/// Run the TUI for `job_id` until the operator quits.
///
/// The watcher's view is always released before returning.
pub async fn run(watcher: &mut JobWatcher, job_id: &str) -> Result<()> {
    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let result = run_app(&mut terminal, watcher, job_id).await;
    watcher.stop().await;

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    watcher: &mut JobWatcher,
    job_id: &str,
) -> Result<()> {
    let mut views = watcher.watch(job_id).await;
    let mut app = WatchApp::new(views.borrow_and_update().clone());

    loop {
        terminal.draw(|frame| ui::render(frame, &app))?;

        if event::poll(INPUT_POLL)? {
            let event = event::read()?;
            if let Some(action) = input::handle_event(event) {
                app.handle_action(action, watcher);
            }
        }

        if views.has_changed().unwrap_or(false) {
            app.update_view(views.borrow_and_update().clone());
        }

        if !app.running {
            break;
        }

        // Let the view's tasks run between frames.
        tokio::task::yield_now().await;
    }

    Ok(())
}
