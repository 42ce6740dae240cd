//! Interactive TUI dashboard.
//!
//! Starts syncs from a small form and renders every tracked sync with live
//! progress. Quitting tears the tracker down so no poller outlives the view.

mod app;
mod input;
mod ui;

use std::io::{self, stdout};
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode},
};
use ratatui::{Terminal, backend::CrosstermBackend};
use tokio::sync::mpsc;

use crate::context::AppContext;
use app::{Action, TuiApp};

/// Run the dashboard until the operator quits.
pub async fn run(ctx: AppContext) -> Result<()> {
    // Setup terminal
    enable_raw_mode().context("Failed to enable raw mode")?;
    let mut stdout = stdout();
    execute!(stdout, EnterAlternateScreen).context("Failed to enter alternate screen")?;

    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("Failed to create terminal")?;

    let mut app = TuiApp::new(ctx);
    let result = run_app(&mut terminal, &mut app).await;

    // Restore terminal
    disable_raw_mode().context("Failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("Failed to leave alternate screen")?;
    terminal.show_cursor().context("Failed to show cursor")?;

    result
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut TuiApp,
) -> Result<()> {
    let mut events = spawn_event_reader();
    let mut updates = app.tracker().subscribe();

    // Redraw at least once a second so the poller count stays current.
    let mut redraw = tokio::time::interval(Duration::from_secs(1));

    while app.running {
        terminal.draw(|frame| ui::render(frame, app))?;

        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let Some(action) = input::handle_event(event, &app.view) else { continue };

                if action == Action::Submit {
                    app.starting = true;
                    terminal.draw(|frame| ui::render(frame, app))?;
                }
                app.handle_action(action).await;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                app.refresh(&snapshot);
            }
            _ = redraw.tick() => {}
        }
    }

    Ok(())
}

/// Read terminal events on a dedicated thread and forward them to the async
/// loop. crossterm's reader blocks, so it must stay off the runtime.
fn spawn_event_reader() -> mpsc::UnboundedReceiver<Event> {
    let (tx, rx) = mpsc::unbounded_channel();

    std::thread::spawn(move || {
        while let Ok(event) = event::read() {
            if tx.send(event).is_err() {
                break;
            }
        }
    });

    rx
}
