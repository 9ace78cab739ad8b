//! Interactive chat event loop.
//!
//! Drives a [`StreamingSession`] from terminal input: Enter sends the input
//! box, and session events are drained between key polls so partial tokens
//! show up as they arrive. The terminal keeps redrawing and honours Ctrl+C
//! while a request is still being opened.

use std::error::Error;
use std::future::Future;
use std::io::{self, Stdout};
use std::ops::ControlFlow;
use std::time::Duration;

use ratatui::crossterm::{
    event::{self, DisableBracketedPaste, EnableBracketedPaste, Event, KeyEventKind},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::{debug, info};

use crate::core::session::StreamingSession;
use crate::ui::renderer::ui;
use crate::ui::view::{ChatView, KeyOutcome};

type ChatTerminal = Terminal<CrosstermBackend<Stdout>>;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

fn setup_terminal() -> Result<ChatTerminal, Box<dyn Error>> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableBracketedPaste)?;
    let terminal = Terminal::new(CrosstermBackend::new(stdout)).inspect_err(|_| {
        let _ = disable_raw_mode();
    })?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut ChatTerminal) -> Result<(), Box<dyn Error>> {
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableBracketedPaste
    )?;
    terminal.show_cursor()?;
    Ok(())
}

pub async fn run_chat(session: StreamingSession) -> Result<(), Box<dyn Error>> {
    let mut terminal = setup_terminal()?;
    let result = event_loop(&mut terminal, session).await;
    restore_terminal(&mut terminal)?;
    result
}

async fn event_loop(
    terminal: &mut ChatTerminal,
    mut session: StreamingSession,
) -> Result<(), Box<dyn Error>> {
    let mut view = ChatView::new(session.model());
    info!(model = %session.model(), "chat started");

    loop {
        while let Some(event) = session.try_recv() {
            view.apply_event(event);
        }

        terminal.draw(|f| ui(f, &mut view))?;

        if !event::poll(POLL_INTERVAL)? {
            view.tick();
            continue;
        }

        match event::read()? {
            Event::Key(key) if key.kind == KeyEventKind::Press => match view.handle_key(key) {
                KeyOutcome::Quit => break,
                KeyOutcome::Send(text) => {
                    view.begin_turn(&text);
                    let opened = await_with_ticks(session.send(text.as_str()), || {
                        poll_while_opening(terminal, &mut view)
                    })
                    .await?;
                    match opened {
                        // Quit before the server answered; the request is dropped
                        None => break,
                        Some(Err(err)) => view.fail_turn(&text, &err.to_string()),
                        Some(Ok(())) => {}
                    }
                }
                KeyOutcome::None => {}
            },
            Event::Paste(text) => view.insert_str(&text),
            _ => {}
        }
    }

    debug!(messages = session.conversation().len(), "chat ended");
    Ok(())
}

/// Awaits `fut`, calling `on_tick` every poll interval until it resolves.
/// Returns `None` if `on_tick` breaks first, dropping `fut`.
async fn await_with_ticks<F, T>(
    fut: F,
    mut on_tick: impl FnMut() -> Result<ControlFlow<()>, Box<dyn Error>>,
) -> Result<Option<T>, Box<dyn Error>>
where
    F: Future<Output = T>,
{
    tokio::pin!(fut);
    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    loop {
        tokio::select! {
            output = &mut fut => return Ok(Some(output)),
            _ = ticker.tick() => {
                if on_tick()?.is_break() {
                    return Ok(None);
                }
            }
        }
    }
}

/// Redraws and reads pending keys while `send` waits for the server. Only
/// scrolling and Ctrl+C do anything here since input is locked.
fn poll_while_opening(
    terminal: &mut ChatTerminal,
    view: &mut ChatView,
) -> Result<ControlFlow<()>, Box<dyn Error>> {
    view.tick();
    terminal.draw(|f| ui(f, view))?;
    while event::poll(Duration::ZERO)? {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press && view.handle_key(key) == KeyOutcome::Quit {
                return Ok(ControlFlow::Break(()));
            }
        }
    }
    Ok(ControlFlow::Continue(()))
}
