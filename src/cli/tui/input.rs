//! Input handling for the TUI.

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};

use super::app::{Action, View};

/// Convert a key event to an Action. The form view captures printable
/// characters as text input.
pub fn handle_key_event(key: KeyEvent, view: &View) -> Option<Action> {
    if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
        return Some(Action::Quit);
    }

    match view {
        View::Dashboard { .. } => match key.code {
            KeyCode::Char('q') => Some(Action::Quit),
            KeyCode::Up | KeyCode::Char('k') => Some(Action::Up),
            KeyCode::Down | KeyCode::Char('j') => Some(Action::Down),
            KeyCode::Char('n') | KeyCode::Char('s') => Some(Action::NewSync),
            KeyCode::Char('c') => Some(Action::CancelJob),
            KeyCode::Char('d') | KeyCode::Delete => Some(Action::DiscardJob),
            _ => None,
        },
        View::StartSync(_) => match key.code {
            KeyCode::Esc => Some(Action::Back),
            KeyCode::Enter => Some(Action::Submit),
            KeyCode::Tab | KeyCode::Down => Some(Action::NextField),
            KeyCode::BackTab | KeyCode::Up => Some(Action::PrevField),
            KeyCode::Left | KeyCode::Right => Some(Action::Toggle),
            KeyCode::Backspace => Some(Action::Backspace),
            KeyCode::Char(c) => Some(Action::Input(c)),
            _ => None,
        },
    }
}

/// Convert a crossterm Event to an Action.
pub fn handle_event(event: Event, view: &View) -> Option<Action> {
    match event {
        Event::Key(key) if key.kind == KeyEventKind::Press => handle_key_event(key, view),
        _ => None,
    }
}
