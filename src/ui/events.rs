use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEvent {
    Quit,

    // Playback
    TogglePlayPause,
    Stop,
    NextTrack,
    PreviousTrack,
    ToggleShuffle,
    ToggleRepeat,
    VolumeUp,
    VolumeDown,

    // Navigation
    Up,
    Down,
    Enter,
    SwitchFocus,

    // Library
    ScanAll,
    AddDirectory,
    RemoveDirectory,
    ToggleLike,
}

/// Reads the terminal on a blocking worker and forwards key presses.
/// The worker ends on its own once the handler is dropped.
pub struct EventHandler {
    receiver: mpsc::UnboundedReceiver<KeyEvent>,
}

impl EventHandler {
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();

        tokio::task::spawn_blocking(move || loop {
            if sender.is_closed() {
                break;
            }
            match event::poll(Duration::from_millis(50)) {
                Ok(true) => match event::read() {
                    Ok(Event::Key(key)) if key.kind == KeyEventKind::Press => {
                        if sender.send(key).is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(e) => {
                        debug!("Terminal read failed: {}", e);
                        break;
                    }
                },
                Ok(false) => {}
                Err(e) => {
                    debug!("Terminal poll failed: {}", e);
                    break;
                }
            }
        });

        Self { receiver }
    }

    pub async fn next(&mut self) -> Option<KeyEvent> {
        self.receiver.recv().await
    }
}

pub fn key_to_app_event(key: KeyEvent) -> Option<AppEvent> {
    if key.modifiers.contains(KeyModifiers::CONTROL) && key.code == KeyCode::Char('c') {
        return Some(AppEvent::Quit);
    }

    match key.code {
        KeyCode::Char('q') | KeyCode::Esc => Some(AppEvent::Quit),

        KeyCode::Char(' ') => Some(AppEvent::TogglePlayPause),
        KeyCode::Char('x') => Some(AppEvent::Stop),
        KeyCode::Char('n') | KeyCode::Right => Some(AppEvent::NextTrack),
        KeyCode::Char('p') | KeyCode::Left => Some(AppEvent::PreviousTrack),
        KeyCode::Char('z') => Some(AppEvent::ToggleShuffle),
        KeyCode::Char('r') => Some(AppEvent::ToggleRepeat),
        KeyCode::Char('+') | KeyCode::Char('=') => Some(AppEvent::VolumeUp),
        KeyCode::Char('-') => Some(AppEvent::VolumeDown),

        KeyCode::Up | KeyCode::Char('k') => Some(AppEvent::Up),
        KeyCode::Down | KeyCode::Char('j') => Some(AppEvent::Down),
        KeyCode::Enter => Some(AppEvent::Enter),
        KeyCode::Tab => Some(AppEvent::SwitchFocus),

        KeyCode::Char('s') => Some(AppEvent::ScanAll),
        KeyCode::Char('a') => Some(AppEvent::AddDirectory),
        KeyCode::Char('d') => Some(AppEvent::RemoveDirectory),
        KeyCode::Char('l') => Some(AppEvent::ToggleLike),

        _ => None,
    }
}
