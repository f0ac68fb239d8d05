use super::events::key_to_app_event;
use super::{AppEvent, EventHandler, TerminalManager};
use crate::audio::AudioEngine;
use crate::config::MonitorConfig;
use crate::controller::{Command, Controller, LibraryListing, Outcome};
use crate::error::VaultError;
use crate::library::ScanOutcome;
use crate::playback::{EndOfTrackMonitor, MonitorEvent, PlaybackState, SessionSnapshot};
use anyhow::Result;
use crossterm::event::{KeyCode, KeyEvent};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Gauge, List, ListItem, ListState, Paragraph},
    Frame,
};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{info, warn};

const TICK: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Focus {
    Directories,
    Tracks,
}

pub struct App<E: AudioEngine> {
    controller: Controller<E>,
    terminal: TerminalManager,
    monitor_config: MonitorConfig,

    focus: Focus,
    directory_state: ListState,
    track_state: ListState,
    // Some while the user is typing a directory to add
    input: Option<String>,
    status: Option<String>,
    should_quit: bool,
    dirty: bool,
}

impl<E: AudioEngine> App<E> {
    pub fn new(controller: Controller<E>, monitor_config: MonitorConfig) -> Result<Self> {
        let terminal = TerminalManager::new()?;

        let mut track_state = ListState::default();
        if !controller.library().tracks().is_empty() {
            track_state.select(Some(0));
        }
        let mut directory_state = ListState::default();
        if !controller.library().directories().is_empty() {
            directory_state.select(Some(0));
        }

        Ok(Self {
            controller,
            terminal,
            monitor_config,
            focus: Focus::Tracks,
            directory_state,
            track_state,
            input: None,
            status: None,
            should_quit: false,
            dirty: true,
        })
    }

    /// Runs until the user quits, then stops the monitor and the controller.
    pub async fn run(mut self) -> Result<()> {
        let (monitor_tx, mut monitor_rx) = mpsc::unbounded_channel();
        let monitor = EndOfTrackMonitor::spawn(
            self.controller.completion_signal(),
            monitor_tx,
            &self.monitor_config,
        );
        let (scan_tx, mut scan_rx) = mpsc::unbounded_channel::<Option<ScanOutcome>>();
        let mut keys = EventHandler::spawn();

        let mut ticker = time::interval(TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_snapshot: Option<SessionSnapshot> = None;

        while !self.should_quit {
            let snapshot = self.controller.snapshot();
            if self.dirty || last_snapshot.as_ref() != Some(&snapshot) {
                self.render(&snapshot)?;
                last_snapshot = Some(snapshot);
                self.dirty = false;
            }

            tokio::select! {
                Some(key) = keys.next() => self.handle_key(key, &scan_tx),
                Some(event) = monitor_rx.recv() => self.handle_monitor_event(event),
                Some(outcome) = scan_rx.recv() => self.handle_scan_result(outcome),
                _ = ticker.tick() => {
                    self.controller.tick();
                }
            }
        }

        if !monitor.shutdown().await {
            warn!("End-of-track monitor had to be aborted");
        }
        self.controller.shutdown();
        info!("Bye");
        Ok(())
    }

    fn handle_key(&mut self, key: KeyEvent, scan_tx: &mpsc::UnboundedSender<Option<ScanOutcome>>) {
        self.dirty = true;

        if let Some(input) = self.input.as_mut() {
            match key.code {
                KeyCode::Char(c) => input.push(c),
                KeyCode::Backspace => {
                    input.pop();
                }
                KeyCode::Esc => self.input = None,
                KeyCode::Enter => {
                    let path = self.input.take().unwrap_or_default();
                    if !path.trim().is_empty() {
                        self.run_command(Command::AddDirectory(PathBuf::from(path.trim())));
                    }
                }
                _ => {}
            }
            return;
        }

        let Some(event) = key_to_app_event(key) else {
            return;
        };

        let step = self.controller.volume_step();
        match event {
            AppEvent::Quit => self.should_quit = true,

            AppEvent::TogglePlayPause => self.run_command(Command::TogglePlayPause),
            AppEvent::Stop => self.run_command(Command::Stop),
            AppEvent::NextTrack => self.run_command(Command::Next),
            AppEvent::PreviousTrack => self.run_command(Command::Previous),
            AppEvent::ToggleShuffle => self.run_command(Command::ToggleShuffle),
            AppEvent::ToggleRepeat => self.run_command(Command::ToggleRepeat),
            AppEvent::VolumeUp => self.run_command(Command::AdjustVolume(step)),
            AppEvent::VolumeDown => self.run_command(Command::AdjustVolume(-step)),

            AppEvent::Up => self.move_selection(-1),
            AppEvent::Down => self.move_selection(1),
            AppEvent::SwitchFocus => {
                self.focus = match self.focus {
                    Focus::Directories => Focus::Tracks,
                    Focus::Tracks => Focus::Directories,
                };
            }
            AppEvent::Enter => match self.focus {
                Focus::Tracks => {
                    if let Some(index) = self.track_state.selected() {
                        self.run_command(Command::Select(index));
                    }
                }
                Focus::Directories => self.focus = Focus::Tracks,
            },

            AppEvent::ScanAll => self.start_scan(scan_tx),
            AppEvent::AddDirectory => self.input = Some(String::new()),
            AppEvent::RemoveDirectory => {
                let selected = self
                    .directory_state
                    .selected()
                    .and_then(|i| self.controller.library().directories().get(i))
                    .map(|d| d.path.clone());
                match selected {
                    Some(path) if self.focus == Focus::Directories => {
                        self.run_command(Command::RemoveDirectory(path))
                    }
                    _ => self.status = Some("Select a directory first (Tab)".to_string()),
                }
            }
            AppEvent::ToggleLike => {
                if let Some(index) = self.track_state.selected() {
                    let liked = self
                        .controller
                        .library()
                        .tracks()
                        .get(index)
                        .is_some_and(|t| t.is_liked);
                    if let Err(e) = self.controller.set_liked(index, !liked) {
                        self.status = Some(format!("Error: {}", e));
                    }
                }
            }
        }
    }

    fn run_command(&mut self, command: Command) {
        match self.controller.execute(command) {
            Ok(outcome) => {
                if let Some(message) = describe(&outcome) {
                    self.status = Some(message);
                }
                self.clamp_selections();
            }
            Err(e) => {
                warn!("Command failed: {}", e);
                self.status = Some(format!("Error: {}", e));
            }
        }
    }

    /// Scans run on the blocking pool; the result comes back through `scan_tx`.
    fn start_scan(&mut self, scan_tx: &mpsc::UnboundedSender<Option<ScanOutcome>>) {
        match self.controller.begin_scan_all() {
            Ok(job) => {
                let roots = job.roots().len();
                let tx = scan_tx.clone();
                tokio::spawn(async move {
                    let outcome = tokio::task::spawn_blocking(move || job.run()).await.ok();
                    let _ = tx.send(outcome);
                });
                self.status = Some(format!("Scanning {} directories...", roots));
            }
            Err(VaultError::ScanInProgress) => {
                self.status = Some("A scan is already running".to_string());
            }
            Err(e) => self.status = Some(format!("Error: {}", e)),
        }
    }

    fn handle_scan_result(&mut self, outcome: Option<ScanOutcome>) {
        self.dirty = true;
        match outcome {
            Some(outcome) => {
                let report = self.controller.finish_scan(outcome);
                self.status = Some(scan_message(report.added, report.errors.len()));
                self.clamp_selections();
            }
            None => {
                warn!("Scan worker died before reporting");
                self.controller.abort_scan();
                self.status = Some("Scan failed".to_string());
            }
        }
    }

    fn handle_monitor_event(&mut self, event: MonitorEvent) {
        if let Err(e) = self.controller.handle_monitor_event(event) {
            warn!("Could not advance after track end: {}", e);
            self.status = Some(format!("Error: {}", e));
            self.dirty = true;
        }
    }

    fn move_selection(&mut self, delta: i32) {
        let (state, len) = match self.focus {
            Focus::Directories => (
                &mut self.directory_state,
                self.controller.library().directories().len(),
            ),
            Focus::Tracks => (&mut self.track_state, self.controller.library().tracks().len()),
        };
        if len == 0 {
            return;
        }

        let current = state.selected().unwrap_or(0);
        let new_index = if delta < 0 {
            current.saturating_sub(delta.unsigned_abs() as usize)
        } else {
            (current + delta as usize).min(len - 1)
        };
        state.select(Some(new_index));
    }

    fn clamp_selections(&mut self) {
        clamp(&mut self.track_state, self.controller.library().tracks().len());
        clamp(&mut self.directory_state, self.controller.library().directories().len());
    }

    fn render(&mut self, snapshot: &SessionSnapshot) -> Result<()> {
        let listing = self.controller.library_listing();
        let now_playing = self.controller.current_track().map(|t| t.file_name());
        let footer = match &self.input {
            Some(input) => format!("Add directory: {}_", input),
            None => self.status.clone().unwrap_or_else(|| HELP.to_string()),
        };
        let focus = self.focus;
        let mut directory_state = self.directory_state.clone();
        let mut track_state = self.track_state.clone();

        self.terminal.draw(|f| {
            let chunks = Layout::default()
                .direction(Direction::Vertical)
                .constraints([
                    Constraint::Length(7), // Directories
                    Constraint::Min(0),    // Tracks
                    Constraint::Length(3), // Player
                    Constraint::Length(1), // Status
                ])
                .split(f.area());

            render_directories(f, chunks[0], &listing, focus, &mut directory_state);
            render_tracks(f, chunks[1], &listing, snapshot, focus, &mut track_state);
            render_player(f, chunks[2], snapshot, now_playing.as_deref());
            f.render_widget(
                Paragraph::new(footer).style(Style::default().fg(Color::DarkGray)),
                chunks[3],
            );
        })?;

        self.directory_state = directory_state;
        self.track_state = track_state;
        Ok(())
    }
}

const HELP: &str =
    "space play/pause  n/p next/prev  x stop  z shuffle  r repeat  +/- volume  a add  d remove  s scan  l like  q quit";

fn clamp(state: &mut ListState, len: usize) {
    match state.selected() {
        _ if len == 0 => state.select(None),
        Some(i) if i >= len => state.select(Some(len - 1)),
        None => state.select(Some(0)),
        _ => {}
    }
}

fn focused_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default()
    };
    Block::default().borders(Borders::ALL).title(title).border_style(style)
}

fn render_directories(
    f: &mut Frame,
    area: Rect,
    listing: &LibraryListing,
    focus: Focus,
    state: &mut ListState,
) {
    let items: Vec<ListItem> = listing
        .directories
        .iter()
        .map(|d| {
            let status = if d.scanned { "" } else { " (not scanned)" };
            ListItem::new(format!("{} ({} files){}", d.path.display(), d.files, status))
        })
        .collect();

    let list = List::new(items)
        .block(focused_block("Directories", focus == Focus::Directories))
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("► ");
    f.render_stateful_widget(list, area, state);
}

fn render_tracks(
    f: &mut Frame,
    area: Rect,
    listing: &LibraryListing,
    snapshot: &SessionSnapshot,
    focus: Focus,
    state: &mut ListState,
) {
    let items: Vec<ListItem> = listing
        .tracks
        .iter()
        .enumerate()
        .map(|(i, track)| {
            let is_current = snapshot.current_index == Some(i);
            let prefix = if is_current { "♪ " } else { "  " };
            let liked = if track.is_liked { " ♥" } else { "" };
            let artist = track.artist.as_deref().unwrap_or("Unknown Artist");
            let content = format!(
                "{}{} - {}{}  [{}]",
                prefix,
                artist,
                track.title,
                liked,
                track.parent.display()
            );

            let style = if is_current {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            ListItem::new(content).style(style)
        })
        .collect();

    let title = format!("Tracks ({})", listing.tracks.len());
    let list = List::new(items)
        .block(focused_block(&title, focus == Focus::Tracks))
        .highlight_style(Style::default().bg(Color::DarkGray))
        .highlight_symbol("► ");
    f.render_stateful_widget(list, area, state);
}

fn render_player(f: &mut Frame, area: Rect, snapshot: &SessionSnapshot, track: Option<&str>) {
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(75), Constraint::Percentage(25)])
        .split(area);

    let info = Paragraph::new(now_playing_line(snapshot, track))
        .block(Block::default().borders(Borders::ALL).title("Now Playing"));
    f.render_widget(info, chunks[0]);

    let volume = Gauge::default()
        .block(Block::default().borders(Borders::ALL).title("Volume"))
        .gauge_style(Style::default().fg(Color::Green))
        .ratio(f64::from(snapshot.volume.clamp(0.0, 1.0)));
    f.render_widget(volume, chunks[1]);
}

fn now_playing_line(snapshot: &SessionSnapshot, track: Option<&str>) -> String {
    let mut flags = String::new();
    if snapshot.shuffle {
        flags.push_str(" [shuffle]");
    }
    if snapshot.repeat {
        flags.push_str(" [repeat]");
    }

    let name = track.unwrap_or("-");
    let head = match snapshot.state {
        PlaybackState::Idle => "⏹ Stopped".to_string(),
        PlaybackState::Loaded => format!("⏸ Paused: {}", name),
        PlaybackState::Playing => format!("▶ Playing: {}", name),
    };

    match snapshot.state {
        PlaybackState::Idle => format!("{}{}", head, flags),
        _ => format!("{}  {}{}", head, format_position(snapshot.position_seconds), flags),
    }
}

fn format_position(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "--:--".to_string();
    }
    let total = seconds as u64;
    format!("{:02}:{:02}", total / 60, total % 60)
}

fn scan_message(added: usize, errors: usize) -> String {
    match errors {
        0 => format!("Scan finished: {} tracks", added),
        n => format!("Scan finished: {} tracks, {} unreadable paths", added, n),
    }
}

fn describe(outcome: &Outcome) -> Option<String> {
    let message = match outcome {
        Outcome::DirectoryAdded { path, report } => format!(
            "Added {} ({} tracks)",
            path.display(),
            report.added
        ),
        Outcome::DirectoryRemoved { path, dropped } => {
            format!("Removed {} ({} tracks)", path.display(), dropped)
        }
        Outcome::Scanned(report) => scan_message(report.added, report.errors.len()),
        Outcome::ShuffleChanged(on) => format!("Shuffle {}", if *on { "on" } else { "off" }),
        Outcome::RepeatChanged(on) => format!("Repeat {}", if *on { "on" } else { "off" }),
        Outcome::VolumeChanged(v) => format!("Volume {:.0}%", v * 100.0),
        Outcome::Playing(_) | Outcome::Paused | Outcome::Resumed | Outcome::Stopped => {
            return None
        }
        Outcome::Nothing => "Library is empty".to_string(),
    };
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(state: PlaybackState) -> SessionSnapshot {
        SessionSnapshot {
            state,
            current_index: Some(0),
            loaded_path: Some(PathBuf::from("/music/rock/a.mp3")),
            is_playing: state == PlaybackState::Playing,
            volume: 0.7,
            position_seconds: 83.4,
            shuffle: false,
            repeat: false,
        }
    }

    #[test]
    fn test_format_position() {
        assert_eq!(format_position(0.0), "00:00");
        assert_eq!(format_position(83.9), "01:23");
        assert_eq!(format_position(-1.0), "--:--");
        assert_eq!(format_position(f64::NAN), "--:--");
    }

    #[test]
    fn test_now_playing_line() {
        let playing = snapshot(PlaybackState::Playing);
        assert_eq!(now_playing_line(&playing, Some("a.mp3")), "▶ Playing: a.mp3  01:23");

        let mut paused = snapshot(PlaybackState::Loaded);
        paused.shuffle = true;
        paused.repeat = true;
        assert_eq!(
            now_playing_line(&paused, Some("a.mp3")),
            "⏸ Paused: a.mp3  01:23 [shuffle] [repeat]"
        );

        assert_eq!(now_playing_line(&snapshot(PlaybackState::Idle), None), "⏹ Stopped");
    }

    #[test]
    fn test_clamp_follows_list_length() {
        let mut state = ListState::default();
        clamp(&mut state, 3);
        assert_eq!(state.selected(), Some(0));

        state.select(Some(5));
        clamp(&mut state, 2);
        assert_eq!(state.selected(), Some(1));

        clamp(&mut state, 0);
        assert_eq!(state.selected(), None);
    }
}
