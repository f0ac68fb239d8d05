// Playback - the session state machine and the watcher that feeds it
// track-finished events from the audio side.

pub mod monitor; // polls the engine's completion signal, posts events
pub mod session; // what is loaded/playing and what comes next

pub use monitor::{EndOfTrackMonitor, MonitorEvent};
pub use session::{PlaybackSession, PlaybackState, SessionSnapshot};
