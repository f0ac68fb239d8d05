use super::engine::{AudioEngine, CompletionSignal, EngineError};
use super::AudioConfig;
use rodio::source::EmptyCallback;
use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, warn};

/// rodio-backed engine. Owns the output stream for its whole lifetime;
/// dropping it stops playback and releases the device.
pub struct RodioEngine {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    sink: Option<Sink>,
    config: AudioConfig,
    signal: CompletionSignal,
}

impl RodioEngine {
    pub fn new(config: AudioConfig) -> Result<Self, EngineError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| EngineError::Output(e.to_string()))?;

        Ok(Self {
            _stream: stream,
            stream_handle,
            sink: None,
            config,
            signal: CompletionSignal::new(),
        })
    }

    fn drop_sink(&mut self) {
        if let Some(sink) = self.sink.take() {
            if !sink.is_paused() {
                self.fade_out(&sink);
            }
            sink.stop();
        }
    }

    /// Blocking volume ramp before a playing sink is dropped. Runs on the
    /// caller's thread, so `fade_out_ms` stays small.
    fn fade_out(&self, sink: &Sink) {
        let current_volume = self.config.volume;
        let fade_duration = self.config.fade_out_ms;

        if fade_duration == 0 {
            return;
        }

        let fade_steps = 10;
        let step_duration = fade_duration / fade_steps;
        let volume_step = current_volume / fade_steps as f32;

        for step in 1..=fade_steps {
            let new_volume = current_volume - (volume_step * step as f32);
            sink.set_volume(new_volume.max(0.0));
            std::thread::sleep(Duration::from_millis(step_duration));
        }

        sink.set_volume(0.0);
    }
}

impl AudioEngine for RodioEngine {
    fn load(&mut self, path: &Path) -> Result<(), EngineError> {
        self.drop_sink();
        // Whatever was queued before is no longer allowed to report completion.
        self.signal.invalidate();

        let file = File::open(path)?;
        let source = Decoder::new(BufReader::new(file)).map_err(|e| {
            warn!("Decoder rejected {}: {}", path.display(), e);
            EngineError::Decode(e.to_string())
        })?;

        let sink = Sink::try_new(&self.stream_handle).map_err(|e| EngineError::Output(e.to_string()))?;
        sink.pause();
        sink.set_volume(self.config.volume);
        // Ramps on the audio thread, so selecting a track never blocks on it.
        sink.append(source.fade_in(Duration::from_millis(self.config.fade_in_ms)));

        // Runs on the audio thread once the decoder is exhausted.
        let load_id = self.signal.begin_load();
        let signal = self.signal.clone();
        sink.append(EmptyCallback::<f32>::new(Box::new(move || {
            signal.mark_finished(load_id);
        })));

        debug!("Loaded {} as load #{}", path.display(), load_id);
        self.sink = Some(sink);
        Ok(())
    }

    fn play(&mut self) {
        if let Some(sink) = self.sink.as_ref() {
            sink.play();
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = self.sink.as_ref() {
            sink.pause();
        }
    }

    fn resume(&mut self) {
        if let Some(sink) = self.sink.as_ref() {
            sink.play();
        }
    }

    fn stop(&mut self) {
        self.signal.invalidate();
        self.drop_sink();
    }

    fn set_volume(&mut self, volume: f32) {
        let clamped_volume = volume.clamp(0.0, 1.0);
        self.config.volume = clamped_volume;

        if let Some(sink) = self.sink.as_ref() {
            sink.set_volume(clamped_volume);
        }
    }

    fn position(&self) -> f64 {
        self.sink
            .as_ref()
            .map(|sink| sink.get_pos().as_secs_f64())
            .unwrap_or(-1.0)
    }

    fn is_busy(&self) -> bool {
        self.sink
            .as_ref()
            .map(|sink| !sink.is_paused() && !sink.empty())
            .unwrap_or(false)
    }

    fn completion_signal(&self) -> CompletionSignal {
        self.signal.clone()
    }
}

impl Drop for RodioEngine {
    fn drop(&mut self) {
        self.signal.invalidate();
        if let Some(sink) = self.sink.take() {
            sink.stop();
        }
    }
}
