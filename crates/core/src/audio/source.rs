use serde::{Deserialize, Serialize};

use super::{decoder::DecodedAudio, device::LiveStream};

/// Which kind of source the transport is pointed at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    File,
    LiveInput,
}

impl SourceKind {
    /// Only file sources have a playback head.
    pub fn supports_seek(self) -> bool {
        matches!(self, SourceKind::File)
    }

    pub fn supports_pause(self) -> bool {
        matches!(self, SourceKind::File)
    }
}

/// Asynchronous notifications raised by a file-backed source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MediaEvent {
    TimeUpdate(f64),
    Ended,
}

/// The one source currently feeding the signal graph.
pub enum AudioSource {
    File(MediaElement),
    LiveInput(Box<dyn LiveStream>),
}

impl AudioSource {
    /// Which variant is active.
    pub fn kind(&self) -> SourceKind {
        match self {
            AudioSource::File(_) => SourceKind::File,
            AudioSource::LiveInput(_) => SourceKind::LiveInput,
        }
    }

    pub fn supports_seek(&self) -> bool {
        self.kind().supports_seek()
    }

    pub fn supports_pause(&self) -> bool {
        self.kind().supports_pause()
    }

    /// Display name; live input has none.
    pub fn name(&self) -> Option<&str> {
        match self {
            AudioSource::File(element) => Some(element.name()),
            AudioSource::LiveInput(_) => None,
        }
    }

    /// Length in seconds, file sources only.
    pub fn duration(&self) -> Option<f64> {
        match self {
            AudioSource::File(element) => Some(element.duration()),
            AudioSource::LiveInput(_) => None,
        }
    }

    /// Playback head in seconds, file sources only.
    pub fn current_time(&self) -> Option<f64> {
        match self {
            AudioSource::File(element) => Some(element.current_time()),
            AudioSource::LiveInput(_) => None,
        }
    }
}

impl std::fmt::Debug for AudioSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AudioSource::File(element) => f.debug_tuple("File").field(element).finish(),
            AudioSource::LiveInput(stream) => f
                .debug_tuple("LiveInput")
                .field(&stream.label())
                .finish(),
        }
    }
}

/// Playback head over fully decoded audio, modelled on a media element:
/// it can be played, paused and seeked, and it reports `ended` exactly once
/// each time it runs off the end.
#[derive(Debug, Clone)]
pub struct MediaElement {
    name: String,
    audio: DecodedAudio,
    position: usize,
    paused: bool,
    ended: bool,
    events: Vec<MediaEvent>,
}

impl MediaElement {
    /// Wraps decoded audio. The element starts paused at zero.
    pub fn new(name: impl Into<String>, audio: DecodedAudio) -> Self {
        Self {
            name: name.into(),
            audio,
            position: 0,
            paused: true,
            ended: false,
            events: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.audio.sample_rate
    }

    pub fn is_empty(&self) -> bool {
        self.audio.samples.is_empty()
    }

    /// Length in seconds.
    pub fn duration(&self) -> f64 {
        self.audio.duration_secs()
    }

    /// Playback head in seconds.
    pub fn current_time(&self) -> f64 {
        if self.audio.sample_rate == 0 {
            return 0.0;
        }
        self.position as f64 / self.audio.sample_rate as f64
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Resumes playback; an element that already ended starts over.
    pub fn play(&mut self) {
        if self.ended {
            self.position = 0;
            self.ended = false;
        }
        self.paused = false;
    }

    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Moves the playback head, clamped to `[0, duration]`.
    pub fn seek(&mut self, seconds: f64) {
        let seconds = if seconds.is_finite() { seconds } else { 0.0 };
        let target = (seconds.max(0.0) * self.audio.sample_rate as f64).round() as usize;
        self.position = target.min(self.audio.samples.len());
        self.ended = false;
        self.events.push(MediaEvent::TimeUpdate(self.current_time()));
    }

    /// Pauses and rewinds to the start.
    pub fn rewind(&mut self) {
        self.paused = true;
        self.ended = false;
        self.position = 0;
    }

    /// Copies up to `out.len()` samples from the playback head and returns
    /// how many were written. Paused elements produce nothing.
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        if self.paused || self.ended {
            return 0;
        }

        let remaining = &self.audio.samples[self.position..];
        let count = remaining.len().min(out.len());
        out[..count].copy_from_slice(&remaining[..count]);
        self.position += count;

        if count > 0 {
            self.events.push(MediaEvent::TimeUpdate(self.current_time()));
        }
        if self.position >= self.audio.samples.len() {
            self.paused = true;
            self.ended = true;
            self.events.push(MediaEvent::Ended);
        }
        count
    }

    /// Drains the events raised since the last call.
    pub fn take_events(&mut self) -> Vec<MediaEvent> {
        std::mem::take(&mut self.events)
    }
}
