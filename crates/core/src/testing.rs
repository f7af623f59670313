//! In-memory stand-ins for the host seams, shared by the unit tests.

use std::{
    cell::{Cell, RefCell},
    path::PathBuf,
    rc::Rc,
};

use crate::{
    audio::{AudioOutput, InputDevice, LiveStream},
    record::{Artifact, ArtifactSink, CaptureHost, Encoder, EncoderEvent, EncoderRequest},
    render::Canvas,
    AuraluxError, Result,
};

const EBML_MAGIC: [u8; 4] = [0x1a, 0x45, 0xdf, 0xa3];

pub(crate) struct FakeInput {
    sample_rate: u32,
    grant: bool,
    released: Rc<Cell<usize>>,
}

impl FakeInput {
    pub(crate) fn granting(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            grant: true,
            released: Rc::default(),
        }
    }

    pub(crate) fn denying() -> Self {
        Self {
            grant: false,
            ..Self::granting(48_000)
        }
    }

    /// Counts streams whose tracks were released.
    pub(crate) fn released_counter(&self) -> Rc<Cell<usize>> {
        Rc::clone(&self.released)
    }
}

impl InputDevice for FakeInput {
    fn open(&mut self) -> Result<Box<dyn LiveStream>> {
        if !self.grant {
            return Err(AuraluxError::PermissionDenied(
                "Microphone access was denied.".into(),
            ));
        }
        Ok(Box::new(FakeStream {
            sample_rate: self.sample_rate,
            live: true,
            released: Rc::clone(&self.released),
        }))
    }
}

struct FakeStream {
    sample_rate: u32,
    live: bool,
    released: Rc<Cell<usize>>,
}

impl LiveStream for FakeStream {
    fn label(&self) -> &str {
        "fake microphone"
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn drain_into(&mut self, out: &mut Vec<f32>) {
        if self.live {
            let block = (self.sample_rate / 60) as usize;
            out.extend((0..block).map(|i| if i % 2 == 0 { 0.5 } else { -0.5 }));
        }
    }

    fn stop_tracks(&mut self) {
        if self.live {
            self.live = false;
            self.released.set(self.released.get() + 1);
        }
    }

    fn is_live(&self) -> bool {
        self.live
    }
}

#[derive(Default)]
pub(crate) struct FakeOutput {
    blocked: Rc<Cell<bool>>,
}

impl FakeOutput {
    /// While the handle holds `true`, `start` is rejected as autoplay-blocked.
    pub(crate) fn blocked_handle(&self) -> Rc<Cell<bool>> {
        Rc::clone(&self.blocked)
    }
}

impl AudioOutput for FakeOutput {
    fn start(&mut self) -> Result<()> {
        if self.blocked.get() {
            return Err(AuraluxError::AutoplayBlocked(
                "Playback requires a user gesture.".into(),
            ));
        }
        Ok(())
    }

    fn pause(&mut self) {}

    fn write(&mut self, _samples: &[f32]) {}
}

/// Totals written into every encoder a [`FakeCaptureHost`] built.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub(crate) struct Written {
    pub(crate) frames: usize,
    pub(crate) samples: usize,
}

/// Capture host whose encoders emit one chunk per time-slice worth of frames
/// and finish as soon as they are polled after `stop`.
pub(crate) struct FakeCaptureHost {
    canvas_capture: bool,
    supported: Option<Vec<String>>,
    encoders_fail: bool,
    fail_after_frames: Option<usize>,
    created: Rc<RefCell<Vec<Option<String>>>>,
    written: Rc<Cell<Written>>,
}

impl Default for FakeCaptureHost {
    fn default() -> Self {
        Self {
            canvas_capture: true,
            supported: None,
            encoders_fail: false,
            fail_after_frames: None,
            created: Rc::default(),
            written: Rc::default(),
        }
    }
}

impl FakeCaptureHost {
    pub(crate) fn without_canvas_capture() -> Self {
        Self {
            canvas_capture: false,
            ..Self::default()
        }
    }

    pub(crate) fn supporting(mimes: &[&str]) -> Self {
        Self {
            supported: Some(mimes.iter().map(|mime| mime.to_string()).collect()),
            ..Self::default()
        }
    }

    pub(crate) fn failing_encoders() -> Self {
        Self {
            encoders_fail: true,
            ..Self::default()
        }
    }

    /// Encoders that report a failure once `frames` frames went in and
    /// silently drop everything after that.
    pub(crate) fn failing_after(frames: usize) -> Self {
        Self {
            fail_after_frames: Some(frames),
            ..Self::default()
        }
    }

    pub(crate) fn written(&self) -> Rc<Cell<Written>> {
        Rc::clone(&self.written)
    }

    /// Requested mime of every encoder built so far.
    pub(crate) fn created(&self) -> Rc<RefCell<Vec<Option<String>>>> {
        Rc::clone(&self.created)
    }
}

impl CaptureHost for FakeCaptureHost {
    fn supports_canvas_capture(&self) -> bool {
        self.canvas_capture
    }

    fn is_type_supported(&self, mime: &str) -> bool {
        match &self.supported {
            Some(list) => list.iter().any(|supported| supported == mime),
            None => true,
        }
    }

    fn create_encoder(&mut self, request: &EncoderRequest) -> Result<Box<dyn Encoder>> {
        if self.encoders_fail {
            return Err(AuraluxError::msg("encoder construction failed"));
        }
        self.created.borrow_mut().push(request.mime.clone());
        Ok(Box::new(FakeEncoder {
            mime: request
                .mime
                .clone()
                .unwrap_or_else(|| "video/webm".to_owned()),
            frames_per_slice: 1,
            fps: request.fps,
            pending: Vec::new(),
            pending_frames: 0,
            events: Vec::new(),
            started: false,
            stopped: false,
            fail_after_frames: self.fail_after_frames,
            failed: false,
            written: Rc::clone(&self.written),
        }))
    }
}

struct FakeEncoder {
    mime: String,
    fps: u32,
    frames_per_slice: usize,
    pending: Vec<u8>,
    pending_frames: usize,
    events: Vec<EncoderEvent>,
    started: bool,
    stopped: bool,
    fail_after_frames: Option<usize>,
    failed: bool,
    written: Rc<Cell<Written>>,
}

impl FakeEncoder {
    fn flush(&mut self) {
        if !self.pending.is_empty() {
            self.events
                .push(EncoderEvent::DataAvailable(std::mem::take(&mut self.pending)));
        }
        self.pending_frames = 0;
    }
}

impl Encoder for FakeEncoder {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    fn start(&mut self, timeslice: f64) -> Result<()> {
        self.frames_per_slice = ((self.fps as f64 * timeslice).round() as usize).max(1);
        self.started = true;
        self.pending.extend_from_slice(&EBML_MAGIC);
        Ok(())
    }

    fn write_video(&mut self, frame: &Canvas) -> Result<()> {
        if self.stopped {
            return Err(AuraluxError::msg("encoder stopped"));
        }
        if self.failed {
            return Ok(());
        }
        let mut written = self.written.get();
        written.frames += 1;
        self.written.set(written);
        if self.fail_after_frames.is_some_and(|limit| written.frames >= limit) {
            self.failed = true;
            self.events.push(EncoderEvent::Failed("encoder crashed".into()));
            return Ok(());
        }
        self.pending.push(frame.pixels().first().copied().unwrap_or(0));
        self.pending_frames += 1;
        if self.pending_frames >= self.frames_per_slice {
            self.flush();
        }
        Ok(())
    }

    fn write_audio(&mut self, samples: &[f32]) -> Result<()> {
        if self.failed {
            return Ok(());
        }
        let mut written = self.written.get();
        written.samples += samples.len();
        self.written.set(written);
        self.pending.extend(samples.iter().take(1).map(|s| (s * 127.0) as i8 as u8));
        Ok(())
    }

    fn stop(&mut self) {
        if self.stopped || !self.started {
            return;
        }
        self.stopped = true;
        self.flush();
        self.events.push(EncoderEvent::Stopped);
    }

    fn poll(&mut self) -> Vec<EncoderEvent> {
        std::mem::take(&mut self.events)
    }
}

/// Keeps offered artifacts in memory.
#[derive(Default)]
pub(crate) struct MemorySink {
    artifacts: Rc<RefCell<Vec<Artifact>>>,
}

impl MemorySink {
    pub(crate) fn artifacts(&self) -> Rc<RefCell<Vec<Artifact>>> {
        Rc::clone(&self.artifacts)
    }
}

impl ArtifactSink for MemorySink {
    fn offer(&mut self, artifact: &Artifact) -> Result<PathBuf> {
        self.artifacts.borrow_mut().push(artifact.clone());
        Ok(PathBuf::from(&artifact.file_name))
    }
}
