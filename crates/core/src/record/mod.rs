//! Capture Controller: records the rendered surface plus the capture audio
//! tap into a finite session and packages it into one artifact.

mod ffmpeg;
mod sink;

pub use ffmpeg::{FfmpegCaptureHost, FfmpegEncoder};
pub use sink::{ArtifactSink, DirectorySink};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::{audio::AudioTrackInfo, config::CaptureConfig, render::Canvas, AuraluxError, Result};

/// Fixed name of the still-image artifact.
pub const SCREENSHOT_FILE_NAME: &str = "auralux.png";

/// Everything an encoder needs to know up front.
#[derive(Debug, Clone, PartialEq)]
pub struct EncoderRequest {
    /// Preferred container/codec combination; `None` asks for the host default.
    pub mime: Option<String>,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub audio: Option<AudioTrackInfo>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    DataAvailable(Vec<u8>),
    Stopped,
    Failed(String),
}

/// The platform side of recording: frame-stream capture and encoders.
pub trait CaptureHost {
    /// Whether the drawable surface can be captured as a frame stream at all.
    fn supports_canvas_capture(&self) -> bool;

    fn is_type_supported(&self, mime: &str) -> bool;

    fn create_encoder(&mut self, request: &EncoderRequest) -> Result<Box<dyn Encoder>>;
}

/// A running encoder. Output arrives as [`EncoderEvent`]s from [`Encoder::poll`].
pub trait Encoder {
    fn mime_type(&self) -> &str;

    /// Begins encoding, flushing buffered output every `timeslice` seconds.
    fn start(&mut self, timeslice: f64) -> Result<()>;

    fn write_video(&mut self, frame: &Canvas) -> Result<()>;

    fn write_audio(&mut self, samples: &[f32]) -> Result<()>;

    /// Requests finalisation. Remaining data and then `Stopped` follow later.
    fn stop(&mut self);

    fn poll(&mut self) -> Vec<EncoderEvent>;
}

/// A finished download.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub file_name: String,
    pub mime: String,
    pub bytes: Vec<u8>,
    pub duration_secs: f64,
}

impl Artifact {
    /// Still image under the fixed screenshot name.
    pub fn screenshot(png: Vec<u8>) -> Self {
        Self {
            file_name: SCREENSHOT_FILE_NAME.to_owned(),
            mime: "image/png".to_owned(),
            bytes: png,
            duration_secs: 0.0,
        }
    }
}

/// `<prefix>-<ISO-8601 timestamp with ':' and '.' replaced by '-'>.<ext>`
pub fn artifact_name(prefix: &str, mime: &str, at: DateTime<Utc>) -> String {
    let stamp = at
        .to_rfc3339_opts(SecondsFormat::Millis, true)
        .replace([':', '.'], "-");
    format!("{prefix}-{stamp}.{}", extension_for(mime))
}

fn extension_for(mime: &str) -> &'static str {
    if mime.starts_with("video/mp4") {
        "mp4"
    } else {
        "webm"
    }
}

/// One recording: the encoder plus every chunk it has handed back so far.
pub struct RecordingSession {
    encoder: Box<dyn Encoder>,
    chunks: Vec<Vec<u8>>,
    active: bool,
    started_at: DateTime<Utc>,
    elapsed: f64,
    frame_debt: f64,
}

impl RecordingSession {
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Recorded time in seconds.
    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    pub fn mime_type(&self) -> &str {
        self.encoder.mime_type()
    }

    /// Bytes of encoder output collected so far.
    pub fn buffered_bytes(&self) -> usize {
        self.chunks.iter().map(Vec::len).sum()
    }

    /// Collects encoder output. Returns `Some` once the encoder is done.
    fn collect(&mut self) -> Option<std::result::Result<(), String>> {
        for event in self.encoder.poll() {
            match event {
                EncoderEvent::DataAvailable(chunk) if !chunk.is_empty() => self.chunks.push(chunk),
                EncoderEvent::DataAvailable(_) => {}
                EncoderEvent::Stopped => return Some(Ok(())),
                EncoderEvent::Failed(reason) => return Some(Err(reason)),
            }
        }
        None
    }

    fn into_artifact(self, prefix: &str) -> Artifact {
        let mime = self.encoder.mime_type().to_owned();
        Artifact {
            file_name: artifact_name(prefix, &mime, self.started_at),
            bytes: self.chunks.concat(),
            mime,
            duration_secs: self.elapsed,
        }
    }
}

impl std::fmt::Debug for RecordingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordingSession")
            .field("mime", &self.encoder.mime_type())
            .field("chunks", &self.chunks.len())
            .field("active", &self.active)
            .field("elapsed", &self.elapsed)
            .finish()
    }
}

/// Drives at most one active [`RecordingSession`].
///
/// Stopping hands the session over to a finalising list; [`CaptureController::poll`]
/// turns it into an [`Artifact`] once the encoder reports it has stopped.
pub struct CaptureController {
    config: CaptureConfig,
    host: Box<dyn CaptureHost>,
    session: Option<RecordingSession>,
    finalizing: Vec<RecordingSession>,
    finished: Vec<Result<Artifact>>,
    stop_on_end: bool,
    audio_scratch: Vec<f32>,
}

impl CaptureController {
    /// Validates `config` and wraps the host. No encoder exists until
    /// [`CaptureController::start`].
    pub fn new(config: CaptureConfig, host: Box<dyn CaptureHost>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            host,
            session: None,
            finalizing: Vec::new(),
            finished: Vec::new(),
            stop_on_end: false,
            audio_scratch: Vec::new(),
        })
    }

    /// Whether a session is currently taking frames.
    pub fn is_recording(&self) -> bool {
        self.session.as_ref().is_some_and(RecordingSession::is_active)
    }

    /// Whether a stopped session is still waiting on its encoder.
    pub fn is_finalizing(&self) -> bool {
        !self.finalizing.is_empty()
    }

    /// The active session, if any.
    pub fn session(&self) -> Option<&RecordingSession> {
        self.session.as_ref()
    }

    pub fn config(&self) -> &CaptureConfig {
        &self.config
    }

    /// Starts a session over `canvas`, including the audio track if one is
    /// given. Does nothing if a session is already active.
    ///
    /// Fails with [`AuraluxError::UnsupportedCapability`] and no state change
    /// when the host cannot capture the surface or no encoder can be built.
    pub fn start(&mut self, canvas: &Canvas, audio: Option<AudioTrackInfo>) -> Result<()> {
        if self.is_recording() {
            tracing::debug!("capture already active");
            return Ok(());
        }
        if !self.host.supports_canvas_capture() {
            return Err(AuraluxError::UnsupportedCapability(
                "Recording is not supported on this host.".into(),
            ));
        }

        let mut encoder = self.build_encoder(canvas, audio)?;
        encoder
            .start(self.config.timeslice_secs())
            .map_err(|err| AuraluxError::UnsupportedCapability(err.to_string()))?;

        tracing::info!(
            mime = encoder.mime_type(),
            width = canvas.pixel_width(),
            height = canvas.pixel_height(),
            audio = audio.is_some(),
            "capture started"
        );
        self.stop_on_end = false;
        self.session = Some(RecordingSession {
            encoder,
            chunks: Vec::new(),
            active: true,
            started_at: Utc::now(),
            elapsed: 0.0,
            frame_debt: 0.0,
        });
        Ok(())
    }

    fn build_encoder(
        &mut self,
        canvas: &Canvas,
        audio: Option<AudioTrackInfo>,
    ) -> Result<Box<dyn Encoder>> {
        let mut request = EncoderRequest {
            mime: None,
            width: canvas.pixel_width(),
            height: canvas.pixel_height(),
            fps: self.config.fps,
            audio,
        };

        let preferences = self.config.format_preferences.clone();
        for mime in preferences {
            if !self.host.is_type_supported(&mime) {
                tracing::debug!(%mime, "format not supported");
                continue;
            }
            request.mime = Some(mime);
            match self.host.create_encoder(&request) {
                Ok(encoder) => return Ok(encoder),
                Err(err) => tracing::debug!(%err, mime = ?request.mime, "encoder construction failed"),
            }
        }

        request.mime = None;
        self.host.create_encoder(&request).map_err(|err| {
            tracing::warn!(%err, "no encoder available");
            AuraluxError::UnsupportedCapability(format!("Recording is not supported: {err}"))
        })
    }

    /// Feeds one rendered frame plus the audio captured since the last call.
    /// Frames are emitted at the configured rate regardless of `dt`.
    ///
    /// A write the encoder refuses ends the session; the failure is handed
    /// out by the next [`CaptureController::poll`].
    pub fn capture_frame(&mut self, canvas: &Canvas, audio: &[f32], dt: f64) {
        let fps = self.config.fps as f64;
        let Some(session) = self.session.as_mut().filter(|session| session.active) else {
            return;
        };

        session.elapsed += dt.max(0.0);
        let mut failure = None;
        if !audio.is_empty() {
            if let Err(err) = session.encoder.write_audio(audio) {
                failure = Some(format!("audio could not be recorded: {err}"));
            }
        }

        session.frame_debt += dt.max(0.0) * fps;
        while failure.is_none() && session.frame_debt >= 1.0 {
            session.frame_debt -= 1.0;
            if let Err(err) = session.encoder.write_video(canvas) {
                failure = Some(err.to_string());
            }
        }

        match failure {
            Some(reason) => self.retire_active(reason),
            None => self.collect_active(),
        }
    }

    /// Drains the active encoder's events. An encoder that gives up, or
    /// finishes on its own, ends the session.
    fn collect_active(&mut self) {
        let Some(outcome) = self.session.as_mut().and_then(RecordingSession::collect) else {
            return;
        };
        match outcome {
            Err(reason) => self.retire_active(reason),
            Ok(()) => {
                self.stop_on_end = false;
                if let Some(mut session) = self.session.take() {
                    session.active = false;
                    tracing::info!(elapsed = session.elapsed, "encoder finished early");
                    self.finished
                        .push(Ok(session.into_artifact(&self.config.file_prefix)));
                }
            }
        }
    }

    fn retire_active(&mut self, reason: String) {
        self.stop_on_end = false;
        if let Some(session) = self.session.take() {
            tracing::warn!(%reason, elapsed = session.elapsed, "recording failed");
            self.finished
                .push(Err(AuraluxError::msg(format!("Recording failed: {reason}"))));
        }
    }

    /// Reusable buffer for draining the capture tap; hand it back with
    /// [`CaptureController::restore_audio_scratch`].
    pub fn take_audio_scratch(&mut self) -> Vec<f32> {
        let mut scratch = std::mem::take(&mut self.audio_scratch);
        scratch.clear();
        scratch
    }

    /// Returns the buffer taken with [`CaptureController::take_audio_scratch`].
    pub fn restore_audio_scratch(&mut self, scratch: Vec<f32>) {
        self.audio_scratch = scratch;
    }

    /// Finalises the active session. No-op when nothing is recording, so
    /// repeated calls produce a single artifact.
    pub fn stop(&mut self) {
        self.stop_on_end = false;
        let Some(mut session) = self.session.take() else {
            tracing::debug!("capture stop ignored: not recording");
            return;
        };
        session.active = false;
        session.encoder.stop();
        tracing::info!(elapsed = session.elapsed, "capture stopped, finalising");
        self.finalizing.push(session);
    }

    /// Drops the active session without producing an artifact.
    pub fn abort(&mut self) {
        self.stop_on_end = false;
        if let Some(mut session) = self.session.take() {
            session.encoder.stop();
            tracing::info!("capture rolled back");
        }
    }

    /// Starts a session if idle, stops the active one otherwise. Returns
    /// whether a session is active afterwards.
    pub fn toggle(&mut self, canvas: &Canvas, audio: Option<AudioTrackInfo>) -> Result<bool> {
        if self.is_recording() {
            self.stop();
            Ok(false)
        } else {
            self.start(canvas, audio)?;
            Ok(true)
        }
    }

    /// Arms a one-shot stop for the next end-of-playback event.
    pub fn arm_stop_on_end(&mut self) {
        if self.is_recording() {
            self.stop_on_end = true;
        }
    }

    /// End-of-playback listener. Fires the armed stop at most once.
    pub fn on_playback_ended(&mut self) {
        if std::mem::take(&mut self.stop_on_end) {
            tracing::debug!("playback ended, stopping capture");
            self.stop();
        }
    }

    /// Collects finished sessions. Each entry is an artifact ready to offer
    /// or the reason the encoder gave up.
    pub fn poll(&mut self) -> Vec<Result<Artifact>> {
        self.collect_active();

        let mut finished = std::mem::take(&mut self.finished);
        let mut index = 0;
        while index < self.finalizing.len() {
            match self.finalizing[index].collect() {
                None => index += 1,
                Some(outcome) => {
                    let session = self.finalizing.remove(index);
                    finished.push(match outcome {
                        Ok(()) => Ok(session.into_artifact(&self.config.file_prefix)),
                        Err(reason) => Err(AuraluxError::msg(format!(
                            "Recording could not be finalised: {reason}"
                        ))),
                    });
                }
            }
        }
        finished
    }
}

impl std::fmt::Debug for CaptureController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureController")
            .field("session", &self.session)
            .field("finalizing", &self.finalizing.len())
            .field("stop_on_end", &self.stop_on_end)
            .finish()
    }
}
