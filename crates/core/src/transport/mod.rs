//! Transport/State facade: the single entry point a presentation layer
//! drives. Owns the playback state and sequences the graph, the render loop
//! and the capture controller.

use std::{
    path::{Path, PathBuf},
    sync::mpsc::{Receiver, TryRecvError},
};

use serde::{Deserialize, Serialize};

use crate::{
    analysis::SpectrumSampler,
    audio::{
        spawn_decode, AudioOutput, CpalInputDevice, CpalOutput, DecodedAudio, InputDevice,
        MediaElement, MediaEvent, NullOutput, SignalGraphManager, SourceKind,
    },
    config::{AppConfig, Theme, VisualMode},
    record::{
        Artifact, ArtifactSink, CaptureController, CaptureHost, DirectorySink, FfmpegCaptureHost,
    },
    render::{FrameStats, RenderEngine},
    AuraluxError, Result,
};

/// Upper bound of the volume control.
pub const MAX_VOLUME: f32 = 2.0;

/// The observable playback state. Only the facade writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PlaybackState {
    pub source: Option<SourceKind>,
    pub is_playing: bool,
    pub current_time: f64,
    pub duration: f64,
    pub file_name: Option<String>,
}

/// The host implementations a [`Visualizer`] runs on.
pub struct Hosts {
    pub input: Box<dyn InputDevice>,
    pub output: Box<dyn AudioOutput>,
    pub capture: Box<dyn CaptureHost>,
    pub sink: Box<dyn ArtifactSink>,
}

impl Hosts {
    /// Default microphone, `ffmpeg` for recording, artifacts saved under the
    /// configured output directory. With `monitor` set, audio is played on the
    /// default output device; otherwise it is discarded.
    pub fn native(config: &AppConfig, monitor: bool) -> Self {
        let output: Box<dyn AudioOutput> = if monitor {
            Box::new(CpalOutput::new(config.audio.sample_rate))
        } else {
            Box::new(NullOutput)
        };
        Self {
            input: Box::new(CpalInputDevice::new()),
            output,
            capture: Box::new(FfmpegCaptureHost::new()),
            sink: Box::new(DirectorySink::new(&config.capture.output_dir)),
        }
    }
}

struct PendingLoad {
    name: String,
    rx: Receiver<Result<DecodedAudio>>,
}

/// Everything that happened during one [`Visualizer::tick`].
#[derive(Debug, Default)]
pub struct TickReport {
    pub frame: Option<FrameStats>,
    pub loaded: Option<String>,
    pub ended: bool,
    pub artifacts: Vec<PathBuf>,
}

pub struct Visualizer {
    config: AppConfig,
    graph: SignalGraphManager,
    sampler: SpectrumSampler,
    render: RenderEngine,
    capture: CaptureController,
    sink: Box<dyn ArtifactSink>,
    state: PlaybackState,
    pending: Option<PendingLoad>,
    play_requested: bool,
    notices: Vec<AuraluxError>,
}

impl Visualizer {
    /// Validates `config` and wires the components. Nothing is opened or
    /// decoded until a source is chosen.
    pub fn new(config: AppConfig, theme: Theme, hosts: Hosts) -> Result<Self> {
        config.validate()?;
        let mut audio = config.audio.clone();
        audio.volume = clamp_volume(audio.volume).unwrap_or(1.0);

        let graph = SignalGraphManager::new(audio, hosts.input, hosts.output)?;
        let capture = CaptureController::new(config.capture.clone(), hosts.capture)?;
        let render = RenderEngine::new(&config.visual, theme);

        Ok(Self {
            config,
            graph,
            sampler: SpectrumSampler::new(),
            render,
            capture,
            sink: hosts.sink,
            state: PlaybackState::default(),
            pending: None,
            play_requested: false,
            notices: Vec::new(),
        })
    }

    /// Replaces the particle field with a seeded one.
    pub fn with_particle_seed(mut self, seed: u64) -> Self {
        let theme = self.render.theme();
        let mut visual = self.config.visual.clone();
        visual.mode = self.render.mode();
        visual.sensitivity = self.render.sensitivity();
        self.render = RenderEngine::with_particle_seed(&visual, theme, seed);
        self
    }

    /// Snapshot of the playback state.
    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// The render engine, for inspecting the surface.
    pub fn render(&self) -> &RenderEngine {
        &self.render
    }

    pub fn capture(&self) -> &CaptureController {
        &self.capture
    }

    pub fn graph(&self) -> &SignalGraphManager {
        &self.graph
    }

    /// Whether a file is still being decoded.
    pub fn is_loading(&self) -> bool {
        self.pending.is_some()
    }

    pub fn is_recording(&self) -> bool {
        self.capture.is_recording()
    }

    /// Failures that surfaced asynchronously since the last call.
    pub fn take_notices(&mut self) -> Vec<AuraluxError> {
        std::mem::take(&mut self.notices)
    }

    fn notice(&mut self, err: AuraluxError) {
        tracing::warn!(%err, "notice");
        self.notices.push(err);
    }

    // Transport

    /// Starts or resumes playback. While a load is pending the request is
    /// remembered and honoured once the file is ready.
    pub fn play(&mut self) -> Result<()> {
        if self.pending.is_some() {
            tracing::debug!("play deferred until the pending load resolves");
            self.play_requested = true;
            return Ok(());
        }
        match self.graph.source_kind() {
            None => Err(AuraluxError::NoSource),
            Some(SourceKind::LiveInput) => {
                self.render.start();
                Ok(())
            }
            Some(SourceKind::File) => self.start_file_playback(),
        }
    }

    fn start_file_playback(&mut self) -> Result<()> {
        let Some(element) = self.graph.file_element_mut() else {
            return Err(AuraluxError::NoSource);
        };
        element.play();

        if let Err(err) = self.graph.start_output() {
            if let Some(element) = self.graph.file_element_mut() {
                element.pause();
            }
            self.state.is_playing = false;
            return Err(err);
        }

        self.sync_position();
        self.state.is_playing = true;
        self.render.start();
        tracing::info!(at = self.state.current_time, "playback started");
        Ok(())
    }

    /// Pauses a file source. Live input has no pause.
    pub fn pause(&mut self) {
        self.play_requested = false;
        if !self.source_supports_pause() {
            tracing::debug!("pause ignored for current source");
            return;
        }
        if let Some(element) = self.graph.file_element_mut() {
            element.pause();
        }
        self.graph.pause_output();
        self.state.is_playing = false;
    }

    /// Finalises any capture, cancels the frame loop, then stops and rewinds
    /// the source. Live input is released.
    pub fn stop(&mut self) {
        self.play_requested = false;
        self.capture.stop();
        self.render.stop();
        self.graph.teardown();

        self.state.is_playing = false;
        self.state.source = self.graph.source_kind();
        if self.state.source.is_none() {
            self.state.duration = 0.0;
            self.state.file_name = None;
        }
        self.sync_position();
        tracing::info!("transport stopped");
    }

    /// Moves the playback head of a file source.
    pub fn seek(&mut self, seconds: f64) {
        if !self.source_supports_seek() {
            tracing::debug!("seek ignored for current source");
            return;
        }
        if let Some(element) = self.graph.file_element_mut() {
            element.seek(seconds);
        }
        self.sync_position();
    }

    /// Volume in `[0, MAX_VOLUME]`, applied at the gain stage shared by
    /// listening, analysis and capture.
    pub fn set_volume(&mut self, volume: f32) {
        if let Some(volume) = clamp_volume(volume) {
            self.graph.set_gain(volume);
        }
    }

    /// Current volume.
    pub fn volume(&self) -> f32 {
        self.graph.gain()
    }

    fn source_supports_pause(&self) -> bool {
        self.graph
            .source_kind()
            .is_some_and(SourceKind::supports_pause)
    }

    fn source_supports_seek(&self) -> bool {
        self.graph
            .source_kind()
            .is_some_and(SourceKind::supports_seek)
    }

    fn sync_position(&mut self) {
        self.state.current_time = self
            .graph
            .file_element()
            .map(MediaElement::current_time)
            .unwrap_or(0.0);
    }

    // Sources

    /// Starts decoding `path` in the background. The previous source is
    /// released right away; the file is bound on a later tick.
    pub fn load_file(&mut self, path: &Path) {
        let name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());

        self.switch_away();
        tracing::info!(%name, "loading file");
        let rx = spawn_decode(path.to_path_buf(), self.graph.sample_rate());
        self.state.file_name = Some(name.clone());
        self.pending = Some(PendingLoad { name, rx });
    }

    /// Binds already decoded audio as the file source.
    pub fn load_decoded(&mut self, name: impl Into<String>, audio: DecodedAudio) {
        self.switch_away();
        self.bind_file(name.into(), audio);
    }

    fn bind_file(&mut self, name: String, audio: DecodedAudio) {
        let audio = audio.resampled(self.graph.sample_rate());
        self.graph
            .activate_file_source(MediaElement::new(name.clone(), audio));

        self.state.source = self.graph.source_kind();
        if self.state.source.is_none() {
            self.state.file_name = None;
            self.state.duration = 0.0;
            self.notice(AuraluxError::LoadFailure(format!("{name} contains no audio")));
            return;
        }
        self.state.file_name = Some(name);
        self.state.duration = self
            .graph
            .file_element()
            .map(MediaElement::duration)
            .unwrap_or(0.0);
        self.state.is_playing = false;
        self.sync_position();
    }

    /// Stops capture and rendering, drops any pending load and disconnects
    /// the current source ahead of a switch.
    fn switch_away(&mut self) {
        self.capture.stop();
        self.render.stop();
        self.pending = None;
        self.play_requested = false;
        self.graph.detach_source();
        self.state = PlaybackState::default();
    }

    /// Switches to the live capture device. On refusal nothing changes.
    pub fn use_live_input(&mut self) -> Result<()> {
        let mut stream = self.graph.request_live_stream()?;
        if let Err(err) = self.graph.ensure_context() {
            stream.stop_tracks();
            return Err(err);
        }
        self.switch_away();
        self.graph.attach_live_stream(stream)?;

        self.state.source = Some(SourceKind::LiveInput);
        self.state.is_playing = true;
        self.render.start();
        Ok(())
    }

    // Capture

    /// Starts recording the surface and the capture tap. Does nothing while
    /// a recording is already running.
    pub fn start_recording(&mut self) -> Result<()> {
        if self.capture.is_recording() {
            return Ok(());
        }
        self.discard_tapped_audio();
        let track = self.graph.capture_track();
        self.capture.start(self.render.canvas(), track)
    }

    /// Finalises the running recording; the artifact is offered on a later
    /// tick.
    pub fn stop_recording(&mut self) {
        self.capture.stop();
    }

    /// Returns whether a recording is active afterwards.
    pub fn toggle_recording(&mut self) -> Result<bool> {
        if self.capture.is_recording() {
            self.capture.stop();
            Ok(false)
        } else {
            self.start_recording()?;
            Ok(true)
        }
    }

    /// Records the loaded file from the start until it ends. Refused while
    /// another recording is running.
    pub fn export_full_track(&mut self) -> Result<()> {
        match self.graph.source_kind() {
            Some(SourceKind::LiveInput) => return Err(AuraluxError::ExportRequiresFile),
            None => return Err(AuraluxError::NoSource),
            Some(SourceKind::File) => {}
        }
        if self.pending.is_some() {
            return Err(AuraluxError::NoSource);
        }
        if self.capture.is_recording() {
            return Err(AuraluxError::RecordingInProgress);
        }

        if let Some(element) = self.graph.file_element_mut() {
            element.seek(0.0);
        }
        self.start_recording()?;

        if let Err(err) = self.start_file_playback() {
            self.capture.abort();
            tracing::warn!(%err, "track export rolled back");
            return Err(err);
        }
        self.capture.arm_stop_on_end();
        tracing::info!(duration = self.state.duration, "track export started");
        Ok(())
    }

    /// Saves the current frame as a PNG.
    pub fn screenshot(&mut self) -> Result<PathBuf> {
        let png = self.render.canvas().to_png()?;
        self.sink.offer(&Artifact::screenshot(png))
    }

    fn discard_tapped_audio(&mut self) {
        let mut scratch = self.capture.take_audio_scratch();
        self.graph.drain_capture_tap(&mut scratch);
        scratch.clear();
        self.capture.restore_audio_scratch(scratch);
    }

    // Configuration

    /// Switches the visual mode.
    pub fn set_mode(&mut self, mode: VisualMode) {
        self.render.set_mode(mode);
    }

    /// Sensitivity in `[0, 2]`, applied to every mode.
    pub fn set_sensitivity(&mut self, sensitivity: f32) {
        self.render.set_sensitivity(sensitivity);
    }

    /// Changes the analysis resolution; must be a power of two.
    pub fn set_fft_size(&mut self, fft_size: usize) -> Result<()> {
        self.graph.set_analysis_resolution(fft_size)
    }

    /// Resizes the drawing surface. A recording cannot change frame size,
    /// so one in progress is finalised at the old size and a notice raised.
    pub fn resize(&mut self, css_width: f32, css_height: f32, device_pixel_ratio: f32) {
        let canvas = self.render.canvas();
        let before = (canvas.pixel_width(), canvas.pixel_height());
        self.render
            .resize(css_width, css_height, device_pixel_ratio);

        let canvas = self.render.canvas();
        let after = (canvas.pixel_width(), canvas.pixel_height());
        if before != after && self.capture.is_recording() {
            self.capture.stop();
            self.notice(AuraluxError::msg(
                "Recording stopped because the visualiser was resized.",
            ));
        }
    }

    /// Changes the palette.
    pub fn set_theme(&mut self, theme: Theme) {
        self.render.set_theme(theme);
    }

    // Loop

    /// Advances everything by `dt` seconds: resolves a finished load, pulls
    /// audio through the graph, runs the due frame, feeds the recorder and
    /// offers finished artifacts.
    pub fn tick(&mut self, dt: f64) -> TickReport {
        let dt = if dt.is_finite() { dt.max(0.0) } else { 0.0 };
        let mut report = TickReport {
            loaded: self.resolve_pending_load(),
            ..TickReport::default()
        };

        let events = self.graph.process(dt);
        for event in &events {
            if let MediaEvent::TimeUpdate(time) = event {
                self.state.current_time = *time;
            }
        }

        if self.render.frame_due().is_some() {
            let frame = self.sampler.sample(self.graph.analyser_mut());
            report.frame = Some(self.render.render_frame(frame));
        }

        let mut scratch = self.capture.take_audio_scratch();
        self.graph.drain_capture_tap(&mut scratch);
        self.capture.capture_frame(self.render.canvas(), &scratch, dt);
        self.capture.restore_audio_scratch(scratch);

        if events.contains(&MediaEvent::Ended) {
            report.ended = true;
            self.on_ended();
        }

        for finished in self.capture.poll() {
            match finished.and_then(|artifact| self.sink.offer(&artifact)) {
                Ok(path) => report.artifacts.push(path),
                Err(err) => self.notice(err),
            }
        }
        report
    }

    fn on_ended(&mut self) {
        tracing::info!(duration = self.state.duration, "playback ended");
        self.state.is_playing = false;
        self.graph.pause_output();
        self.capture.on_playback_ended();
        self.render.stop();
        self.sync_position();
    }

    fn resolve_pending_load(&mut self) -> Option<String> {
        let pending = self.pending.as_ref()?;
        let outcome = match pending.rx.try_recv() {
            Ok(outcome) => outcome,
            Err(TryRecvError::Empty) => return None,
            Err(TryRecvError::Disconnected) => Err(AuraluxError::LoadFailure(
                "decoder stopped unexpectedly".into(),
            )),
        };
        let name = self.pending.take().map(|pending| pending.name)?;
        let play = std::mem::take(&mut self.play_requested);

        match outcome {
            Ok(audio) => {
                self.bind_file(name.clone(), audio);
                tracing::info!(%name, duration = self.state.duration, "metadata loaded");
                if play && self.state.source.is_some() {
                    if let Err(err) = self.play() {
                        self.notice(err);
                    }
                }
                Some(name)
            }
            Err(err) => {
                self.state.file_name = None;
                self.notice(err);
                None
            }
        }
    }
}

fn clamp_volume(volume: f32) -> Option<f32> {
    volume.is_finite().then(|| volume.clamp(0.0, MAX_VOLUME))
}

impl std::fmt::Debug for Visualizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Visualizer")
            .field("state", &self.state)
            .field("graph", &self.graph)
            .field("render", &self.render)
            .field("capture", &self.capture)
            .field("loading", &self.pending.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc, time::Duration};

    use super::*;
    use crate::testing::{FakeCaptureHost, FakeInput, FakeOutput, MemorySink, Written};

    const RATE: u32 = 4_000;
    const FRAME: f64 = 1.0 / 60.0;

    struct Rig {
        viz: Visualizer,
        artifacts: Rc<RefCell<Vec<Artifact>>>,
        released: Rc<std::cell::Cell<usize>>,
        blocked: Rc<std::cell::Cell<bool>>,
        written: Rc<std::cell::Cell<Written>>,
    }

    fn rig_with(input: FakeInput) -> Rig {
        rig_on(input, FakeCaptureHost::default())
    }

    fn rig_on(input: FakeInput, capture: FakeCaptureHost) -> Rig {
        let mut config = AppConfig::default();
        config.audio.sample_rate = RATE;
        config.audio.fft_size = 64;
        config.visual.width = 48.0;
        config.visual.height = 27.0;

        let sink = MemorySink::default();
        let artifacts = sink.artifacts();
        let released = input.released_counter();
        let output = FakeOutput::default();
        let blocked = output.blocked_handle();
        let written = capture.written();
        let hosts = Hosts {
            input: Box::new(input),
            output: Box::new(output),
            capture: Box::new(capture),
            sink: Box::new(sink),
        };
        let viz = Visualizer::new(config, Theme::Dark, hosts)
            .unwrap()
            .with_particle_seed(9);
        Rig {
            viz,
            artifacts,
            released,
            blocked,
            written,
        }
    }

    fn rig() -> Rig {
        rig_with(FakeInput::granting(RATE))
    }

    fn tone(seconds: f64) -> DecodedAudio {
        let len = (seconds * RATE as f64) as usize;
        let samples = (0..len)
            .map(|i| (i as f32 * 0.3).sin() * 0.5)
            .collect();
        DecodedAudio::new(samples, RATE)
    }

    #[test]
    fn full_track_export_spans_the_track() {
        let mut rig = rig();
        rig.viz.load_decoded("ten.wav", tone(10.0));
        rig.viz.export_full_track().unwrap();
        assert!(rig.viz.is_recording());

        let mut ticks = 0;
        while (rig.viz.is_recording() || rig.viz.capture().is_finalizing()) && ticks < 2_000 {
            rig.viz.tick(FRAME);
            ticks += 1;
        }

        let artifacts = rig.artifacts.borrow();
        assert_eq!(artifacts.len(), 1);
        let timeslice = rig.viz.config().capture.timeslice_secs();
        assert!((artifacts[0].duration_secs - 10.0).abs() <= timeslice);
        assert!(!rig.viz.state().is_playing);
        assert!(!rig.viz.render().is_running());
    }

    #[test]
    fn export_rejects_live_input_without_side_effects() {
        let mut rig = rig();
        rig.viz.use_live_input().unwrap();
        let before = rig.viz.state().clone();

        let err = rig.viz.export_full_track().unwrap_err();
        assert!(matches!(err, AuraluxError::ExportRequiresFile));
        assert!(!rig.viz.is_recording());
        assert_eq!(rig.viz.state(), &before);
        rig.viz.tick(FRAME);
        assert!(rig.artifacts.borrow().is_empty());
    }

    #[test]
    fn export_without_file_is_rejected() {
        let mut rig = rig();
        assert!(matches!(
            rig.viz.export_full_track(),
            Err(AuraluxError::NoSource)
        ));
    }

    #[test]
    fn blocked_autoplay_rolls_back_export() {
        let mut rig = rig();
        rig.blocked.set(true);
        rig.viz.load_decoded("song.wav", tone(2.0));

        let err = rig.viz.export_full_track().unwrap_err();
        assert!(matches!(err, AuraluxError::AutoplayBlocked(_)));
        assert!(!rig.viz.is_recording());
        assert!(!rig.viz.state().is_playing);
        for _ in 0..10 {
            rig.viz.tick(FRAME);
        }
        assert!(rig.artifacts.borrow().is_empty());

        rig.blocked.set(false);
        rig.viz.export_full_track().unwrap();
        assert!(rig.viz.is_recording());
    }

    #[test]
    fn export_is_refused_while_recording() {
        let mut rig = rig();
        rig.viz.load_decoded("song.wav", tone(5.0));
        rig.viz.play().unwrap();
        rig.viz.start_recording().unwrap();
        for _ in 0..60 {
            rig.viz.tick(FRAME);
        }
        rig.viz.pause();
        rig.blocked.set(true);
        let position = rig.viz.state().current_time;

        let err = rig.viz.export_full_track().unwrap_err();
        assert!(matches!(err, AuraluxError::RecordingInProgress));
        assert!(rig.viz.is_recording());
        assert_eq!(rig.viz.state().current_time, position);

        rig.viz.start_recording().unwrap();
        assert!(rig.viz.is_recording());
        rig.viz.stop_recording();
        rig.viz.tick(FRAME);
        assert_eq!(rig.artifacts.borrow().len(), 1);
    }

    #[test]
    fn recording_across_a_pause_keeps_audio_and_video_in_step() {
        let mut rig = rig();
        rig.viz.load_decoded("song.wav", tone(5.0));
        rig.viz.play().unwrap();
        rig.viz.start_recording().unwrap();
        for _ in 0..120 {
            rig.viz.tick(FRAME);
        }
        rig.viz.pause();
        for _ in 0..120 {
            rig.viz.tick(FRAME);
        }
        rig.viz.stop_recording();

        let written = rig.written.get();
        let fps = rig.viz.config().capture.fps as f64;
        let video_secs = written.frames as f64 / fps;
        let audio_secs = written.samples as f64 / RATE as f64;
        assert!((video_secs - 4.0).abs() <= 2.0 / fps);
        assert!((video_secs - audio_secs).abs() <= 2.0 / fps);
    }

    #[test]
    fn encoder_crash_becomes_a_notice() {
        let mut rig = rig_on(FakeInput::granting(RATE), FakeCaptureHost::failing_after(10));
        rig.viz.load_decoded("song.wav", tone(2.0));
        rig.viz.play().unwrap();
        rig.viz.start_recording().unwrap();
        for _ in 0..30 {
            rig.viz.tick(FRAME);
        }

        assert!(!rig.viz.is_recording());
        assert!(!rig.viz.capture().is_finalizing());
        let notices = rig.viz.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].to_string().contains("encoder crashed"));
        assert!(rig.artifacts.borrow().is_empty());
        assert!(rig.viz.state().is_playing);
    }

    #[test]
    fn resizing_finalises_a_running_recording() {
        let mut rig = rig();
        rig.viz.load_decoded("song.wav", tone(2.0));
        rig.viz.play().unwrap();
        rig.viz.start_recording().unwrap();
        for _ in 0..10 {
            rig.viz.tick(FRAME);
        }

        rig.viz.resize(48.0, 27.0, 1.0);
        assert!(rig.viz.is_recording());
        assert!(rig.viz.take_notices().is_empty());

        rig.viz.resize(96.0, 54.0, 1.0);
        assert!(!rig.viz.is_recording());
        assert_eq!(rig.viz.take_notices().len(), 1);
        rig.viz.tick(FRAME);
        assert_eq!(rig.artifacts.borrow().len(), 1);
        assert_eq!(rig.viz.render().canvas().pixel_width(), 96);
    }

    #[test]
    fn start_then_double_stop_offers_one_artifact() {
        let mut rig = rig();
        rig.viz.load_decoded("song.wav", tone(2.0));
        rig.viz.start_recording().unwrap();
        rig.viz.stop_recording();
        rig.viz.stop_recording();
        rig.viz.tick(FRAME);
        rig.viz.tick(FRAME);
        assert_eq!(rig.artifacts.borrow().len(), 1);
    }

    #[test]
    fn toggle_recording_alternates() {
        let mut rig = rig();
        rig.viz.load_decoded("song.wav", tone(1.0));
        assert!(rig.viz.toggle_recording().unwrap());
        rig.viz.tick(FRAME);
        assert!(!rig.viz.toggle_recording().unwrap());
        rig.viz.tick(FRAME);
        assert_eq!(rig.artifacts.borrow().len(), 1);
    }

    #[test]
    fn live_input_ignores_pause_and_seek() {
        let mut rig = rig();
        rig.viz.use_live_input().unwrap();
        rig.viz.pause();
        rig.viz.seek(3.0);
        assert!(rig.viz.state().is_playing);
        assert_eq!(rig.viz.state().current_time, 0.0);
        assert!(rig.viz.render().is_running());
    }

    #[test]
    fn stop_cancels_loop_and_releases_microphone() {
        let mut rig = rig();
        rig.viz.use_live_input().unwrap();
        rig.viz.tick(FRAME);
        rig.viz.stop();
        assert!(!rig.viz.render().is_running());
        assert_eq!(rig.released.get(), 1);
        assert_eq!(rig.viz.state().source, None);
        assert!(rig.viz.tick(FRAME).frame.is_none());
    }

    #[test]
    fn stop_mid_capture_finalises_before_teardown() {
        let mut rig = rig();
        rig.viz.load_decoded("song.wav", tone(3.0));
        rig.viz.play().unwrap();
        rig.viz.start_recording().unwrap();
        for _ in 0..30 {
            rig.viz.tick(FRAME);
        }
        rig.viz.stop();
        rig.viz.tick(FRAME);
        assert_eq!(rig.artifacts.borrow().len(), 1);
        assert_eq!(rig.viz.state().current_time, 0.0);
        assert_eq!(rig.viz.state().source, Some(SourceKind::File));
    }

    #[test]
    fn live_input_builds_the_context_before_switching() {
        let mut rig = rig();
        assert!(rig.viz.graph().context().is_none());
        rig.viz.use_live_input().unwrap();
        assert_eq!(rig.viz.graph().contexts_created(), 1);
        assert_eq!(rig.viz.graph().connected_sources(), 1);

        rig.viz.use_live_input().unwrap();
        assert_eq!(rig.viz.graph().contexts_created(), 1);
        assert_eq!(rig.released.get(), 1);
    }

    #[test]
    fn paused_spectrum_decays_to_silence() {
        let mut rig = rig();
        rig.viz.set_mode(VisualMode::Particles);
        rig.viz.load_decoded("song.wav", tone(5.0));
        rig.viz.play().unwrap();

        let mut playing = 0.0;
        for _ in 0..30 {
            if let Some(FrameStats::Particles(stats)) = rig.viz.tick(FRAME).frame {
                playing = stats.average_energy;
            }
        }
        assert!(playing > 0.0);

        rig.viz.pause();
        let mut paused = playing;
        for _ in 0..600 {
            if let Some(FrameStats::Particles(stats)) = rig.viz.tick(FRAME).frame {
                paused = stats.average_energy;
            }
        }
        assert!(rig.viz.render().is_running());
        assert_eq!(paused, 0.0);
    }

    #[test]
    fn denied_microphone_keeps_file_source() {
        let mut rig = rig_with(FakeInput::denying());
        rig.viz.load_decoded("song.wav", tone(1.0));
        rig.viz.play().unwrap();

        let err = rig.viz.use_live_input().unwrap_err();
        assert!(matches!(err, AuraluxError::PermissionDenied(_)));
        assert_eq!(rig.viz.state().source, Some(SourceKind::File));
        assert!(rig.viz.state().is_playing);
        assert!(rig.viz.render().is_running());
    }

    #[test]
    fn file_live_file_keeps_one_source() {
        let mut rig = rig();
        rig.viz.load_decoded("a.wav", tone(1.0));
        assert_eq!(rig.viz.graph().connected_sources(), 1);
        rig.viz.use_live_input().unwrap();
        assert_eq!(rig.viz.graph().connected_sources(), 1);
        rig.viz.load_decoded("b.wav", tone(1.0));
        assert_eq!(rig.viz.graph().connected_sources(), 1);
        assert_eq!(rig.released.get(), 1);
        assert_eq!(rig.viz.graph().contexts_created(), 1);
    }

    #[test]
    fn playback_updates_position_and_ends() {
        let mut rig = rig();
        rig.viz.load_decoded("short.wav", tone(0.5));
        assert_eq!(rig.viz.state().duration, 0.5);
        rig.viz.play().unwrap();

        let mut ended = 0;
        for _ in 0..60 {
            if rig.viz.tick(FRAME).ended {
                ended += 1;
            }
        }
        assert_eq!(ended, 1);
        assert_eq!(rig.viz.state().current_time, 0.5);
        assert!(!rig.viz.state().is_playing);

        rig.viz.play().unwrap();
        assert_eq!(rig.viz.state().current_time, 0.0);
        assert!(rig.viz.state().is_playing);
    }

    #[test]
    fn seek_clamps_for_files() {
        let mut rig = rig();
        rig.viz.load_decoded("song.wav", tone(2.0));
        rig.viz.seek(1.5);
        assert_eq!(rig.viz.state().current_time, 1.5);
        rig.viz.seek(9.0);
        assert_eq!(rig.viz.state().current_time, 2.0);
    }

    #[test]
    fn volume_is_clamped() {
        let mut rig = rig();
        rig.viz.set_volume(3.5);
        assert_eq!(rig.viz.volume(), MAX_VOLUME);
        rig.viz.set_volume(-1.0);
        assert_eq!(rig.viz.volume(), 0.0);
        rig.viz.set_volume(1.5);
        assert_eq!(rig.viz.volume(), 1.5);
    }

    fn write_wav(path: &Path, seconds: f32) {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec).unwrap();
        for i in 0..(seconds * RATE as f32) as usize {
            writer
                .write_sample(((i as f32 * 0.2).sin() * 8_000.0) as i16)
                .unwrap();
        }
        writer.finalize().unwrap();
    }

    fn tick_until_loaded(viz: &mut Visualizer) {
        for _ in 0..500 {
            viz.tick(FRAME);
            if !viz.is_loading() {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("load did not resolve");
    }

    #[test]
    fn play_during_pending_load_is_honoured() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.wav");
        write_wav(&path, 1.0);

        let mut rig = rig();
        rig.viz.load_file(&path);
        assert!(rig.viz.is_loading());
        rig.viz.play().unwrap();
        tick_until_loaded(&mut rig.viz);

        let state = rig.viz.state();
        assert_eq!(state.file_name.as_deref(), Some("clip.wav"));
        assert!((state.duration - 1.0).abs() < 1e-3);
        assert!(state.is_playing);
    }

    #[test]
    fn stop_during_pending_load_stays_idle() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.wav");
        write_wav(&path, 1.0);

        let mut rig = rig();
        rig.viz.load_file(&path);
        rig.viz.play().unwrap();
        rig.viz.stop();
        tick_until_loaded(&mut rig.viz);

        assert_eq!(rig.viz.state().source, Some(SourceKind::File));
        assert!(!rig.viz.state().is_playing);
        assert!(!rig.viz.render().is_running());
    }

    #[test]
    fn superseded_load_is_discarded() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("clip.wav");
        write_wav(&path, 1.0);

        let mut rig = rig();
        rig.viz.load_file(&path);
        rig.viz.use_live_input().unwrap();
        for _ in 0..20 {
            rig.viz.tick(FRAME);
        }
        assert_eq!(rig.viz.state().source, Some(SourceKind::LiveInput));
        assert!(!rig.viz.is_loading());
    }

    #[test]
    fn broken_file_becomes_a_notice() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("broken.mp3");
        std::fs::write(&path, b"not audio").unwrap();

        let mut rig = rig();
        rig.viz.load_file(&path);
        tick_until_loaded(&mut rig.viz);

        let notices = rig.viz.take_notices();
        assert_eq!(notices.len(), 1);
        assert!(matches!(notices[0], AuraluxError::LoadFailure(_)));
        assert_eq!(rig.viz.state().source, None);
        assert!(rig.viz.take_notices().is_empty());
    }

    #[test]
    fn screenshot_uses_fixed_name() {
        let mut rig = rig();
        let path = rig.viz.screenshot().unwrap();
        assert_eq!(path, PathBuf::from("auralux.png"));
        let artifacts = rig.artifacts.borrow();
        assert_eq!(artifacts[0].mime, "image/png");
        assert!(artifacts[0].bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn zero_sensitivity_renders_baseline() {
        let mut rig = rig();
        rig.viz.set_sensitivity(0.0);
        rig.viz.load_decoded("song.wav", tone(2.0));
        rig.viz.play().unwrap();
        rig.viz.set_mode(VisualMode::Particles);
        for _ in 0..20 {
            if let Some(FrameStats::Particles(stats)) = rig.viz.tick(FRAME).frame {
                assert_eq!(stats.average_energy, 0.0);
            }
        }
    }
}
