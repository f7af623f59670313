use super::{
    decoder::resample_linear,
    device::{AudioOutput, InputDevice, LiveStream},
    ring::SampleRing,
    source::{AudioSource, MediaElement, MediaEvent, SourceKind},
};
use crate::{config::validate_fft_size, Analyser, AudioConfig, AuraluxError, Result};

/// Single multiplicative volume control shared by monitoring and capture.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    value: f32,
}

impl GainStage {
    /// Gain stage multiplying by `value`.
    pub fn new(value: f32) -> Self {
        Self { value }
    }

    pub fn value(&self) -> f32 {
        self.value
    }

    fn apply(&self, samples: &mut [f32]) {
        if (self.value - 1.0).abs() <= f32::EPSILON {
            return;
        }
        for sample in samples {
            *sample *= self.value;
        }
    }
}

/// Description of the audio track the capture tap can contribute to a
/// recording.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioTrackInfo {
    pub sample_rate: u32,
    pub channels: u16,
}

/// Graph branch that hands post-gain audio to the recorder.
#[derive(Debug)]
pub struct CaptureTap {
    sample_rate: u32,
    ring: SampleRing,
}

impl CaptureTap {
    fn new(sample_rate: u32, seconds: f32) -> Self {
        Self {
            sample_rate,
            ring: SampleRing::with_duration(seconds, sample_rate),
        }
    }

    /// Format of the audio the tap hands out.
    pub fn track(&self) -> AudioTrackInfo {
        AudioTrackInfo {
            sample_rate: self.sample_rate,
            channels: 1,
        }
    }

    /// Samples waiting to be drained.
    pub fn buffered(&self) -> usize {
        self.ring.len()
    }
}

/// The processing nodes that outlive any individual source: gain, analysis
/// tap and capture tap. Created once, on first use.
#[derive(Debug)]
pub struct AudioContext {
    sample_rate: u32,
    gain: GainStage,
    analyser: Analyser,
    capture_tap: CaptureTap,
}

impl AudioContext {
    fn new(config: &AudioConfig, gain: f32, fft_size: usize) -> Result<Self> {
        let analyser = Analyser::new(&AudioConfig {
            fft_size,
            ..config.clone()
        })?;
        Ok(Self {
            sample_rate: config.sample_rate,
            gain: GainStage::new(gain),
            analyser,
            capture_tap: CaptureTap::new(config.sample_rate, config.capture_tap_seconds),
        })
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn gain(&self) -> GainStage {
        self.gain
    }

    /// The analysis tap.
    pub fn analyser(&self) -> &Analyser {
        &self.analyser
    }

    pub fn capture_tap(&self) -> &CaptureTap {
        &self.capture_tap
    }

    /// source → gain → {analyser → output, capture tap}
    fn route(&mut self, block: &mut [f32], output: &mut dyn AudioOutput) {
        if block.is_empty() {
            return;
        }
        self.gain.apply(block);
        self.analyser.push_samples(block);
        self.capture_tap.ring.extend(block);
        output.write(block);
    }
}

/// Owner of the audio processing graph.
///
/// Only this type creates or destroys nodes. The shared [`AudioContext`] is
/// instantiated lazily and then reused across every source switch; at most
/// one source is connected to the gain stage at a time.
pub struct SignalGraphManager {
    config: AudioConfig,
    context: Option<AudioContext>,
    contexts_created: usize,
    source: Option<AudioSource>,
    input: Box<dyn InputDevice>,
    output: Box<dyn AudioOutput>,
    gain: f32,
    fft_size: usize,
    block: Vec<f32>,
    sample_debt: f64,
}

impl SignalGraphManager {
    /// Validates `config`. No context exists until the first source is bound.
    pub fn new(
        config: AudioConfig,
        input: Box<dyn InputDevice>,
        output: Box<dyn AudioOutput>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gain: config.volume,
            fft_size: config.fft_size,
            config,
            context: None,
            contexts_created: 0,
            source: None,
            input,
            output,
            block: Vec::new(),
            sample_debt: 0.0,
        })
    }

    /// Returns the shared context, creating it on first use.
    pub fn ensure_context(&mut self) -> Result<&mut AudioContext> {
        if self.context.is_none() {
            let context = AudioContext::new(&self.config, self.gain, self.fft_size)?;
            self.contexts_created += 1;
            tracing::info!(
                sample_rate = context.sample_rate,
                fft_size = self.fft_size,
                "audio context created"
            );
            self.context = Some(context);
        }
        self.context
            .as_mut()
            .ok_or_else(|| AuraluxError::msg("audio context unavailable"))
    }

    /// `None` until the first source needs a graph.
    pub fn context(&self) -> Option<&AudioContext> {
        self.context.as_ref()
    }

    /// How many contexts were ever built.
    pub fn contexts_created(&self) -> usize {
        self.contexts_created
    }

    /// Drops the context and every node hanging off it. Only meant for tests
    /// and process shutdown; normal operation never recreates the context.
    pub fn close_context(&mut self) {
        self.teardown();
        self.source = None;
        self.context = None;
    }

    pub fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    pub fn source(&self) -> Option<&AudioSource> {
        self.source.as_ref()
    }

    /// Kind of the connected source, if any.
    pub fn source_kind(&self) -> Option<SourceKind> {
        self.source.as_ref().map(AudioSource::kind)
    }

    /// The bound file, when the source is a file.
    pub fn file_element(&self) -> Option<&MediaElement> {
        match &self.source {
            Some(AudioSource::File(element)) => Some(element),
            _ => None,
        }
    }

    pub fn file_element_mut(&mut self) -> Option<&mut MediaElement> {
        match &mut self.source {
            Some(AudioSource::File(element)) => Some(element),
            _ => None,
        }
    }

    /// Number of source nodes wired into the gain stage: zero or one.
    pub fn connected_sources(&self) -> usize {
        usize::from(self.context.is_some() && self.source.is_some())
    }

    /// Binds a decoded file as the source. Any previous source is detached
    /// first, releasing live-input tracks. If binding fails the graph is left
    /// stopped with no source.
    pub fn activate_file_source(&mut self, element: MediaElement) {
        self.detach_source();

        if element.is_empty() {
            tracing::warn!(name = element.name(), "refusing to bind an empty file source");
            return;
        }
        if let Err(err) = self.ensure_context() {
            tracing::warn!(%err, "could not build the signal graph for file source");
            return;
        }

        tracing::info!(
            name = element.name(),
            duration = element.duration(),
            "file source connected"
        );
        self.source = Some(AudioSource::File(element));
    }

    /// Requests a live stream from the input device without touching the
    /// current graph.
    pub fn request_live_stream(&mut self) -> Result<Box<dyn LiveStream>> {
        self.input.open().map_err(|err| match err {
            AuraluxError::PermissionDenied(_) => err,
            other => AuraluxError::PermissionDenied(other.to_string()),
        })
    }

    /// Connects an already granted live stream in place of the current source.
    pub fn attach_live_stream(&mut self, mut stream: Box<dyn LiveStream>) -> Result<()> {
        if let Err(err) = self.ensure_context() {
            stream.stop_tracks();
            return Err(err);
        }
        self.detach_source();
        tracing::info!(device = stream.label(), "live input connected");
        self.source = Some(AudioSource::LiveInput(stream));
        Ok(())
    }

    /// Requests the live input and, once granted, rebuilds the graph around
    /// it. On refusal the previous source stays connected.
    pub fn activate_live_input(&mut self) -> Result<()> {
        let stream = self.request_live_stream()?;
        self.attach_live_stream(stream)
    }

    /// Disconnects the current source, releasing live-input tracks.
    pub fn detach_source(&mut self) {
        if let Some(source) = self.source.take() {
            match source {
                AudioSource::LiveInput(mut stream) => stream.stop_tracks(),
                AudioSource::File(mut element) => element.pause(),
            }
        }
        self.output.pause();
        self.sample_debt = 0.0;
    }

    /// Stops all transport: a file source is paused and rewound, a live
    /// stream has its tracks released and is disconnected. Idempotent.
    pub fn teardown(&mut self) {
        self.output.pause();
        self.sample_debt = 0.0;
        match self.source.take() {
            Some(AudioSource::File(mut element)) => {
                element.rewind();
                self.source = Some(AudioSource::File(element));
            }
            Some(AudioSource::LiveInput(mut stream)) => stream.stop_tracks(),
            None => {}
        }
    }

    /// Sets the gain value. No clamping happens here; values above one amplify.
    pub fn set_gain(&mut self, value: f32) {
        self.gain = value;
        if let Some(context) = self.context.as_mut() {
            context.gain = GainStage::new(value);
        }
    }

    /// Current gain value.
    pub fn gain(&self) -> f32 {
        self.gain
    }

    /// Resizes the analysis tap. Takes effect on the next spectrum sample.
    pub fn set_analysis_resolution(&mut self, fft_size: usize) -> Result<()> {
        validate_fft_size(fft_size)?;
        if let Some(context) = self.context.as_mut() {
            context.analyser.set_fft_size(fft_size)?;
        }
        self.fft_size = fft_size;
        Ok(())
    }

    /// FFT size used by the analysis tap.
    pub fn analysis_resolution(&self) -> usize {
        self.fft_size
    }

    /// The analysis tap, or `None` while no graph exists.
    pub fn analyser_mut(&mut self) -> Option<&mut Analyser> {
        self.context.as_mut().map(|context| &mut context.analyser)
    }

    /// Audio track the capture tap offers, once a context exists.
    pub fn capture_track(&self) -> Option<AudioTrackInfo> {
        self.context
            .as_ref()
            .map(|context| context.capture_tap.track())
    }

    /// Moves everything the capture tap collected onto the end of `out`.
    pub fn drain_capture_tap(&mut self, out: &mut Vec<f32>) {
        if let Some(context) = self.context.as_mut() {
            context.capture_tap.ring.drain_into(out);
        }
    }

    /// Starts the listening output. Refusal surfaces as [`AuraluxError::AutoplayBlocked`].
    pub fn start_output(&mut self) -> Result<()> {
        self.output.start().map_err(|err| match err {
            AuraluxError::AutoplayBlocked(_) => err,
            other => AuraluxError::AutoplayBlocked(other.to_string()),
        })
    }

    /// Silences the listening output.
    pub fn pause_output(&mut self) {
        self.output.pause();
    }

    /// Pulls `seconds` worth of audio through the graph and returns the
    /// media events the source raised meanwhile.
    ///
    /// A live stream delivers whatever the device captured. Otherwise the
    /// graph runs on elapsed time: a paused, ended or exhausted file, or no
    /// source at all, contributes silence, so the spectrum decays and the
    /// capture tap keeps pace with the recorded video.
    pub fn process(&mut self, seconds: f64) -> Vec<MediaEvent> {
        let Some(context) = self.context.as_mut() else {
            return Vec::new();
        };
        self.block.clear();

        if let Some(AudioSource::LiveInput(stream)) = self.source.as_mut() {
            stream.drain_into(&mut self.block);
            if stream.sample_rate() != context.sample_rate {
                let mut converted =
                    resample_linear(&self.block, stream.sample_rate(), context.sample_rate);
                context.route(&mut converted, self.output.as_mut());
            } else {
                context.route(&mut self.block, self.output.as_mut());
            }
            return Vec::new();
        }

        self.sample_debt += seconds.max(0.0) * context.sample_rate as f64;
        let frames = self.sample_debt.floor() as usize;
        self.sample_debt -= frames as f64;
        self.block.resize(frames, 0.0);

        let events = match self.source.as_mut() {
            Some(AudioSource::File(element)) => {
                element.read(&mut self.block);
                element.take_events()
            }
            _ => Vec::new(),
        };
        context.route(&mut self.block, self.output.as_mut());
        events
    }
}

impl std::fmt::Debug for SignalGraphManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalGraphManager")
            .field("context", &self.context)
            .field("contexts_created", &self.contexts_created)
            .field("source", &self.source)
            .field("gain", &self.gain)
            .field("fft_size", &self.fft_size)
            .finish()
    }
}
