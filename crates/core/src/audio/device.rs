//! Audio hardware seams: the live capture device and the listening output.
//!
//! The signal graph only sees the traits; the cpal-backed types are what the
//! application wires in, tests substitute in-memory fakes.

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

use super::ring::SampleRing;
use crate::{AuraluxError, Result};

/// Seconds of audio buffered between a device callback and the graph.
const DEVICE_BUFFER_SECONDS: f32 = 0.5;

/// A capture device that may grant a live stream.
pub trait InputDevice {
    /// Requests the device. Refusal or absence is reported as
    /// [`AuraluxError::PermissionDenied`].
    fn open(&mut self) -> Result<Box<dyn LiveStream>>;
}

/// A granted live capture stream delivering mono samples.
pub trait LiveStream {
    fn label(&self) -> &str;

    fn sample_rate(&self) -> u32;

    /// Appends every sample captured since the previous call.
    fn drain_into(&mut self, out: &mut Vec<f32>);

    /// Releases the underlying device tracks. Further reads yield nothing.
    fn stop_tracks(&mut self);

    fn is_live(&self) -> bool;
}

/// The listening output at the end of the analysis branch.
pub trait AudioOutput {
    /// Begins (or resumes) audible output. Refusal is reported as
    /// [`AuraluxError::AutoplayBlocked`].
    fn start(&mut self) -> Result<()>;

    fn pause(&mut self);

    fn write(&mut self, samples: &[f32]);
}

/// Output that discards everything, for headless rendering.
#[derive(Debug, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn pause(&mut self) {}

    fn write(&mut self, _samples: &[f32]) {}
}

/// Input device backed by the default cpal capture device.
#[derive(Debug, Default, Clone)]
pub struct CpalInputDevice;

impl CpalInputDevice {
    pub fn new() -> Self {
        Self
    }
}

impl InputDevice for CpalInputDevice {
    fn open(&mut self) -> Result<Box<dyn LiveStream>> {
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| AuraluxError::PermissionDenied("no input device found".into()))?;
        let label = device.name().unwrap_or_else(|_| "Unknown".to_string());
        let supported = device
            .default_input_config()
            .map_err(|err| AuraluxError::PermissionDenied(err.to_string()))?;
        let sample_rate = supported.sample_rate().0;
        let channels = supported.channels() as usize;
        let config: cpal::StreamConfig = supported.config();
        let ring = Arc::new(Mutex::new(SampleRing::with_duration(
            DEVICE_BUFFER_SECONDS,
            sample_rate,
        )));

        let stream = match supported.sample_format() {
            cpal::SampleFormat::F32 => build_input::<f32>(&device, &config, channels, ring.clone()),
            cpal::SampleFormat::I16 => build_input::<i16>(&device, &config, channels, ring.clone()),
            cpal::SampleFormat::U16 => build_input::<u16>(&device, &config, channels, ring.clone()),
            other => Err(AuraluxError::PermissionDenied(format!(
                "unsupported input sample format {other:?}"
            ))),
        }?;
        stream
            .play()
            .map_err(|err| AuraluxError::PermissionDenied(err.to_string()))?;

        tracing::info!(device = %label, sample_rate, channels, "live input opened");
        Ok(Box::new(CpalLiveStream {
            label,
            sample_rate,
            ring,
            stream: Some(stream),
        }))
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    ring: Arc<Mutex<SampleRing>>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + Send + 'static,
    f32: cpal::FromSample<T>,
{
    let channels = channels.max(1);
    device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| {
                if let Ok(mut ring) = ring.lock() {
                    for frame in data.chunks(channels) {
                        let sum: f32 = frame
                            .iter()
                            .map(|sample| <f32 as cpal::Sample>::from_sample(*sample))
                            .sum();
                        ring.push(sum / frame.len() as f32);
                    }
                }
            },
            |err| tracing::warn!(%err, "input stream error"),
            None,
        )
        .map_err(|err| AuraluxError::PermissionDenied(err.to_string()))
}

/// Live stream fed by a cpal input callback.
pub struct CpalLiveStream {
    label: String,
    sample_rate: u32,
    ring: Arc<Mutex<SampleRing>>,
    stream: Option<cpal::Stream>,
}

impl LiveStream for CpalLiveStream {
    fn label(&self) -> &str {
        &self.label
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn drain_into(&mut self, out: &mut Vec<f32>) {
        if self.stream.is_none() {
            return;
        }
        if let Ok(mut ring) = self.ring.lock() {
            ring.drain_into(out);
        }
    }

    fn stop_tracks(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                tracing::debug!(%err, "input stream pause failed during release");
            }
            tracing::info!(device = %self.label, "live input released");
        }
        if let Ok(mut ring) = self.ring.lock() {
            ring.clear();
        }
    }

    fn is_live(&self) -> bool {
        self.stream.is_some()
    }
}

impl Drop for CpalLiveStream {
    fn drop(&mut self) {
        self.stop_tracks();
    }
}

/// Listening output on the default cpal playback device.
///
/// The stream is built lazily on the first `start`, which is where a host
/// that refuses playback reports it.
pub struct CpalOutput {
    sample_rate: u32,
    ring: Arc<Mutex<SampleRing>>,
    stream: Option<cpal::Stream>,
    playing: bool,
}

impl CpalOutput {
    /// Output fed at `sample_rate`. No device is opened yet.
    pub fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            ring: Arc::new(Mutex::new(SampleRing::with_duration(
                DEVICE_BUFFER_SECONDS,
                sample_rate,
            ))),
            stream: None,
            playing: false,
        }
    }

    fn build(&self) -> Result<cpal::Stream> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| AuraluxError::AutoplayBlocked("no output device found".into()))?;
        let supported = device
            .default_output_config()
            .map_err(|err| AuraluxError::AutoplayBlocked(err.to_string()))?;
        let channels = supported.channels() as usize;
        let format = supported.sample_format();
        let native: cpal::StreamConfig = supported.config();
        let mut candidates = vec![native.clone()];
        if native.sample_rate.0 != self.sample_rate {
            let mut matched = native.clone();
            matched.sample_rate = cpal::SampleRate(self.sample_rate);
            candidates.insert(0, matched);
        }

        let mut last_error = None;
        for config in &candidates {
            let built = match format {
                cpal::SampleFormat::F32 => {
                    build_output::<f32>(&device, config, channels, self.ring.clone())
                }
                cpal::SampleFormat::I16 => {
                    build_output::<i16>(&device, config, channels, self.ring.clone())
                }
                cpal::SampleFormat::U16 => {
                    build_output::<u16>(&device, config, channels, self.ring.clone())
                }
                other => {
                    return Err(AuraluxError::AutoplayBlocked(format!(
                        "unsupported output sample format {other:?}"
                    )))
                }
            };
            match built {
                Ok(stream) => {
                    if config.sample_rate.0 != self.sample_rate {
                        tracing::warn!(
                            device_rate = config.sample_rate.0,
                            context_rate = self.sample_rate,
                            "output device runs at a different rate than the audio context"
                        );
                    }
                    return Ok(stream);
                }
                Err(err) => last_error = Some(err),
            }
        }
        Err(last_error
            .unwrap_or_else(|| AuraluxError::AutoplayBlocked("no usable output config".into())))
    }
}

fn build_output<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    channels: usize,
    ring: Arc<Mutex<SampleRing>>,
) -> Result<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32> + Send + 'static,
{
    let channels = channels.max(1);
    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                let mut ring = ring.lock().ok();
                for frame in data.chunks_mut(channels) {
                    let value = ring.as_mut().and_then(|ring| ring.pop()).unwrap_or(0.0);
                    let sample = <T as cpal::Sample>::from_sample(value);
                    for slot in frame.iter_mut() {
                        *slot = sample;
                    }
                }
            },
            |err| tracing::warn!(%err, "output stream error"),
            None,
        )
        .map_err(|err| AuraluxError::AutoplayBlocked(err.to_string()))
}

impl AudioOutput for CpalOutput {
    fn start(&mut self) -> Result<()> {
        if self.stream.is_none() {
            self.stream = Some(self.build()?);
        }
        if let Some(stream) = &self.stream {
            stream
                .play()
                .map_err(|err| AuraluxError::AutoplayBlocked(err.to_string()))?;
        }
        self.playing = true;
        Ok(())
    }

    fn pause(&mut self) {
        self.playing = false;
        if let Some(stream) = &self.stream {
            if let Err(err) = stream.pause() {
                tracing::debug!(%err, "output pause failed");
            }
        }
        if let Ok(mut ring) = self.ring.lock() {
            ring.clear();
        }
    }

    /// Dropped while paused so a resume does not replay queued silence.
    fn write(&mut self, samples: &[f32]) {
        if !self.playing {
            return;
        }
        if let Ok(mut ring) = self.ring.lock() {
            ring.extend(samples);
        }
    }
}
