use std::{
    collections::HashSet,
    fs::{self, File},
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    process::{Child, ChildStdin, Command, Stdio},
    sync::mpsc::{self, Receiver, Sender, TryRecvError},
    thread,
};

use hound::{SampleFormat, WavSpec, WavWriter};
use tempfile::TempDir;

use super::{CaptureHost, Encoder, EncoderEvent, EncoderRequest};
use crate::{audio::AudioTrackInfo, render::Canvas, AuraluxError, Result};

const DEFAULT_PROGRAM: &str = "ffmpeg";
const DEFAULT_MIME: &str = "video/webm";
const CHUNK_SIZE: usize = 64 * 1024;
const VIDEO_FILE: &str = "video.webm";
const AUDIO_FILE: &str = "audio.wav";
const MUXED_FILE: &str = "recording.webm";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Codecs {
    video: &'static str,
    audio: &'static str,
}

fn codecs_for(mime: &str) -> Option<Codecs> {
    let normalized: String = mime
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_ascii_lowercase();
    match normalized.as_str() {
        "video/webm;codecs=vp9,opus" => Some(Codecs {
            video: "libvpx-vp9",
            audio: "libopus",
        }),
        "video/webm;codecs=vp8,opus" => Some(Codecs {
            video: "libvpx",
            audio: "libopus",
        }),
        "video/webm" => Some(Codecs {
            video: "libvpx",
            audio: "libvorbis",
        }),
        _ => None,
    }
}

/// Encoder names from `ffmpeg -encoders`, e.g. ` V....D libvpx-vp9  ...`.
fn parse_encoders(listing: &str) -> HashSet<String> {
    listing
        .lines()
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let flags = parts.next()?;
            let name = parts.next()?;
            (flags.len() == 6 && flags.starts_with(['V', 'A', 'S'])).then(|| name.to_owned())
        })
        .collect()
}

/// Capture host backed by the system `ffmpeg` binary.
#[derive(Debug, Clone)]
pub struct FfmpegCaptureHost {
    program: PathBuf,
    available: bool,
    encoders: HashSet<String>,
}

impl Default for FfmpegCaptureHost {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegCaptureHost {
    /// Probes `ffmpeg` on the `PATH`.
    pub fn new() -> Self {
        Self::with_program(DEFAULT_PROGRAM)
    }

    /// Probes `program` once for availability and its encoder list.
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        let program = program.into();
        let probe = Command::new(&program)
            .args(["-hide_banner", "-encoders"])
            .stdin(Stdio::null())
            .stderr(Stdio::null())
            .output();

        match probe {
            Ok(output) if output.status.success() => {
                let encoders = parse_encoders(&String::from_utf8_lossy(&output.stdout));
                tracing::debug!(encoders = encoders.len(), "ffmpeg available");
                Self {
                    program,
                    available: true,
                    encoders,
                }
            }
            Ok(output) => {
                tracing::warn!(status = %output.status, "ffmpeg probe failed; recording disabled");
                Self::unavailable(program)
            }
            Err(err) => {
                tracing::warn!(%err, "ffmpeg not found; recording disabled");
                Self::unavailable(program)
            }
        }
    }

    fn unavailable(program: PathBuf) -> Self {
        Self {
            program,
            available: false,
            encoders: HashSet::new(),
        }
    }
}

impl CaptureHost for FfmpegCaptureHost {
    fn supports_canvas_capture(&self) -> bool {
        self.available
    }

    fn is_type_supported(&self, mime: &str) -> bool {
        codecs_for(mime).is_some_and(|codecs| {
            self.encoders.contains(codecs.video) && self.encoders.contains(codecs.audio)
        })
    }

    fn create_encoder(&mut self, request: &EncoderRequest) -> Result<Box<dyn Encoder>> {
        if !self.available {
            return Err(AuraluxError::UnsupportedCapability(
                "ffmpeg is not available".into(),
            ));
        }
        let mime = request.mime.as_deref().unwrap_or(DEFAULT_MIME);
        let codecs = codecs_for(mime).ok_or_else(|| {
            AuraluxError::UnsupportedCapability(format!("no ffmpeg mapping for {mime}"))
        })?;
        let encoder = FfmpegEncoder::new(self.program.clone(), mime, codecs, request)?;
        Ok(Box::new(encoder))
    }
}

/// Pipes raw RGBA frames into an `ffmpeg` child and buffers audio into a WAV
/// file; both are muxed on a worker thread once stopped.
pub struct FfmpegEncoder {
    program: PathBuf,
    mime: String,
    codecs: Codecs,
    width: u32,
    height: u32,
    fps: u32,
    audio: Option<AudioTrackInfo>,
    workdir: Option<TempDir>,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    wav: Option<WavWriter<BufWriter<File>>>,
    pending: Vec<u8>,
    pending_frames: usize,
    frames_per_slice: usize,
    frames_written: u64,
    failure: Option<String>,
    failure_reported: bool,
    events: Option<Receiver<EncoderEvent>>,
}

impl FfmpegEncoder {
    fn new(program: PathBuf, mime: &str, codecs: Codecs, request: &EncoderRequest) -> Result<Self> {
        if request.width == 0 || request.height == 0 {
            return Err(AuraluxError::invalid("cannot record an empty surface"));
        }
        let workdir = tempfile::Builder::new()
            .prefix("auralux-capture")
            .tempdir()?;
        Ok(Self {
            program,
            mime: mime.to_owned(),
            codecs,
            width: request.width,
            height: request.height,
            fps: request.fps,
            audio: request.audio,
            workdir: Some(workdir),
            child: None,
            stdin: None,
            wav: None,
            pending: Vec::new(),
            pending_frames: 0,
            frames_per_slice: 1,
            frames_written: 0,
            failure: None,
            failure_reported: false,
            events: None,
        })
    }

    /// Frames handed to the child so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn workdir(&self) -> Result<&Path> {
        self.workdir
            .as_ref()
            .map(TempDir::path)
            .ok_or_else(|| AuraluxError::msg("encoder already stopped"))
    }

    /// Bytes of video held back until the next time-slice flush.
    pub fn pending_bytes(&self) -> usize {
        self.pending.len()
    }

    fn flush(&mut self) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let written = match self.stdin.as_mut() {
            Some(stdin) => stdin
                .write_all(&self.pending)
                .map_err(|err| format!("ffmpeg rejected frames: {err}")),
            None => Err("encoder is not running".to_owned()),
        };
        let frames = self.pending_frames;
        self.pending.clear();
        self.pending_frames = 0;
        match written {
            Ok(()) => {
                self.frames_written += frames as u64;
                Ok(())
            }
            Err(reason) => Err(self.fail(reason)),
        }
    }

    /// Latches the encoder into its failed state. Later writes are refused
    /// without buffering and `poll` reports the reason once.
    fn fail(&mut self, reason: String) -> AuraluxError {
        tracing::warn!(%reason, "ffmpeg encoder failed");
        self.stdin = None;
        self.wav = None;
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        self.failure.get_or_insert(reason).clone().into()
    }

    fn check_running(&self) -> Result<()> {
        match &self.failure {
            Some(reason) => Err(AuraluxError::msg(reason.clone())),
            None => Ok(()),
        }
    }
}

impl Encoder for FfmpegEncoder {
    fn mime_type(&self) -> &str {
        &self.mime
    }

    fn start(&mut self, timeslice: f64) -> Result<()> {
        if self.child.is_some() {
            return Ok(());
        }
        let workdir = self.workdir()?.to_path_buf();
        let mut child = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error", "-y"])
            .args(["-f", "rawvideo", "-pix_fmt", "rgba"])
            .args(["-s", &format!("{}x{}", self.width, self.height)])
            .args(["-r", &self.fps.to_string()])
            .args(["-i", "pipe:0", "-an"])
            .args(["-c:v", self.codecs.video, "-pix_fmt", "yuv420p"])
            .args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .arg(workdir.join(VIDEO_FILE))
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| AuraluxError::UnsupportedCapability(format!("failed to run ffmpeg: {err}")))?;

        let Some(stdin) = child.stdin.take() else {
            let _ = child.kill();
            return Err(AuraluxError::msg("ffmpeg stdin unavailable"));
        };

        if let Some(track) = self.audio {
            let spec = WavSpec {
                channels: track.channels,
                sample_rate: track.sample_rate,
                bits_per_sample: 32,
                sample_format: SampleFormat::Float,
            };
            match WavWriter::create(workdir.join(AUDIO_FILE), spec) {
                Ok(writer) => self.wav = Some(writer),
                Err(err) => {
                    let _ = child.kill();
                    return Err(AuraluxError::msg(format!("failed to buffer audio: {err}")));
                }
            }
        }

        self.frames_per_slice = ((self.fps as f64 * timeslice).round() as usize).max(1);
        self.stdin = Some(stdin);
        self.child = Some(child);
        Ok(())
    }

    fn write_video(&mut self, frame: &Canvas) -> Result<()> {
        self.check_running()?;
        if frame.pixel_width() != self.width || frame.pixel_height() != self.height {
            return Err(AuraluxError::invalid(format!(
                "frame is {}x{}, recording is {}x{}",
                frame.pixel_width(),
                frame.pixel_height(),
                self.width,
                self.height
            )));
        }
        self.pending.extend_from_slice(frame.pixels());
        self.pending_frames += 1;
        if self.pending_frames >= self.frames_per_slice {
            self.flush()?;
        }
        Ok(())
    }

    fn write_audio(&mut self, samples: &[f32]) -> Result<()> {
        self.check_running()?;
        let Some(wav) = self.wav.as_mut() else {
            return Ok(());
        };
        let written: std::result::Result<(), hound::Error> =
            samples.iter().try_for_each(|sample| wav.write_sample(*sample));
        written.map_err(|err| self.fail(format!("failed to buffer audio: {err}")))
    }

    fn stop(&mut self) {
        if self.events.is_some() {
            return;
        }
        if self.failure.is_some() {
            let (_, rx) = mpsc::channel();
            self.events = Some(rx);
            return;
        }
        if let Err(err) = self.flush() {
            tracing::warn!(%err, "dropping final frames");
        }
        self.stdin = None;

        let mut has_audio = false;
        if let Some(wav) = self.wav.take() {
            match wav.finalize() {
                Ok(()) => has_audio = true,
                Err(err) => tracing::warn!(%err, "recording without audio"),
            }
        }

        let (tx, rx) = mpsc::channel();
        self.events = Some(rx);
        let (Some(child), Some(workdir)) = (self.child.take(), self.workdir.take()) else {
            let _ = tx.send(EncoderEvent::Stopped);
            return;
        };

        let job = FinalizeJob {
            program: self.program.clone(),
            audio_codec: self.codecs.audio,
            has_audio,
            child,
            workdir,
        };
        thread::spawn(move || job.run(tx));
    }

    fn poll(&mut self) -> Vec<EncoderEvent> {
        let mut events = Vec::new();
        if let Some(reason) = &self.failure {
            if !self.failure_reported {
                self.failure_reported = true;
                events.push(EncoderEvent::Failed(reason.clone()));
            }
            return events;
        }
        let Some(rx) = self.events.as_ref() else {
            return events;
        };
        loop {
            match rx.try_recv() {
                Ok(event) => events.push(event),
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => break,
            }
        }
        events
    }
}

impl std::fmt::Debug for FfmpegEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FfmpegEncoder")
            .field("mime", &self.mime)
            .field("size", &(self.width, self.height))
            .field("fps", &self.fps)
            .field("audio", &self.audio)
            .field("frames_written", &self.frames_written)
            .field("failure", &self.failure)
            .finish()
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        if let Some(mut child) = self.child.take() {
            self.stdin = None;
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Waits for the video encode, muxes in the audio, and streams the result
/// back as chunks.
struct FinalizeJob {
    program: PathBuf,
    audio_codec: &'static str,
    has_audio: bool,
    child: Child,
    workdir: TempDir,
}

impl FinalizeJob {
    fn run(self, tx: Sender<EncoderEvent>) {
        match self.finish() {
            Ok(bytes) => {
                for chunk in bytes.chunks(CHUNK_SIZE) {
                    if tx.send(EncoderEvent::DataAvailable(chunk.to_vec())).is_err() {
                        return;
                    }
                }
                let _ = tx.send(EncoderEvent::Stopped);
            }
            Err(reason) => {
                let _ = tx.send(EncoderEvent::Failed(reason));
            }
        }
    }

    fn finish(self) -> std::result::Result<Vec<u8>, String> {
        let output = self
            .child
            .wait_with_output()
            .map_err(|err| format!("ffmpeg did not finish: {err}"))?;
        if !output.status.success() {
            return Err(format!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }

        let dir = self.workdir.path();
        let video = dir.join(VIDEO_FILE);
        if !self.has_audio {
            return fs::read(&video).map_err(|err| err.to_string());
        }

        let muxed = dir.join(MUXED_FILE);
        let output = Command::new(&self.program)
            .args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(&video)
            .arg("-i")
            .arg(dir.join(AUDIO_FILE))
            .args(["-c:v", "copy", "-c:a", self.audio_codec])
            .args(["-af", "apad", "-shortest"])
            .arg(&muxed)
            .stdin(Stdio::null())
            .output()
            .map_err(|err| format!("failed to run ffmpeg: {err}"))?;
        if !output.status.success() {
            return Err(format!(
                "ffmpeg mux failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            ));
        }
        fs::read(&muxed).map_err(|err| err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = "Encoders:
 V..... = Video
 A..... = Audio
 ------
 V....D libvpx               libvpx VP8 (codec vp8)
 V....D libvpx-vp9           libvpx VP9 (codec vp9)
 A....D libopus              libopus Opus (codec opus)
 A....D aac                  AAC (Advanced Audio Coding)
";

    #[test]
    fn parses_encoder_names() {
        let encoders = parse_encoders(LISTING);
        assert!(encoders.contains("libvpx"));
        assert!(encoders.contains("libvpx-vp9"));
        assert!(encoders.contains("libopus"));
        assert!(!encoders.contains("libvorbis"));
    }

    #[test]
    fn preference_support_needs_both_codecs() {
        let host = FfmpegCaptureHost {
            program: PathBuf::from(DEFAULT_PROGRAM),
            available: true,
            encoders: parse_encoders(LISTING),
        };
        assert!(host.is_type_supported("video/webm;codecs=vp9,opus"));
        assert!(host.is_type_supported("video/webm; codecs=VP8,opus"));
        assert!(!host.is_type_supported("video/webm"));
        assert!(!host.is_type_supported("video/mp4"));
    }

    #[test]
    fn missing_binary_disables_capture() {
        let mut host = FfmpegCaptureHost::with_program("/nonexistent/auralux-ffmpeg");
        assert!(!host.supports_canvas_capture());
        let request = EncoderRequest {
            mime: None,
            width: 4,
            height: 4,
            fps: 30,
            audio: None,
        };
        assert!(matches!(
            host.create_encoder(&request),
            Err(AuraluxError::UnsupportedCapability(_))
        ));
    }

    #[cfg(unix)]
    #[test]
    fn dead_encoder_stops_buffering_and_reports_once() {
        let request = EncoderRequest {
            mime: None,
            width: 64,
            height: 64,
            fps: 30,
            audio: None,
        };
        let codecs = codecs_for(DEFAULT_MIME).unwrap();
        let mut encoder =
            FfmpegEncoder::new(PathBuf::from("/bin/false"), DEFAULT_MIME, codecs, &request).unwrap();
        encoder.start(0.1).unwrap();

        let frame = Canvas::new(64.0, 64.0, 1.0);
        let mut errors = 0;
        for _ in 0..600 {
            if encoder.write_video(&frame).is_err() {
                errors += 1;
            }
            assert!(encoder.pending_bytes() <= 3 * 64 * 64 * 4);
        }
        assert!(errors > 0);
        assert_eq!(encoder.pending_bytes(), 0);
        assert!(encoder.write_audio(&[0.0; 8]).is_err());

        let events = encoder.poll();
        assert!(matches!(events.as_slice(), [EncoderEvent::Failed(_)]));
        assert!(encoder.poll().is_empty());
        encoder.stop();
        assert!(encoder.poll().is_empty());
    }
}
