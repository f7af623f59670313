/// Result alias that carries the custom [`AuraluxError`] type.
pub type Result<T> = std::result::Result<T, AuraluxError>;

/// Common error type for the core crate.
///
/// Every variant is recoverable: the session keeps running and the
/// [`Display`](std::fmt::Display) text is what gets shown to the user as a
/// notice.
#[derive(Debug, thiserror::Error)]
pub enum AuraluxError {
    /// The live capture device was refused or is unavailable.
    #[error("Microphone access denied or unavailable: {0}")]
    PermissionDenied(String),
    /// Frame-stream capture or every encoder format is unsupported by the host.
    #[error("Recording is not supported: {0}")]
    UnsupportedCapability(String),
    /// The output refused to start playback before a user gesture.
    #[error("Please press Play once to allow autoplay, then try again ({0})")]
    AutoplayBlocked(String),
    /// An audio file could not be opened or decoded.
    #[error("Failed to load audio: {0}")]
    LoadFailure(String),
    /// An operation needed a loaded audio file.
    #[error("Please choose an audio file first.")]
    NoSource,
    /// Full-track export was requested while the live input is active.
    #[error("Track export is only available for file sources.")]
    ExportRequiresFile,
    /// Full-track export was requested while another recording is running.
    #[error("Stop the current recording before exporting the track.")]
    RecordingInProgress,
    /// A caller supplied an out-of-range value.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// Free-form failure with a readable message.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// Configuration or preference files that failed to (de)serialise.
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl AuraluxError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Creates an [`AuraluxError::InvalidInput`] from the provided message.
    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidInput(msg.into())
    }
}

impl From<&str> for AuraluxError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for AuraluxError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notices_are_readable() {
        let err = AuraluxError::ExportRequiresFile;
        assert_eq!(
            err.to_string(),
            "Track export is only available for file sources."
        );

        let err = AuraluxError::PermissionDenied("no device".into());
        assert!(err.to_string().contains("no device"));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: AuraluxError = io.into();
        assert!(matches!(err, AuraluxError::Io(_)));
    }
}
