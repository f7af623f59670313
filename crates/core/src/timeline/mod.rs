/// Handle to one scheduled frame callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameRequest(u64);

impl FrameRequest {
    /// Monotonic sequence number of the request.
    pub fn id(self) -> u64 {
        self.0
    }
}

/// Explicit stand-in for a display-refresh callback that reschedules itself.
///
/// At most one request is pending at any time, so frames can never overlap:
/// a frame runs only after taking the pending request, and the next one is
/// scheduled only once that frame is done. [`FrameLoop::cancel`] is
/// synchronous; once it returns nothing will run until a new request.
#[derive(Debug, Default)]
pub struct FrameLoop {
    pending: Option<FrameRequest>,
    next_id: u64,
    frames_run: u64,
}

impl FrameLoop {
    /// Creates a loop with nothing scheduled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules the next frame, or returns the one already pending.
    pub fn request(&mut self) -> FrameRequest {
        if let Some(request) = self.pending {
            return request;
        }
        self.next_id += 1;
        let request = FrameRequest(self.next_id);
        self.pending = Some(request);
        request
    }

    /// Drops the pending request, if any.
    pub fn cancel(&mut self) -> Option<FrameRequest> {
        self.pending.take()
    }

    /// Whether a frame is scheduled.
    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Claims the pending request so its frame can run.
    pub fn take_due(&mut self) -> Option<FrameRequest> {
        let request = self.pending.take()?;
        self.frames_run += 1;
        Some(request)
    }

    /// Number of frames that have been claimed so far.
    pub fn frames_run(&self) -> u64 {
        self.frames_run
    }
}
