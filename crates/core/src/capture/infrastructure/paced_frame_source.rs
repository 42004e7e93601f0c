use std::time::{Duration, Instant};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;

/// Decorator that delivers at most one frame per `interval`.
///
/// File-backed sources decode far faster than a camera produces frames, so
/// a time-based enrollment debounce would reject almost every still. Pacing
/// them to at least the debounce interval restores camera-like spacing.
/// The interval is measured from the moment the previous frame was handed
/// out, and early polls are reported as transient misses.
pub struct PacedFrameSource {
    inner: Box<dyn FrameSource>,
    interval: Duration,
    last_delivered: Option<Instant>,
}

impl PacedFrameSource {
    pub fn new(inner: Box<dyn FrameSource>, interval: Duration) -> Self {
        Self {
            inner,
            interval,
            last_delivered: None,
        }
    }
}

impl FrameSource for PacedFrameSource {
    fn start(&mut self) -> bool {
        self.last_delivered = None;
        self.inner.start()
    }

    fn stop(&mut self) {
        self.inner.stop();
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if let Some(last) = self.last_delivered {
            if last.elapsed() < self.interval {
                return None;
            }
        }
        let frame = self.inner.next_frame()?;
        self.last_delivered = Some(Instant::now());
        Some(frame)
    }

    fn is_running(&self) -> bool {
        self.inner.is_running()
    }
}
