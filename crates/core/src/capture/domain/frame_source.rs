use crate::shared::frame::Frame;

/// Lazy sequence of colour frames with a start/stop lifecycle.
///
/// A source may be restarted after `stop()` for a new session.
pub trait FrameSource: Send {
    /// Acquires the underlying device or files. `false` if unavailable.
    fn start(&mut self) -> bool;

    fn stop(&mut self);

    /// Next frame, or `None` on a transient miss (no frame ready, one
    /// undecodable image). Callers retry after a short pause.
    fn next_frame(&mut self) -> Option<Frame>;

    /// `false` once stopped or when a finite source is exhausted.
    fn is_running(&self) -> bool;
}
