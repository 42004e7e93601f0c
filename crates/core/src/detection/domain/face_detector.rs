use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// Implementations return every face they find, already clamped to the
/// frame, in whatever order their backend produces them. Callers must not
/// rely on ordering.
pub trait FaceDetector: Send {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>>;
}
