use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Turns detected faces into fixed-length embedding vectors.
///
/// Returns one entry per region, in the same order. A `None` entry means
/// that face could not be encoded.
pub trait FaceEmbedder: Send + Sync {
    fn embed(
        &self,
        frame: &Frame,
        regions: &[FaceRegion],
    ) -> Result<Vec<Option<Vec<f32>>>, Box<dyn std::error::Error>>;
}
