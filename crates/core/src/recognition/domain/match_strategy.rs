use crate::gallery::domain::feature_payload::FeaturePayload;
use crate::recognition::domain::matching_engine::EngineError;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// The part of a matching engine that differs between strategies: how faces
/// become payloads and how a payload is classified against the gallery.
pub trait MatchStrategy: Send + Sync {
    /// Immutable gallery snapshot built from stored records.
    type Gallery: Send + Sync;

    fn name(&self) -> &'static str;

    /// Builds a snapshot from `(identity, payload)` pairs in store order.
    /// Payloads of the wrong kind are skipped.
    fn build_gallery(&self, records: Vec<(String, FeaturePayload)>) -> Self::Gallery;

    fn gallery_len(gallery: &Self::Gallery) -> usize;

    /// One payload per region, same order; `None` where a face could not be
    /// encoded.
    fn extract(
        &self,
        frame: &Frame,
        regions: &[FaceRegion],
    ) -> Result<Vec<Option<FeaturePayload>>, EngineError>;

    /// Returns the accepted identity (if any) and its confidence in `[0, 100]`.
    fn classify(
        &self,
        gallery: &Self::Gallery,
        query: &FeaturePayload,
        tolerance: f64,
    ) -> Option<(String, f64)>;
}
