/// LBPH classifier matching over normalized grayscale patches.
use crate::gallery::domain::feature_payload::FeaturePayload;
use crate::recognition::domain::match_strategy::MatchStrategy;
use crate::recognition::domain::matching_engine::EngineError;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

use super::face_patch::extract_patch;
use super::lbph_classifier::LbphClassifier;

/// Trained classifier plus the label → identity table it was trained with.
#[derive(Debug, Default)]
pub struct HistogramGallery {
    classifier: LbphClassifier,
    labels: Vec<String>,
}

#[derive(Debug, Default)]
pub struct HistogramStrategy;

/// `100 - score`, clamped to `[0, 100]`.
pub fn score_confidence(score: f64) -> f64 {
    (100.0 - score).clamp(0.0, 100.0)
}

impl MatchStrategy for HistogramStrategy {
    type Gallery = HistogramGallery;

    fn name(&self) -> &'static str {
        "histogram"
    }

    fn build_gallery(&self, records: Vec<(String, FeaturePayload)>) -> HistogramGallery {
        let mut labels: Vec<String> = Vec::new();
        let mut patches = Vec::new();
        for (name, payload) in records {
            let FeaturePayload::Patch(patch) = payload else {
                log::warn!("Ignoring embedding record for {name}; patch gallery expected");
                continue;
            };
            let Some(gray) = patch.to_gray() else {
                log::warn!("Ignoring malformed patch record for {name}");
                continue;
            };
            let label = match labels.iter().position(|l| *l == name) {
                Some(label) => label,
                None => {
                    labels.push(name);
                    labels.len() - 1
                }
            };
            patches.push((label, gray));
        }
        HistogramGallery {
            classifier: LbphClassifier::train(patches.iter().map(|(l, p)| (*l, p))),
            labels,
        }
    }

    fn gallery_len(gallery: &HistogramGallery) -> usize {
        gallery.classifier.len()
    }

    fn extract(
        &self,
        frame: &Frame,
        regions: &[FaceRegion],
    ) -> Result<Vec<Option<FeaturePayload>>, EngineError> {
        Ok(regions
            .iter()
            .map(|r| extract_patch(frame, r).map(FeaturePayload::Patch))
            .collect())
    }

    fn classify(
        &self,
        gallery: &HistogramGallery,
        query: &FeaturePayload,
        tolerance: f64,
    ) -> Option<(String, f64)> {
        let FeaturePayload::Patch(patch) = query else {
            return None;
        };
        let (label, score) = gallery.classifier.predict(&patch.to_gray()?)?;
        if score >= tolerance {
            return None;
        }
        let name = gallery.labels.get(label)?;
        Some((name.clone(), score_confidence(score)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::domain::feature_payload::FacePatch;
    use approx::assert_relative_eq;
    use image::GrayImage;

    fn patch(f: impl Fn(u32, u32) -> u8) -> FeaturePayload {
        FeaturePayload::Patch(FacePatch::from_gray(GrayImage::from_fn(64, 64, |x, y| {
            image::Luma([f(x, y)])
        })))
    }

    fn vertical() -> FeaturePayload {
        patch(|x, _| if (x / 4) % 2 == 0 { 20 } else { 230 })
    }

    fn checker() -> FeaturePayload {
        patch(|x, y| if ((x / 3) + (y / 3)) % 2 == 0 { 20 } else { 230 })
    }

    #[test]
    fn test_labels_follow_first_appearance() {
        let gallery = HistogramStrategy.build_gallery(vec![
            ("bob".into(), vertical()),
            ("alice".into(), checker()),
            ("bob".into(), checker()),
        ]);
        assert_eq!(gallery.labels, vec!["bob".to_string(), "alice".to_string()]);
        assert_eq!(HistogramStrategy::gallery_len(&gallery), 3);
    }

    #[test]
    fn test_embedding_records_are_ignored() {
        let gallery = HistogramStrategy.build_gallery(vec![
            ("bob".into(), FeaturePayload::Embedding(vec![0.0; 4])),
            ("alice".into(), checker()),
        ]);
        assert_eq!(gallery.labels, vec!["alice".to_string()]);
    }

    #[test]
    fn test_classify_exact_sample_is_full_confidence() {
        let gallery = HistogramStrategy.build_gallery(vec![
            ("bob".into(), vertical()),
            ("alice".into(), checker()),
        ]);
        let (name, confidence) = HistogramStrategy.classify(&gallery, &checker(), 100.0).unwrap();
        assert_eq!(name, "alice");
        assert_relative_eq!(confidence, 100.0);
    }

    #[test]
    fn test_classify_rejects_score_at_tolerance() {
        let gallery = HistogramStrategy.build_gallery(vec![("bob".into(), vertical())]);
        // Exact match scores 0, which is not strictly below a zero tolerance
        assert!(HistogramStrategy.classify(&gallery, &vertical(), 0.0).is_none());
    }

    #[test]
    fn test_classify_empty_gallery_is_unknown() {
        let gallery = HistogramStrategy.build_gallery(Vec::new());
        assert!(HistogramStrategy.classify(&gallery, &vertical(), 100.0).is_none());
    }

    #[test]
    fn test_score_confidence_clamps() {
        assert_relative_eq!(score_confidence(30.0), 70.0);
        assert_relative_eq!(score_confidence(150.0), 0.0);
        assert_relative_eq!(score_confidence(-5.0), 100.0);
    }
}
