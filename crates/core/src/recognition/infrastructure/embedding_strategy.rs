/// Euclidean-distance matching over face embeddings.
use crate::gallery::domain::feature_payload::FeaturePayload;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::recognition::domain::match_strategy::MatchStrategy;
use crate::recognition::domain::matching_engine::EngineError;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Names and vectors in store order; `names[i]` owns `vectors[i]`.
#[derive(Debug, Default)]
pub struct EmbeddingGallery {
    names: Vec<String>,
    vectors: Vec<Vec<f32>>,
}

pub struct EmbeddingStrategy {
    embedder: Box<dyn FaceEmbedder>,
}

impl EmbeddingStrategy {
    pub fn new(embedder: Box<dyn FaceEmbedder>) -> Self {
        Self { embedder }
    }
}

/// Euclidean distance; vectors of different length never match.
pub fn face_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() {
        return f64::INFINITY;
    }
    let d = a
        .iter()
        .zip(b)
        .map(|(x, y)| {
            let diff = *x as f64 - *y as f64;
            diff * diff
        })
        .sum::<f64>()
        .sqrt();
    if d.is_nan() {
        f64::INFINITY
    } else {
        d
    }
}

/// Picks the globally closest vector, then accepts it only if that same
/// pair is within `tolerance`.
///
/// The arg-min is taken first (first index wins ties) and the tolerance
/// test is applied to it alone; no other candidate is considered.
pub fn best_match(vectors: &[Vec<f32>], query: &[f32], tolerance: f64) -> Option<(usize, f64)> {
    let distances: Vec<f64> = vectors.iter().map(|v| face_distance(v, query)).collect();
    let within: Vec<bool> = distances.iter().map(|d| *d <= tolerance).collect();

    let (best, best_distance) = distances
        .iter()
        .copied()
        .enumerate()
        .fold(None, |acc: Option<(usize, f64)>, (i, d)| match acc {
            Some((_, best_d)) if best_d <= d => acc,
            _ => Some((i, d)),
        })?;

    within[best].then_some((best, best_distance))
}

/// `(1 - distance) * 100`, clamped to `[0, 100]`.
pub fn distance_confidence(distance: f64) -> f64 {
    ((1.0 - distance) * 100.0).clamp(0.0, 100.0)
}

impl MatchStrategy for EmbeddingStrategy {
    type Gallery = EmbeddingGallery;

    fn name(&self) -> &'static str {
        "embedding"
    }

    fn build_gallery(&self, records: Vec<(String, FeaturePayload)>) -> EmbeddingGallery {
        let mut gallery = EmbeddingGallery::default();
        for (name, payload) in records {
            match payload {
                FeaturePayload::Embedding(v) => {
                    gallery.names.push(name);
                    gallery.vectors.push(v);
                }
                FeaturePayload::Patch(_) => {
                    log::warn!("Ignoring patch record for {name}; embedding gallery expected");
                }
            }
        }
        gallery
    }

    fn gallery_len(gallery: &EmbeddingGallery) -> usize {
        gallery.vectors.len()
    }

    fn extract(
        &self,
        frame: &Frame,
        regions: &[FaceRegion],
    ) -> Result<Vec<Option<FeaturePayload>>, EngineError> {
        let mut embeddings = self
            .embedder
            .embed(frame, regions)
            .map_err(|e| EngineError::Extraction(e.to_string()))?;
        if embeddings.len() != regions.len() {
            return Err(EngineError::Extraction(format!(
                "embedder returned {} vectors for {} faces",
                embeddings.len(),
                regions.len()
            )));
        }
        Ok(embeddings
            .drain(..)
            .map(|e| e.map(FeaturePayload::Embedding))
            .collect())
    }

    fn classify(
        &self,
        gallery: &EmbeddingGallery,
        query: &FeaturePayload,
        tolerance: f64,
    ) -> Option<(String, f64)> {
        let FeaturePayload::Embedding(query) = query else {
            return None;
        };
        let (index, distance) = best_match(&gallery.vectors, query, tolerance)?;
        Some((gallery.names[index].clone(), distance_confidence(distance)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_face_distance_euclidean() {
        assert_relative_eq!(face_distance(&[0.0, 0.0], &[3.0, 4.0]), 5.0);
        assert_relative_eq!(face_distance(&[1.0, 2.0], &[1.0, 2.0]), 0.0);
    }

    #[test]
    fn test_face_distance_dimension_mismatch_is_infinite() {
        assert!(face_distance(&[0.0], &[0.0, 0.0]).is_infinite());
    }

    #[test]
    fn test_face_distance_nan_is_infinite() {
        assert!(face_distance(&[f32::NAN], &[0.0]).is_infinite());
    }

    #[test]
    fn test_best_match_accepts_closest_within_tolerance() {
        let gallery = vec![vec![1.0, 0.0], vec![0.1, 0.0], vec![0.5, 0.0]];
        let (idx, d) = best_match(&gallery, &[0.0, 0.0], 0.6).unwrap();
        assert_eq!(idx, 1);
        assert_relative_eq!(d, 0.1, epsilon = 1e-6);
    }

    #[test]
    fn test_best_match_rejects_when_closest_exceeds_tolerance() {
        let gallery = vec![vec![0.7, 0.0], vec![0.9, 0.0]];
        assert!(best_match(&gallery, &[0.0, 0.0], 0.6).is_none());
    }

    #[test]
    fn test_best_match_tolerance_is_inclusive() {
        let gallery = vec![vec![0.5, 0.0]];
        assert!(best_match(&gallery, &[0.0, 0.0], 0.5).is_some());
    }

    #[test]
    fn test_best_match_tie_prefers_first_index() {
        let gallery = vec![vec![0.0, 0.2], vec![0.2, 0.0]];
        assert_eq!(best_match(&gallery, &[0.0, 0.0], 0.6).unwrap().0, 0);
    }

    #[test]
    fn test_best_match_accepts_iff_min_distance_within_tolerance() {
        let gallery = vec![vec![0.55, 0.0], vec![0.3, 0.0], vec![0.0, 0.9]];
        let query = [0.0, 0.0];
        for step in 0..=20 {
            let tolerance = step as f64 * 0.05;
            match best_match(&gallery, &query, tolerance) {
                Some((idx, d)) => {
                    assert_eq!(idx, 1);
                    assert!(d <= tolerance);
                }
                None => assert!(tolerance < 0.3 + 1e-6),
            }
        }
    }

    #[test]
    fn test_best_match_empty_gallery() {
        assert!(best_match(&[], &[0.0], 0.6).is_none());
    }

    #[rstest]
    #[case(0.0, 100.0)]
    #[case(0.25, 75.0)]
    #[case(1.0, 0.0)]
    #[case(1.7, 0.0)]
    fn test_distance_confidence(#[case] distance: f64, #[case] expected: f64) {
        assert_relative_eq!(distance_confidence(distance), expected, epsilon = 1e-9);
    }

    #[test]
    fn test_distance_confidence_is_monotone() {
        let mut prev = f64::INFINITY;
        for i in 0..=30 {
            let c = distance_confidence(i as f64 * 0.05);
            assert!(c <= prev);
            assert!((0.0..=100.0).contains(&c));
            prev = c;
        }
    }
}
