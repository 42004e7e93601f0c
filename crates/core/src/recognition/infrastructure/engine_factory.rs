use std::sync::Arc;

use thiserror::Error;

use crate::detection::domain::face_detector::FaceDetector;
use crate::detection::infrastructure::cascade_model::CascadeError;
use crate::detection::infrastructure::haar_cascade_detector::HaarCascadeDetector;
use crate::detection::infrastructure::onnx_yolo_detector::OnnxYoloDetector;
use crate::gallery::domain::gallery_store::GalleryStore;
use crate::recognition::domain::matching_engine::{EngineError, MatchingEngine};
use crate::shared::constants::{
    CASCADE_MODEL_NAME, CASCADE_MODEL_URL, EMBEDDING_MODEL_NAME, EMBEDDING_MODEL_URL,
    YOLO_MODEL_NAME, YOLO_MODEL_URL,
};
use crate::shared::model_resolver::{self, ModelResolveError, ProgressFn};
use crate::shared::settings::{DetectorKind, MatchingStrategy, Settings};

use super::embedding_strategy::EmbeddingStrategy;
use super::gallery_matching_engine::GalleryMatchingEngine;
use super::histogram_strategy::HistogramStrategy;
use super::onnx_face_embedder::OnnxFaceEmbedder;

#[derive(Error, Debug)]
pub enum FactoryError {
    #[error(transparent)]
    Model(#[from] ModelResolveError),
    #[error(transparent)]
    Cascade(#[from] CascadeError),
    #[error("failed to initialize {what}: {message}")]
    Backend { what: &'static str, message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Builds the detector selected in `settings`.
pub fn create_detector(
    settings: &Settings,
    progress: Option<ProgressFn>,
) -> Result<Box<dyn FaceDetector>, FactoryError> {
    match settings.detector {
        DetectorKind::Onnx => {
            let path = model_resolver::resolve(YOLO_MODEL_NAME, YOLO_MODEL_URL, None, progress)?;
            let detector = OnnxYoloDetector::new(&path, settings.detection_confidence).map_err(
                |e| FactoryError::Backend {
                    what: "face detector",
                    message: e.to_string(),
                },
            )?;
            log::info!("Using ONNX face detector");
            Ok(Box::new(detector))
        }
        DetectorKind::Cascade => {
            // Without an explicit file, use OpenCV's stock frontal face cascade
            let path = match &settings.cascade_path {
                Some(path) => path.clone(),
                None => model_resolver::resolve(CASCADE_MODEL_NAME, CASCADE_MODEL_URL, None, progress)?,
            };
            log::info!("Using Haar cascade face detector");
            Ok(Box::new(HaarCascadeDetector::load(&path)?))
        }
    }
}

/// Builds the matching engine selected in `settings` on top of `store`,
/// loading the current gallery.
pub fn create_engine(
    settings: &Settings,
    detector: Box<dyn FaceDetector>,
    store: Box<dyn GalleryStore>,
    progress: Option<ProgressFn>,
) -> Result<Arc<dyn MatchingEngine>, FactoryError> {
    let tolerance = settings.effective_tolerance();
    log::info!(
        "Using {} matching (tolerance={tolerance})",
        settings.strategy
    );
    let engine: Arc<dyn MatchingEngine> = match settings.strategy {
        MatchingStrategy::Embedding => {
            let path = model_resolver::resolve(
                EMBEDDING_MODEL_NAME,
                EMBEDDING_MODEL_URL,
                None,
                progress,
            )?;
            let embedder = OnnxFaceEmbedder::new(&path).map_err(|e| FactoryError::Backend {
                what: "face embedder",
                message: e.to_string(),
            })?;
            Arc::new(GalleryMatchingEngine::new(
                EmbeddingStrategy::new(Box::new(embedder)),
                detector,
                store,
                tolerance,
            )?)
        }
        MatchingStrategy::Histogram => Arc::new(GalleryMatchingEngine::new(
            HistogramStrategy,
            detector,
            store,
            tolerance,
        )?),
    };
    Ok(engine)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gallery::infrastructure::sqlite_gallery_store::SqliteGalleryStore;
    use std::path::PathBuf;
    use tempfile::TempDir;

    use crate::detection::infrastructure::cascade_model::fixtures::EDGE_CASCADE_XML;

    #[test]
    fn test_cascade_detector_rejects_non_cascade_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("cascade.xml");
        std::fs::write(&path, "<opencv_storage/>").unwrap();
        let settings = Settings {
            detector: DetectorKind::Cascade,
            cascade_path: Some(path),
            ..Settings::default()
        };
        assert!(matches!(
            create_detector(&settings, None),
            Err(FactoryError::Cascade(_))
        ));
    }

    #[test]
    fn test_cascade_detector_missing_file_is_error() {
        let settings = Settings {
            detector: DetectorKind::Cascade,
            cascade_path: Some(PathBuf::from("/nonexistent/cascade.xml")),
            ..Settings::default()
        };
        assert!(matches!(
            create_detector(&settings, None),
            Err(FactoryError::Cascade(_))
        ));
    }

    #[test]
    fn test_histogram_engine_starts_empty() {
        let tmp = TempDir::new().unwrap();
        let cascade = tmp.path().join("cascade.xml");
        std::fs::write(&cascade, EDGE_CASCADE_XML).unwrap();
        let settings = Settings {
            strategy: MatchingStrategy::Histogram,
            detector: DetectorKind::Cascade,
            cascade_path: Some(cascade),
            ..Settings::default()
        };

        let detector = create_detector(&settings, None).unwrap();
        let store = Box::new(SqliteGalleryStore::open_in_memory().unwrap());
        let engine = create_engine(&settings, detector, store, None).unwrap();
        let stats = engine.statistics().unwrap();
        assert_eq!((stats.person_count, stats.record_count), (0, 0));
        assert_eq!(stats.tolerance, 100.0);
    }
}
