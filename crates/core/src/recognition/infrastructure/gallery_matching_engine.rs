/// Matching engine shared by every strategy.
///
/// Owns the detector, the gallery store and an atomically swapped gallery
/// snapshot. Writers hold the store lock across the mutation and the reload
/// that follows it, so snapshots are published in mutation order.
use std::sync::{Arc, Mutex, MutexGuard};

use arc_swap::ArcSwap;

use crate::detection::domain::face_detector::FaceDetector;
use crate::gallery::domain::feature_payload::FeaturePayload;
use crate::gallery::domain::gallery_store::{GalleryStore, PersonSummary};
use crate::recognition::domain::identity::is_valid_identity;
use crate::recognition::domain::match_strategy::MatchStrategy;
use crate::recognition::domain::matching_engine::{
    EngineError, MatchResult, MatchingEngine, RegistrationOutcome, RejectReason, Statistics,
};
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

pub struct GalleryMatchingEngine<S: MatchStrategy> {
    strategy: S,
    detector: Mutex<Box<dyn FaceDetector>>,
    store: Mutex<Box<dyn GalleryStore>>,
    gallery: ArcSwap<S::Gallery>,
    tolerance: f64,
}

impl<S: MatchStrategy> GalleryMatchingEngine<S> {
    /// Builds the engine and loads the current gallery.
    pub fn new(
        strategy: S,
        detector: Box<dyn FaceDetector>,
        store: Box<dyn GalleryStore>,
        tolerance: f64,
    ) -> Result<Self, EngineError> {
        let empty = strategy.build_gallery(Vec::new());
        let engine = Self {
            strategy,
            detector: Mutex::new(detector),
            store: Mutex::new(store),
            gallery: ArcSwap::from_pointee(empty),
            tolerance,
        };
        engine.reload()?;
        Ok(engine)
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    fn lock_store(&self) -> Result<MutexGuard<'_, Box<dyn GalleryStore>>, EngineError> {
        self.store.lock().map_err(|_| EngineError::LockPoisoned)
    }

    fn reload_from(&self, store: &dyn GalleryStore) -> Result<usize, EngineError> {
        let records: Vec<(String, FeaturePayload)> = store
            .all_records()?
            .into_iter()
            .filter_map(|(name, bytes)| match FeaturePayload::decode(&bytes) {
                Ok(payload) => Some((name, payload)),
                Err(e) => {
                    log::warn!("Skipping unreadable gallery record for {name}: {e}");
                    None
                }
            })
            .collect();

        let gallery = self.strategy.build_gallery(records);
        let count = S::gallery_len(&gallery);
        self.gallery.store(Arc::new(gallery));
        log::info!("Loaded {count} gallery records ({} strategy)", self.strategy.name());
        Ok(count)
    }
}

impl<S: MatchStrategy> MatchingEngine for GalleryMatchingEngine<S> {
    fn reload(&self) -> Result<usize, EngineError> {
        let store = self.lock_store()?;
        self.reload_from(store.as_ref())
    }

    fn recognize_all(&self, frame: &Frame) -> Result<Vec<MatchResult>, EngineError> {
        let gallery = self.gallery.load();
        if S::gallery_len(&gallery) == 0 {
            return Ok(Vec::new());
        }

        let regions = self.detect(frame)?;
        if regions.is_empty() {
            return Ok(Vec::new());
        }
        let payloads = self.strategy.extract(frame, &regions)?;

        Ok(regions
            .into_iter()
            .zip(payloads)
            .map(|(region, payload)| {
                payload
                    .and_then(|p| self.strategy.classify(&gallery, &p, self.tolerance))
                    .map(|(identity, confidence)| MatchResult {
                        region,
                        identity: Some(identity),
                        confidence: confidence.clamp(0.0, 100.0),
                    })
                    .unwrap_or_else(|| MatchResult::unknown(region))
            })
            .collect())
    }

    fn register_one(
        &self,
        frame: &Frame,
        identity: &str,
    ) -> Result<RegistrationOutcome, EngineError> {
        if !is_valid_identity(identity) {
            return Ok(RegistrationOutcome::Rejected(RejectReason::InvalidIdentity));
        }

        let regions = self.detect(frame)?;
        match regions.len() {
            0 => return Ok(RegistrationOutcome::Rejected(RejectReason::NoFace)),
            1 => {}
            _ => return Ok(RegistrationOutcome::Rejected(RejectReason::MultipleFaces)),
        }

        let Some(payload) = self
            .strategy
            .extract(frame, &regions)?
            .into_iter()
            .next()
            .flatten()
        else {
            return Ok(RegistrationOutcome::Rejected(RejectReason::EncodingFailed));
        };

        let mut store = self.lock_store()?;
        store.add_sample(identity, &payload.encode())?;
        self.reload_from(store.as_ref())?;
        log::info!("Registered a face sample for {identity}");
        Ok(RegistrationOutcome::Registered)
    }

    fn delete_identity(&self, identity: &str) -> Result<bool, EngineError> {
        let mut store = self.lock_store()?;
        let removed = store.delete_person(identity)?;
        if removed {
            self.reload_from(store.as_ref())?;
            log::info!("Deleted {identity} from the gallery");
        }
        Ok(removed)
    }

    fn clear_all(&self) -> Result<(), EngineError> {
        let mut store = self.lock_store()?;
        store.clear_all()?;
        self.reload_from(store.as_ref())?;
        log::info!("Cleared the gallery");
        Ok(())
    }

    fn statistics(&self) -> Result<Statistics, EngineError> {
        let person_count = self.lock_store()?.person_count()?;
        Ok(Statistics {
            person_count,
            record_count: S::gallery_len(&self.gallery.load()),
            tolerance: self.tolerance,
        })
    }

    fn persons(&self) -> Result<Vec<PersonSummary>, EngineError> {
        Ok(self.lock_store()?.persons()?)
    }

    fn identity_exists(&self, identity: &str) -> Result<bool, EngineError> {
        Ok(self.lock_store()?.person_exists(identity)?)
    }

    fn detect(&self, frame: &Frame) -> Result<Vec<FaceRegion>, EngineError> {
        let mut detector = self.detector.lock().map_err(|_| EngineError::LockPoisoned)?;
        detector
            .detect(frame)
            .map_err(|e| EngineError::Detection(e.to_string()))
    }
}
