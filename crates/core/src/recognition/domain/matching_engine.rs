use std::fmt;

use thiserror::Error;

use crate::gallery::domain::gallery_store::{GalleryError, PersonSummary};
use crate::shared::constants::UNKNOWN_IDENTITY;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error("face detection failed: {0}")]
    Detection(String),
    #[error("feature extraction failed: {0}")]
    Extraction(String),
    #[error("engine lock poisoned")]
    LockPoisoned,
}

/// One recognized (or unrecognized) face in a frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub region: FaceRegion,
    /// `None` when the face matched nobody in the gallery.
    pub identity: Option<String>,
    /// Heuristic score in `[0, 100]`; 0 for unknown faces.
    pub confidence: f64,
}

impl MatchResult {
    pub fn unknown(region: FaceRegion) -> Self {
        Self {
            region,
            identity: None,
            confidence: 0.0,
        }
    }

    /// Display name, `"Unknown"` for unmatched faces.
    pub fn name(&self) -> &str {
        self.identity.as_deref().unwrap_or(UNKNOWN_IDENTITY)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub person_count: usize,
    pub record_count: usize,
    pub tolerance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NoFace,
    MultipleFaces,
    InvalidIdentity,
    EncodingFailed,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            RejectReason::NoFace => "no face detected",
            RejectReason::MultipleFaces => "multiple faces detected",
            RejectReason::InvalidIdentity => "invalid identity name",
            RejectReason::EncodingFailed => "failed to encode face",
        };
        f.write_str(msg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    Registered,
    Rejected(RejectReason),
}

impl RegistrationOutcome {
    pub fn is_registered(&self) -> bool {
        matches!(self, RegistrationOutcome::Registered)
    }
}

/// Detection, feature extraction and gallery comparison behind one seam.
///
/// All methods take `&self`: readers see an immutable gallery snapshot that
/// writers replace wholesale after every mutation, so recognition never
/// blocks on registration.
pub trait MatchingEngine: Send + Sync {
    /// Rebuilds the in-memory gallery from the store. Returns the number of
    /// records loaded.
    fn reload(&self) -> Result<usize, EngineError>;

    /// Detects and classifies every face in `frame`. Empty when the gallery
    /// is empty or no face is found.
    fn recognize_all(&self, frame: &Frame) -> Result<Vec<MatchResult>, EngineError>;

    /// Stores one new record for `identity` when `frame` holds exactly one face.
    fn register_one(&self, frame: &Frame, identity: &str)
        -> Result<RegistrationOutcome, EngineError>;

    fn delete_identity(&self, identity: &str) -> Result<bool, EngineError>;

    fn clear_all(&self) -> Result<(), EngineError>;

    fn statistics(&self) -> Result<Statistics, EngineError>;

    fn persons(&self) -> Result<Vec<PersonSummary>, EngineError>;

    fn identity_exists(&self, identity: &str) -> Result<bool, EngineError>;

    /// Face regions only, without classification.
    fn detect(&self, frame: &Frame) -> Result<Vec<FaceRegion>, EngineError>;
}
