/// Multi-sample enrollment: Idle → Capturing → Idle.
///
/// While capturing, every frame with exactly one face is registered with the
/// engine, at most once per debounce interval, until the target sample count
/// is reached.
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

use crate::enrollment::domain::clock::Clock;
use crate::recognition::domain::identity::is_valid_identity;
use crate::recognition::domain::matching_engine::{
    EngineError, MatchingEngine, RegistrationOutcome, RejectReason,
};
use crate::shared::frame::Frame;

#[derive(Error, Debug)]
pub enum EnrollmentError {
    #[error("invalid identity name {0:?}: use letters, digits, '-' or '_'")]
    InvalidIdentity(String),
    #[error("already enrolling {0}")]
    AlreadyCapturing(String),
    #[error("target sample count must be at least 1")]
    ZeroTarget,
    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BeginOutcome {
    /// The identity already had samples; new ones are added to them.
    pub appending: bool,
}

/// What happened to one frame during enrollment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrollmentEvent {
    /// No session is active.
    Idle,
    NoFace,
    MultipleFaces,
    /// One face, but too soon after the previous capture.
    Debounced,
    Captured {
        identity: String,
        count: usize,
        target: usize,
    },
    Completed {
        identity: String,
        samples: usize,
    },
    CaptureFailed {
        reason: RejectReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    identity: String,
    captured: usize,
    target: usize,
    last_capture: Option<Instant>,
}

impl ActiveSession {
    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn captured(&self) -> usize {
        self.captured
    }

    pub fn target(&self) -> usize {
        self.target
    }
}

#[derive(Debug)]
enum State {
    Idle,
    Capturing(ActiveSession),
}

pub struct EnrollmentStateMachine {
    engine: Arc<dyn MatchingEngine>,
    clock: Arc<dyn Clock>,
    debounce: Duration,
    state: State,
}

impl EnrollmentStateMachine {
    pub fn new(engine: Arc<dyn MatchingEngine>, clock: Arc<dyn Clock>, debounce: Duration) -> Self {
        Self {
            engine,
            clock,
            debounce,
            state: State::Idle,
        }
    }

    /// Starts a session for `identity`, collecting `target` samples.
    pub fn begin(&mut self, identity: &str, target: usize) -> Result<BeginOutcome, EnrollmentError> {
        if let State::Capturing(session) = &self.state {
            return Err(EnrollmentError::AlreadyCapturing(session.identity.clone()));
        }
        if !is_valid_identity(identity) {
            return Err(EnrollmentError::InvalidIdentity(identity.to_string()));
        }
        if target == 0 {
            return Err(EnrollmentError::ZeroTarget);
        }

        let appending = self.engine.identity_exists(identity)?;
        if appending {
            log::info!("{identity} is already enrolled; new samples will be added");
        }
        log::info!("Enrolling {identity}: capturing {target} samples");
        self.state = State::Capturing(ActiveSession {
            identity: identity.to_string(),
            captured: 0,
            target,
            last_capture: None,
        });
        Ok(BeginOutcome { appending })
    }

    /// Ends the session without completing it. Samples already captured
    /// stay in the gallery.
    pub fn cancel(&mut self) {
        if let State::Capturing(session) = std::mem::replace(&mut self.state, State::Idle) {
            log::info!(
                "Enrollment of {} cancelled after {}/{} samples",
                session.identity,
                session.captured,
                session.target
            );
        }
    }

    pub fn is_capturing(&self) -> bool {
        matches!(self.state, State::Capturing(_))
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        match &self.state {
            State::Capturing(session) => Some(session),
            State::Idle => None,
        }
    }

    /// Feeds one frame to the active session.
    ///
    /// Engine failures are returned and leave the session as it was.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<EnrollmentEvent, EngineError> {
        let State::Capturing(session) = &mut self.state else {
            return Ok(EnrollmentEvent::Idle);
        };
        let now = self.clock.now();

        match self.engine.detect(frame)?.len() {
            0 => return Ok(EnrollmentEvent::NoFace),
            1 => {}
            _ => return Ok(EnrollmentEvent::MultipleFaces),
        }
        if let Some(last) = session.last_capture {
            if now.saturating_duration_since(last) < self.debounce {
                return Ok(EnrollmentEvent::Debounced);
            }
        }

        match self.engine.register_one(frame, &session.identity)? {
            RegistrationOutcome::Rejected(reason) => {
                log::debug!("Enrollment capture rejected: {reason}");
                Ok(EnrollmentEvent::CaptureFailed { reason })
            }
            RegistrationOutcome::Registered => {
                session.captured += 1;
                session.last_capture = Some(now);
                log::info!(
                    "Captured sample {}/{} for {}",
                    session.captured,
                    session.target,
                    session.identity
                );
                if session.captured < session.target {
                    return Ok(EnrollmentEvent::Captured {
                        identity: session.identity.clone(),
                        count: session.captured,
                        target: session.target,
                    });
                }
                let event = EnrollmentEvent::Completed {
                    identity: std::mem::take(&mut session.identity),
                    samples: session.captured,
                };
                self.state = State::Idle;
                Ok(event)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enrollment::domain::clock::manual::ManualClock;
    use crate::gallery::infrastructure::sqlite_gallery_store::SqliteGalleryStore;
    use crate::recognition::infrastructure::embedding_strategy::EmbeddingStrategy;
    use crate::recognition::infrastructure::gallery_matching_engine::GalleryMatchingEngine;
    use crate::testing::{face_frame, HeaderDetector, HeaderEmbedder};
    use rstest::rstest;

    const DEBOUNCE: Duration = Duration::from_millis(500);

    fn setup() -> (EnrollmentStateMachine, Arc<dyn MatchingEngine>, Arc<ManualClock>) {
        let engine: Arc<dyn MatchingEngine> = Arc::new(
            GalleryMatchingEngine::new(
                EmbeddingStrategy::new(Box::new(HeaderEmbedder)),
                Box::new(HeaderDetector),
                Box::new(SqliteGalleryStore::open_in_memory().unwrap()),
                0.6,
            )
            .unwrap(),
        );
        let clock = Arc::new(ManualClock::new());
        let machine = EnrollmentStateMachine::new(engine.clone(), clock.clone(), DEBOUNCE);
        (machine, engine, clock)
    }

    fn record_count(engine: &Arc<dyn MatchingEngine>) -> usize {
        engine.statistics().unwrap().record_count
    }

    #[rstest]
    #[case("")]
    #[case("bad name")]
    #[case("semi;colon")]
    fn test_begin_rejects_invalid_identity(#[case] name: &str) {
        let (mut machine, _, _) = setup();
        assert!(matches!(
            machine.begin(name, 10),
            Err(EnrollmentError::InvalidIdentity(_))
        ));
        assert!(!machine.is_capturing());
    }

    #[test]
    fn test_begin_rejects_zero_target() {
        let (mut machine, _, _) = setup();
        assert!(matches!(machine.begin("alice", 0), Err(EnrollmentError::ZeroTarget)));
    }

    #[test]
    fn test_begin_while_capturing_fails() {
        let (mut machine, _, _) = setup();
        machine.begin("alice", 10).unwrap();
        assert!(matches!(
            machine.begin("bob", 10),
            Err(EnrollmentError::AlreadyCapturing(name)) if name == "alice"
        ));
        assert_eq!(machine.session().unwrap().identity(), "alice");
    }

    #[test]
    fn test_ten_spaced_captures_complete_enrollment() {
        let (mut machine, engine, clock) = setup();
        assert_eq!(machine.begin("alice", 10).unwrap(), BeginOutcome { appending: false });

        for i in 1..=9 {
            let event = machine.process_frame(&face_frame(1, 10)).unwrap();
            assert_eq!(
                event,
                EnrollmentEvent::Captured {
                    identity: "alice".into(),
                    count: i,
                    target: 10
                }
            );
            clock.advance(DEBOUNCE);
        }
        let event = machine.process_frame(&face_frame(1, 10)).unwrap();
        assert_eq!(
            event,
            EnrollmentEvent::Completed {
                identity: "alice".into(),
                samples: 10
            }
        );
        assert!(!machine.is_capturing());
        assert_eq!(record_count(&engine), 10);
        assert_eq!(engine.statistics().unwrap().person_count, 1);
    }

    #[test]
    fn test_fast_frames_are_debounced() {
        let (mut machine, engine, clock) = setup();
        machine.begin("alice", 10).unwrap();

        // 100 ms frames for 2 s: captures at 0, 500, 1000, 1500, 2000 ms
        let mut captured = 0;
        for _ in 0..=20 {
            match machine.process_frame(&face_frame(1, 10)).unwrap() {
                EnrollmentEvent::Captured { .. } => captured += 1,
                EnrollmentEvent::Debounced => {}
                other => panic!("unexpected event {other:?}"),
            }
            clock.advance(Duration::from_millis(100));
        }
        assert_eq!(captured, 5);
        assert_eq!(record_count(&engine), 5);
        assert_eq!(machine.session().unwrap().captured(), 5);
    }

    #[test]
    fn test_face_count_other_than_one_keeps_capturing() {
        let (mut machine, engine, clock) = setup();
        machine.begin("alice", 3).unwrap();

        assert_eq!(machine.process_frame(&face_frame(0, 10)).unwrap(), EnrollmentEvent::NoFace);
        clock.advance(DEBOUNCE);
        assert_eq!(
            machine.process_frame(&face_frame(2, 10)).unwrap(),
            EnrollmentEvent::MultipleFaces
        );
        assert!(machine.is_capturing());
        assert_eq!(record_count(&engine), 0);
    }

    #[test]
    fn test_cancel_keeps_partial_samples() {
        let (mut machine, engine, clock) = setup();
        machine.begin("alice", 10).unwrap();
        for _ in 0..3 {
            machine.process_frame(&face_frame(1, 10)).unwrap();
            clock.advance(DEBOUNCE);
        }
        machine.cancel();

        assert!(!machine.is_capturing());
        assert_eq!(record_count(&engine), 3);
        assert_eq!(machine.process_frame(&face_frame(1, 10)).unwrap(), EnrollmentEvent::Idle);
        assert_eq!(record_count(&engine), 3);
    }

    #[test]
    fn test_begin_reports_existing_identity() {
        let (mut machine, engine, _) = setup();
        engine.register_one(&face_frame(1, 10), "alice").unwrap();
        assert!(machine.begin("alice", 2).unwrap().appending);
    }

    #[test]
    fn test_idle_machine_ignores_frames() {
        let (mut machine, engine, _) = setup();
        assert_eq!(machine.process_frame(&face_frame(1, 10)).unwrap(), EnrollmentEvent::Idle);
        assert_eq!(record_count(&engine), 0);
    }

    #[test]
    fn test_unencodable_face_reports_failure() {
        let (mut machine, engine, _) = setup();
        machine.begin("alice", 2).unwrap();
        let event = machine
            .process_frame(&face_frame(1, crate::testing::UNENCODABLE))
            .unwrap();
        assert_eq!(
            event,
            EnrollmentEvent::CaptureFailed {
                reason: RejectReason::EncodingFailed
            }
        );
        assert!(machine.is_capturing());
        assert_eq!(record_count(&engine), 0);
    }

    #[test]
    fn test_new_session_after_completion() {
        let (mut machine, engine, clock) = setup();
        machine.begin("alice", 1).unwrap();
        assert!(matches!(
            machine.process_frame(&face_frame(1, 10)).unwrap(),
            EnrollmentEvent::Completed { samples: 1, .. }
        ));
        clock.advance(Duration::from_millis(10));
        machine.begin("bob", 1).unwrap();
        // last capture resets with the new session, so no debounce carries over
        assert!(matches!(
            machine.process_frame(&face_frame(1, 40)).unwrap(),
            EnrollmentEvent::Completed { .. }
        ));
        assert_eq!(engine.statistics().unwrap().person_count, 2);
    }
}
