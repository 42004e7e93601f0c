/// Background loop that pulls frames from a source and routes each one to
/// enrollment (while a session is active) or to recognition.
///
/// Results reach consumers through a bounded channel that never blocks the
/// loop, plus a slot holding the most recent update.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use thiserror::Error;

use crate::capture::domain::frame_source::FrameSource;
use crate::enrollment::domain::enrollment_session::{
    BeginOutcome, EnrollmentError, EnrollmentEvent, EnrollmentStateMachine,
};
use crate::recognition::domain::matching_engine::{MatchResult, MatchingEngine};

/// Pause after a missed frame before polling the source again.
pub const DEFAULT_MISS_SLEEP: Duration = Duration::from_millis(10);

const DEFAULT_UPDATE_CAPACITY: usize = 8;

#[derive(Error, Debug)]
pub enum CaptureError {
    #[error("frame source could not be started")]
    SourceUnavailable,
    #[error("capture loop has stopped")]
    Stopped,
    #[error(transparent)]
    Enrollment(#[from] EnrollmentError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureUpdate {
    Recognized {
        frame_index: usize,
        results: Vec<MatchResult>,
    },
    Enrollment {
        frame_index: usize,
        event: EnrollmentEvent,
    },
    Error {
        frame_index: usize,
        message: String,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct CaptureConfig {
    pub miss_sleep: Duration,
    pub update_capacity: usize,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            miss_sleep: DEFAULT_MISS_SLEEP,
            update_capacity: DEFAULT_UPDATE_CAPACITY,
        }
    }
}

enum Command {
    BeginEnrollment {
        identity: String,
        target: usize,
        reply: Sender<Result<BeginOutcome, EnrollmentError>>,
    },
    CancelEnrollment,
}

pub struct CaptureLoop {
    running: Arc<AtomicBool>,
    commands: Sender<Command>,
    updates: Receiver<CaptureUpdate>,
    latest: Arc<Mutex<Option<CaptureUpdate>>>,
    handle: Option<JoinHandle<()>>,
}

impl CaptureLoop {
    /// Starts `source` and spawns the loop thread.
    ///
    /// `enrollment` may already be capturing, so no frame is missed between
    /// start-up and the first session.
    pub fn spawn(
        mut source: Box<dyn FrameSource>,
        engine: Arc<dyn MatchingEngine>,
        enrollment: EnrollmentStateMachine,
        config: CaptureConfig,
    ) -> Result<Self, CaptureError> {
        if !source.start() {
            return Err(CaptureError::SourceUnavailable);
        }

        let running = Arc::new(AtomicBool::new(true));
        let (command_tx, command_rx) = crossbeam_channel::unbounded::<Command>();
        let (update_tx, update_rx) =
            crossbeam_channel::bounded::<CaptureUpdate>(config.update_capacity.max(1));
        let latest = Arc::new(Mutex::new(None));

        let worker = Worker {
            source,
            engine,
            enrollment,
            running: running.clone(),
            commands: command_rx,
            updates: update_tx,
            latest: latest.clone(),
            miss_sleep: config.miss_sleep,
        };
        let handle = thread::spawn(move || worker.run());

        Ok(Self {
            running,
            commands: command_tx,
            updates: update_rx,
            latest,
            handle: Some(handle),
        })
    }

    /// Starts an enrollment session on the loop thread and waits for the
    /// outcome.
    pub fn begin_enrollment(&self, identity: &str, target: usize) -> Result<BeginOutcome, CaptureError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        self.commands
            .send(Command::BeginEnrollment {
                identity: identity.to_string(),
                target,
                reply: reply_tx,
            })
            .map_err(|_| CaptureError::Stopped)?;
        Ok(reply_rx.recv().map_err(|_| CaptureError::Stopped)??)
    }

    pub fn cancel_enrollment(&self) {
        let _ = self.commands.send(Command::CancelEnrollment);
    }

    /// Updates in frame order. Disconnects once the loop has exited.
    pub fn updates(&self) -> &Receiver<CaptureUpdate> {
        &self.updates
    }

    pub fn latest(&self) -> Option<CaptureUpdate> {
        self.latest.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Signals the loop to exit and waits for it.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Capture loop thread panicked");
            }
        }
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Worker {
    source: Box<dyn FrameSource>,
    engine: Arc<dyn MatchingEngine>,
    enrollment: EnrollmentStateMachine,
    running: Arc<AtomicBool>,
    commands: Receiver<Command>,
    updates: Sender<CaptureUpdate>,
    latest: Arc<Mutex<Option<CaptureUpdate>>>,
    miss_sleep: Duration,
}

impl Worker {
    fn run(mut self) {
        log::info!("Capture loop started");
        while self.running.load(Ordering::Relaxed) {
            self.drain_commands();
            if !self.source.is_running() {
                break;
            }
            let Some(frame) = self.source.next_frame() else {
                thread::sleep(self.miss_sleep);
                continue;
            };

            let frame_index = frame.index();
            let update = if self.enrollment.is_capturing() {
                self.enrollment
                    .process_frame(&frame)
                    .map(|event| CaptureUpdate::Enrollment { frame_index, event })
            } else {
                self.engine
                    .recognize_all(&frame)
                    .map(|results| CaptureUpdate::Recognized {
                        frame_index,
                        results,
                    })
            };
            let update = update.unwrap_or_else(|e| {
                log::warn!("Frame {frame_index} failed: {e}");
                CaptureUpdate::Error {
                    frame_index,
                    message: e.to_string(),
                }
            });
            self.publish(update);
        }

        // Commands that raced with shutdown still get an answer
        self.drain_commands();
        self.enrollment.cancel();
        self.source.stop();
        self.running.store(false, Ordering::Relaxed);
        log::info!("Capture loop stopped");
    }

    fn drain_commands(&mut self) {
        while let Ok(command) = self.commands.try_recv() {
            match command {
                Command::BeginEnrollment {
                    identity,
                    target,
                    reply,
                } => {
                    let _ = reply.send(self.enrollment.begin(&identity, target));
                }
                Command::CancelEnrollment => self.enrollment.cancel(),
            }
        }
    }

    fn publish(&self, update: CaptureUpdate) {
        if let Ok(mut slot) = self.latest.lock() {
            *slot = Some(update.clone());
        }
        match self.updates.try_send(update) {
            Ok(()) | Err(TrySendError::Disconnected(_)) => {}
            Err(TrySendError::Full(_)) => log::debug!("Update channel full; dropping update"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    use crate::capture::infrastructure::image_sequence_source::ImageSequenceSource;
    use crate::capture::infrastructure::paced_frame_source::PacedFrameSource;
    use crate::enrollment::domain::clock::SystemClock;
    use crate::gallery::infrastructure::sqlite_gallery_store::SqliteGalleryStore;
    use crate::recognition::infrastructure::embedding_strategy::EmbeddingStrategy;
    use crate::recognition::infrastructure::gallery_matching_engine::GalleryMatchingEngine;
    use crate::shared::frame::Frame;
    use crate::testing::{face_frame, HeaderDetector, HeaderEmbedder, FRAME_SIZE};
    use tempfile::TempDir;

    /// Plays back a script of frames (`None` = miss), then reports exhausted.
    /// With `endless`, keeps missing instead of ending.
    struct ScriptedSource {
        script: VecDeque<Option<Frame>>,
        startable: bool,
        endless: bool,
        running: bool,
    }

    impl ScriptedSource {
        fn new(frames: Vec<Option<Frame>>) -> Self {
            Self {
                script: frames.into(),
                startable: true,
                endless: false,
                running: false,
            }
        }
    }

    impl FrameSource for ScriptedSource {
        fn start(&mut self) -> bool {
            self.running = self.startable;
            self.running
        }

        fn stop(&mut self) {
            self.running = false;
        }

        fn next_frame(&mut self) -> Option<Frame> {
            match self.script.pop_front() {
                Some(frame) => frame,
                None => {
                    self.running = self.endless;
                    None
                }
            }
        }

        fn is_running(&self) -> bool {
            self.running
        }
    }

    fn frame(index: usize, faces: u8, appearance: u8) -> Option<Frame> {
        let f = face_frame(faces, appearance);
        Some(Frame::new(f.data().to_vec(), f.width(), f.height(), index))
    }

    fn engine() -> Arc<dyn MatchingEngine> {
        Arc::new(
            GalleryMatchingEngine::new(
                EmbeddingStrategy::new(Box::new(HeaderEmbedder)),
                Box::new(HeaderDetector),
                Box::new(SqliteGalleryStore::open_in_memory().unwrap()),
                0.6,
            )
            .unwrap(),
        )
    }

    fn machine(engine: &Arc<dyn MatchingEngine>) -> EnrollmentStateMachine {
        EnrollmentStateMachine::new(engine.clone(), Arc::new(SystemClock), Duration::ZERO)
    }

    fn config() -> CaptureConfig {
        CaptureConfig {
            miss_sleep: Duration::from_millis(1),
            update_capacity: 16,
        }
    }

    #[test]
    fn test_spawn_fails_when_source_cannot_start() {
        let engine = engine();
        let mut source = ScriptedSource::new(Vec::new());
        source.startable = false;
        let result = CaptureLoop::spawn(Box::new(source), engine.clone(), machine(&engine), config());
        assert!(matches!(result, Err(CaptureError::SourceUnavailable)));
    }

    #[test]
    fn test_idle_loop_recognizes_every_frame() {
        let engine = engine();
        let enrolled = engine.register_one(&face_frame(1, 3), "alice").unwrap();
        assert!(enrolled.is_registered());
        let source = ScriptedSource::new(vec![frame(0, 1, 3), None, frame(1, 2, 40)]);
        let capture = CaptureLoop::spawn(Box::new(source), engine.clone(), machine(&engine), config()).unwrap();

        let updates: Vec<CaptureUpdate> = capture.updates().iter().collect();
        assert_eq!(updates.len(), 2);
        match &updates[0] {
            CaptureUpdate::Recognized { results, .. } => assert_eq!(results[0].name(), "alice"),
            other => panic!("unexpected update {other:?}"),
        }
        match &updates[1] {
            CaptureUpdate::Recognized {
                frame_index,
                results,
            } => {
                assert_eq!(*frame_index, 1);
                assert_eq!(results.len(), 2);
                assert!(results.iter().all(|r| r.identity.is_none()));
            }
            other => panic!("unexpected update {other:?}"),
        }
        assert_eq!(capture.latest(), updates.last().cloned());
    }

    #[test]
    fn test_enrollment_then_recognition() {
        let engine = engine();
        let mut enrollment = machine(&engine);
        enrollment.begin("alice", 2).unwrap();
        let source = ScriptedSource::new(vec![frame(0, 1, 3), frame(1, 1, 3), frame(2, 1, 3)]);
        let capture = CaptureLoop::spawn(Box::new(source), engine.clone(), enrollment, config()).unwrap();

        let updates: Vec<CaptureUpdate> = capture.updates().iter().collect();
        assert_eq!(
            updates[0],
            CaptureUpdate::Enrollment {
                frame_index: 0,
                event: EnrollmentEvent::Captured {
                    identity: "alice".into(),
                    count: 1,
                    target: 2,
                },
            }
        );
        assert_eq!(
            updates[1],
            CaptureUpdate::Enrollment {
                frame_index: 1,
                event: EnrollmentEvent::Completed {
                    identity: "alice".into(),
                    samples: 2,
                },
            }
        );
        match &updates[2] {
            CaptureUpdate::Recognized { results, .. } => {
                assert_eq!(results[0].name(), "alice");
            }
            other => panic!("unexpected update {other:?}"),
        }
        assert_eq!(engine.statistics().unwrap().record_count, 2);
    }

    #[test]
    fn test_begin_and_cancel_through_commands() {
        let engine = engine();
        let mut source = ScriptedSource::new(Vec::new());
        source.endless = true;
        let mut capture =
            CaptureLoop::spawn(Box::new(source), engine.clone(), machine(&engine), config()).unwrap();

        let outcome = capture.begin_enrollment("bob", 3).unwrap();
        assert!(!outcome.appending);
        assert!(matches!(
            capture.begin_enrollment("carol", 3),
            Err(CaptureError::Enrollment(EnrollmentError::AlreadyCapturing(_)))
        ));
        capture.cancel_enrollment();
        assert!(capture.begin_enrollment("carol", 3).is_ok());
        assert!(matches!(
            capture.begin_enrollment("not valid", 3),
            Err(CaptureError::Enrollment(_))
        ));

        assert!(capture.is_running());
        capture.stop();
        assert!(!capture.is_running());
        assert!(matches!(capture.begin_enrollment("dave", 1), Err(CaptureError::Stopped)));
    }

    #[test]
    fn test_full_channel_drops_updates_without_stalling() {
        let engine = engine();
        let frames = (0..6).map(|i| frame(i, 1, 3)).collect();
        let mut capture = CaptureLoop::spawn(
            Box::new(ScriptedSource::new(frames)),
            engine.clone(),
            machine(&engine),
            CaptureConfig {
                update_capacity: 1,
                ..config()
            },
        )
        .unwrap();

        while capture.is_running() {
            std::thread::sleep(Duration::from_millis(1));
        }
        capture.stop();
        assert_eq!(capture.updates().try_iter().count(), 1);
        assert!(matches!(
            capture.latest(),
            Some(CaptureUpdate::Recognized { frame_index: 5, .. })
        ));
    }

    #[test]
    fn test_engine_errors_become_updates() {
        let engine: Arc<dyn MatchingEngine> = Arc::new(
            GalleryMatchingEngine::new(
                EmbeddingStrategy::new(Box::new(HeaderEmbedder)),
                Box::new(crate::testing::BrokenDetector),
                Box::new(SqliteGalleryStore::open_in_memory().unwrap()),
                0.6,
            )
            .unwrap(),
        );
        let mut enrollment = machine(&engine);
        enrollment.begin("alice", 1).unwrap();
        let source = ScriptedSource::new(vec![frame(7, 1, 3)]);
        let capture = CaptureLoop::spawn(Box::new(source), engine.clone(), enrollment, config()).unwrap();
        let updates: Vec<CaptureUpdate> = capture.updates().iter().collect();
        assert!(matches!(updates[..], [CaptureUpdate::Error { frame_index: 7, .. }]));
    }

    #[test]
    fn test_paced_stills_enroll_one_sample_each() {
        let tmp = TempDir::new().unwrap();
        for i in 0..4 {
            // one face, appearance 3
            let mut img = image::RgbImage::new(FRAME_SIZE, FRAME_SIZE);
            img.put_pixel(0, 0, image::Rgb([1, 3, 0]));
            img.save(tmp.path().join(format!("{i:02}.png"))).unwrap();
        }
        let debounce = Duration::from_millis(30);
        let engine = engine();
        let mut enrollment = EnrollmentStateMachine::new(engine.clone(), Arc::new(SystemClock), debounce);
        enrollment.begin("alice", 4).unwrap();
        let source = PacedFrameSource::new(Box::new(ImageSequenceSource::new(tmp.path())), debounce * 2);
        let capture = CaptureLoop::spawn(Box::new(source), engine.clone(), enrollment, config()).unwrap();

        let events: Vec<EnrollmentEvent> = capture
            .updates()
            .iter()
            .filter_map(|update| match update {
                CaptureUpdate::Enrollment { event, .. } => Some(event),
                _ => None,
            })
            .collect();
        assert!(!events.contains(&EnrollmentEvent::Debounced));
        assert_eq!(
            events.last(),
            Some(&EnrollmentEvent::Completed {
                identity: "alice".into(),
                samples: 4,
            })
        );
        assert_eq!(engine.statistics().unwrap().record_count, 4);
    }
}
