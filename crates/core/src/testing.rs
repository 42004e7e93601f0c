//! Deterministic fakes shared by unit tests.
//!
//! Test frames carry their own ground truth: byte 0 is the number of faces
//! and byte 1 is a scalar "appearance" that the fake embedder turns into a
//! vector, so no model is needed to exercise the engines.

use crate::detection::domain::face_detector::FaceDetector;
use crate::recognition::domain::face_embedder::FaceEmbedder;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

pub const FRAME_SIZE: u32 = 64;
const FACE_WIDTH: u32 = 16;

/// Appearance value the fake embedder refuses to encode.
pub const UNENCODABLE: u8 = 255;

pub fn face_frame(faces: u8, appearance: u8) -> Frame {
    let mut data = vec![0u8; (FRAME_SIZE * FRAME_SIZE * 3) as usize];
    data[0] = faces;
    data[1] = appearance;
    Frame::new(data, FRAME_SIZE, FRAME_SIZE, 0)
}

/// Reports `data[0]` side-by-side faces.
pub struct HeaderDetector;

impl FaceDetector for HeaderDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        let faces = frame.data().first().copied().unwrap_or(0) as u32;
        Ok((0..faces.min(FRAME_SIZE / FACE_WIDTH))
            .map(|i| FaceRegion::new(0, FACE_WIDTH * (i + 1), FACE_WIDTH, FACE_WIDTH * i))
            .collect())
    }
}

/// Embeds face `i` of a frame with appearance `a` as `[(a + i) / 10, 0]`.
pub struct HeaderEmbedder;

impl FaceEmbedder for HeaderEmbedder {
    fn embed(
        &self,
        frame: &Frame,
        regions: &[FaceRegion],
    ) -> Result<Vec<Option<Vec<f32>>>, Box<dyn std::error::Error>> {
        let appearance = frame.data().get(1).copied().unwrap_or(0);
        Ok(regions
            .iter()
            .map(|r| {
                (appearance != UNENCODABLE).then(|| {
                    let i = (r.left / FACE_WIDTH) as f32;
                    vec![(appearance as f32 + i) / 10.0, 0.0]
                })
            })
            .collect())
    }
}

/// Treats the whole frame as a single face.
pub struct FullFrameDetector;

impl FaceDetector for FullFrameDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        Ok(FaceRegion::new(0, frame.width(), frame.height(), 0)
            .clamp_to(frame.width(), frame.height())
            .into_iter()
            .collect())
    }
}

/// Always fails, for error-propagation tests.
pub struct BrokenDetector;

impl FaceDetector for BrokenDetector {
    fn detect(&mut self, _frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        Err("camera exploded".into())
    }
}
