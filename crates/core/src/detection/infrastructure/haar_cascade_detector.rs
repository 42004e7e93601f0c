/// Sliding-window Haar cascade detector.
///
/// Scans an image pyramid of the grayscale frame with the cascade's fixed
/// window, variance-normalizing every window through integral images, then
/// groups overlapping hits into one rectangle per face.
use std::path::Path;

use image::imageops::{self, FilterType};
use image::GrayImage;

use crate::detection::domain::face_detector::FaceDetector;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

use super::cascade_model::{CascadeError, HaarCascade};
use super::math::{group_rectangles, Rect};

pub const DEFAULT_SCALE_FACTOR: f64 = 1.1;
pub const DEFAULT_MIN_NEIGHBORS: usize = 5;
pub const DEFAULT_MIN_SIZE: u32 = 100;

/// Similarity tolerance used when grouping raw hits.
const GROUP_EPS: f64 = 0.2;

pub struct HaarCascadeDetector {
    cascade: HaarCascade,
    scale_factor: f64,
    min_neighbors: usize,
    min_size: u32,
}

impl HaarCascadeDetector {
    pub fn load(path: &Path) -> Result<Self, CascadeError> {
        let cascade = HaarCascade::load(path)?;
        log::info!(
            "Loaded Haar cascade {} ({} stages, {}x{} window)",
            path.display(),
            cascade.stages.len(),
            cascade.window_width,
            cascade.window_height
        );
        Ok(Self::new(cascade))
    }

    pub fn new(cascade: HaarCascade) -> Self {
        Self {
            cascade,
            scale_factor: DEFAULT_SCALE_FACTOR,
            min_neighbors: DEFAULT_MIN_NEIGHBORS,
            min_size: DEFAULT_MIN_SIZE,
        }
    }

    pub fn with_params(mut self, scale_factor: f64, min_neighbors: usize, min_size: u32) -> Self {
        // A factor of 1.0 or less would never terminate the pyramid
        self.scale_factor = scale_factor.max(1.01);
        self.min_neighbors = min_neighbors;
        self.min_size = min_size;
        self
    }

    /// Raw window hits in original-image coordinates, before grouping.
    fn scan(&self, gray: &GrayImage) -> Vec<Rect> {
        let (img_w, img_h) = gray.dimensions();
        let win_w = self.cascade.window_width;
        let win_h = self.cascade.window_height;
        let mut hits = Vec::new();

        let mut factor = 1.0f64;
        loop {
            let scaled_w = (img_w as f64 / factor).round() as u32;
            let scaled_h = (img_h as f64 / factor).round() as u32;
            if scaled_w < win_w || scaled_h < win_h {
                break;
            }
            let orig_win_w = (win_w as f64 * factor).round() as u32;
            let orig_win_h = (win_h as f64 * factor).round() as u32;
            if orig_win_w < self.min_size || orig_win_h < self.min_size {
                factor *= self.scale_factor;
                continue;
            }

            let scaled = if factor == 1.0 {
                gray.clone()
            } else {
                imageops::resize(gray, scaled_w, scaled_h, FilterType::Triangle)
            };
            let integral = IntegralImage::new(&scaled);
            let step = if factor > 2.0 { 1 } else { 2 };

            for y in (0..=(scaled_h - win_h)).step_by(step) {
                for x in (0..=(scaled_w - win_w)).step_by(step) {
                    if self.passes(&integral, x, y) {
                        hits.push(Rect::new(
                            (x as f64 * factor).round() as i64,
                            (y as f64 * factor).round() as i64,
                            orig_win_w as i64,
                            orig_win_h as i64,
                        ));
                    }
                }
            }
            factor *= self.scale_factor;
        }
        hits
    }

    fn passes(&self, ii: &IntegralImage, x: u32, y: u32) -> bool {
        let w = self.cascade.window_width;
        let h = self.cascade.window_height;

        let area = ((w - 2) * (h - 2)) as f64;
        let sum = ii.sum(x + 1, y + 1, w - 2, h - 2) as f64;
        let sq_sum = ii.sq_sum(x + 1, y + 1, w - 2, h - 2) as f64;
        let variance = area * sq_sum - sum * sum;
        let norm = if variance > 0.0 { variance.sqrt() } else { 1.0 };

        self.cascade.stages.iter().all(|stage| {
            let score: f64 = stage
                .classifiers
                .iter()
                .map(|weak| {
                    let value: f64 = weak
                        .rects
                        .iter()
                        .map(|r| r.weight * ii.sum(x + r.x, y + r.y, r.w, r.h) as f64)
                        .sum::<f64>()
                        / norm;
                    if value < weak.threshold {
                        weak.left
                    } else {
                        weak.right
                    }
                })
                .sum();
            score >= stage.threshold
        })
    }
}

impl FaceDetector for HaarCascadeDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<FaceRegion>, Box<dyn std::error::Error>> {
        let gray = frame
            .to_luma()
            .ok_or("frame data does not match its dimensions")?;
        let hits = self.scan(&gray);
        let grouped = group_rectangles(&hits, self.min_neighbors, GROUP_EPS);
        log::debug!(
            "Frame {}: {} cascade hit(s), {} face(s)",
            frame.index(),
            hits.len(),
            grouped.len()
        );
        Ok(grouped
            .iter()
            .filter_map(|r| FaceRegion::from_xywh(r.x, r.y, r.w, r.h, frame.width(), frame.height()))
            .collect())
    }
}

/// Summed-area tables of pixel values and squared pixel values.
struct IntegralImage {
    stride: usize,
    sum: Vec<u64>,
    sq_sum: Vec<u64>,
}

impl IntegralImage {
    fn new(img: &GrayImage) -> Self {
        let (w, h) = (img.width() as usize, img.height() as usize);
        let stride = w + 1;
        let mut sum = vec![0u64; stride * (h + 1)];
        let mut sq_sum = vec![0u64; stride * (h + 1)];
        let raw = img.as_raw();

        for y in 0..h {
            let mut row_sum = 0u64;
            let mut row_sq = 0u64;
            for x in 0..w {
                let v = raw[y * w + x] as u64;
                row_sum += v;
                row_sq += v * v;
                let idx = (y + 1) * stride + x + 1;
                sum[idx] = sum[idx - stride] + row_sum;
                sq_sum[idx] = sq_sum[idx - stride] + row_sq;
            }
        }
        Self {
            stride,
            sum,
            sq_sum,
        }
    }

    fn rect(table: &[u64], stride: usize, x: u32, y: u32, w: u32, h: u32) -> u64 {
        let (x0, y0) = (x as usize, y as usize);
        let (x1, y1) = (x0 + w as usize, y0 + h as usize);
        table[y1 * stride + x1] + table[y0 * stride + x0]
            - table[y0 * stride + x1]
            - table[y1 * stride + x0]
    }

    fn sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sum, self.stride, x, y, w, h)
    }

    fn sq_sum(&self, x: u32, y: u32, w: u32, h: u32) -> u64 {
        Self::rect(&self.sq_sum, self.stride, x, y, w, h)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::infrastructure::cascade_model::{FeatureRect, Stage, WeakClassifier};

    /// One-stump cascade that fires on a dark-left / bright-right edge.
    fn edge_cascade() -> HaarCascade {
        HaarCascade {
            window_width: 24,
            window_height: 24,
            stages: vec![Stage {
                threshold: 0.0,
                classifiers: vec![WeakClassifier {
                    rects: vec![
                        FeatureRect { x: 0, y: 0, w: 12, h: 24, weight: -1.0 },
                        FeatureRect { x: 12, y: 0, w: 12, h: 24, weight: 1.0 },
                    ],
                    threshold: 0.05,
                    left: -1.0,
                    right: 1.0,
                }],
            }],
        }
    }

    fn gray_frame(w: u32, h: u32, pixel: impl Fn(u32, u32) -> u8) -> Frame {
        let mut data = Vec::with_capacity((w * h * 3) as usize);
        for y in 0..h {
            for x in 0..w {
                let v = pixel(x, y);
                data.extend_from_slice(&[v, v, v]);
            }
        }
        Frame::new(data, w, h, 0)
    }

    #[test]
    fn test_integral_image_rect_sums() {
        let img = GrayImage::from_fn(4, 3, |x, y| image::Luma([(x + y * 4) as u8]));
        let ii = IntegralImage::new(&img);
        // whole image: 0..=11
        assert_eq!(ii.sum(0, 0, 4, 3), 66);
        // 2x2 at (1,1): 5 + 6 + 9 + 10
        assert_eq!(ii.sum(1, 1, 2, 2), 30);
        assert_eq!(ii.sq_sum(1, 1, 2, 2), 25 + 36 + 81 + 100);
    }

    #[test]
    fn test_detects_high_contrast_square() {
        let frame = gray_frame(400, 400, |x, y| {
            if (100..300).contains(&x) && (100..300).contains(&y) {
                if x < 200 {
                    0
                } else {
                    255
                }
            } else {
                128
            }
        });
        let mut detector = HaarCascadeDetector::new(edge_cascade());
        let faces = detector.detect(&frame).unwrap();
        assert!(!faces.is_empty());
        for face in &faces {
            assert!(face.width() >= DEFAULT_MIN_SIZE);
            assert!(face.right <= 400 && face.bottom <= 400);
        }
    }

    #[test]
    fn test_uniform_frame_has_no_faces() {
        let frame = gray_frame(320, 240, |_, _| 128);
        let mut detector = HaarCascadeDetector::new(edge_cascade());
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_frame_smaller_than_min_size_has_no_faces() {
        let frame = gray_frame(80, 80, |x, _| if x < 40 { 0 } else { 255 });
        let mut detector = HaarCascadeDetector::new(edge_cascade());
        assert!(detector.detect(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_min_neighbors_zero_returns_raw_hits() {
        let frame = gray_frame(120, 120, |x, _| if x < 60 { 0 } else { 255 });
        let mut grouped = HaarCascadeDetector::new(edge_cascade()).with_params(1.1, 1, 100);
        let mut raw = HaarCascadeDetector::new(edge_cascade()).with_params(1.1, 0, 100);
        let grouped_count = grouped.detect(&frame).unwrap().len();
        let raw_count = raw.detect(&frame).unwrap().len();
        assert!(raw_count >= grouped_count);
        assert!(raw_count > 0);
    }

    #[test]
    fn test_opencv_xml_cascade_detects_edge_square() {
        use crate::detection::infrastructure::cascade_model::fixtures::EDGE_CASCADE_XML;

        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("edge.xml");
        std::fs::write(&path, EDGE_CASCADE_XML).unwrap();
        let mut detector = HaarCascadeDetector::load(&path).unwrap();

        let frame = gray_frame(400, 400, |x, y| {
            let inside = (100..300).contains(&x) && (100..300).contains(&y);
            match (inside, x < 200) {
                (true, true) => 0,
                (true, false) => 255,
                _ => 128,
            }
        });
        assert!(!detector.detect(&frame).unwrap().is_empty());
        assert!(detector.detect(&gray_frame(320, 240, |_, _| 128)).unwrap().is_empty());
    }
}
