//! Local binary pattern histogram (LBPH) face classifier.
//!
//! Each training patch becomes a concatenation of per-cell 256-bin LBP
//! histograms; prediction returns the label of the nearest training sample
//! under the chi-square distance. Lower distance means a better match.

use image::GrayImage;

const RADIUS: i64 = 1;
const NEIGHBORS: usize = 8;
const GRID_X: usize = 8;
const GRID_Y: usize = 8;
const BINS: usize = 1 << NEIGHBORS;

/// Interpolated neighbours this close to the centre count as equal.
const EQUAL_EPS: f32 = 1e-3;

#[derive(Debug, Default)]
pub struct LbphClassifier {
    samples: Vec<(usize, Vec<f32>)>,
}

impl LbphClassifier {
    /// Trains from scratch on `(label, patch)` pairs.
    pub fn train<'a>(samples: impl IntoIterator<Item = (usize, &'a GrayImage)>) -> Self {
        Self {
            samples: samples
                .into_iter()
                .filter_map(|(label, patch)| spatial_histogram(patch).map(|h| (label, h)))
                .collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Nearest training sample as `(label, distance)`; first sample wins ties.
    pub fn predict(&self, patch: &GrayImage) -> Option<(usize, f64)> {
        let query = spatial_histogram(patch)?;
        self.samples
            .iter()
            .map(|(label, hist)| (*label, chi_square(hist, &query)))
            .fold(None, |best: Option<(usize, f64)>, (label, d)| match best {
                Some((_, best_d)) if best_d <= d => best,
                _ => Some((label, d)),
            })
    }
}

/// Circular LBP code image, `2 * RADIUS` smaller than the input per axis.
fn lbp_codes(patch: &GrayImage) -> Option<(Vec<u8>, usize, usize)> {
    let (w, h) = (patch.width() as i64, patch.height() as i64);
    if w <= 2 * RADIUS || h <= 2 * RADIUS {
        return None;
    }
    let px = |x: i64, y: i64| patch.get_pixel(x as u32, y as u32)[0] as f32;
    let out_w = (w - 2 * RADIUS) as usize;
    let out_h = (h - 2 * RADIUS) as usize;
    let mut codes = vec![0u8; out_w * out_h];

    for n in 0..NEIGHBORS {
        let angle = 2.0 * std::f64::consts::PI * n as f64 / NEIGHBORS as f64;
        let x = RADIUS as f64 * angle.cos();
        let y = -(RADIUS as f64) * angle.sin();
        let (fx, fy) = (x.floor() as i64, y.floor() as i64);
        let (cx, cy) = (x.ceil() as i64, y.ceil() as i64);
        let (tx, ty) = ((x - fx as f64) as f32, (y - fy as f64) as f32);
        let w1 = (1.0 - tx) * (1.0 - ty);
        let w2 = tx * (1.0 - ty);
        let w3 = (1.0 - tx) * ty;
        let w4 = tx * ty;

        for i in RADIUS..h - RADIUS {
            for j in RADIUS..w - RADIUS {
                let t = w1 * px(j + fx, i + fy)
                    + w2 * px(j + cx, i + fy)
                    + w3 * px(j + fx, i + cy)
                    + w4 * px(j + cx, i + cy);
                let center = px(j, i);
                if t > center || (t - center).abs() < EQUAL_EPS {
                    let idx = (i - RADIUS) as usize * out_w + (j - RADIUS) as usize;
                    codes[idx] |= 1 << n;
                }
            }
        }
    }
    Some((codes, out_w, out_h))
}

/// Normalized LBP histograms of an 8x8 cell grid, concatenated.
fn spatial_histogram(patch: &GrayImage) -> Option<Vec<f32>> {
    let (codes, w, h) = lbp_codes(patch)?;
    let cell_w = w / GRID_X;
    let cell_h = h / GRID_Y;
    if cell_w == 0 || cell_h == 0 {
        return None;
    }

    let mut hist = vec![0f32; GRID_X * GRID_Y * BINS];
    let per_cell = (cell_w * cell_h) as f32;
    for gy in 0..GRID_Y {
        for gx in 0..GRID_X {
            let cell = &mut hist[(gy * GRID_X + gx) * BINS..][..BINS];
            for y in gy * cell_h..(gy + 1) * cell_h {
                for x in gx * cell_w..(gx + 1) * cell_w {
                    cell[codes[y * w + x] as usize] += 1.0;
                }
            }
            cell.iter_mut().for_each(|v| *v /= per_cell);
        }
    }
    Some(hist)
}

/// Alternative chi-square: `sum 2 (a - b)^2 / (a + b)`.
fn chi_square(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(&a, &b)| {
            let (a, b) = (a as f64, b as f64);
            let sum = a + b;
            if sum > f64::EPSILON {
                2.0 * (a - b) * (a - b) / sum
            } else {
                0.0
            }
        })
        .sum()
}
