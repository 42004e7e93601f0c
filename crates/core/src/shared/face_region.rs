/// Axis-aligned face rectangle in frame pixel coordinates.
///
/// Stored as (top, right, bottom, left) offsets with `right` and `bottom`
/// exclusive. Every detector normalizes to this shape regardless of its
/// native box convention.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FaceRegion {
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
    pub left: u32,
}

impl FaceRegion {
    pub fn new(top: u32, right: u32, bottom: u32, left: u32) -> Self {
        Self {
            top,
            right,
            bottom,
            left,
        }
    }

    /// Converts an `(x, y, w, h)` box: top=y, left=x, right=x+w, bottom=y+h.
    ///
    /// The result is clamped to the frame; `None` if nothing remains.
    pub fn from_xywh(x: i64, y: i64, w: i64, h: i64, frame_w: u32, frame_h: u32) -> Option<Self> {
        Self::from_corners(x as f64, y as f64, (x + w) as f64, (y + h) as f64, frame_w, frame_h)
    }

    /// Converts `[x1, y1, x2, y2]` corners (possibly fractional, possibly
    /// outside the frame) into a clamped region.
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64, frame_w: u32, frame_h: u32) -> Option<Self> {
        if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            return None;
        }
        let clamp = |v: f64, max: u32| v.round().clamp(0.0, max as f64) as u32;
        let region = Self {
            top: clamp(y1.min(y2), frame_h),
            right: clamp(x1.max(x2), frame_w),
            bottom: clamp(y1.max(y2), frame_h),
            left: clamp(x1.min(x2), frame_w),
        };
        (region.area() > 0).then_some(region)
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn area(&self) -> u64 {
        self.width() as u64 * self.height() as u64
    }

    /// Intersects the region with a `frame_w` x `frame_h` frame.
    ///
    /// Returns `None` for malformed (inverted) or fully outside regions.
    pub fn clamp_to(&self, frame_w: u32, frame_h: u32) -> Option<Self> {
        if self.left > self.right || self.top > self.bottom {
            return None;
        }
        let region = Self {
            top: self.top.min(frame_h),
            right: self.right.min(frame_w),
            bottom: self.bottom.min(frame_h),
            left: self.left.min(frame_w),
        };
        (region.area() > 0).then_some(region)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_from_xywh_converts_convention() {
        let r = FaceRegion::from_xywh(10, 20, 100, 120, 640, 480).unwrap();
        assert_eq!(r, FaceRegion::new(20, 110, 140, 10));
        assert_eq!(r.width(), 100);
        assert_eq!(r.height(), 120);
    }

    #[test]
    fn test_from_corners_clamps_to_frame() {
        let r = FaceRegion::from_corners(-15.0, -5.0, 700.4, 300.0, 640, 480).unwrap();
        assert_eq!(r, FaceRegion::new(0, 640, 300, 0));
    }

    #[test]
    fn test_from_corners_orders_swapped_corners() {
        let r = FaceRegion::from_corners(50.0, 60.0, 10.0, 20.0, 100, 100).unwrap();
        assert_eq!(r, FaceRegion::new(20, 50, 60, 10));
    }

    #[rstest]
    #[case::fully_left(-50.0, 0.0, -10.0, 40.0)]
    #[case::zero_width(10.0, 10.0, 10.0, 40.0)]
    #[case::not_finite(f64::NAN, 0.0, 10.0, 10.0)]
    fn test_from_corners_degenerate_is_none(
        #[case] x1: f64,
        #[case] y1: f64,
        #[case] x2: f64,
        #[case] y2: f64,
    ) {
        assert!(FaceRegion::from_corners(x1, y1, x2, y2, 100, 100).is_none());
    }

    #[test]
    fn test_clamp_to_rejects_inverted_region() {
        let inverted = FaceRegion::new(50, 10, 20, 40);
        assert!(inverted.clamp_to(100, 100).is_none());
    }

    #[test]
    fn test_clamp_to_trims_overflow() {
        let r = FaceRegion::new(90, 120, 130, 80).clamp_to(100, 100).unwrap();
        assert_eq!(r, FaceRegion::new(90, 100, 100, 80));
        assert_eq!(r.area(), 200);
    }
}
