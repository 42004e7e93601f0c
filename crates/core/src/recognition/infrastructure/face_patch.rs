use image::imageops::{self, FilterType};

use crate::gallery::domain::feature_payload::FacePatch;
use crate::shared::constants::PATCH_SIZE;
use crate::shared::face_region::FaceRegion;
use crate::shared::frame::Frame;

/// Grayscale, crop to `region`, resize to `PATCH_SIZE` square.
///
/// The same preprocessing is used when training and when predicting.
pub fn extract_patch(frame: &Frame, region: &FaceRegion) -> Option<FacePatch> {
    let region = region.clamp_to(frame.width(), frame.height())?;
    let gray = frame.to_luma()?;
    let face = imageops::crop_imm(&gray, region.left, region.top, region.width(), region.height())
        .to_image();
    let resized = imageops::resize(&face, PATCH_SIZE, PATCH_SIZE, FilterType::Triangle);
    Some(FacePatch::from_gray(resized))
}
