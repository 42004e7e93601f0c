use ndarray::ArrayView3;

use crate::shared::face_region::FaceRegion;

/// A single captured frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; matching and
/// enrollment treat pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    index: usize,
}

const CHANNELS: usize = 3;

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * CHANNELS,
            "data length must equal width * height * 3"
        );
        Self {
            data,
            width,
            height,
            index,
        }
    }

    /// Wraps a decoded `image` buffer, keeping its pixels as-is.
    pub fn from_rgb_image(image: image::RgbImage, index: usize) -> Self {
        let (width, height) = image.dimensions();
        Self::new(image.into_raw(), width, height, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> Option<ArrayView3<'_, u8>> {
        ArrayView3::from_shape(
            (self.height as usize, self.width as usize, CHANNELS),
            &self.data,
        )
        .ok()
    }

    /// Borrowed view as an `image` RGB buffer, or `None` if the data length
    /// does not match the dimensions.
    pub fn to_rgb_image(&self) -> Option<image::RgbImage> {
        image::RgbImage::from_raw(self.width, self.height, self.data.clone())
    }

    /// Single-channel luma conversion (ITU-R 601 weights, via `image`).
    pub fn to_luma(&self) -> Option<image::GrayImage> {
        self.to_rgb_image()
            .map(|rgb| image::DynamicImage::ImageRgb8(rgb).to_luma8())
    }

    /// Copies the pixels inside `region` into a new RGB buffer.
    ///
    /// Returns `None` for regions that fall outside the frame or are empty.
    pub fn crop_rgb(&self, region: &FaceRegion) -> Option<(Vec<u8>, u32, u32)> {
        let region = region.clamp_to(self.width, self.height)?;
        let w = region.width() as usize;
        let h = region.height() as usize;
        let stride = self.width as usize * CHANNELS;

        let mut out = Vec::with_capacity(w * h * CHANNELS);
        for row in region.top as usize..region.bottom as usize {
            let start = row * stride + region.left as usize * CHANNELS;
            out.extend_from_slice(self.data.get(start..start + w * CHANNELS)?);
        }
        Some((out, w as u32, h as u32))
    }
}
