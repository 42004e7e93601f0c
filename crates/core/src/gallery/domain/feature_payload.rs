//! Binary encoding of stored feature records.
//!
//! Layout: one tag byte, then
//! - `1` (embedding): little-endian `f32` values,
//! - `2` (patch): `width: u32 LE`, `height: u32 LE`, `width * height` luma bytes.

use thiserror::Error;

const TAG_EMBEDDING: u8 = 1;
const TAG_PATCH: u8 = 2;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PayloadError {
    #[error("empty payload")]
    Empty,
    #[error("unknown payload tag {0}")]
    UnknownTag(u8),
    #[error("embedding payload length {0} is not a multiple of 4")]
    MisalignedEmbedding(usize),
    #[error("patch payload declares {width}x{height} but carries {actual} pixel bytes")]
    PatchSize { width: u32, height: u32, actual: usize },
}

/// Fixed-size grayscale face patch used by the histogram classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FacePatch {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl FacePatch {
    pub fn from_gray(image: image::GrayImage) -> Self {
        let (width, height) = image.dimensions();
        Self {
            width,
            height,
            pixels: image.into_raw(),
        }
    }

    pub fn to_gray(&self) -> Option<image::GrayImage> {
        image::GrayImage::from_raw(self.width, self.height, self.pixels.clone())
    }
}

/// A feature record as the matching engines see it. The store only ever
/// sees the encoded bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum FeaturePayload {
    Embedding(Vec<f32>),
    Patch(FacePatch),
}

impl FeaturePayload {
    pub fn encode(&self) -> Vec<u8> {
        match self {
            FeaturePayload::Embedding(values) => {
                let mut out = Vec::with_capacity(1 + values.len() * 4);
                out.push(TAG_EMBEDDING);
                for v in values {
                    out.extend_from_slice(&v.to_le_bytes());
                }
                out
            }
            FeaturePayload::Patch(patch) => {
                let mut out = Vec::with_capacity(9 + patch.pixels.len());
                out.push(TAG_PATCH);
                out.extend_from_slice(&patch.width.to_le_bytes());
                out.extend_from_slice(&patch.height.to_le_bytes());
                out.extend_from_slice(&patch.pixels);
                out
            }
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, PayloadError> {
        let (&tag, body) = bytes.split_first().ok_or(PayloadError::Empty)?;
        match tag {
            TAG_EMBEDDING => {
                if body.len() % 4 != 0 {
                    return Err(PayloadError::MisalignedEmbedding(body.len()));
                }
                let values: Vec<f32> = bytemuck::pod_collect_to_vec::<u8, [u8; 4]>(body)
                    .into_iter()
                    .map(f32::from_le_bytes)
                    .collect();
                Ok(FeaturePayload::Embedding(values))
            }
            TAG_PATCH => {
                let header = |range: std::ops::Range<usize>| -> Option<u32> {
                    body.get(range)
                        .and_then(|b| <[u8; 4]>::try_from(b).ok())
                        .map(u32::from_le_bytes)
                };
                let (Some(width), Some(height)) = (header(0..4), header(4..8)) else {
                    return Err(PayloadError::PatchSize {
                        width: 0,
                        height: 0,
                        actual: body.len(),
                    });
                };
                let pixels = &body[8..];
                if pixels.len() as u64 != width as u64 * height as u64 {
                    return Err(PayloadError::PatchSize {
                        width,
                        height,
                        actual: pixels.len(),
                    });
                }
                Ok(FeaturePayload::Patch(FacePatch {
                    width,
                    height,
                    pixels: pixels.to_vec(),
                }))
            }
            other => Err(PayloadError::UnknownTag(other)),
        }
    }
}
