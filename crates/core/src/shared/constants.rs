pub const YOLO_MODEL_NAME: &str = "yolo11n-pose_widerface.onnx";
pub const YOLO_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/yolo11n-pose_widerface.onnx";

pub const EMBEDDING_MODEL_NAME: &str = "w600k_r50.onnx";
pub const EMBEDDING_MODEL_URL: &str =
    "https://github.com/neutrinographics/faceguard/releases/download/v0.1.0/w600k_r50.onnx";

pub const CASCADE_MODEL_NAME: &str = "haarcascade_frontalface_default.xml";
pub const CASCADE_MODEL_URL: &str =
    "https://raw.githubusercontent.com/opencv/opencv/4.x/data/haarcascades/haarcascade_frontalface_default.xml";

/// Label reported for faces that do not match any enrolled identity.
pub const UNKNOWN_IDENTITY: &str = "Unknown";

/// Default embedding-distance tolerance (accept at or below).
///
/// Calibrated for 128-d dlib embeddings. L2-normalized ArcFace vectors of the
/// same person typically lie 0.8-1.1 apart, so with the ONNX embedder this
/// default is strict and a tolerance near 1.0 is usually needed.
pub const DEFAULT_EMBEDDING_TOLERANCE: f64 = 0.6;

/// Default histogram-classifier tolerance (accept strictly below).
pub const DEFAULT_HISTOGRAM_TOLERANCE: f64 = 100.0;

/// Minimum spacing between accepted enrollment captures.
pub const DEFAULT_DEBOUNCE_MS: u64 = 500;

pub const DEFAULT_TARGET_SAMPLES: usize = 10;

/// Side length of the normalized grayscale patch used by the histogram
/// classifier, for both training and prediction.
pub const PATCH_SIZE: u32 = 200;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "tiff", "tif", "webp"];

pub const APP_DIR_NAME: &str = "FaceMatch";
