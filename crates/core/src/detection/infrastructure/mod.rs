pub mod cascade_model;
pub mod execution_provider;
pub mod haar_cascade_detector;
pub mod math;
pub mod onnx_yolo_detector;
