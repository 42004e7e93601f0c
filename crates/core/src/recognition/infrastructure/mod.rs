pub mod embedding_strategy;
pub mod engine_factory;
pub mod face_patch;
pub mod gallery_matching_engine;
pub mod histogram_strategy;
pub mod lbph_classifier;
pub mod onnx_face_embedder;
