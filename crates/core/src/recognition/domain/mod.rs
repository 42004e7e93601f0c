pub mod face_embedder;
pub mod identity;
pub mod match_strategy;
pub mod matching_engine;
