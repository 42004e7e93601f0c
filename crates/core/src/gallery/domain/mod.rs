pub mod feature_payload;
pub mod gallery_store;
