pub mod sqlite_gallery_store;
