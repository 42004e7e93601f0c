use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::constants::IMAGE_EXTENSIONS;
use crate::shared::frame::Frame;

/// Plays a directory of still images (or one image) as a frame stream,
/// in file-name order.
pub struct ImageSequenceSource {
    path: PathBuf,
    looping: bool,
    files: Vec<PathBuf>,
    position: usize,
    frame_index: usize,
    running: bool,
}

impl ImageSequenceSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            looping: false,
            files: Vec::new(),
            position: 0,
            frame_index: 0,
            running: false,
        }
    }

    /// Restart from the first image instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

fn list_images(path: &Path) -> Vec<PathBuf> {
    if path.is_file() {
        return if is_image(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        };
    }
    let Ok(entries) = std::fs::read_dir(path) else {
        return Vec::new();
    };
    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file() && is_image(p))
        .collect();
    files.sort();
    files
}

impl FrameSource for ImageSequenceSource {
    fn start(&mut self) -> bool {
        self.files = list_images(&self.path);
        self.position = 0;
        self.frame_index = 0;
        self.running = !self.files.is_empty();
        if self.running {
            log::info!("Reading {} image(s) from {}", self.files.len(), self.path.display());
        } else {
            log::warn!("No images found at {}", self.path.display());
        }
        self.running
    }

    fn stop(&mut self) {
        self.running = false;
        self.files.clear();
    }

    fn next_frame(&mut self) -> Option<Frame> {
        if !self.running {
            return None;
        }
        if self.position >= self.files.len() {
            if self.looping {
                self.position = 0;
            } else {
                self.running = false;
                return None;
            }
        }
        let file = &self.files[self.position];
        self.position += 1;

        match image::open(file) {
            Ok(img) => {
                let frame = Frame::from_rgb_image(img.to_rgb8(), self.frame_index);
                self.frame_index += 1;
                Some(frame)
            }
            Err(e) => {
                log::warn!("Skipping unreadable image {}: {e}", file.display());
                None
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
