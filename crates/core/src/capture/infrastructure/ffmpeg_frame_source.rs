use std::path::{Path, PathBuf};

use crate::capture::domain::frame_source::FrameSource;
use crate::shared::frame::Frame;

/// Video file or capture device decoded with ffmpeg-next, converted to RGB24.
///
/// Device paths (e.g. `/dev/video0`) go through libavdevice.
pub struct FfmpegFrameSource {
    path: PathBuf,
    decoder: Option<Decoding>,
    frame_index: usize,
    running: bool,
}

struct Decoding {
    ictx: ffmpeg_next::format::context::Input,
    decoder: ffmpeg_next::decoder::Video,
    scaler: ffmpeg_next::software::scaling::Context,
    video_stream_index: usize,
    width: u32,
    height: u32,
    flushing: bool,
}

// Safety: FfmpegFrameSource is only used from a single thread at a time.
// The raw pointers inside ffmpeg types are not shared across threads.
unsafe impl Send for FfmpegFrameSource {}

impl FfmpegFrameSource {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            decoder: None,
            frame_index: 0,
            running: false,
        }
    }

    fn open(&self) -> Result<Decoding, Box<dyn std::error::Error>> {
        ffmpeg_next::init()?;
        ffmpeg_next::device::register_all();

        let ictx = ffmpeg_next::format::input(&self.path)?;
        let stream = ictx
            .streams()
            .best(ffmpeg_next::media::Type::Video)
            .ok_or("No video stream found")?;
        let video_stream_index = stream.index();
        let codec_ctx = ffmpeg_next::codec::context::Context::from_parameters(stream.parameters())?;
        let decoder = codec_ctx.decoder().video()?;

        let width = decoder.width();
        let height = decoder.height();
        let scaler = ffmpeg_next::software::scaling::Context::get(
            decoder.format(),
            width,
            height,
            ffmpeg_next::format::Pixel::RGB24,
            width,
            height,
            ffmpeg_next::software::scaling::Flags::BILINEAR,
        )?;

        Ok(Decoding {
            ictx,
            decoder,
            scaler,
            video_stream_index,
            width,
            height,
            flushing: false,
        })
    }
}

fn extract_rgb_pixels(
    rgb_frame: &ffmpeg_next::util::frame::video::Video,
    width: u32,
    height: u32,
) -> Vec<u8> {
    let stride = rgb_frame.stride(0);
    let data = rgb_frame.data(0);
    let w = width as usize;

    let mut pixels = Vec::with_capacity(w * height as usize * 3);
    for row in 0..height as usize {
        let row_start = row * stride;
        pixels.extend_from_slice(&data[row_start..row_start + w * 3]);
    }
    pixels
}

impl Decoding {
    fn try_receive(&mut self, index: usize) -> Option<Frame> {
        let mut decoded = ffmpeg_next::util::frame::video::Video::empty();
        self.decoder.receive_frame(&mut decoded).ok()?;
        let mut rgb_frame = ffmpeg_next::util::frame::video::Video::empty();
        if let Err(e) = self.scaler.run(&decoded, &mut rgb_frame) {
            log::warn!("Dropping frame that failed colour conversion: {e}");
            return None;
        }
        let pixels = extract_rgb_pixels(&rgb_frame, self.width, self.height);
        Some(Frame::new(pixels, self.width, self.height, index))
    }

    /// `None` once the stream is drained; `Some(None)` is a transient miss.
    fn next(&mut self, index: usize) -> Option<Option<Frame>> {
        if let Some(frame) = self.try_receive(index) {
            return Some(Some(frame));
        }
        if self.flushing {
            return None;
        }
        loop {
            let Some((stream, packet)) = self.ictx.packets().next() else {
                let _ = self.decoder.send_eof();
                self.flushing = true;
                return self.try_receive(index).map(Some);
            };
            if stream.index() != self.video_stream_index {
                continue;
            }
            if self.decoder.send_packet(&packet).is_err() {
                // Corrupt packet; report a miss and carry on
                return Some(None);
            }
            if let Some(frame) = self.try_receive(index) {
                return Some(Some(frame));
            }
        }
    }
}

impl FrameSource for FfmpegFrameSource {
    fn start(&mut self) -> bool {
        match self.open() {
            Ok(decoding) => {
                log::info!(
                    "Opened video source {} ({}x{})",
                    self.path.display(),
                    decoding.width,
                    decoding.height
                );
                self.decoder = Some(decoding);
                self.frame_index = 0;
                self.running = true;
                true
            }
            Err(e) => {
                log::error!("Cannot open video source {}: {e}", self.path.display());
                self.running = false;
                false
            }
        }
    }

    fn stop(&mut self) {
        self.decoder = None;
        self.running = false;
    }

    fn next_frame(&mut self) -> Option<Frame> {
        let decoding = self.decoder.as_mut()?;
        match decoding.next(self.frame_index) {
            Some(Some(frame)) => {
                self.frame_index += 1;
                Some(frame)
            }
            Some(None) => None,
            None => {
                log::info!("Video source {} ended", self.path.display());
                self.stop();
                None
            }
        }
    }

    fn is_running(&self) -> bool {
        self.running
    }
}
