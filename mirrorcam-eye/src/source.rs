//! Frame sources feeding the frame loop

use crate::error::VisionError;
use crate::frame::Frame;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{info, warn};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "webp"];

/// Something that yields frames. `None` means the source is exhausted.
#[async_trait]
pub trait FrameSource: Send {
    async fn next_frame(&mut self) -> Result<Option<Frame>, VisionError>;
}

/// Frames pushed by another task, e.g. a camera reader.
#[async_trait]
impl FrameSource for mpsc::Receiver<Frame> {
    async fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        Ok(self.recv().await)
    }
}

/// Replays still images from a directory, in file name order, at a fixed
/// frame rate.
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    position: usize,
    frame_interval: Duration,
    last_frame: Option<Instant>,
    looping: bool,
}

impl ImageSequenceSource {
    pub fn new(paths: Vec<PathBuf>, frame_rate: u32) -> Self {
        // Prevent division by zero
        let frame_rate = frame_rate.max(1);
        Self {
            paths,
            position: 0,
            frame_interval: Duration::from_secs_f64(1.0 / frame_rate as f64),
            last_frame: None,
            looping: false,
        }
    }

    pub fn from_dir(dir: &Path, frame_rate: u32) -> Result<Self, VisionError> {
        if !dir.is_dir() {
            return Err(VisionError::Source(format!(
                "Not a directory: {}",
                dir.display()
            )));
        }

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false);
            if path.is_file() && is_image {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(VisionError::Source(format!(
                "No images found in {}",
                dir.display()
            )));
        }
        info!("Replaying {} images from {:?}", paths.len(), dir);
        Ok(Self::new(paths, frame_rate))
    }

    /// Start over from the first image instead of ending.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }

    async fn pace(&mut self) {
        if let Some(last) = self.last_frame {
            let elapsed = last.elapsed();
            if elapsed < self.frame_interval {
                tokio::time::sleep(self.frame_interval - elapsed).await;
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

#[async_trait]
impl FrameSource for ImageSequenceSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>, VisionError> {
        // Unreadable files are skipped; give up after one full pass of them.
        for _ in 0..self.paths.len() {
            if self.position >= self.paths.len() {
                if !self.looping {
                    return Ok(None);
                }
                self.position = 0;
            }

            let path = self.paths[self.position].clone();
            self.position += 1;

            match image::open(&path) {
                Ok(image) => {
                    self.pace().await;
                    return Ok(Some(Frame::from_dynamic(&image)));
                }
                Err(e) => warn!("Skipping unreadable image {:?}: {}", path, e),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn write_image(dir: &Path, name: &str, width: u32) {
        RgbImage::from_pixel(width, 8, Rgb([10, 20, 30]))
            .save(dir.join(name))
            .unwrap();
    }

    #[tokio::test]
    async fn test_directory_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "b.png", 16);
        write_image(dir.path(), "a.png", 8);
        std::fs::write(dir.path().join("notes.txt"), "skip me").unwrap();

        let mut source = ImageSequenceSource::from_dir(dir.path(), 120).unwrap();
        assert_eq!(source.len(), 2);
        assert_eq!(source.next_frame().await.unwrap().unwrap().width(), 8);
        assert_eq!(source.next_frame().await.unwrap().unwrap().width(), 16);
        assert!(source.next_frame().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_looping() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "only.png", 8);
        let mut source = ImageSequenceSource::from_dir(dir.path(), 120)
            .unwrap()
            .looping(true);
        for _ in 0..3 {
            assert!(source.next_frame().await.unwrap().is_some());
        }
    }

    #[tokio::test]
    async fn test_unreadable_file_skipped() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.png"), b"not a png").unwrap();
        write_image(dir.path(), "b.png", 12);
        let mut source = ImageSequenceSource::from_dir(dir.path(), 120).unwrap();
        assert_eq!(source.next_frame().await.unwrap().unwrap().width(), 12);
    }

    #[test]
    fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            ImageSequenceSource::from_dir(dir.path(), 30),
            Err(VisionError::Source(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_pacing() {
        let dir = tempfile::tempdir().unwrap();
        write_image(dir.path(), "a.png", 8);
        write_image(dir.path(), "b.png", 8);
        let mut source = ImageSequenceSource::from_dir(dir.path(), 10).unwrap();

        let start = Instant::now();
        source.next_frame().await.unwrap();
        source.next_frame().await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_channel_source() {
        let (tx, mut rx) = mpsc::channel(2);
        tx.send(Frame::new(RgbImage::new(4, 4))).await.unwrap();
        drop(tx);
        assert!(rx.next_frame().await.unwrap().is_some());
        assert!(rx.next_frame().await.unwrap().is_none());
    }
}
