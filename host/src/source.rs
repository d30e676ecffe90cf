//! Frame sources
//!
//! The frame loop pulls images through [`FrameSource`]. The shipped implementation
//! replays a still image or a directory of frames; a camera adapter plugs in behind
//! the same trait.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::RgbImage;
use tracing::{info, warn};

use crate::error::AppError;

const FRAME_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` when this cycle produced nothing usable
    ///
    /// An error means the source is gone and the loop should stop.
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, AppError>;
}

/// Replays image files in name order, wrapping around at the end
pub struct ImageSequenceSource {
    frames: Vec<PathBuf>,
    next: usize,
}

impl ImageSequenceSource {
    /// Open a single image or a directory of PNG/JPEG frames
    pub async fn open(path: &Path) -> Result<Self, AppError> {
        let metadata = tokio::fs::metadata(path).await.map_err(|e| {
            AppError::FrameSource(format!("cannot open {}: {}", path.display(), e))
        })?;

        let frames = if metadata.is_dir() {
            let mut frames = Vec::new();
            let mut entries = tokio::fs::read_dir(path).await?;
            while let Some(entry) = entries.next_entry().await? {
                let p = entry.path();
                if is_frame_file(&p) {
                    frames.push(p);
                }
            }
            frames.sort();
            frames
        } else {
            vec![path.to_path_buf()]
        };

        if frames.is_empty() {
            return Err(AppError::FrameSource(format!(
                "no PNG or JPEG frames in {}",
                path.display()
            )));
        }

        info!("Frame source: {} frame(s) from {}", frames.len(), path.display());
        Ok(Self { frames, next: 0 })
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }
}

fn is_frame_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}

#[async_trait]
impl FrameSource for ImageSequenceSource {
    async fn next_frame(&mut self) -> Result<Option<RgbImage>, AppError> {
        let path = &self.frames[self.next];
        self.next = (self.next + 1) % self.frames.len();

        let bytes = tokio::fs::read(path).await?;
        match image::load_from_memory(&bytes) {
            Ok(img) => Ok(Some(img.to_rgb8())),
            Err(e) => {
                warn!("Skipping undecodable frame {}: {}", path.display(), e);
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("chromalight-{}-{}", name, std::process::id()));
        let _ = std::fs::remove_dir_all(&dir);
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[tokio::test]
    async fn test_directory_replays_in_order() {
        let dir = temp_dir("seq");
        RgbImage::from_pixel(4, 4, image::Rgb([255, 0, 0]))
            .save(dir.join("a.png"))
            .unwrap();
        RgbImage::from_pixel(4, 4, image::Rgb([0, 0, 255]))
            .save(dir.join("b.png"))
            .unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let mut source = ImageSequenceSource::open(&dir).await.unwrap();
        assert_eq!(source.len(), 2);

        let first = source.next_frame().await.unwrap().unwrap();
        assert_eq!(first.get_pixel(0, 0).0, [255, 0, 0]);
        let second = source.next_frame().await.unwrap().unwrap();
        assert_eq!(second.get_pixel(0, 0).0, [0, 0, 255]);
        let wrapped = source.next_frame().await.unwrap().unwrap();
        assert_eq!(wrapped.get_pixel(0, 0).0, [255, 0, 0]);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_undecodable_frame_is_skipped() {
        let dir = temp_dir("bad");
        let path = dir.join("broken.png");
        std::fs::write(&path, b"not a png").unwrap();

        let mut source = ImageSequenceSource::open(&path).await.unwrap();
        assert!(source.next_frame().await.unwrap().is_none());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_missing_or_empty_source() {
        let missing = std::env::temp_dir().join("chromalight-definitely-missing");
        assert!(matches!(
            ImageSequenceSource::open(&missing).await,
            Err(AppError::FrameSource(_))
        ));

        let dir = temp_dir("empty");
        assert!(matches!(
            ImageSequenceSource::open(&dir).await,
            Err(AppError::FrameSource(_))
        ));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[tokio::test]
    async fn test_vanished_frame_is_an_error() {
        let dir = temp_dir("gone");
        let path = dir.join("frame.png");
        RgbImage::new(2, 2).save(&path).unwrap();

        let mut source = ImageSequenceSource::open(&path).await.unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(source.next_frame().await.is_err());

        std::fs::remove_dir_all(&dir).unwrap();
    }
}
