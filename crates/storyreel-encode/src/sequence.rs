use std::path::{Path, PathBuf};

use async_trait::async_trait;
use storyreel_core::{Frame, FrameSink, ImageFormat, RenderError, RenderResult};

/// Writes captured frames to disk as `frame_00000.<ext>`, `frame_00001.<ext>`, ...
///
/// Numbering must be contiguous from 0 for ffmpeg's image2 demuxer, so
/// frames are only accepted in index order.
#[derive(Debug)]
pub struct FrameSequenceWriter {
    dir: PathBuf,
    format: Option<ImageFormat>,
    written: u64,
    bytes: u64,
}

impl FrameSequenceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            format: None,
            written: 0,
            bytes: 0,
        }
    }

    pub fn frame_path(dir: &Path, index: u64, format: ImageFormat) -> PathBuf {
        dir.join(format!("frame_{:05}.{}", index, format.extension()))
    }

    /// ffmpeg input pattern matching the written files.
    pub fn input_pattern(&self) -> PathBuf {
        let ext = self.format.unwrap_or(ImageFormat::Png).extension();
        self.dir.join(format!("frame_%05d.{}", ext))
    }

    pub fn frames_written(&self) -> u64 {
        self.written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes
    }
}

#[async_trait]
impl FrameSink for FrameSequenceWriter {
    async fn accept(&mut self, frame: Frame) -> RenderResult<()> {
        if frame.index != self.written {
            return Err(RenderError::FrameCapture(format!(
                "frame {} arrived out of order, expected {}",
                frame.index, self.written
            )));
        }
        match self.format {
            None => self.format = Some(frame.format),
            Some(format) if format != frame.format => {
                return Err(RenderError::FrameCapture(format!(
                    "frame {} is {:?}, sequence is {:?}",
                    frame.index, frame.format, format
                )));
            }
            Some(_) => {}
        }

        let path = Self::frame_path(&self.dir, frame.index, frame.format);
        tokio::fs::write(&path, &frame.image)
            .await
            .map_err(|e| RenderError::storage("write frame", &path, e))?;
        self.written += 1;
        self.bytes += frame.image.len() as u64;
        Ok(())
    }
}
