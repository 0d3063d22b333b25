use async_trait::async_trait;

use crate::error::RenderResult;

/// Image container of a captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageFormat {
    Png,
    Jpeg,
}

impl ImageFormat {
    /// File extension used when the frame is written to disk.
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
        }
    }
}

/// One rasterized step of a render: the page's visual state at `timestamp_ms`.
///
/// Frames are scratch data. They are handed to a [`FrameSink`] as soon as they
/// are captured and are not kept after that.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Zero-based position in the output sequence.
    pub index: u64,
    /// Animation clock value the frame was captured at.
    pub timestamp_ms: u64,
    /// Encoded image bytes.
    pub image: Vec<u8>,
    /// Container of `image`.
    pub format: ImageFormat,
}

impl Frame {
    pub fn png(index: u64, timestamp_ms: u64, image: Vec<u8>) -> Self {
        Self {
            index,
            timestamp_ms,
            image,
            format: ImageFormat::Png,
        }
    }

    /// Encoded size in bytes.
    pub fn byte_size(&self) -> usize {
        self.image.len()
    }
}

/// Consumer of captured frames, fed strictly in index order.
#[async_trait]
pub trait FrameSink: Send {
    async fn accept(&mut self, frame: Frame) -> RenderResult<()>;
}

/// Keeps every frame in memory. Used by callers that want the raw sequence
/// (stills, determinism checks) instead of an encoded video.
#[derive(Debug, Default)]
pub struct CollectingSink {
    pub frames: Vec<Frame>,
}

#[async_trait]
impl FrameSink for CollectingSink {
    async fn accept(&mut self, frame: Frame) -> RenderResult<()> {
        self.frames.push(frame);
        Ok(())
    }
}
