use std::path::PathBuf;

use async_trait::async_trait;
use storyreel_core::{FrameTiming, RenderResult};

/// Output geometry and clock every encode is held to.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputSpec {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: u64,
}

impl OutputSpec {
    pub fn timing(&self) -> FrameTiming {
        FrameTiming::new(self.fps, self.duration_ms)
    }
}

/// What to encode.
#[derive(Debug, Clone, PartialEq)]
pub enum EncodeInput {
    /// A numbered image sequence written by [`crate::FrameSequenceWriter`].
    FrameSequence {
        /// ffmpeg image2 pattern, e.g. `/tmp/job/frame_%05d.png`.
        pattern: PathBuf,
        frames: u64,
    },
    /// One image looped for the whole duration.
    StillImage { path: PathBuf },
}

/// One encode invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodeJob {
    pub input: EncodeInput,
    pub output: OutputSpec,
    /// Where the MP4 is written before it is read back.
    pub output_path: PathBuf,
}

/// Muxes images into an H.264 MP4.
///
/// Implementations either return the complete, validated file contents or
/// fail; they never hand back an empty or truncated video.
#[async_trait]
pub trait VideoEncoder: Send + Sync {
    async fn encode(&self, job: &EncodeJob) -> RenderResult<Vec<u8>>;
}
