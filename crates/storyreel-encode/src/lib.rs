//! # storyreel-encode
//!
//! Encoding module: turns captured frame sequences and still images into
//! H.264 MP4 files by shelling out to FFmpeg.

pub mod encoder;
pub mod ffmpeg;
pub mod mp4;
pub mod sequence;

pub use encoder::{EncodeInput, EncodeJob, OutputSpec, VideoEncoder};
pub use ffmpeg::FfmpegEncoder;
pub use sequence::FrameSequenceWriter;
