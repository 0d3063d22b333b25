//! Deterministic frame capture.
//!
//! Real-time playback is replaced by an explicit clock: every animation on
//! the page is paused at 0, then for each output frame the clock is set to
//! that frame's timestamp and the viewport is screenshotted. Frames are
//! captured strictly one after another since they all move the same clock.

use std::io::Cursor;

use storyreel_core::{
    ContentHash, Frame, FrameSequenceHasher, FrameSink, FrameTiming, RenderError, RenderResult,
};

use crate::session::RenderSurface;

/// Summary of a completed capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStats {
    pub frames: u64,
    pub animations: u32,
    pub first_timestamp_ms: u64,
    pub last_timestamp_ms: u64,
    /// SHA-256 over the captured sequence, in order.
    pub sequence_hash: ContentHash,
}

/// Steps a surface through a [`FrameTiming`] grid.
#[derive(Debug, Clone)]
pub struct FrameCapturer {
    timing: FrameTiming,
}

impl FrameCapturer {
    pub fn new(timing: FrameTiming) -> Self {
        Self { timing }
    }

    pub fn timing(&self) -> &FrameTiming {
        &self.timing
    }

    /// Capture every frame of the timing grid from `surface` into `sink`.
    ///
    /// Any failed step aborts the capture; a short sequence is never
    /// reported as success.
    pub async fn capture(
        &self,
        surface: &mut RenderSurface,
        sink: &mut dyn FrameSink,
    ) -> RenderResult<CaptureStats> {
        let expected = surface.config().raster_size();
        let animations = surface.pause_animations().await?;
        tracing::debug!(animations, timing = %self.timing, "animations paused");

        let mut hasher = FrameSequenceHasher::new();
        let mut last: Option<u64> = None;
        let mut captured = 0u64;

        for (index, timestamp_ms) in self.timing.frames() {
            if let Some(prev) = last {
                if timestamp_ms <= prev {
                    return Err(RenderError::FrameCapture(format!(
                        "frame {} timestamp {}ms does not advance past {}ms",
                        index, timestamp_ms, prev
                    )));
                }
            }

            let image = surface
                .capture_at(timestamp_ms)
                .await
                .map_err(|e| at_frame(e, index, timestamp_ms))?;
            check_dimensions(&image, expected)
                .map_err(|msg| RenderError::FrameCapture(format!("frame {}: {}", index, msg)))?;

            let frame = Frame::png(index, timestamp_ms, image);
            hasher.update(&frame);
            sink.accept(frame).await?;

            last = Some(timestamp_ms);
            captured += 1;
        }

        let stats = CaptureStats {
            frames: captured,
            animations,
            first_timestamp_ms: 0,
            last_timestamp_ms: last.unwrap_or(0),
            sequence_hash: hasher.finish(),
        };
        tracing::debug!(frames = stats.frames, hash = %stats.sequence_hash, "capture finished");
        Ok(stats)
    }
}

fn at_frame(err: RenderError, index: u64, timestamp_ms: u64) -> RenderError {
    match err {
        RenderError::FrameCapture(msg) => {
            RenderError::FrameCapture(format!("frame {} at {}ms: {}", index, timestamp_ms, msg))
        }
        other => other,
    }
}

/// Check a screenshot is a decodable image of the expected raster size,
/// allowing one pixel of rounding for fractional scale factors.
fn check_dimensions(image: &[u8], expected: (u32, u32)) -> Result<(), String> {
    let (width, height) = image::ImageReader::new(Cursor::new(image))
        .with_guessed_format()
        .map_err(|e| format!("unreadable screenshot: {}", e))?
        .into_dimensions()
        .map_err(|e| format!("unreadable screenshot: {}", e))?;
    if width.abs_diff(expected.0) > 1 || height.abs_diff(expected.1) > 1 {
        return Err(format!(
            "screenshot is {}x{}, expected {}x{}",
            width, height, expected.0, expected.1
        ));
    }
    Ok(())
}
