use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};
use crate::time::FrameTiming;

/// Largest accepted output edge, in pixels.
pub const MAX_DIMENSION: u32 = 4096;
/// Highest accepted output frame rate.
pub const MAX_FPS: f64 = 120.0;
/// Highest accepted device scale factor.
pub const MAX_DEVICE_SCALE_FACTOR: f64 = 4.0;
/// Longest accepted video, in milliseconds (ten minutes).
pub const MAX_DURATION_MS: u64 = 600_000;

/// How a request is turned into frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderStrategy {
    /// A registered composition bound to props, captured in the browser.
    ProgrammaticComposition,
    /// Caller-supplied HTML, captured in the browser.
    RawHtml,
    /// One image looped for the whole duration; no browser involved.
    StillImageLoop,
}

impl std::fmt::Display for RenderStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderStrategy::ProgrammaticComposition => write!(f, "programmatic-composition"),
            RenderStrategy::RawHtml => write!(f, "raw-html"),
            RenderStrategy::StillImageLoop => write!(f, "still-image-loop"),
        }
    }
}

/// What the request renders. Exactly one source per request.
#[derive(Debug, Clone, PartialEq)]
pub enum RenderSource {
    Composition {
        id: String,
        props: serde_json::Value,
    },
    Html(String),
    StillImage(Vec<u8>),
}

impl RenderSource {
    pub fn strategy(&self) -> RenderStrategy {
        match self {
            RenderSource::Composition { .. } => RenderStrategy::ProgrammaticComposition,
            RenderSource::Html(_) => RenderStrategy::RawHtml,
            RenderSource::StillImage(_) => RenderStrategy::StillImageLoop,
        }
    }
}

/// Immutable description of one render.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub source: RenderSource,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration_ms: u64,
    pub device_scale_factor: f64,
}

impl RenderRequest {
    /// Create a request with scale factor 1.
    pub fn new(source: RenderSource, width: u32, height: u32, fps: f64, duration_ms: u64) -> Self {
        Self {
            source,
            width,
            height,
            fps,
            duration_ms,
            device_scale_factor: 1.0,
        }
    }

    pub fn composition(
        id: impl Into<String>,
        props: serde_json::Value,
        width: u32,
        height: u32,
        fps: f64,
        duration_ms: u64,
    ) -> Self {
        Self::new(
            RenderSource::Composition {
                id: id.into(),
                props,
            },
            width,
            height,
            fps,
            duration_ms,
        )
    }

    pub fn html(html: impl Into<String>, width: u32, height: u32, fps: f64, duration_ms: u64) -> Self {
        Self::new(RenderSource::Html(html.into()), width, height, fps, duration_ms)
    }

    pub fn still_image(image: Vec<u8>, width: u32, height: u32, fps: f64, duration_ms: u64) -> Self {
        Self::new(RenderSource::StillImage(image), width, height, fps, duration_ms)
    }

    pub fn with_device_scale_factor(mut self, factor: f64) -> Self {
        self.device_scale_factor = factor;
        self
    }

    pub fn strategy(&self) -> RenderStrategy {
        self.source.strategy()
    }

    pub fn timing(&self) -> FrameTiming {
        FrameTiming::new(self.fps, self.duration_ms)
    }

    /// Check every invariant a request must hold before a job is created.
    pub fn validate(&self) -> RenderResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "dimensions must be positive, got {}x{}",
                self.width, self.height
            )));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(invalid(format!(
                "dimensions {}x{} exceed the {}px limit",
                self.width, self.height, MAX_DIMENSION
            )));
        }
        // yuv420p subsamples chroma 2x2.
        if self.width % 2 != 0 || self.height % 2 != 0 {
            return Err(invalid(format!(
                "dimensions must be even for yuv420p, got {}x{}",
                self.width, self.height
            )));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 || self.fps > MAX_FPS {
            return Err(invalid(format!(
                "fps must be in (0, {}], got {}",
                MAX_FPS, self.fps
            )));
        }
        if self.duration_ms == 0 {
            return Err(invalid("duration must be positive".to_string()));
        }
        if self.duration_ms > MAX_DURATION_MS {
            return Err(invalid(format!(
                "duration {}ms exceeds the {}ms limit",
                self.duration_ms, MAX_DURATION_MS
            )));
        }
        if self.timing().total_frames() == 0 {
            return Err(invalid(format!(
                "{}ms at {}fps yields no frames",
                self.duration_ms, self.fps
            )));
        }
        let dsf = self.device_scale_factor;
        if !dsf.is_finite() || dsf <= 0.0 || dsf > MAX_DEVICE_SCALE_FACTOR {
            return Err(invalid(format!(
                "device scale factor must be in (0, {}], got {}",
                MAX_DEVICE_SCALE_FACTOR, dsf
            )));
        }

        match &self.source {
            RenderSource::Composition { id, props } => {
                if id.trim().is_empty() {
                    return Err(invalid("composition id is empty".to_string()));
                }
                if !props.is_object() {
                    return Err(invalid("composition props must be a JSON object".to_string()));
                }
            }
            RenderSource::Html(html) => {
                if html.trim().is_empty() {
                    return Err(invalid("html is empty".to_string()));
                }
            }
            RenderSource::StillImage(bytes) => {
                if bytes.is_empty() {
                    return Err(invalid("source image is empty".to_string()));
                }
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> RenderError {
    RenderError::InvalidRequest(message)
}
