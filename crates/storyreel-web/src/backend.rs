use std::path::PathBuf;

use async_trait::async_trait;
use storyreel_core::RenderResult;

/// Viewport and loading policy for one render surface.
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    pub width: u32,
    pub height: u32,
    pub device_scale_factor: f64,
    /// Fixed wait after fonts are ready.
    pub settle_ms: u64,
    /// Upper bound the engine itself applies while waiting for network idle.
    pub navigation_timeout_ms: u64,
    /// Job-owned directory the backend may write helper files into.
    pub scratch_dir: PathBuf,
}

impl SurfaceConfig {
    /// Pixel size of a full-viewport screenshot.
    pub fn raster_size(&self) -> (u32, u32) {
        (
            (self.width as f64 * self.device_scale_factor).round() as u32,
            (self.height as f64 * self.device_scale_factor).round() as u32,
        )
    }
}

/// A navigable document, ready to be loaded into a surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTarget {
    /// Complete HTML document.
    pub html: String,
    /// Short description for logs (composition id, "raw html", ...).
    pub label: String,
}

impl RenderTarget {
    pub fn new(html: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            label: label.into(),
        }
    }
}

/// A headless page engine the capturer can drive.
///
/// Calls arrive strictly in order: `launch`, `navigate`, `pause_animations`,
/// any number of `capture_at`, then `close`. `close` must be safe to call at
/// any point, including after a failed `launch`, and more than once.
#[async_trait]
pub trait SurfaceBackend: Send {
    /// Start the engine with a page sized to the config's viewport.
    async fn launch(&mut self, config: &SurfaceConfig) -> RenderResult<()>;

    /// Load the document and wait until it is idle, fonts are loaded, and
    /// the settle delay has passed. Returns the number of animations found.
    async fn navigate(&mut self, target: &RenderTarget) -> RenderResult<u32>;

    /// Pause every animation on the page at time 0.
    async fn pause_animations(&mut self) -> RenderResult<u32>;

    /// Set every animation's current time to `timestamp_ms` and return a
    /// full-viewport PNG screenshot.
    async fn capture_at(&mut self, timestamp_ms: u64) -> RenderResult<Vec<u8>>;

    /// Shut the engine down and release its process.
    async fn close(&mut self) -> RenderResult<()>;

    /// Whether an engine process is currently alive.
    fn is_running(&self) -> bool;
}
