//! In-process surface backend for tests and benches.
//!
//! [`SyntheticBackend`] paints one solid PNG per timestamp, with the colour a
//! pure function of the timestamp, so captures are deterministic without a
//! browser. A shared [`SurfaceTally`] records launches and live surfaces and
//! can inject failures.

use std::io::Cursor;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use storyreel_core::{RenderError, RenderResult};

use crate::backend::{RenderTarget, SurfaceBackend, SurfaceConfig};

/// Observation and fault-injection point shared by synthetic backends.
#[derive(Debug, Default)]
pub struct SurfaceTally {
    launched: AtomicUsize,
    live: AtomicUsize,
    peak_live: AtomicUsize,
    captures: AtomicU64,
    fail_launch: AtomicBool,
    /// Navigation sleeps this long before answering (ms).
    navigation_delay_ms: AtomicU64,
    /// Capture fails at this frame timestamp (ms); `u64::MAX` disables.
    fail_at_ms: AtomicU64,
    last_html: Mutex<Option<String>>,
}

impl SurfaceTally {
    pub fn new() -> Arc<Self> {
        let tally = Self::default();
        tally.fail_at_ms.store(u64::MAX, Ordering::SeqCst);
        Arc::new(tally)
    }

    pub fn launched(&self) -> usize {
        self.launched.load(Ordering::SeqCst)
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Highest number of surfaces that were open at the same time.
    pub fn peak_live(&self) -> usize {
        self.peak_live.load(Ordering::SeqCst)
    }

    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }

    /// Markup of the most recent navigation on any surface sharing this tally.
    pub fn last_html(&self) -> Option<String> {
        self.last_html.lock().clone()
    }

    pub fn fail_launch(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn delay_navigation(&self, delay: Duration) {
        self.navigation_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn fail_capture_at(&self, timestamp_ms: u64) {
        self.fail_at_ms.store(timestamp_ms, Ordering::SeqCst);
    }
}

pub struct SyntheticBackend {
    tally: Arc<SurfaceTally>,
    raster: Option<(u32, u32)>,
    paused: bool,
}

impl SyntheticBackend {
    pub fn new(tally: Arc<SurfaceTally>) -> Self {
        Self {
            tally,
            raster: None,
            paused: false,
        }
    }
}

/// Deterministic colour for a timestamp.
pub fn color_at(timestamp_ms: u64) -> [u8; 4] {
    let t = timestamp_ms as u32;
    [(t % 256) as u8, ((t / 7) % 256) as u8, ((t / 31) % 256) as u8, 255]
}

/// Encode a solid PNG of the given size.
pub fn solid_png(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
    let img = image::RgbaImage::from_pixel(width, height, image::Rgba(rgba));
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .expect("in-memory PNG encoding cannot fail");
    buf
}

#[async_trait]
impl SurfaceBackend for SyntheticBackend {
    async fn launch(&mut self, config: &SurfaceConfig) -> RenderResult<()> {
        if self.tally.fail_launch.load(Ordering::SeqCst) {
            return Err(RenderError::BrowserLaunch("synthetic launch failure".into()));
        }
        self.raster = Some(config.raster_size());
        self.tally.launched.fetch_add(1, Ordering::SeqCst);
        let live = self.tally.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.tally.peak_live.fetch_max(live, Ordering::SeqCst);
        Ok(())
    }

    async fn navigate(&mut self, target: &RenderTarget) -> RenderResult<u32> {
        let delay = self.tally.navigation_delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        *self.tally.last_html.lock() = Some(target.html.clone());
        Ok(1)
    }

    async fn pause_animations(&mut self) -> RenderResult<u32> {
        self.paused = true;
        Ok(1)
    }

    async fn capture_at(&mut self, timestamp_ms: u64) -> RenderResult<Vec<u8>> {
        if !self.paused {
            return Err(RenderError::FrameCapture("animations not paused".into()));
        }
        if self.tally.fail_at_ms.load(Ordering::SeqCst) == timestamp_ms {
            return Err(RenderError::FrameCapture("synthetic surface crashed".into()));
        }
        let (width, height) = self
            .raster
            .ok_or_else(|| RenderError::FrameCapture("surface not launched".into()))?;
        self.tally.captures.fetch_add(1, Ordering::SeqCst);
        Ok(solid_png(width, height, color_at(timestamp_ms)))
    }

    async fn close(&mut self) -> RenderResult<()> {
        if self.raster.take().is_some() {
            self.tally.live.fetch_sub(1, Ordering::SeqCst);
        }
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.raster.is_some()
    }
}
