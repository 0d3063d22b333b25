use std::future::Future;
use std::time::Duration;

use storyreel_core::{RenderError, RenderResult, TimeoutConfig};

use crate::backend::{RenderTarget, SurfaceBackend, SurfaceConfig};

/// One job's render surface: a launched backend plus the per-step bounds
/// every call to it is held to.
pub struct RenderSurface {
    config: SurfaceConfig,
    backend: Box<dyn SurfaceBackend>,
    launch_timeout: Duration,
    navigation_timeout: Duration,
    frame_timeout: Duration,
    is_active: bool,
}

impl RenderSurface {
    /// Launch `backend` with `config`. A backend that fails or times out
    /// while launching is closed before the error is returned.
    pub async fn open(
        config: SurfaceConfig,
        backend: Box<dyn SurfaceBackend>,
        timeouts: &TimeoutConfig,
    ) -> RenderResult<Self> {
        let mut surface = Self {
            config,
            backend,
            launch_timeout: timeouts.launch(),
            navigation_timeout: timeouts.navigation(),
            frame_timeout: timeouts.frame(),
            is_active: true,
        };

        let timeout = surface.launch_timeout;
        let launched = bounded(timeout, surface.backend.launch(&surface.config), || {
            RenderError::BrowserLaunch(format!("launch timed out after {:?}", timeout))
        })
        .await;

        if let Err(e) = launched {
            surface.close().await;
            return Err(e);
        }
        tracing::debug!(
            width = surface.config.width,
            height = surface.config.height,
            scale = surface.config.device_scale_factor,
            "render surface launched"
        );
        Ok(surface)
    }

    pub fn config(&self) -> &SurfaceConfig {
        &self.config
    }

    /// Load `target` and wait for it to become idle. Returns the number of
    /// animations on the page.
    pub async fn load(&mut self, target: &RenderTarget) -> RenderResult<u32> {
        let timeout = self.navigation_timeout;
        let animations = bounded(timeout, self.backend.navigate(target), || {
            RenderError::NavigationTimeout(format!(
                "{} did not become ready within {:?}",
                target.label, timeout
            ))
        })
        .await?;
        tracing::debug!(target = %target.label, animations, "render surface ready");
        Ok(animations)
    }

    pub async fn pause_animations(&mut self) -> RenderResult<u32> {
        let timeout = self.frame_timeout;
        bounded(timeout, self.backend.pause_animations(), || {
            RenderError::FrameCapture(format!("pausing animations timed out after {:?}", timeout))
        })
        .await
    }

    pub async fn capture_at(&mut self, timestamp_ms: u64) -> RenderResult<Vec<u8>> {
        let timeout = self.frame_timeout;
        bounded(timeout, self.backend.capture_at(timestamp_ms), || {
            RenderError::FrameCapture(format!("screenshot timed out after {:?}", timeout))
        })
        .await
    }

    /// Release the browser. Failures are logged, never returned, so a
    /// cleanup problem cannot mask the error that triggered it.
    pub async fn close(&mut self) {
        if !self.is_active {
            return;
        }
        self.is_active = false;
        match tokio::time::timeout(self.launch_timeout, self.backend.close()).await {
            Ok(Ok(())) => tracing::debug!("render surface closed"),
            Ok(Err(e)) => tracing::warn!(error = %e, "render surface close failed"),
            Err(_) => tracing::warn!("render surface close timed out"),
        }
    }

    pub fn is_running(&self) -> bool {
        self.backend.is_running()
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        if self.is_active {
            // Backends kill their engine process when dropped.
            tracing::warn!("render surface dropped without close");
        }
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = RenderResult<T>>,
    on_timeout: impl FnOnce() -> RenderError,
) -> RenderResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(on_timeout()),
    }
}
