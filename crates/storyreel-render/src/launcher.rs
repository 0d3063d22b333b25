use storyreel_web::{DriverOptions, PlaywrightBackend, SurfaceBackend};

/// Creates a fresh, unlaunched surface backend for each job.
pub trait SurfaceLauncher: Send + Sync {
    fn backend(&self) -> Box<dyn SurfaceBackend>;

    /// Short engine name for logs.
    fn name(&self) -> &str;
}

/// Headless Chromium through the Node Playwright driver.
#[derive(Debug, Clone)]
pub struct PlaywrightLauncher {
    options: DriverOptions,
}

impl PlaywrightLauncher {
    pub fn new(options: DriverOptions) -> Self {
        Self { options }
    }
}

impl SurfaceLauncher for PlaywrightLauncher {
    fn backend(&self) -> Box<dyn SurfaceBackend> {
        Box::new(PlaywrightBackend::new(self.options.clone()))
    }

    fn name(&self) -> &str {
        "playwright"
    }
}
