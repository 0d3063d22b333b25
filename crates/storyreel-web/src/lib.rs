pub mod backend;
pub mod capture;
pub mod playwright;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{RenderTarget, SurfaceBackend, SurfaceConfig};
pub use capture::{CaptureStats, FrameCapturer};
pub use playwright::{DriverOptions, PlaywrightBackend};
pub use session::RenderSurface;
