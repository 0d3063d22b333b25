//! # storyreel-render
//!
//! The Storyreel render pipeline. Resolves compositions into pages, runs
//! each job through surface, capture, and encode, and hands back a
//! complete MP4 artifact or a single typed error.

pub mod bundle;
pub mod cache;
pub mod composition;
pub mod job;
pub mod launcher;
pub mod pipeline;
pub mod pool;
pub mod resolve;
#[cfg(feature = "testing")]
pub mod testing;

pub use bundle::Bundle;
pub use cache::BundleCache;
pub use composition::{Composition, CompositionInfo, CompositionRegistry};
pub use job::RenderJob;
pub use launcher::{PlaywrightLauncher, SurfaceLauncher};
pub use pipeline::{Renderer, RendererBuilder};
pub use pool::{SurfacePermit, SurfacePool};
pub use resolve::{CompositionResolver, Resolved};
