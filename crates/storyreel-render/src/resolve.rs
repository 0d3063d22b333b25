use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use storyreel_core::{RenderError, RenderResult, RenderSource};
use storyreel_web::RenderTarget;

use crate::bundle::inject_props;
use crate::cache::BundleCache;
use crate::composition::CompositionRegistry;

/// A still image that decoded far enough to trust its header.
#[derive(Debug, Clone)]
pub struct StillImage {
    pub bytes: Vec<u8>,
    pub format: image::ImageFormat,
    pub width: u32,
    pub height: u32,
}

impl StillImage {
    /// File extension matching the detected format.
    pub fn extension(&self) -> &'static str {
        self.format.extensions_str().first().copied().unwrap_or("img")
    }
}

/// What a request turns into before any resources are acquired.
#[derive(Debug, Clone)]
pub enum Resolved {
    /// A document to load into a render surface.
    Page(RenderTarget),
    /// An image for the encoder to loop; no surface needed.
    Still(StillImage),
}

/// Turns request sources into renderable targets.
pub struct CompositionResolver {
    registry: CompositionRegistry,
    cache: Arc<BundleCache>,
    bundle_timeout: Duration,
}

impl CompositionResolver {
    pub fn new(registry: CompositionRegistry, cache: Arc<BundleCache>, bundle_timeout: Duration) -> Self {
        Self {
            registry,
            cache,
            bundle_timeout,
        }
    }

    pub fn registry(&self) -> &CompositionRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &BundleCache {
        &self.cache
    }

    pub async fn resolve(&self, source: &RenderSource) -> RenderResult<Resolved> {
        match source {
            RenderSource::Composition { id, props } => {
                let composition = self.registry.get(id)?;
                let props = props.as_object().ok_or_else(|| {
                    RenderError::InvalidRequest("props must be a JSON object".into())
                })?;
                let merged = composition.merge_props(props);

                let timeout = self.bundle_timeout;
                let bundled = tokio::time::timeout(timeout, async {
                    let text = composition.load_source().await?;
                    let cache = self.cache.clone();
                    let label = id.clone();
                    tokio::task::spawn_blocking(move || cache.get_or_compile(&label, &text))
                        .await
                        .map_err(|e| RenderError::Bundling(format!("{}: bundler task failed: {}", id, e)))?
                })
                .await
                .map_err(|_| {
                    RenderError::Bundling(format!("{}: bundling timed out after {:?}", id, timeout))
                })??;

                let html = inject_props(&bundled.bind(&merged)?, &merged);
                tracing::debug!(
                    composition = %id,
                    bundle = %bundled.hash(),
                    bytes = html.len(),
                    "composition resolved"
                );
                Ok(Resolved::Page(RenderTarget::new(html, format!("composition {}", id))))
            }
            RenderSource::Html(html) => Ok(Resolved::Page(RenderTarget::new(html.clone(), "raw html"))),
            RenderSource::StillImage(bytes) => Ok(Resolved::Still(inspect_image(bytes)?)),
        }
    }
}

/// Reject bytes that are not a decodable image before anything is staged.
pub fn inspect_image(bytes: &[u8]) -> RenderResult<StillImage> {
    let format = image::guess_format(bytes)
        .map_err(|e| RenderError::InvalidRequest(format!("unrecognised image data: {}", e)))?;
    let (width, height) = image::ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| RenderError::InvalidRequest(format!("unreadable {:?} image: {}", format, e)))?;
    Ok(StillImage {
        bytes: bytes.to_vec(),
        format,
        width,
        height,
    })
}
