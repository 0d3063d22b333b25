//! The render job orchestrator.
//!
//! [`Renderer::render`] is the single entry point: it validates the request,
//! resolves its source, acquires a scratch directory and (for page sources)
//! a render surface, captures, encodes, and assembles the [`Artifact`].
//! Every resource a job acquires is released on every exit path, and a
//! cleanup failure is logged rather than allowed to replace the job's own
//! result.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use storyreel_core::{
    Artifact, RenderError, RenderRequest, RenderResult, StoryreelConfig, TimeoutConfig,
};
use storyreel_encode::{
    EncodeInput, EncodeJob, FfmpegEncoder, FrameSequenceWriter, OutputSpec, VideoEncoder,
};
use storyreel_web::{CaptureStats, DriverOptions, FrameCapturer, RenderSurface, RenderTarget, SurfaceConfig};
use tempfile::TempDir;
use tracing::Instrument;

use crate::cache::BundleCache;
use crate::composition::CompositionRegistry;
use crate::job::RenderJob;
use crate::launcher::{PlaywrightLauncher, SurfaceLauncher};
use crate::pool::SurfacePool;
use crate::resolve::{CompositionResolver, Resolved, StillImage};

/// Prefix of per-job scratch directories.
pub const SCRATCH_PREFIX: &str = "storyreel-job-";
const OUTPUT_FILE: &str = "output.mp4";

pub struct Renderer {
    resolver: CompositionResolver,
    pool: SurfacePool,
    launcher: Arc<dyn SurfaceLauncher>,
    encoder: Arc<dyn VideoEncoder>,
    timeouts: TimeoutConfig,
    settle_ms: u64,
    scratch_root: PathBuf,
}

/// Builds a [`Renderer`], with Playwright and FFmpeg unless told otherwise.
pub struct RendererBuilder {
    config: StoryreelConfig,
    registry: Option<CompositionRegistry>,
    launcher: Option<Arc<dyn SurfaceLauncher>>,
    encoder: Option<Arc<dyn VideoEncoder>>,
}

impl RendererBuilder {
    pub fn registry(mut self, registry: CompositionRegistry) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn launcher(mut self, launcher: impl SurfaceLauncher + 'static) -> Self {
        self.launcher = Some(Arc::new(launcher));
        self
    }

    pub fn encoder(mut self, encoder: impl VideoEncoder + 'static) -> Self {
        self.encoder = Some(Arc::new(encoder));
        self
    }

    pub fn build(self) -> RenderResult<Renderer> {
        let config = self.config;
        let registry = match self.registry {
            Some(registry) => registry,
            None => CompositionRegistry::from_config(&config.compositions)?,
        };

        let scratch_root = config.scratch.dir.clone().unwrap_or_else(std::env::temp_dir);
        std::fs::create_dir_all(&scratch_root)
            .map_err(|e| RenderError::storage("create scratch root", &scratch_root, e))?;

        let launcher = self.launcher.unwrap_or_else(|| {
            Arc::new(PlaywrightLauncher::new(DriverOptions::from(&config.browser)))
        });
        let encoder = self.encoder.unwrap_or_else(|| {
            Arc::new(FfmpegEncoder::new(&config.encoder, config.timeouts.encode()))
        });

        let cache = Arc::new(BundleCache::new(config.compositions.cache_bundles));
        tracing::info!(
            compositions = registry.len(),
            engine = launcher.name(),
            max_surfaces = ?config.pool.max_surfaces,
            scratch = %scratch_root.display(),
            "renderer ready"
        );

        Ok(Renderer {
            resolver: CompositionResolver::new(registry, cache, config.timeouts.bundle()),
            pool: SurfacePool::new(config.pool.max_surfaces),
            launcher,
            encoder,
            timeouts: config.timeouts.clone(),
            settle_ms: config.browser.settle_ms,
            scratch_root,
        })
    }
}

impl Renderer {
    pub fn builder(config: StoryreelConfig) -> RendererBuilder {
        RendererBuilder {
            config,
            registry: None,
            launcher: None,
            encoder: None,
        }
    }

    /// Renderer with the production engine and encoder.
    pub fn from_config(config: &StoryreelConfig) -> RenderResult<Self> {
        Self::builder(config.clone()).build()
    }

    pub fn registry(&self) -> &CompositionRegistry {
        self.resolver.registry()
    }

    pub fn bundle_cache(&self) -> &BundleCache {
        self.resolver.cache()
    }

    pub fn pool(&self) -> &SurfacePool {
        &self.pool
    }

    pub fn scratch_root(&self) -> &Path {
        &self.scratch_root
    }

    /// Render one request to a complete MP4, or fail with a single error
    /// after releasing everything the job acquired.
    pub async fn render(&self, request: &RenderRequest) -> RenderResult<Artifact> {
        request.validate()?;
        let mut job = RenderJob::new(request.strategy());
        let span = tracing::info_span!("render_job", job_id = %job.id(), strategy = %job.strategy());

        async {
            tracing::debug!(
                width = request.width,
                height = request.height,
                fps = request.fps,
                duration_ms = request.duration_ms,
                scale = request.device_scale_factor,
                "render job created"
            );
            match self.execute(&mut job, request).await {
                Ok(video) => {
                    job.advance();
                    let artifact = Artifact::new(
                        video,
                        request.duration_ms,
                        request.fps,
                        request.width,
                        request.height,
                    );
                    tracing::info!(
                        frames = request.timing().total_frames(),
                        bytes = artifact.size_bytes,
                        elapsed_ms = job.elapsed().as_millis() as u64,
                        "render completed"
                    );
                    Ok(artifact)
                }
                Err(e) => {
                    job.fail(e.kind());
                    tracing::warn!(
                        error = %e,
                        kind = e.kind(),
                        elapsed_ms = job.elapsed().as_millis() as u64,
                        "render failed"
                    );
                    Err(e)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&self, job: &mut RenderJob, request: &RenderRequest) -> RenderResult<Vec<u8>> {
        // Resolve before acquiring anything, so a bad id or template costs nothing.
        let resolved = self.resolver.resolve(&request.source).await?;
        let scratch = self.scratch_scope()?;

        let result = match resolved {
            Resolved::Page(target) => self.render_page(job, request, &target, scratch.path()).await,
            Resolved::Still(still) => self.render_still(job, request, still, scratch.path()).await,
        };

        let path = scratch.path().to_path_buf();
        match scratch.close() {
            Ok(()) => tracing::debug!(path = %path.display(), "scratch directory removed"),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to remove scratch directory"),
        }
        result
    }

    fn scratch_scope(&self) -> RenderResult<TempDir> {
        tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .tempdir_in(&self.scratch_root)
            .map_err(|e| RenderError::storage("create job scratch directory", &self.scratch_root, e))
    }

    async fn render_page(
        &self,
        job: &mut RenderJob,
        request: &RenderRequest,
        target: &RenderTarget,
        scratch: &Path,
    ) -> RenderResult<Vec<u8>> {
        let timing = request.timing();
        let permit = self.pool.acquire().await;

        let config = SurfaceConfig {
            width: request.width,
            height: request.height,
            device_scale_factor: request.device_scale_factor,
            settle_ms: self.settle_ms,
            navigation_timeout_ms: self.timeouts.navigation_ms,
            scratch_dir: scratch.to_path_buf(),
        };
        let mut surface = RenderSurface::open(config, self.launcher.backend(), &self.timeouts).await?;
        let captured = self.capture(job, &mut surface, target, timing, scratch).await;
        // The browser is not needed for encoding; free it and its pool slot first.
        surface.close().await;
        drop(permit);

        let (stats, writer) = captured?;
        if stats.frames != timing.total_frames() {
            return Err(RenderError::FrameCapture(format!(
                "captured {} of {} frames",
                stats.frames,
                timing.total_frames()
            )));
        }
        job.advance();

        let video = self
            .encoder
            .encode(&EncodeJob {
                input: EncodeInput::FrameSequence {
                    pattern: writer.input_pattern(),
                    frames: writer.frames_written(),
                },
                output: output_spec(request),
                output_path: scratch.join(OUTPUT_FILE),
            })
            .await?;
        job.advance();
        Ok(video)
    }

    async fn capture(
        &self,
        job: &mut RenderJob,
        surface: &mut RenderSurface,
        target: &RenderTarget,
        timing: storyreel_core::FrameTiming,
        scratch: &Path,
    ) -> RenderResult<(CaptureStats, FrameSequenceWriter)> {
        surface.load(target).await?;
        job.advance();

        let mut writer = FrameSequenceWriter::new(scratch);
        let stats = FrameCapturer::new(timing).capture(surface, &mut writer).await?;
        tracing::debug!(
            frames = stats.frames,
            animations = stats.animations,
            bytes = writer.bytes_written(),
            sequence = %stats.sequence_hash,
            "frames captured"
        );
        Ok((stats, writer))
    }

    async fn render_still(
        &self,
        job: &mut RenderJob,
        request: &RenderRequest,
        still: StillImage,
        scratch: &Path,
    ) -> RenderResult<Vec<u8>> {
        let path = scratch.join(format!("source.{}", still.extension()));
        tokio::fs::write(&path, &still.bytes)
            .await
            .map_err(|e| RenderError::storage("stage source image", &path, e))?;
        tracing::debug!(
            format = ?still.format,
            width = still.width,
            height = still.height,
            "source image staged"
        );
        // No surface: staging the image stands in for both pre-encode steps.
        job.advance();
        job.advance();

        let video = self
            .encoder
            .encode(&EncodeJob {
                input: EncodeInput::StillImage { path },
                output: output_spec(request),
                output_path: scratch.join(OUTPUT_FILE),
            })
            .await?;
        job.advance();
        Ok(video)
    }
}

fn output_spec(request: &RenderRequest) -> OutputSpec {
    OutputSpec {
        width: request.width,
        height: request.height,
        fps: request.fps,
        duration_ms: request.duration_ms,
    }
}
