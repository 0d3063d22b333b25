mod server;

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{Map, Value};
use storyreel_core::{RenderRequest, StoryreelConfig, DEFAULT_CONFIG_FILE};
use storyreel_encode::FfmpegEncoder;
use storyreel_render::{CompositionRegistry, Renderer};

#[derive(Parser)]
#[command(
    name = "storyreel",
    version,
    about = "Storyreel: render HTML compositions and still images to MP4 stories"
)]
struct Cli {
    /// Config file (default: ./storyreel.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP render service
    Serve {
        /// Port to listen on (overrides config and PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Render a registered composition to an MP4 file
    Render {
        /// Composition id, e.g. ContentPillar or HTMLVideo
        #[arg()]
        composition: String,

        /// Props as an inline JSON object
        #[arg(long, conflicts_with = "props_file")]
        props: Option<String>,

        /// Props read from a JSON file
        #[arg(long)]
        props_file: Option<PathBuf>,

        /// HTML file passed to the composition as its `html` prop
        #[arg(long)]
        html_file: Option<PathBuf>,

        /// Output file path (default: <composition>.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        #[arg(long)]
        fps: Option<f64>,

        #[arg(long)]
        duration_ms: Option<u64>,

        /// Device scale factor used when rasterising the page
        #[arg(long, default_value_t = 1.0)]
        scale: f64,
    },

    /// Loop a still image into an MP4 file
    Still {
        /// Path to a PNG, JPEG or WebP image
        #[arg()]
        image: PathBuf,

        #[arg(long, default_value_t = 7.0)]
        duration_seconds: f64,

        /// Output file path (default: <image stem>.mp4)
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[arg(long)]
        width: Option<u32>,

        #[arg(long)]
        height: Option<u32>,

        #[arg(long)]
        fps: Option<f64>,
    },

    /// List registered compositions
    Compositions,

    /// Check that ffmpeg and node are usable
    Doctor,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut config = load_config(cli.config.as_deref())?;
    config.apply_env_overrides();

    match cli.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            run_async(server::run_server(config))
        }
        Commands::Render {
            composition,
            props,
            props_file,
            html_file,
            output,
            width,
            height,
            fps,
            duration_ms,
            scale,
        } => {
            let props = read_props(props.as_deref(), props_file.as_deref(), html_file.as_deref())?;
            let output = output.unwrap_or_else(|| PathBuf::from(format!("{}.mp4", composition)));
            run_async(cmd_render(
                config,
                composition,
                props,
                output,
                (width, height, fps, duration_ms),
                scale,
            ))
        }
        Commands::Still {
            image,
            duration_seconds,
            output,
            width,
            height,
            fps,
        } => {
            let output = output.unwrap_or_else(|| image.with_extension("mp4"));
            run_async(cmd_still(config, image, duration_seconds, output, (width, height, fps)))
        }
        Commands::Compositions => cmd_compositions(&config),
        Commands::Doctor => cmd_doctor(&config, cli.config.as_deref()),
    }
}

fn run_async<F>(future: F) -> Result<()>
where
    F: std::future::Future<Output = Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to initialize async runtime")?;
    runtime.block_on(future)
}

/// An explicit `--config` must load; the default file is best-effort.
fn load_config(path: Option<&Path>) -> Result<StoryreelConfig> {
    match path {
        Some(path) => StoryreelConfig::load_from_file(path)
            .map_err(|e| anyhow::anyhow!("failed to load config {}: {}", path.display(), e)),
        None => Ok(StoryreelConfig::load_or_default(Path::new(DEFAULT_CONFIG_FILE))),
    }
}

fn read_props(inline: Option<&str>, file: Option<&Path>, html_file: Option<&Path>) -> Result<Value> {
    let mut props = match (inline, file) {
        (Some(json), _) => serde_json::from_str(json).context("--props is not valid JSON")?,
        (None, Some(path)) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read props file {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("props file {} is not valid JSON", path.display()))?
        }
        (None, None) => Value::Object(Map::new()),
    };
    let Value::Object(map) = &mut props else {
        anyhow::bail!("props must be a JSON object");
    };
    if let Some(path) = html_file {
        let html = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read html file {}", path.display()))?;
        map.insert("html".to_string(), Value::String(html));
    }
    Ok(props)
}

async fn cmd_render(
    config: StoryreelConfig,
    composition: String,
    props: Value,
    output: PathBuf,
    overrides: (Option<u32>, Option<u32>, Option<f64>, Option<u64>),
    scale: f64,
) -> Result<()> {
    let renderer = Renderer::from_config(&config).context("failed to set up renderer")?;
    let defaults = renderer
        .registry()
        .get(&composition)
        .with_context(|| {
            let known: Vec<&str> = renderer.registry().ids().collect();
            format!("unknown composition; available: {}", known.join(", "))
        })?;
    let (width, height, fps, duration_ms) = overrides;
    let request = RenderRequest::composition(
        composition.clone(),
        props,
        width.unwrap_or(defaults.width),
        height.unwrap_or(defaults.height),
        fps.unwrap_or(defaults.fps),
        duration_ms.unwrap_or(defaults.duration_ms),
    )
    .with_device_scale_factor(scale);

    println!("🎬 Rendering {} ({}x{} @ {}fps, {}ms)", composition, request.width, request.height, request.fps, request.duration_ms);
    render_to_file(&renderer, &request, &output).await
}

async fn cmd_still(
    config: StoryreelConfig,
    image: PathBuf,
    duration_seconds: f64,
    output: PathBuf,
    overrides: (Option<u32>, Option<u32>, Option<f64>),
) -> Result<()> {
    if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
        anyhow::bail!("--duration-seconds must be positive");
    }
    let bytes = tokio::fs::read(&image)
        .await
        .with_context(|| format!("failed to read image {}", image.display()))?;
    let renderer = Renderer::from_config(&config).context("failed to set up renderer")?;
    let (width, height, fps) = overrides;
    let defaults = &config.compositions;
    let request = RenderRequest::still_image(
        bytes,
        width.unwrap_or(defaults.default_width),
        height.unwrap_or(defaults.default_height),
        fps.unwrap_or(defaults.default_fps),
        (duration_seconds * 1000.0).round() as u64,
    );

    println!("🖼  Looping {} for {}s", image.display(), duration_seconds);
    render_to_file(&renderer, &request, &output).await
}

async fn render_to_file(renderer: &Renderer, request: &RenderRequest, output: &Path) -> Result<()> {
    let start = Instant::now();
    let artifact = renderer.render(request).await.context("render failed")?;

    if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    tokio::fs::write(output, &artifact.video)
        .await
        .with_context(|| format!("failed to write {}", output.display()))?;

    let stats = artifact.stats();
    println!(
        "✅ Wrote {} ({} MB, {}, {}) in {:.1}s",
        output.display(),
        stats.file_size_mb,
        stats.resolution,
        stats.duration,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn cmd_compositions(config: &StoryreelConfig) -> Result<()> {
    let registry = CompositionRegistry::from_config(&config.compositions).context("failed to load compositions")?;
    println!("🎞  {} composition(s)", registry.len());
    for info in registry.list() {
        println!(
            "   {:<20} {}x{} @ {}fps, {}ms  [{}]",
            info.id, info.width, info.height, info.fps, info.duration_ms, info.source
        );
        if !info.variants.is_empty() {
            println!("   {:<20} variants: {}", "", info.variants.join(", "));
        }
    }
    Ok(())
}

fn cmd_doctor(config: &StoryreelConfig, config_path: Option<&Path>) -> Result<()> {
    let mut warnings: Vec<String> = Vec::new();

    println!("🩺 Storyreel Doctor");
    println!("   CLI version: {}", env!("CARGO_PKG_VERSION"));
    println!("   OS: {} ({})", std::env::consts::OS, std::env::consts::ARCH);

    let config_file = config_path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
    println!(
        "   Config: {}",
        if config_file.exists() {
            config_file.display().to_string()
        } else {
            "(defaults)".to_string()
        }
    );

    let encoder = FfmpegEncoder::new(&config.encoder, config.timeouts.encode());
    match encoder.version() {
        Some(version) => println!("   FFmpeg: {}", version),
        None if encoder.is_available() => println!("   FFmpeg: available"),
        None => warnings.push(format!("ffmpeg not found ({})", encoder.program().display())),
    }

    match node_version(&config.browser.node) {
        Some(version) => println!("   Node: {}", version),
        None => warnings.push(format!("node not found ({}); html renders need it", config.browser.node)),
    }
    if let Some(script) = &config.browser.driver_script {
        if !script.exists() {
            warnings.push(format!("driver script missing: {}", script.display()));
        }
    }

    let scratch = config.scratch.dir.clone().unwrap_or_else(std::env::temp_dir);
    let marker = scratch.join(format!("storyreel-doctor-{}.tmp", std::process::id()));
    match std::fs::create_dir_all(&scratch).and_then(|_| std::fs::write(&marker, b"ok")) {
        Ok(()) => {
            let _ = std::fs::remove_file(&marker);
            println!("   Scratch: {}", scratch.display());
        }
        Err(e) => warnings.push(format!("scratch dir {} not writable: {}", scratch.display(), e)),
    }

    match CompositionRegistry::from_config(&config.compositions) {
        Ok(registry) => println!("   Compositions: {}", registry.len()),
        Err(e) => warnings.push(format!("compositions: {}", e)),
    }

    if warnings.is_empty() {
        println!("   Status: OK");
        return Ok(());
    }

    println!("   Status: WARN ({} issue(s))", warnings.len());
    for w in &warnings {
        println!("   - {}", w);
    }
    Ok(())
}

fn node_version(node: &str) -> Option<String> {
    let output = std::process::Command::new(node).arg("--version").output().ok()?;
    if !output.status.success() {
        return None;
    }
    Some(String::from_utf8_lossy(&output.stdout).trim().to_string())
}
