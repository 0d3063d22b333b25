use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "storyreel.toml";

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub body_limit_mb: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3001,
            body_limit_mb: 20,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BrowserConfig {
    /// Node.js executable that runs the capture driver.
    pub node: String,
    /// Driver script to run instead of the embedded one.
    pub driver_script: Option<PathBuf>,
    /// `NODE_PATH` handed to the driver so it can resolve `playwright`.
    pub node_path: Option<PathBuf>,
    /// Extra Chromium command-line switches.
    pub args: Vec<String>,
    /// Fixed wait after fonts are ready, for late paint and layout passes.
    pub settle_ms: u64,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            node: "node".to_string(),
            driver_script: None,
            node_path: None,
            args: Vec::new(),
            settle_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg: String,
    pub preset: String,
    pub crf: u8,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            preset: "medium".to_string(),
            crf: 23,
        }
    }
}

/// Per-step upper bounds, in milliseconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub bundle_ms: u64,
    pub launch_ms: u64,
    pub navigation_ms: u64,
    pub frame_ms: u64,
    pub encode_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            bundle_ms: 10_000,
            launch_ms: 30_000,
            navigation_ms: 30_000,
            frame_ms: 10_000,
            encode_ms: 120_000,
        }
    }
}

impl TimeoutConfig {
    pub fn bundle(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.bundle_ms)
    }

    pub fn launch(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.launch_ms)
    }

    pub fn navigation(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.navigation_ms)
    }

    pub fn frame(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.frame_ms)
    }

    pub fn encode(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.encode_ms)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct PoolConfig {
    /// Ceiling on concurrently live render surfaces. Unbounded when unset.
    pub max_surfaces: Option<usize>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CompositionConfig {
    /// Directory of `<id>.html` templates registered next to the built-ins.
    pub dir: Option<PathBuf>,
    pub cache_bundles: bool,
    pub default_width: u32,
    pub default_height: u32,
    pub default_fps: f64,
    pub default_duration_ms: u64,
}

impl Default for CompositionConfig {
    fn default() -> Self {
        Self {
            dir: None,
            cache_bundles: true,
            default_width: 1080,
            default_height: 1920,
            default_fps: 30.0,
            default_duration_ms: 7000,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ScratchConfig {
    /// Parent of per-job scratch directories. System temp dir when unset.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoryreelConfig {
    pub server: ServerConfig,
    pub browser: BrowserConfig,
    pub encoder: EncoderConfig,
    pub timeouts: TimeoutConfig,
    pub pool: PoolConfig,
    pub compositions: CompositionConfig,
    pub scratch: ScratchConfig,
}

impl StoryreelConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, Box<dyn std::error::Error + Send + Sync>> {
        let contents = std::fs::read_to_string(path)?;
        let config: StoryreelConfig = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Best-effort load: a missing file yields defaults, a broken one is
    /// reported and also yields defaults.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match Self::load_from_file(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "ignoring unreadable config");
                Self::default()
            }
        }
    }

    /// Apply `PORT` from the environment, if set and numeric.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.server.port = port;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_file_keeps_defaults() {
        let config: StoryreelConfig = toml::from_str(
            r#"
            [encoder]
            crf = 18

            [pool]
            max_surfaces = 2
            "#,
        )
        .unwrap();
        assert_eq!(config.encoder.crf, 18);
        assert_eq!(config.encoder.ffmpeg, "ffmpeg");
        assert_eq!(config.pool.max_surfaces, Some(2));
        assert_eq!(config.server.port, 3001);
        assert_eq!(config.timeouts.encode_ms, 120_000);
        assert!(config.compositions.cache_bundles);
    }

    #[test]
    fn test_missing_file_is_default() {
        let config = StoryreelConfig::load_or_default(Path::new("/definitely/not/here.toml"));
        assert_eq!(config.server.body_limit_mb, 20);
        assert_eq!(config.browser.settle_ms, 500);
    }

    #[test]
    fn test_load_from_file() {
        let dir = std::env::temp_dir().join(format!("storyreel-config-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join(DEFAULT_CONFIG_FILE);

        std::fs::write(&path, "[browser]\nargs = [\"--disable-gpu\"]\n\n[pool]\nmax_surfaces = 3\n").unwrap();

        let loaded = StoryreelConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.browser.args, vec!["--disable-gpu".to_string()]);
        assert_eq!(loaded.pool.max_surfaces, Some(3));
        assert_eq!(loaded.server.body_limit_mb, 20);
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
