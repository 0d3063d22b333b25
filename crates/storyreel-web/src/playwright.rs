use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose, Engine as _};
use serde_json::{json, Value};
use storyreel_core::{RenderError, RenderResult};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

use crate::backend::{RenderTarget, SurfaceBackend, SurfaceConfig};

/// The driver script shipped with the crate.
pub const EMBEDDED_DRIVER: &str = include_str!("../scripts/surface-driver.js");
const EMBEDDED_DRIVER_FILE: &str = "surface-driver.js";

/// How long `close` waits for the driver to exit before killing it.
const STOP_GRACE: Duration = Duration::from_secs(5);

/// How to start the Node.js Playwright driver.
#[derive(Debug, Clone)]
pub struct DriverOptions {
    pub node: String,
    /// Script to run; the embedded driver is written to the scratch dir when unset.
    pub script: Option<PathBuf>,
    pub node_path: Option<PathBuf>,
    pub chromium_args: Vec<String>,
}

impl Default for DriverOptions {
    fn default() -> Self {
        Self {
            node: "node".to_string(),
            script: None,
            node_path: None,
            chromium_args: Vec::new(),
        }
    }
}

impl From<&storyreel_core::BrowserConfig> for DriverOptions {
    fn from(config: &storyreel_core::BrowserConfig) -> Self {
        Self {
            node: config.node.clone(),
            script: config.driver_script.clone(),
            node_path: config.node_path.clone(),
            chromium_args: config.args.clone(),
        }
    }
}

/// Render surface backed by headless Chromium, driven through a Node.js
/// Playwright script over line-delimited JSON.
pub struct PlaywrightBackend {
    options: DriverOptions,
    process: Option<Child>,
    stdin: Option<ChildStdin>,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    navigation_timeout_ms: u64,
    settle_ms: u64,
}

impl PlaywrightBackend {
    pub fn new(options: DriverOptions) -> Self {
        Self {
            options,
            process: None,
            stdin: None,
            stdout: None,
            navigation_timeout_ms: 30_000,
            settle_ms: 0,
        }
    }

    async fn driver_script(&self, config: &SurfaceConfig) -> RenderResult<PathBuf> {
        if let Some(script) = &self.options.script {
            return Ok(script.clone());
        }
        let path = config.scratch_dir.join(EMBEDDED_DRIVER_FILE);
        tokio::fs::write(&path, EMBEDDED_DRIVER)
            .await
            .map_err(|e| RenderError::storage("write surface driver", &path, e))?;
        Ok(path)
    }

    fn spawn(&mut self, script: PathBuf) -> Result<(), String> {
        let mut cmd = Command::new(&self.options.node);
        cmd.arg(&script)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(node_path) = &self.options.node_path {
            cmd.env("NODE_PATH", node_path);
        }

        let mut child = cmd.spawn().map_err(|e| {
            format!(
                "failed to spawn '{}' for driver {}: {}",
                self.options.node,
                script.display(),
                e
            )
        })?;

        let stdin = child.stdin.take().ok_or("driver stdin not available")?;
        let stdout = child.stdout.take().ok_or("driver stdout not available")?;
        if let Some(stderr) = child.stderr.take() {
            let pid = child.id();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    tracing::debug!(driver_pid = ?pid, "{}", line);
                }
            });
        }

        tracing::debug!(pid = ?child.id(), script = %script.display(), "surface driver started");
        self.process = Some(child);
        self.stdin = Some(stdin);
        self.stdout = Some(BufReader::new(stdout).lines());
        Ok(())
    }

    async fn send_request(&mut self, req: Value) -> Result<(), String> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or("driver stdin not available")?;
        let msg = req.to_string() + "\n";
        stdin
            .write_all(msg.as_bytes())
            .await
            .map_err(|e| format!("failed to write to driver: {}", e))?;
        stdin
            .flush()
            .await
            .map_err(|e| format!("failed to flush driver stdin: {}", e))?;
        Ok(())
    }

    async fn read_response(&mut self) -> Result<Value, DriverFailure> {
        let stdout = self
            .stdout
            .as_mut()
            .ok_or_else(|| DriverFailure::local("driver stdout not available"))?;
        let line = stdout
            .next_line()
            .await
            .map_err(|e| DriverFailure::local(format!("failed to read from driver: {}", e)))?
            .ok_or_else(|| DriverFailure::local("driver process closed unexpectedly"))?;
        let res: Value = serde_json::from_str(&line)
            .map_err(|e| DriverFailure::local(format!("malformed driver response: {}", e)))?;
        if res["type"] == "error" {
            return Err(DriverFailure {
                kind: res["kind"].as_str().unwrap_or("unknown").to_string(),
                message: res["error"].as_str().unwrap_or("unknown error").to_string(),
            });
        }
        Ok(res)
    }

    /// Send one request and wait for the response of type `expect`.
    async fn round_trip(&mut self, req: Value, expect: &str) -> Result<Value, DriverFailure> {
        self.send_request(req).await.map_err(DriverFailure::local)?;
        let res = self.read_response().await?;
        if res["type"] != expect {
            return Err(DriverFailure::local(format!(
                "expected '{}' response, got {}",
                expect, res["type"]
            )));
        }
        Ok(res)
    }

    async fn reap(&mut self) {
        self.stdin = None;
        self.stdout = None;
        if let Some(mut child) = self.process.take() {
            match tokio::time::timeout(STOP_GRACE, child.wait()).await {
                Ok(Ok(status)) => tracing::debug!(%status, "surface driver exited"),
                Ok(Err(e)) => tracing::warn!(error = %e, "failed to wait for surface driver"),
                Err(_) => {
                    tracing::warn!("surface driver did not exit in time; killing it");
                    if let Err(e) = child.kill().await {
                        tracing::warn!(error = %e, "failed to kill surface driver");
                    }
                }
            }
        }
    }
}

/// An error reported by, or while talking to, the driver.
#[derive(Debug)]
struct DriverFailure {
    kind: String,
    message: String,
}

impl DriverFailure {
    fn local(message: impl Into<String>) -> Self {
        Self {
            kind: "local".to_string(),
            message: message.into(),
        }
    }

    fn is_timeout(&self) -> bool {
        self.kind == "timeout"
    }
}

impl std::fmt::Display for DriverFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}

#[async_trait]
impl SurfaceBackend for PlaywrightBackend {
    async fn launch(&mut self, config: &SurfaceConfig) -> RenderResult<()> {
        if self.process.is_some() {
            return Err(RenderError::BrowserLaunch("surface already launched".into()));
        }
        self.navigation_timeout_ms = config.navigation_timeout_ms;
        self.settle_ms = config.settle_ms;

        let script = self.driver_script(config).await?;
        self.spawn(script).map_err(RenderError::BrowserLaunch)?;

        let req = json!({
            "type": "launch",
            "width": config.width,
            "height": config.height,
            "deviceScaleFactor": config.device_scale_factor,
            "args": self.options.chromium_args,
        });
        let res = self
            .round_trip(req, "launched")
            .await
            .map_err(|e| RenderError::BrowserLaunch(e.to_string()))?;
        tracing::debug!(version = %res["version"], "browser launched");
        Ok(())
    }

    async fn navigate(&mut self, target: &RenderTarget) -> RenderResult<u32> {
        let req = json!({
            "type": "navigate",
            "html": target.html,
            "timeoutMs": self.navigation_timeout_ms,
            "settleMs": self.settle_ms,
        });
        // Only a driver-side timeout is a navigation timeout. Anything else
        // (page crash, dead driver) means the surface itself is unusable.
        let res = self.round_trip(req, "ready").await.map_err(|e| {
            let detail = format!("{}: {}", target.label, e);
            if e.is_timeout() {
                RenderError::NavigationTimeout(detail)
            } else {
                RenderError::BrowserLaunch(detail)
            }
        })?;
        Ok(res["animations"].as_u64().unwrap_or(0) as u32)
    }

    async fn pause_animations(&mut self) -> RenderResult<u32> {
        let res = self
            .round_trip(json!({ "type": "pause" }), "paused")
            .await
            .map_err(|e| RenderError::FrameCapture(format!("failed to pause animations: {}", e)))?;
        Ok(res["animations"].as_u64().unwrap_or(0) as u32)
    }

    async fn capture_at(&mut self, timestamp_ms: u64) -> RenderResult<Vec<u8>> {
        let req = json!({ "type": "capture", "timeMs": timestamp_ms });
        let res = self
            .round_trip(req, "frame")
            .await
            .map_err(|e| RenderError::FrameCapture(e.to_string()))?;
        let b64_str = res["data"]
            .as_str()
            .ok_or_else(|| RenderError::FrameCapture("missing frame data".into()))?;
        general_purpose::STANDARD
            .decode(b64_str)
            .map_err(|e| RenderError::FrameCapture(format!("undecodable frame data: {}", e)))
    }

    async fn close(&mut self) -> RenderResult<()> {
        if self.process.is_none() {
            return Ok(());
        }
        // The driver may already be gone; reaping below handles that.
        if let Err(e) = self.round_trip(json!({ "type": "stop" }), "stopped").await {
            tracing::debug!(error = %e, "surface driver did not acknowledge stop");
        }
        self.reap().await;
        Ok(())
    }

    fn is_running(&self) -> bool {
        self.process.is_some()
    }
}

#[cfg(test)]
mod playwright_tests;
