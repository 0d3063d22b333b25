use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use storyreel_core::{EncoderConfig, RenderError, RenderResult};

use crate::encoder::{EncodeInput, EncodeJob, OutputSpec, VideoEncoder};
use crate::mp4;

/// How much of ffmpeg's stderr is kept in error messages.
const STDERR_TAIL_BYTES: usize = 4096;

/// Encoder that shells out to FFmpeg for H.264 encoding.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    program: PathBuf,
    preset: String,
    crf: u8,
    timeout: Duration,
}

impl FfmpegEncoder {
    pub fn new(config: &EncoderConfig, timeout: Duration) -> Self {
        Self {
            program: PathBuf::from(&config.ffmpeg),
            preset: config.preset.clone(),
            crf: config.crf,
            timeout,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Check if FFmpeg is available on the system.
    pub fn is_available(&self) -> bool {
        Command::new(&self.program)
            .arg("-version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// First line of `ffmpeg -version`, if it runs.
    pub fn version(&self) -> Option<String> {
        let output = Command::new(&self.program)
            .arg("-version")
            .stderr(Stdio::null())
            .output()
            .ok()?;
        if !output.status.success() {
            return None;
        }
        String::from_utf8_lossy(&output.stdout)
            .lines()
            .next()
            .map(|line| line.trim().to_string())
    }

    /// Full argument list for one job.
    pub fn build_args(&self, job: &EncodeJob) -> Vec<OsString> {
        let OutputSpec {
            width,
            height,
            fps,
            duration_ms,
        } = job.output;
        let fps = format_number(fps);
        let seconds = format_number(duration_ms as f64 / 1000.0);

        let mut args: Vec<OsString> = ["-y", "-hide_banner", "-loglevel", "error"]
            .into_iter()
            .map(OsString::from)
            .collect();

        match &job.input {
            EncodeInput::FrameSequence { pattern, .. } => {
                args.extend(["-framerate", fps.as_str(), "-start_number", "0", "-i"].map(OsString::from));
                args.push(pattern.as_os_str().to_owned());
            }
            EncodeInput::StillImage { path } => {
                args.extend(["-loop", "1", "-framerate", fps.as_str(), "-i"].map(OsString::from));
                args.push(path.as_os_str().to_owned());
            }
        }

        // Scale to cover the target box, then centre-crop to it exactly.
        let filter = format!(
            "scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},setsar=1",
            w = width,
            h = height
        );
        let crf = self.crf.to_string();
        args.extend(
            [
                "-vf",
                filter.as_str(),
                "-c:v",
                "libx264",
                "-preset",
                self.preset.as_str(),
                "-crf",
                crf.as_str(),
                "-pix_fmt",
                "yuv420p",
                "-r",
                fps.as_str(),
                "-t",
                seconds.as_str(),
                "-movflags",
                "+faststart",
                "-an",
            ]
            .map(OsString::from),
        );
        args.push(job.output_path.as_os_str().to_owned());
        args
    }

    async fn run(&self, job: &EncodeJob) -> RenderResult<()> {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(self.build_args(job))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let child = cmd.spawn().map_err(|e| {
            RenderError::Encoding(format!(
                "failed to start {}: {}",
                self.program.display(),
                e
            ))
        })?;

        // Dropping the wait future on timeout drops the child, which kills it.
        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => {
                result.map_err(|e| RenderError::Encoding(format!("ffmpeg process error: {}", e)))?
            }
            Err(_) => {
                return Err(RenderError::Encoding(format!(
                    "ffmpeg did not finish within {}ms",
                    self.timeout.as_millis()
                )));
            }
        };

        if !output.status.success() {
            return Err(RenderError::Encoding(format!(
                "ffmpeg failed with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl VideoEncoder for FfmpegEncoder {
    async fn encode(&self, job: &EncodeJob) -> RenderResult<Vec<u8>> {
        if let EncodeInput::FrameSequence { frames: 0, .. } = job.input {
            return Err(RenderError::Encoding("no frames to encode".into()));
        }

        let started = Instant::now();
        self.run(job).await?;

        let bytes = match tokio::fs::read(&job.output_path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(RenderError::Encoding(format!(
                    "ffmpeg exited cleanly but wrote no output at {}",
                    job.output_path.display()
                )));
            }
            Err(e) => return Err(RenderError::storage("read encoded video", &job.output_path, e)),
        };
        mp4::check_container(&bytes)?;
        match mp4::video_dimensions(&bytes) {
            Some((width, height)) if (width, height) != (job.output.width, job.output.height) => {
                return Err(RenderError::Encoding(format!(
                    "encoded video is {}x{}, expected {}x{}",
                    width, height, job.output.width, job.output.height
                )));
            }
            Some(_) => {}
            None => tracing::debug!("no track header in encoded output; size not checked"),
        }

        tracing::info!(
            "Encoded {} to {} bytes ({}x{} @ {}fps, {}ms) in {:.2?}",
            describe_input(&job.input),
            bytes.len(),
            job.output.width,
            job.output.height,
            job.output.fps,
            job.output.duration_ms,
            started.elapsed()
        );
        Ok(bytes)
    }
}

fn describe_input(input: &EncodeInput) -> String {
    match input {
        EncodeInput::FrameSequence { frames, .. } => format!("{} frames", frames),
        EncodeInput::StillImage { .. } => "still image".to_string(),
    }
}

/// `30` rather than `30.0`, `7.5` stays `7.5`.
fn format_number(value: f64) -> String {
    format!("{}", value)
}

/// Last few KiB of stderr, cut on a char boundary.
fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.len() <= STDERR_TAIL_BYTES {
        return text.to_string();
    }
    let mut start = text.len() - STDERR_TAIL_BYTES;
    while !text.is_char_boundary(start) {
        start += 1;
    }
    format!("...{}", &text[start..])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoder() -> FfmpegEncoder {
        FfmpegEncoder::new(&EncoderConfig::default(), Duration::from_secs(5))
    }

    fn output() -> OutputSpec {
        OutputSpec {
            width: 1080,
            height: 1920,
            fps: 30.0,
            duration_ms: 7000,
        }
    }

    fn args_of(job: &EncodeJob) -> Vec<String> {
        encoder()
            .build_args(job)
            .into_iter()
            .map(|a| a.to_string_lossy().into_owned())
            .collect()
    }

    fn value_after(args: &[String], flag: &str) -> String {
        let pos = args.iter().position(|a| a == flag).unwrap();
        args[pos + 1].clone()
    }

    #[test]
    fn test_ffmpeg_availability() {
        // Must not panic whether or not ffmpeg is installed.
        let _available = encoder().is_available();
        let missing = FfmpegEncoder::new(
            &EncoderConfig {
                ffmpeg: "/nonexistent/ffmpeg".into(),
                ..EncoderConfig::default()
            },
            Duration::from_secs(1),
        );
        assert!(!missing.is_available());
        assert!(missing.version().is_none());
    }

    #[test]
    fn test_sequence_args() {
        let job = EncodeJob {
            input: EncodeInput::FrameSequence {
                pattern: PathBuf::from("/tmp/job/frame_%05d.png"),
                frames: 210,
            },
            output: output(),
            output_path: PathBuf::from("/tmp/job/out.mp4"),
        };
        let args = args_of(&job);

        assert_eq!(&args[..4], ["-y", "-hide_banner", "-loglevel", "error"]);
        assert_eq!(value_after(&args, "-framerate"), "30");
        assert_eq!(value_after(&args, "-start_number"), "0");
        assert_eq!(value_after(&args, "-i"), "/tmp/job/frame_%05d.png");
        assert_eq!(
            value_after(&args, "-vf"),
            "scale=1080:1920:force_original_aspect_ratio=increase,crop=1080:1920,setsar=1"
        );
        assert_eq!(value_after(&args, "-c:v"), "libx264");
        assert_eq!(value_after(&args, "-pix_fmt"), "yuv420p");
        assert_eq!(value_after(&args, "-preset"), "medium");
        assert_eq!(value_after(&args, "-crf"), "23");
        assert_eq!(value_after(&args, "-t"), "7");
        assert_eq!(value_after(&args, "-movflags"), "+faststart");
        assert!(args.contains(&"-an".to_string()));
        assert!(!args.contains(&"-loop".to_string()));
        assert_eq!(args.last().unwrap(), "/tmp/job/out.mp4");
    }

    #[test]
    fn test_still_image_args() {
        let job = EncodeJob {
            input: EncodeInput::StillImage {
                path: PathBuf::from("/tmp/job/source.png"),
            },
            output: OutputSpec {
                fps: 24.0,
                duration_ms: 2500,
                ..output()
            },
            output_path: PathBuf::from("/tmp/job/out.mp4"),
        };
        let args = args_of(&job);

        assert_eq!(value_after(&args, "-loop"), "1");
        assert_eq!(value_after(&args, "-framerate"), "24");
        assert_eq!(value_after(&args, "-i"), "/tmp/job/source.png");
        assert_eq!(value_after(&args, "-r"), "24");
        assert_eq!(value_after(&args, "-t"), "2.5");
        assert!(!args.contains(&"-start_number".to_string()));
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(30.0), "30");
        assert_eq!(format_number(29.97), "29.97");
        assert_eq!(format_number(7.5), "7.5");
    }

    #[test]
    fn test_stderr_tail_is_bounded() {
        assert_eq!(stderr_tail(b"  boom\n"), "boom");
        let long = "é".repeat(5000);
        let tail = stderr_tail(long.as_bytes());
        assert!(tail.starts_with("..."));
        assert!(tail.len() <= STDERR_TAIL_BYTES + 3);
    }

    #[tokio::test]
    async fn test_encode_empty_frames() {
        let job = EncodeJob {
            input: EncodeInput::FrameSequence {
                pattern: PathBuf::from("/tmp/frame_%05d.png"),
                frames: 0,
            },
            output: output(),
            output_path: PathBuf::from("/tmp/test.mp4"),
        };
        let err = encoder().encode(&job).await.unwrap_err();
        assert!(matches!(err, RenderError::Encoding(_)));
    }
}
