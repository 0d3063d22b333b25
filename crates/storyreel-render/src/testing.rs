//! Renderer stand-ins for tests: a launcher for the synthetic surface and
//! an encoder that records what it was asked to do.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use storyreel_core::{ContentHash, Frame, FrameSequenceHasher, RenderError, RenderResult};
use storyreel_encode::{EncodeInput, EncodeJob, VideoEncoder};
use storyreel_web::testing::{SurfaceTally, SyntheticBackend};
use storyreel_web::SurfaceBackend;

use crate::launcher::SurfaceLauncher;

/// Smallest file that passes the MP4 container check.
pub const STUB_MP4: &[u8] = b"\x00\x00\x00\x18ftypisom\x00\x00\x02\x00isomiso2";

pub struct SyntheticLauncher {
    tally: Arc<SurfaceTally>,
}

impl SyntheticLauncher {
    pub fn new(tally: Arc<SurfaceTally>) -> Self {
        Self { tally }
    }
}

impl SurfaceLauncher for SyntheticLauncher {
    fn backend(&self) -> Box<dyn SurfaceBackend> {
        Box::new(SyntheticBackend::new(self.tally.clone()))
    }

    fn name(&self) -> &str {
        "synthetic"
    }
}

/// One call the stub encoder received.
#[derive(Debug, Clone)]
pub struct EncodeRecord {
    pub job: EncodeJob,
    /// Frame files present in the sequence directory at encode time.
    pub frames_on_disk: u64,
    /// Hash over those frame files in order; `None` for still images.
    pub sequence_hash: Option<ContentHash>,
}

#[derive(Debug, Default)]
pub struct EncoderTally {
    records: Mutex<Vec<EncodeRecord>>,
    fail: AtomicBool,
}

impl EncoderTally {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn calls(&self) -> usize {
        self.records.lock().len()
    }

    pub fn records(&self) -> Vec<EncodeRecord> {
        self.records.lock().clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

pub struct StubEncoder {
    tally: Arc<EncoderTally>,
}

impl StubEncoder {
    pub fn new(tally: Arc<EncoderTally>) -> Self {
        Self { tally }
    }
}

fn read_sequence(dir: &Path) -> RenderResult<(u64, ContentHash)> {
    let mut names: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| RenderError::storage("list frames", dir, e))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.starts_with("frame_"))
        .collect();
    names.sort();

    let mut hasher = FrameSequenceHasher::new();
    for (i, name) in names.iter().enumerate() {
        let path = dir.join(name);
        let bytes = std::fs::read(&path).map_err(|e| RenderError::storage("read frame", &path, e))?;
        hasher.update(&Frame::png(i as u64, 0, bytes));
    }
    Ok((names.len() as u64, hasher.finish()))
}

#[async_trait]
impl VideoEncoder for StubEncoder {
    async fn encode(&self, job: &EncodeJob) -> RenderResult<Vec<u8>> {
        let (frames_on_disk, sequence_hash) = match &job.input {
            EncodeInput::FrameSequence { pattern, .. } => {
                let dir = pattern.parent().unwrap_or_else(|| Path::new("."));
                let (count, hash) = read_sequence(dir)?;
                (count, Some(hash))
            }
            EncodeInput::StillImage { .. } => (0, None),
        };
        self.tally.records.lock().push(EncodeRecord {
            job: job.clone(),
            frames_on_disk,
            sequence_hash,
        });

        if self.tally.fail.load(Ordering::SeqCst) {
            return Err(RenderError::Encoding("stub encoder told to fail".into()));
        }
        tokio::fs::write(&job.output_path, STUB_MP4)
            .await
            .map_err(|e| RenderError::storage("write stub video", &job.output_path, e))?;
        Ok(STUB_MP4.to_vec())
    }
}
