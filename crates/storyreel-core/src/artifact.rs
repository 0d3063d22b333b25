use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

/// A finished, playable MP4. Only ever built from a successful encode.
#[derive(Debug, Clone, PartialEq)]
pub struct Artifact {
    pub video: Vec<u8>,
    pub size_bytes: u64,
    pub duration_ms: u64,
    pub fps: f64,
    pub width: u32,
    pub height: u32,
}

/// Summary attached to transport responses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArtifactStats {
    #[serde(rename = "fileSizeMB")]
    pub file_size_mb: f64,
    pub duration: String,
    pub format: String,
    pub resolution: String,
}

impl Artifact {
    pub fn new(video: Vec<u8>, duration_ms: u64, fps: f64, width: u32, height: u32) -> Self {
        Self {
            size_bytes: video.len() as u64,
            video,
            duration_ms,
            fps,
            width,
            height,
        }
    }

    /// Standard-alphabet base64 of the video bytes.
    pub fn to_base64(&self) -> String {
        general_purpose::STANDARD.encode(&self.video)
    }

    pub fn stats(&self) -> ArtifactStats {
        let mb = self.size_bytes as f64 / (1024.0 * 1024.0);
        ArtifactStats {
            file_size_mb: (mb * 100.0).round() / 100.0,
            duration: format_duration(self.duration_ms),
            format: "mp4".to_string(),
            resolution: format!("{}x{}", self.width, self.height),
        }
    }
}

fn format_duration(duration_ms: u64) -> String {
    if duration_ms % 1000 == 0 {
        let secs = duration_ms / 1000;
        if secs == 1 {
            "1 second".to_string()
        } else {
            format!("{} seconds", secs)
        }
    } else {
        let secs = duration_ms as f64 / 1000.0;
        format!("{} seconds", secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats() {
        let artifact = Artifact::new(vec![0u8; 3 * 1024 * 1024 / 2], 7000, 30.0, 1080, 1920);
        let stats = artifact.stats();
        assert_eq!(stats.file_size_mb, 1.5);
        assert_eq!(stats.duration, "7 seconds");
        assert_eq!(stats.format, "mp4");
        assert_eq!(stats.resolution, "1080x1920");
        assert_eq!(artifact.size_bytes, 3 * 1024 * 1024 / 2);
    }

    #[test]
    fn test_fractional_duration() {
        assert_eq!(format_duration(7500), "7.5 seconds");
        assert_eq!(format_duration(1000), "1 second");
    }

    #[test]
    fn test_stats_wire_names() {
        let stats = Artifact::new(vec![1, 2, 3], 7000, 30.0, 1080, 1920).stats();
        let json = serde_json::to_value(&stats).unwrap();
        assert!(json.get("fileSizeMB").is_some());
        assert_eq!(json["resolution"], "1080x1920");
    }

    #[test]
    fn test_base64() {
        let artifact = Artifact::new(b"mp4".to_vec(), 1000, 30.0, 2, 2);
        assert_eq!(artifact.to_base64(), "bXA0");
    }
}
