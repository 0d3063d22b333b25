use serde::{Deserialize, Serialize};
use std::fmt;

/// Output frame clock: maps frame indices onto millisecond timestamps.
///
/// `total_frames = round(fps * duration_ms / 1000)` and frame `i` sits at
/// `round(i * 1000 / fps)` ms. Both are plain functions of `(fps, duration_ms)`
/// so capture and encode always agree on the frame grid.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FrameTiming {
    fps: f64,
    duration_ms: u64,
}

impl FrameTiming {
    /// Create a timing for the given frame rate and duration.
    pub fn new(fps: f64, duration_ms: u64) -> Self {
        Self { fps, duration_ms }
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    /// Duration in (fractional) seconds.
    pub fn duration_seconds(&self) -> f64 {
        self.duration_ms as f64 / 1000.0
    }

    /// Number of frames the output holds.
    pub fn total_frames(&self) -> u64 {
        (self.fps * self.duration_ms as f64 / 1000.0).round() as u64
    }

    /// Timestamp of frame `index`, in milliseconds.
    pub fn timestamp_ms(&self, index: u64) -> u64 {
        (index as f64 * 1000.0 / self.fps).round() as u64
    }

    /// Iterate `(index, timestamp_ms)` over every output frame in order.
    pub fn frames(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        (0..self.total_frames()).map(move |i| (i, self.timestamp_ms(i)))
    }
}

impl fmt::Display for FrameTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} frames @ {}fps ({}ms)",
            self.total_frames(),
            self.fps,
            self.duration_ms
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_frames_rounds() {
        assert_eq!(FrameTiming::new(30.0, 7000).total_frames(), 210);
        assert_eq!(FrameTiming::new(24.0, 1010).total_frames(), 24);
        assert_eq!(FrameTiming::new(24.0, 1030).total_frames(), 25);
        assert_eq!(FrameTiming::new(29.97, 1000).total_frames(), 30);
    }

    #[test]
    fn test_timestamps_strictly_increase() {
        for fps in [1.0, 12.0, 23.976, 25.0, 30.0, 60.0, 120.0] {
            for duration_ms in [1000, 1500, 7000] {
                let timing = FrameTiming::new(fps, duration_ms);
                let stamps: Vec<u64> = timing.frames().map(|(_, t)| t).collect();
                assert_eq!(stamps.len() as u64, timing.total_frames());
                assert_eq!(stamps[0], 0);
                assert!(stamps.windows(2).all(|w| w[0] < w[1]), "fps {}", fps);
            }
        }
    }

    #[test]
    fn test_timestamp_values() {
        let timing = FrameTiming::new(30.0, 7000);
        assert_eq!(timing.timestamp_ms(1), 33);
        assert_eq!(timing.timestamp_ms(2), 67);
        assert_eq!(timing.timestamp_ms(209), 6967);
    }

    #[test]
    fn test_display() {
        assert_eq!(
            FrameTiming::new(30.0, 7000).to_string(),
            "210 frames @ 30fps (7000ms)"
        );
    }
}
