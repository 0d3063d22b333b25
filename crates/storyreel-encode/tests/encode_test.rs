#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::Duration;

use storyreel_core::{EncoderConfig, Frame, FrameSink, RenderError};
use storyreel_encode::{
    mp4, EncodeInput, EncodeJob, FfmpegEncoder, FrameSequenceWriter, OutputSpec, VideoEncoder,
};

const OK: &str = r#"#!/bin/sh
if [ "$1" = "-version" ]; then
  echo "ffmpeg version 6.1-fake Copyright (c) the FFmpeg developers"
  exit 0
fi
for last; do :; done
printf '%s\n' "$@" > "$(dirname "$last")/args.txt"
printf '\000\000\000\030ftypisom\000\000\002\000isomiso2' > "$last"
"#;

const FAILS: &str = r#"#!/bin/sh
echo "Unknown encoder 'libx264'" >&2
exit 1
"#;

const KILLED: &str = "#!/bin/sh\nkill -9 $$\n";

const EMPTY: &str = "#!/bin/sh\nfor last; do :; done\n: > \"$last\"\n";

const GARBAGE: &str = "#!/bin/sh\nfor last; do :; done\necho 'not a video' > \"$last\"\n";

const SILENT: &str = "#!/bin/sh\nexit 0\n";

const HANGS: &str = "#!/bin/sh\nexec sleep 30\n";

/// Copies a well-formed 32x32 movie next to the script into the output.
const WRONG_SIZE: &str = "#!/bin/sh\nfor last; do :; done\ncp \"$(dirname \"$0\")/square.mp4\" \"$last\"\n";

fn mp4_box(kind: &[u8; 4], payload: &[u8]) -> Vec<u8> {
    let mut out = ((payload.len() + 8) as u32).to_be_bytes().to_vec();
    out.extend_from_slice(kind);
    out.extend_from_slice(payload);
    out
}

/// `ftyp` plus a `moov` holding one version-0 track header of the given size.
fn movie_with_track(width: u32, height: u32) -> Vec<u8> {
    let mut tkhd = vec![0u8; 4 + 20 + 16 + 36];
    tkhd.extend((width << 16).to_be_bytes());
    tkhd.extend((height << 16).to_be_bytes());
    let trak = mp4_box(b"trak", &mp4_box(b"tkhd", &tkhd));
    let mut file = mp4_box(b"ftyp", b"isom\0\0\x02\0");
    file.extend(mp4_box(b"moov", &trak));
    file
}

/// Writes every fake ffmpeg once, before any test in this binary spawns a
/// process, so no script is still open for writing when it is exec'd.
fn fake_bin() -> &'static Path {
    static BIN: OnceLock<PathBuf> = OnceLock::new();
    BIN.get_or_init(|| {
        let dir = Path::new(env!("CARGO_TARGET_TMPDIR")).join("fake-ffmpeg");
        std::fs::create_dir_all(&dir).unwrap();
        for (name, body) in [
            ("ok", OK),
            ("fails", FAILS),
            ("killed", KILLED),
            ("empty", EMPTY),
            ("garbage", GARBAGE),
            ("silent", SILENT),
            ("hangs", HANGS),
            ("wrong-size", WRONG_SIZE),
        ] {
            let path = dir.join(name);
            std::fs::write(&path, body).unwrap();
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        std::fs::write(dir.join("square.mp4"), movie_with_track(32, 32)).unwrap();
        dir
    })
}

fn encoder(script: &str, timeout: Duration) -> FfmpegEncoder {
    let config = EncoderConfig {
        ffmpeg: fake_bin().join(script).to_string_lossy().into_owned(),
        ..EncoderConfig::default()
    };
    FfmpegEncoder::new(&config, timeout)
}

fn output() -> OutputSpec {
    OutputSpec {
        width: 1080,
        height: 1920,
        fps: 30.0,
        duration_ms: 7000,
    }
}

fn sequence_job(dir: &Path) -> EncodeJob {
    EncodeJob {
        input: EncodeInput::FrameSequence {
            pattern: dir.join("frame_%05d.png"),
            frames: 210,
        },
        output: output(),
        output_path: dir.join("out.mp4"),
    }
}

#[tokio::test]
async fn test_successful_encode_returns_container() {
    let dir = tempfile::tempdir().unwrap();
    let encoder = encoder("ok", Duration::from_secs(10));
    assert!(encoder.is_available());
    assert!(encoder.version().unwrap().starts_with("ffmpeg version 6.1-fake"));

    let bytes = encoder.encode(&sequence_job(dir.path())).await.unwrap();
    assert_eq!(&bytes[4..8], b"ftyp");
    assert_eq!(mp4::top_level_boxes(&bytes), ["ftyp"]);

    let args = std::fs::read_to_string(dir.path().join("args.txt")).unwrap();
    let args: Vec<&str> = args.lines().collect();
    assert!(args.contains(&"libx264"));
    assert!(args.contains(&"yuv420p"));
    assert!(args.contains(&"+faststart"));
}

#[tokio::test]
async fn test_nonzero_exit_carries_stderr() {
    let dir = tempfile::tempdir().unwrap();
    let err = encoder("fails", Duration::from_secs(10))
        .encode(&sequence_job(dir.path()))
        .await
        .unwrap_err();
    match err {
        RenderError::Encoding(msg) => assert!(msg.contains("Unknown encoder 'libx264'"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_killed_encoder_is_encoding_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = encoder("killed", Duration::from_secs(10))
        .encode(&sequence_job(dir.path()))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "encoding_error");
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn test_empty_and_non_mp4_output_rejected() {
    for script in ["empty", "garbage", "silent"] {
        let dir = tempfile::tempdir().unwrap();
        let err = encoder(script, Duration::from_secs(10))
            .encode(&sequence_job(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, RenderError::Encoding(_)), "{}: {:?}", script, err);
    }
}

#[tokio::test]
async fn test_wrong_output_size_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let err = encoder("wrong-size", Duration::from_secs(10))
        .encode(&sequence_job(dir.path()))
        .await
        .unwrap_err();
    match err {
        RenderError::Encoding(msg) => assert!(msg.contains("32x32, expected 1080x1920"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_encode_is_bounded_by_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let started = std::time::Instant::now();
    let err = encoder("hangs", Duration::from_millis(200))
        .encode(&sequence_job(dir.path()))
        .await
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(10));
    match err {
        RenderError::Encoding(msg) => assert!(msg.contains("200ms"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_missing_binary_is_encoding_error() {
    // Touch the shared bin dir so no fake is being written while we spawn.
    let _ = fake_bin();
    let dir = tempfile::tempdir().unwrap();
    let config = EncoderConfig {
        ffmpeg: "/nonexistent/ffmpeg".into(),
        ..EncoderConfig::default()
    };
    let err = FfmpegEncoder::new(&config, Duration::from_secs(1))
        .encode(&sequence_job(dir.path()))
        .await
        .unwrap_err();
    match err {
        RenderError::Encoding(msg) => assert!(msg.contains("failed to start"), "{}", msg),
        other => panic!("unexpected error: {:?}", other),
    }
}

fn gradient_png(width: u32, height: u32, shade: u8) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |x, y| {
        image::Rgba([shade, (x * 255 / width) as u8, (y * 255 / height) as u8, 255])
    });
    let mut buf = Vec::new();
    image::DynamicImage::ImageRgba8(img)
        .write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
        .unwrap();
    buf
}

/// Runs only where a real ffmpeg with libx264 is installed.
#[tokio::test]
async fn test_real_ffmpeg_sequence_and_still() {
    let _ = fake_bin();
    let ffmpeg = FfmpegEncoder::new(&EncoderConfig::default(), Duration::from_secs(60));
    if !ffmpeg.is_available() {
        eprintln!("ffmpeg not installed; skipping");
        return;
    }

    let dir = tempfile::tempdir().unwrap();
    let mut writer = FrameSequenceWriter::new(dir.path());
    for i in 0..15u64 {
        writer
            .accept(Frame::png(i, i * 1000 / 15, gradient_png(64, 96, (i * 16) as u8)))
            .await
            .unwrap();
    }
    let spec = OutputSpec {
        width: 64,
        height: 96,
        fps: 15.0,
        duration_ms: 1000,
    };
    let video = ffmpeg
        .encode(&EncodeJob {
            input: EncodeInput::FrameSequence {
                pattern: writer.input_pattern(),
                frames: writer.frames_written(),
            },
            output: spec,
            output_path: dir.path().join("seq.mp4"),
        })
        .await
        .unwrap();
    let boxes = mp4::top_level_boxes(&video);
    let moov = boxes.iter().position(|b| b == "moov").unwrap();
    let mdat = boxes.iter().position(|b| b == "mdat").unwrap();
    assert!(moov < mdat, "faststart puts moov first: {:?}", boxes);
    assert_eq!(mp4::video_dimensions(&video), Some((64, 96)));

    // Landscape still into a portrait box: scaled to cover, then cropped.
    let still = dir.path().join("source.png");
    std::fs::write(&still, gradient_png(200, 100, 40)).unwrap();
    let video = ffmpeg
        .encode(&EncodeJob {
            input: EncodeInput::StillImage { path: still },
            output: spec,
            output_path: dir.path().join("still.mp4"),
        })
        .await
        .unwrap();
    assert_eq!(&video[4..8], b"ftyp");
    assert_eq!(mp4::video_dimensions(&video), Some((64, 96)));
}
