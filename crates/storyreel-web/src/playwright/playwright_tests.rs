use super::*;

fn surface_config(dir: &std::path::Path) -> SurfaceConfig {
    SurfaceConfig {
        width: 100,
        height: 100,
        device_scale_factor: 1.0,
        settle_ms: 0,
        navigation_timeout_ms: 1_000,
        scratch_dir: dir.to_path_buf(),
    }
}

/// A shell stand-in for the Node driver that speaks the same protocol.
const FAKE_DRIVER: &str = r#"
while IFS= read -r line; do
  case "$line" in
    *'"type":"launch"'*) echo '{"type":"launched","version":"fake-1.0"}' ;;
    *'"type":"navigate"'*)
      case "$line" in
        *never-idle*) echo '{"type":"error","kind":"timeout","error":"Timeout 1000ms exceeded"}' ;;
        *page-crash*) echo '{"type":"error","kind":"navigate","error":"Target crashed"}' ;;
        *) echo '{"type":"ready","animations":2}' ;;
      esac ;;
    *'"type":"pause"'*) echo '{"type":"paused","animations":2}' ;;
    *'"type":"capture"'*) echo '{"type":"frame","data":"iVBORw0KGgo="}' ;;
    *'"type":"stop"'*) echo '{"type":"stopped"}'; exit 0 ;;
  esac
done
"#;

fn fake_backend(dir: &std::path::Path) -> PlaywrightBackend {
    let script = dir.join("fake-driver.sh");
    std::fs::write(&script, FAKE_DRIVER).unwrap();
    PlaywrightBackend::new(DriverOptions {
        node: "sh".to_string(),
        script: Some(script),
        node_path: None,
        chromium_args: Vec::new(),
    })
}

#[tokio::test]
async fn test_missing_node_is_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = PlaywrightBackend::new(DriverOptions {
        node: "storyreel-no-such-node-binary".to_string(),
        ..DriverOptions::default()
    });

    let err = backend.launch(&surface_config(dir.path())).await.unwrap_err();
    assert!(matches!(err, RenderError::BrowserLaunch(_)), "{:?}", err);
    assert!(!backend.is_running());
    backend.close().await.unwrap();
}

#[tokio::test]
async fn test_embedded_driver_written_to_scratch_dir() {
    let dir = tempfile::tempdir().unwrap();
    let backend = PlaywrightBackend::new(DriverOptions::default());
    let path = backend.driver_script(&surface_config(dir.path())).await.unwrap();
    assert_eq!(path, dir.path().join("surface-driver.js"));
    let written = std::fs::read_to_string(path).unwrap();
    assert_eq!(written, EMBEDDED_DRIVER);
}

#[tokio::test]
async fn test_close_without_launch_is_noop() {
    let mut backend = PlaywrightBackend::new(DriverOptions::default());
    backend.close().await.unwrap();
    backend.close().await.unwrap();
    assert!(!backend.is_running());
}

#[cfg(unix)]
#[tokio::test]
async fn test_protocol_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = fake_backend(dir.path());

    backend.launch(&surface_config(dir.path())).await.unwrap();
    assert!(backend.is_running());

    let target = RenderTarget::new("<div>hi</div>", "raw html");
    assert_eq!(backend.navigate(&target).await.unwrap(), 2);
    assert_eq!(backend.pause_animations().await.unwrap(), 2);

    let frame = backend.capture_at(33).await.unwrap();
    assert_eq!(&frame[1..4], b"PNG");

    backend.close().await.unwrap();
    assert!(!backend.is_running());
}

#[cfg(unix)]
#[tokio::test]
async fn test_driver_timeout_maps_to_navigation_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = fake_backend(dir.path());
    backend.launch(&surface_config(dir.path())).await.unwrap();

    let target = RenderTarget::new("<div>never-idle</div>", "raw html");
    let err = backend.navigate(&target).await.unwrap_err();
    match err {
        RenderError::NavigationTimeout(msg) => {
            assert!(msg.contains("raw html"));
            assert!(msg.contains("Timeout 1000ms exceeded"));
        }
        other => panic!("unexpected error: {:?}", other),
    }

    backend.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_page_crash_is_not_a_timeout() {
    let dir = tempfile::tempdir().unwrap();
    let mut backend = fake_backend(dir.path());
    backend.launch(&surface_config(dir.path())).await.unwrap();

    let target = RenderTarget::new("<div>page-crash</div>", "raw html");
    let err = backend.navigate(&target).await.unwrap_err();
    match err {
        RenderError::BrowserLaunch(msg) => {
            assert!(msg.contains("raw html"));
            assert!(msg.contains("Target crashed (navigate)"), "{}", msg);
        }
        other => panic!("unexpected error: {:?}", other),
    }

    backend.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_driver_exit_during_navigation_is_launch_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("dying-driver.sh");
    std::fs::write(
        &script,
        r#"read -r line; echo '{"type":"launched","version":"x"}'; exit 3"#,
    )
    .unwrap();
    let mut backend = PlaywrightBackend::new(DriverOptions {
        node: "sh".to_string(),
        script: Some(script),
        ..DriverOptions::default()
    });
    backend.launch(&surface_config(dir.path())).await.unwrap();

    let target = RenderTarget::new("<div>hi</div>", "raw html");
    let err = backend.navigate(&target).await.unwrap_err();
    assert!(matches!(err, RenderError::BrowserLaunch(_)), "{:?}", err);
    backend.close().await.unwrap();
}

#[cfg(unix)]
#[tokio::test]
async fn test_driver_exit_is_capture_error() {
    let dir = tempfile::tempdir().unwrap();
    let script = dir.path().join("dying-driver.sh");
    std::fs::write(
        &script,
        r#"read -r line; echo '{"type":"launched","version":"x"}'; exit 3"#,
    )
    .unwrap();
    let mut backend = PlaywrightBackend::new(DriverOptions {
        node: "sh".to_string(),
        script: Some(script),
        ..DriverOptions::default()
    });
    backend.launch(&surface_config(dir.path())).await.unwrap();

    let err = backend.capture_at(0).await.unwrap_err();
    assert!(matches!(err, RenderError::FrameCapture(_)), "{:?}", err);
    backend.close().await.unwrap();
    assert!(!backend.is_running());
}
