use criterion::{criterion_group, criterion_main, Criterion};
use storyreel_core::{CollectingSink, FrameTiming, TimeoutConfig};
use storyreel_web::testing::{SurfaceTally, SyntheticBackend};
use storyreel_web::{FrameCapturer, RenderSurface, RenderTarget, SurfaceConfig};
use tokio::runtime::Runtime;

fn setup_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("storyreel_capture");
    group.sample_size(10);

    let rt = Runtime::new().unwrap();

    // Measures capture bookkeeping (clock stepping, dimension checks,
    // sequence hashing) with the browser replaced by the synthetic backend.
    group.bench_function("synthetic_30_frames_270x480", |b| {
        b.to_async(&rt).iter(|| async {
            let tally = SurfaceTally::new();
            let config = SurfaceConfig {
                width: 270,
                height: 480,
                device_scale_factor: 1.0,
                settle_ms: 0,
                navigation_timeout_ms: 1_000,
                scratch_dir: std::env::temp_dir(),
            };
            let mut surface = RenderSurface::open(
                config,
                Box::new(SyntheticBackend::new(tally)),
                &TimeoutConfig::default(),
            )
            .await
            .unwrap();
            surface
                .load(&RenderTarget::new("<div></div>", "bench"))
                .await
                .unwrap();

            let mut sink = CollectingSink::default();
            FrameCapturer::new(FrameTiming::new(30.0, 1000))
                .capture(&mut surface, &mut sink)
                .await
                .unwrap();
            surface.close().await;
        });
    });

    group.finish();
}

criterion_group!(benches, setup_benchmark);
criterion_main!(benches);
