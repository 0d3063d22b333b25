use std::sync::Arc;
use std::time::Duration;

use criterion::{criterion_group, criterion_main, Criterion};
use serde_json::json;
use storyreel_core::RenderSource;
use storyreel_render::{Bundle, BundleCache, CompositionRegistry, CompositionResolver};
use tokio::runtime::Runtime;

const PILLAR: &str = include_str!("../templates/content_pillar.html");

fn setup_benchmark(c: &mut Criterion) {
    let mut group = c.benchmark_group("storyreel_render");

    let props = json!({
        "title": "Mercedes-Benz S 580 <Night Edition>",
        "description": "Low mileage, full service history & warranty",
        "badgeText": "FRIDAY",
        "accent": "#fca5a5",
        "accentDeep": "#ef4444",
    });
    let props = props.as_object().cloned().unwrap_or_default();

    group.bench_function("compile_content_pillar", |b| {
        b.iter(|| Bundle::compile("ContentPillar", PILLAR).unwrap())
    });

    let bundle = Bundle::compile("ContentPillar", PILLAR).unwrap();
    group.bench_function("bind_content_pillar", |b| b.iter(|| bundle.bind(&props).unwrap()));

    // Resolve end to end, with and without the bundle cache.
    let rt = Runtime::new().unwrap();
    for cached in [true, false] {
        let resolver = CompositionResolver::new(
            CompositionRegistry::with_builtins(),
            Arc::new(BundleCache::new(cached)),
            Duration::from_secs(10),
        );
        let source = RenderSource::Composition {
            id: "ContentPillar".into(),
            props: json!({ "dayOfWeek": "friday", "title": "Weekend offer" }),
        };
        let name = if cached { "resolve_cached" } else { "resolve_uncached" };
        group.bench_function(name, |b| {
            b.to_async(&rt).iter(|| async { resolver.resolve(&source).await.unwrap() })
        });
    }

    group.finish();
}

criterion_group!(benches, setup_benchmark);
criterion_main!(benches);
