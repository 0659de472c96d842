// Benchmark for discovery page fingerprinting
// Run with: cargo bench

use criterion::{Criterion, criterion_group, criterion_main};
use printfleet_rs::discovery::fingerprint::{detect_from_page, detect_neptune, extract_title};
use std::hint::black_box;

fn sample_pages() -> Vec<(String, Option<&'static str>)> {
    let padding = "<div class=\"row\">filler</div>\n".repeat(400);
    vec![
        (format!("<html><head><title>Mainsail</title></head><body>{}</body></html>", padding), None),
        (format!("<html><head><title>OctoPrint Login</title></head><body>{}</body></html>", padding), None),
        (format!("<html><body>{}</body></html>", padding), Some("Tasmota/14.2.0")),
        (format!("<html><head><title>Home Router</title></head><body>{}</body></html>", padding), None),
    ]
}

fn bench_detect_from_page(c: &mut Criterion) {
    let pages = sample_pages();
    c.bench_function("fingerprint 4 pages", |b| {
        b.iter(|| {
            let found = pages
                .iter()
                .filter(|(body, server)| detect_from_page(black_box(body), *server).is_some())
                .count();
            assert_eq!(found, 3);
        });
    });
}

fn bench_title_and_neptune(c: &mut Criterion) {
    let body = format!(
        "<html><head>\n<title>\n  Fluidd   elegoo-neptune4-plus\n</title></head><body>{}</body></html>",
        "<p>x</p>".repeat(2000)
    );
    c.bench_function("extract title", |b| {
        b.iter(|| extract_title(black_box(&body)));
    });
    c.bench_function("detect neptune", |b| {
        b.iter(|| detect_neptune(black_box(&body)));
    });
}

criterion_group!(benches, bench_detect_from_page, bench_title_and_neptune);
criterion_main!(benches);
