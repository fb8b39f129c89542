//! URL parsing benchmarks

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use s3_url_handler::uri::{region_from_url, S3Location};

const URLS: &[(&str, &str)] = &[
    ("virtual_hosted", "s3://releases.s3.amazonaws.com/com/example/app/1.0/app-1.0.jar"),
    ("regional", "s3://releases.s3-eu-west-1.amazonaws.com/com/example/app/1.0/app-1.0.jar"),
    ("path_style", "https://s3.amazonaws.com/releases/com/example/app/1.0/app-1.0.jar"),
    ("custom_domain", "s3://maven.example.com/com/example/app/1.0/app-1.0.jar"),
];

fn benchmark_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("uri_parse");

    for (name, url) in URLS {
        group.bench_function(*name, |b| {
            b.iter(|| S3Location::parse(black_box(url)))
        });
    }

    group.finish();
}

fn benchmark_region_scan(c: &mut Criterion) {
    c.bench_function("region_from_url", |b| {
        b.iter(|| region_from_url(black_box("s3://artifacts-ap-southeast-2/libs/a.jar")))
    });
}

criterion_group!(benches, benchmark_parse, benchmark_region_scan);
criterion_main!(benches);
