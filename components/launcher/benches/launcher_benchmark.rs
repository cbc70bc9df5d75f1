//! Command line parsing throughput.

use criterion::{Criterion, criterion_group, criterion_main};
use jleaker::launcher::options::switch_spec;
use jleaker::switches::parser::parse;
use std::hint::black_box;

fn bench_parse(c: &mut Criterion) {
    let spec = switch_spec().unwrap();
    let argv = [
        "--pid",
        "4821",
        "--lib-path",
        "/opt/jleaker/<ARCH>/libjleaker.so",
        "--conf-path",
        "/etc/jleaker",
        "--size-threshold",
        "500",
        "--debug",
        "--no-gc",
        "--conf-file",
        "a.conf:b.conf",
    ];

    c.bench_function("parse_launcher_argv", |b| {
        b.iter(|| parse(black_box(argv), black_box(&spec)))
    });
}

criterion_group!(benches, bench_parse);
criterion_main!(benches);
