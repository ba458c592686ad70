//! Benchmarks for the wire codec and correlation bookkeeping

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use vwstream_core::codec::{parse_prediction_line, ExampleEncoder};
use vwstream_core::correlation::CorrelationTable;
use vwstream_core::Example;

fn create_example(features: usize, namespaces: usize) -> Example {
    let mut example = Example::new(42.5).with_importance(2.0);
    for i in 0..features {
        example = example.with_feature(format!("f{}", i), i as f64 * 0.25);
    }
    for n in 0..namespaces {
        example = example.with_namespace(
            format!("ns{}", n),
            (0..features).map(|i| (format!("g{}", i), Some(i as f64 + 0.5))),
        );
    }
    example
}

fn bench_encode(c: &mut Criterion) {
    let mut group = c.benchmark_group("encode");

    for features in [4, 32, 256].iter() {
        for namespaces in [0, 4].iter() {
            let id = format!("features_{}_namespaces_{}", features, namespaces);
            let example = create_example(*features, *namespaces);
            group.bench_with_input(BenchmarkId::from_parameter(&id), &example, |b, example| {
                let mut encoder = ExampleEncoder::default();
                let mut seq = 0u64;
                b.iter(|| {
                    seq += 1;
                    encoder.encode(black_box(example), seq).unwrap()
                });
            });
        }
    }

    group.finish();
}

fn bench_parse_prediction(c: &mut Criterion) {
    c.bench_function("parse_prediction_line", |b| {
        b.iter(|| parse_prediction_line(black_box("85.0999 seq_123456")))
    });
}

fn bench_correlate(c: &mut Criterion) {
    let mut group = c.benchmark_group("correlate");

    for in_flight in [1usize, 64, 1024].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(in_flight),
            in_flight,
            |b, &in_flight| {
                b.iter(|| {
                    let mut table = CorrelationTable::new("squared", None);
                    for i in 0..in_flight {
                        table.on_send(Example::new(i as f64));
                    }
                    for seq in (1..=in_flight as u64).rev() {
                        let line = format!("{} seq_{}", seq, seq);
                        black_box(table.on_line(&line).unwrap());
                    }
                    table.aggregate()
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_encode, bench_parse_prediction, bench_correlate);
criterion_main!(benches);
