use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use minw_core::{Engine, EngineConfig, WorkloadGen, WorkloadSpec};

fn bench_process_block(c: &mut Criterion) {
    let mut group = c.benchmark_group("process_block");
    for &txs in &[32usize, 128, 512] {
        let spec = WorkloadSpec {
            transactions: txs,
            ..Default::default()
        };
        let block = WorkloadGen::new(spec, 7).block();
        let engine = Engine::new(EngineConfig::default());
        group.bench_with_input(BenchmarkId::from_parameter(txs), &block, |b, block| {
            b.iter(|| engine.process_block(block).unwrap());
        });
    }
    group.finish();
}

fn bench_fast_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_mode");
    let block = WorkloadGen::new(
        WorkloadSpec {
            transactions: 256,
            keys: 16,
            ..Default::default()
        },
        7,
    )
    .block();
    for &fast in &[false, true] {
        let engine = Engine::new(EngineConfig {
            fast_mode: fast,
            ..Default::default()
        });
        group.bench_with_input(BenchmarkId::from_parameter(fast), &block, |b, block| {
            b.iter(|| engine.process_block(block).unwrap());
        });
    }
    group.finish();
}

criterion_group!(benches, bench_process_block, bench_fast_mode);
criterion_main!(benches);
