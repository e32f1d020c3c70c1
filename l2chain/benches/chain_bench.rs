//! Benchmarks for chain execution.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use l2chain::pipeline::{ChainBuilder, Orchestrator};
use l2chain::prelude::*;
use l2chain::stages::{IdentifyFileStage, SkipOnModeStage};
use l2chain::testing::FieldWriterStage;

fn files(n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let mode = if i % 3 == 0 { "SIN" } else { "LRM" };
            format!(
                "/l1b/CS_OFFL_SIR_{mode}_1B_20200901T{:02}{:02}00_20200901T{:02}{:02}59_D001.nc",
                i / 60 % 24,
                i % 60,
                i / 60 % 24,
                i % 60
            )
        })
        .collect()
}

fn chain() -> StageChain {
    ChainBuilder::new()
        .stage(Arc::new(IdentifyFileStage::new()))
        .stage(Arc::new(SkipOnModeStage::new([InstrumentMode::LowResolution])))
        .stage(Arc::new(FieldWriterStage::new(
            "alg_surface_type",
            "surface_type",
            vec![1_i64; 512],
        )))
        .build()
        .expect("valid chain")
}

fn chain_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let chain = chain();
    let resources = ResourcePool::empty();

    c.bench_function("chain_single_file", |b| {
        let file = FileId::from_path(files(1).remove(0));
        b.iter(|| {
            runtime.block_on(async {
                let ctx = chain.new_context(file.clone());
                black_box(chain.run(ctx, &resources).await.expect("no resource errors"))
            })
        });
    });
}

fn orchestrator_benchmark(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let inputs = files(256);
    let mut group = c.benchmark_group("orchestrator");
    group.throughput(Throughput::Elements(inputs.len() as u64));

    for concurrency in [1, 4, 16] {
        let orchestrator = Orchestrator::builder(chain())
            .concurrency(concurrency)
            .build()
            .expect("valid orchestrator");
        group.bench_with_input(BenchmarkId::from_parameter(concurrency), &inputs, |b, inputs| {
            b.iter(|| {
                runtime.block_on(async {
                    black_box(orchestrator.run_files(inputs.clone()).await.expect("run completes"))
                })
            });
        });
    }
    group.finish();
}

criterion_group!(benches, chain_benchmark, orchestrator_benchmark);
criterion_main!(benches);
