//! Benchmarks for lifecycle bookkeeping overhead.

use clusterflow::config::RunnerConfig;
use clusterflow::core::{Phase, PhaseOutcome};
use clusterflow::events::NoOpEventSink;
use clusterflow::runner::{LifecycleRunner, Verdict};
use clusterflow::testing::ScriptedCommand;
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;

fn lifecycle_benchmark(c: &mut Criterion) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");
    let runner = LifecycleRunner::new(RunnerConfig {
        handle_signals: false,
        ..RunnerConfig::default()
    })
    .with_event_sink(Arc::new(NoOpEventSink));

    let setup = ScriptedCommand::succeeding("setup");
    let test = ScriptedCommand::exiting("test", 1);
    let teardown = ScriptedCommand::succeeding("teardown");

    c.bench_function("run_scripted_lifecycle", |b| {
        b.iter(|| {
            let result = rt.block_on(runner.run(&setup, &test, &teardown));
            for command in [&setup, &test, &teardown] {
                command.reset();
            }
            black_box(result.exit_code())
        })
    });

    let setup_outcome = PhaseOutcome::succeeded(Phase::Setup, chrono::Utc::now());
    let test_outcome = PhaseOutcome::failed(Phase::Test, chrono::Utc::now(), 3);
    c.bench_function("verdict_from_outcomes", |b| {
        b.iter(|| Verdict::from_outcomes(black_box(&setup_outcome), black_box(&test_outcome)))
    });
}

criterion_group!(benches, lifecycle_benchmark);
criterion_main!(benches);
