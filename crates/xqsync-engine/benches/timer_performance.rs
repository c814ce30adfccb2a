//! Benchmarks for event accounting under contention

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::time::Duration;
use xqsync_engine::{EventTimer, Timer};

fn bench_add_events(c: &mut Criterion) {
    c.bench_function("timer_add_1000_events", |b| {
        b.iter(|| {
            let timer = Timer::new();
            for i in 0..1000u64 {
                timer.add(EventTimer::start("/bench/doc.xml").finish(i, i % 50 == 0));
            }
            black_box(timer.snapshot());
        });
    });
}

fn bench_contended_add(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("timer_add_8_workers", |b| {
        b.to_async(&rt).iter(|| async {
            let timer = Arc::new(Timer::with_report_interval(Duration::ZERO));
            let mut handles = Vec::new();
            for worker in 0..8u64 {
                let timer = Arc::clone(&timer);
                handles.push(tokio::spawn(async move {
                    for i in 0..250u64 {
                        timer.add(EventTimer::start("doc").finish(worker * i, false));
                        if i % 100 == 0 {
                            black_box(timer.progress_message());
                        }
                    }
                }));
            }
            for handle in handles {
                handle.await.unwrap();
            }
            black_box(timer.final_summary());
        });
    });
}

criterion_group!(benches, bench_add_events, bench_contended_add);
criterion_main!(benches);
