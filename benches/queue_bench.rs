use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use timer_queue_bench::hooks::{NoopHooks, TimerInfo};
use timer_queue_bench::producer::ProducerLoop;
use timer_queue_bench::stats::{DropCounter, TimerStats};
use timer_queue_bench::work::{angle_batch, FixedWorkload, Operation};
use timer_queue_bench::{BoundedQueue, WorkItem};

fn bench_queue(c: &mut Criterion) {
    let mut group = c.benchmark_group("bounded_queue");

    group.bench_function("enqueue_dequeue", |b| {
        let queue = BoundedQueue::new(3).unwrap();
        let item = WorkItem::new(Operation::Sin, angle_batch(0, 10));

        b.iter(|| {
            let _ = queue.try_enqueue_with(black_box(item.clone()), WorkItem::stamp_enqueued);
            black_box(queue.try_dequeue());
        });
    });

    group.bench_function("reject_when_full", |b| {
        let queue = BoundedQueue::new(1).unwrap();
        let _ = queue.try_enqueue(0u64);

        b.iter(|| {
            black_box(queue.try_enqueue(black_box(1u64)));
        });
    });

    group.bench_function("contended_two_consumers", |b| {
        b.iter(|| {
            let queue = Arc::new(BoundedQueue::new(16).unwrap());
            let consumers: Vec<_> = (0..2)
                .map(|_| {
                    let queue = queue.clone();
                    thread::spawn(move || std::iter::from_fn(|| queue.dequeue()).count())
                })
                .collect();
            for i in 0..1_000u64 {
                let _ = queue.try_enqueue(i);
            }
            queue.mark_production_ended();
            let drained: usize = consumers.into_iter().map(|h| h.join().unwrap()).sum();
            black_box(drained);
        });
    });
}

fn bench_producer_tick(c: &mut Criterion) {
    let mut group = c.benchmark_group("producer");

    group.bench_function("tick", |b| {
        let queue = BoundedQueue::new(1).unwrap();
        let drops = DropCounter::new();
        let hooks = NoopHooks;
        let mut generator = FixedWorkload {
            operation: Operation::Tan,
            base_degrees: 20,
            args_per_item: 10,
        };
        let info = TimerInfo {
            index: 0,
            period: Duration::from_millis(10),
        };
        let mut stats = TimerStats::new(0, info.period, 1);
        let mut producer = ProducerLoop::new(info, &queue, &drops, &hooks, &mut generator);

        b.iter(|| {
            black_box(producer.tick(0, &mut stats));
            let _ = queue.try_dequeue();
        });
    });
}

criterion_group!(benches, bench_queue, bench_producer_tick);
criterion_main!(benches);
