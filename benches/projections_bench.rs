//! Benchmark for the board projections.
//!
//! Measures partitioning, filtering and search over snapshots of
//! realistic size.

use chrono::NaiveDate;
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use taskboard::domain::{Priority, Status, Task, TaskId, Timestamp};
use taskboard::sync::{by_status, next_urgent_deadline, search, stats, urgent};

fn snapshot(size: usize) -> Vec<Task> {
    let base = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap_or_default();
    (0..size)
        .map(|index| {
            let status = Status::ALL[index % Status::ALL.len()];
            let priority = if index % 3 == 0 {
                Priority::Urgent
            } else {
                Priority::Medium
            };
            Task::new(
                TaskId::new(format!("task-{index}")),
                format!("Task number {index}"),
                Timestamp::now(),
            )
            .with_status(status)
            .with_priority(priority)
            .with_category(if index % 2 == 0 { "Technical Task" } else { "User Story" })
            .with_due_date(base + chrono::Days::new(index as u64))
        })
        .collect()
}

// =============================================================================
// Projection Benchmarks
// =============================================================================

fn benchmark_projections(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("projections");

    for size in [10, 100, 1000] {
        let tasks = snapshot(size);

        group.bench_with_input(BenchmarkId::new("by_status", size), &tasks, |bencher, tasks| {
            bencher.iter(|| black_box(by_status(black_box(tasks))));
        });

        group.bench_with_input(BenchmarkId::new("urgent", size), &tasks, |bencher, tasks| {
            bencher.iter(|| black_box(urgent(black_box(tasks))));
        });

        group.bench_with_input(BenchmarkId::new("stats", size), &tasks, |bencher, tasks| {
            bencher.iter(|| black_box(stats(black_box(tasks))));
        });

        group.bench_with_input(
            BenchmarkId::new("next_urgent_deadline", size),
            &tasks,
            |bencher, tasks| {
                bencher.iter(|| black_box(next_urgent_deadline(black_box(tasks))));
            },
        );
    }

    group.finish();
}

fn benchmark_search(criterion: &mut Criterion) {
    let mut group = criterion.benchmark_group("search");
    let tasks = snapshot(1000);

    for query in ["", "number 42", "technical", "no such task"] {
        group.bench_with_input(BenchmarkId::new("query", query), &query, |bencher, query| {
            bencher.iter(|| black_box(search(black_box(&tasks), query)));
        });
    }

    group.finish();
}

criterion_group!(benches, benchmark_projections, benchmark_search);
criterion_main!(benches);
