// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::executor::TokioExecutor;
use std::sync::atomic::{AtomicUsize, Ordering};

#[tokio::test]
async fn runs_at_least_once_per_trigger() {
    let count = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(TokioExecutor::current());
    let c = count.clone();
    let scheduler = SequentialScheduler::new(executor, move || {
        c.fetch_add(1, Ordering::SeqCst);
    });

    scheduler.run_or_schedule();
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;

    assert!(count.load(Ordering::SeqCst) >= 1);
}

#[tokio::test]
async fn concurrent_triggers_coalesce() {
    let count = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(TokioExecutor::current());
    let c = count.clone();
    let scheduler = SequentialScheduler::new(executor, move || {
        c.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(std::time::Duration::from_millis(5));
    });

    for _ in 0..5 {
        scheduler.run_or_schedule();
    }
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;

    let runs = count.load(Ordering::SeqCst);
    assert!(runs >= 1 && runs <= 5, "expected 1..=5 runs, got {runs}");
}

#[tokio::test]
async fn reschedule_decision_keeps_retrying_without_idling() {
    let attempts = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(TokioExecutor::current());
    let a = attempts.clone();
    let r = runs.clone();
    let scheduler = SequentialScheduler::with_enter_scheduling(
        executor,
        move || {
            r.fetch_add(1, Ordering::SeqCst);
        },
        move || {
            // reschedule twice, then let the task actually run
            if a.fetch_add(1, Ordering::SeqCst) < 2 {
                Decision::Reschedule
            } else {
                Decision::Continue
            }
        },
    );

    scheduler.run_or_schedule();
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert!(
        attempts.load(Ordering::SeqCst) >= 3,
        "enter_scheduling should have been consulted across the Reschedule retries"
    );
    assert_eq!(
        runs.load(Ordering::SeqCst),
        1,
        "the task should run exactly once, only after Reschedule stops being returned"
    );
}

#[tokio::test]
async fn return_decision_idles_without_running_the_task() {
    let runs = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(TokioExecutor::current());
    let r = runs.clone();
    let scheduler = SequentialScheduler::with_enter_scheduling(
        executor,
        move || {
            r.fetch_add(1, Ordering::SeqCst);
        },
        || Decision::Return,
    );

    scheduler.run_or_schedule();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stop_prevents_future_runs() {
    let count = Arc::new(AtomicUsize::new(0));
    let executor = Arc::new(TokioExecutor::current());
    let c = count.clone();
    let scheduler = SequentialScheduler::new(executor, move || {
        c.fetch_add(1, Ordering::SeqCst);
    });

    scheduler.run_or_schedule();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    scheduler.stop();
    let seen_before_stop = count.load(Ordering::SeqCst);

    scheduler.run_or_schedule();
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;

    assert_eq!(count.load(Ordering::SeqCst), seen_before_stop);
}
