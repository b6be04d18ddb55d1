// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Serializes execution of a single task so concurrent triggers coalesce
//! into at most one in-flight run plus at most one pending re-run.
//!
//! Grounded on `s2n-quic-dc::task::waker::worker::Waker`, which tracks a
//! mutex-guarded `Sleeping`/`PendingWork`/`Working` status rather than a
//! bare atomic, on the reasoning that the status transitions themselves are
//! not hot enough to justify lock-free CAS games.

use crate::executor::{BoxFuture, TaskExecutor};
use std::sync::{Arc, Mutex};

/// Decision returned by an [`SequentialScheduler`]'s `enter_scheduling`
/// hook, checked before each run. The base scheduler always continues;
/// this exists so a pipeline (namely the reader) can defer a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Continue,
    Reschedule,
    Return,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Running,
    RunningPending,
}

struct Inner {
    state: Mutex<State>,
    stopped: std::sync::atomic::AtomicBool,
    task: Box<dyn Fn() + Send + Sync>,
    enter_scheduling: Box<dyn Fn() -> Decision + Send + Sync>,
    executor: Arc<dyn TaskExecutor>,
}

/// A handle to a serialized task. Cheaply cloneable; all clones share the
/// same coalescing state.
#[derive(Clone)]
pub struct SequentialScheduler {
    inner: Arc<Inner>,
}

impl SequentialScheduler {
    pub fn new<F>(executor: Arc<dyn TaskExecutor>, task: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Self::with_enter_scheduling(executor, task, || Decision::Continue)
    }

    pub fn with_enter_scheduling<F, E>(executor: Arc<dyn TaskExecutor>, task: F, enter: E) -> Self
    where
        F: Fn() + Send + Sync + 'static,
        E: Fn() -> Decision + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(State::Idle),
                stopped: std::sync::atomic::AtomicBool::new(false),
                task: Box::new(task),
                enter_scheduling: Box::new(enter),
                executor,
            }),
        }
    }

    /// Ensures the task runs at least once after this call returns, never
    /// concurrently with itself, and never queues more than one extra run
    /// while a run is in progress.
    pub fn run_or_schedule(&self) {
        use std::sync::atomic::Ordering;

        if self.inner.stopped.load(Ordering::Acquire) {
            return;
        }

        let mut state = self.inner.state.lock().unwrap();
        match *state {
            State::Idle => {
                *state = State::Running;
                drop(state);
                self.spawn_drain_loop();
            }
            State::Running => {
                *state = State::RunningPending;
            }
            State::RunningPending => {}
        }
    }

    /// Prevents future runs. An in-progress run may complete.
    pub fn stop(&self) {
        self.inner.stopped.store(true, std::sync::atomic::Ordering::Release);
    }

    fn spawn_drain_loop(&self) {
        let inner = self.inner.clone();
        let fut: BoxFuture = Box::pin(async move {
            loop {
                if inner.stopped.load(std::sync::atomic::Ordering::Acquire) {
                    *inner.state.lock().unwrap() = State::Idle;
                    return;
                }

                match (inner.enter_scheduling)() {
                    Decision::Return => {
                        *inner.state.lock().unwrap() = State::Idle;
                        return;
                    }
                    Decision::Reschedule => {
                        // a fresh trigger: re-check without touching `state`
                        // or running the task this iteration
                        continue;
                    }
                    Decision::Continue => {
                        (inner.task)();
                    }
                }

                let mut state = inner.state.lock().unwrap();
                match *state {
                    State::RunningPending => {
                        *state = State::Running;
                        // loop again
                    }
                    _ => {
                        *state = State::Idle;
                        return;
                    }
                }
            }
        });
        self.inner.executor.spawn(fut);
    }
}

#[cfg(test)]
mod tests;
