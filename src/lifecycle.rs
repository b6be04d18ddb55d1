// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Completion futures for the read/write halves, ALPN resolution, the
//! close-notify flag, and the normal-stop barrier (spec.md §3 "Lifecycle
//! flags", §4.8).

use crate::scheduler::SequentialScheduler;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    OnceLock,
};
use tokio::sync::watch;

/// A single-assignment slot: the first `complete` call wins, and any
/// number of [`OnceFuture`] clones can observe the result.
pub struct OnceSlot<T: Clone + Send + Sync + 'static> {
    tx: watch::Sender<Option<T>>,
}

#[derive(Clone)]
pub struct OnceFuture<T: Clone + Send + Sync + 'static>(watch::Receiver<Option<T>>);

impl<T: Clone + Send + Sync + 'static> OnceSlot<T> {
    pub fn new() -> (Self, OnceFuture<T>) {
        let (tx, rx) = watch::channel(None);
        (Self { tx }, OnceFuture(rx))
    }

    /// Sets the value if nothing has been set yet. Returns whether this
    /// call was the one that completed it.
    pub fn complete(&self, value: T) -> bool {
        let mut completed = false;
        self.tx.send_if_modified(|slot| {
            if slot.is_none() {
                *slot = Some(value);
                completed = true;
                true
            } else {
                false
            }
        });
        completed
    }

    pub fn is_complete(&self) -> bool {
        self.tx.borrow().is_some()
    }
}

impl<T: Clone + Send + Sync + 'static> OnceFuture<T> {
    /// Resolves once the slot is completed.
    pub async fn get(mut self) -> T {
        loop {
            if let Some(v) = self.0.borrow_and_update().clone() {
                return v;
            }
            if self.0.changed().await.is_err() {
                // the sender side is held alive by the Lifecycle for as
                // long as the Pump exists, so this only happens if the
                // Pump itself was dropped without ever completing.
                panic!("s2n-tls-pump: OnceSlot dropped before completion");
            }
        }
    }
}

pub struct Lifecycle {
    read_completion: OnceSlot<Result<(), crate::Error>>,
    write_completion: OnceSlot<Result<(), crate::Error>>,
    alpn: OnceSlot<Result<String, crate::Error>>,
    close_notify_received: AtomicBool,
    stopped: AtomicBool,
    read_scheduler: OnceLock<SequentialScheduler>,
    write_scheduler: OnceLock<SequentialScheduler>,
}

impl Lifecycle {
    pub fn new() -> (Self, OnceFuture<Result<(), crate::Error>>, OnceFuture<Result<(), crate::Error>>, OnceFuture<Result<String, crate::Error>>) {
        let (read_completion, read_fut) = OnceSlot::new();
        let (write_completion, write_fut) = OnceSlot::new();
        let (alpn, alpn_fut) = OnceSlot::new();
        (
            Self {
                read_completion,
                write_completion,
                alpn,
                close_notify_received: AtomicBool::new(false),
                stopped: AtomicBool::new(false),
                read_scheduler: OnceLock::new(),
                write_scheduler: OnceLock::new(),
            },
            read_fut,
            write_fut,
            alpn_fut,
        )
    }

    pub fn bind_schedulers(&self, read: SequentialScheduler, write: SequentialScheduler) {
        let _ = self.read_scheduler.set(read);
        let _ = self.write_scheduler.set(write);
    }

    pub fn close_notify_received(&self) -> bool {
        self.close_notify_received.load(Ordering::Acquire)
    }

    pub fn mark_close_notify_received(&self) {
        self.close_notify_received.store(true, Ordering::Release);
    }

    /// Completes the ALPN future exactly once, on first observation of
    /// handshake completion or at end-of-stream.
    pub fn surface_alpn(&self, protocol: Option<String>) {
        self.alpn.complete(Ok(protocol.unwrap_or_default()));
    }

    pub fn complete_read(&self, result: Result<(), crate::Error>) {
        if self.read_completion.complete(result) {
            self.maybe_normal_stop();
        }
    }

    pub fn complete_write(&self, result: Result<(), crate::Error>) {
        if self.write_completion.complete(result) {
            self.maybe_normal_stop();
        }
    }

    fn maybe_normal_stop(&self) {
        if self.read_completion.is_complete() && self.write_completion.is_complete() {
            self.normal_stop();
        }
    }

    /// Stops both pipelines exactly once, idempotent.
    pub fn normal_stop(&self) {
        if self
            .stopped
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Some(r) = self.read_scheduler.get() {
            r.stop();
        }
        if let Some(w) = self.write_scheduler.get() {
            w.stop();
        }
    }

    /// Completes both half-completion futures exceptionally with `cause`,
    /// completes ALPN exceptionally if pending, and stops both pipelines.
    /// Idempotent: a second call is a no-op other than the (idempotent)
    /// `normal_stop`.
    pub fn handle_error(&self, cause: crate::Error) {
        tracing::error!(target: "s2n_tls_pump::lifecycle", error = %cause, "fatal pump error");
        self.read_completion.complete(Err(cause.clone()));
        self.write_completion.complete(Err(cause.clone()));
        self.alpn.complete(Err(cause));
        self.normal_stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::TokioExecutor;
    use std::sync::Arc;

    #[tokio::test]
    async fn once_slot_completes_exactly_once() {
        let (slot, fut) = OnceSlot::new();
        assert!(slot.complete(1));
        assert!(!slot.complete(2));
        assert_eq!(fut.get().await, 1);
    }

    #[tokio::test]
    async fn handle_error_completes_all_futures_with_same_cause() {
        let (lifecycle, read_fut, write_fut, alpn_fut) = Lifecycle::new();
        let executor = Arc::new(TokioExecutor::current());
        let noop = move || {};
        let read_sched = SequentialScheduler::new(executor.clone(), noop.clone());
        let write_sched = SequentialScheduler::new(executor, noop);
        lifecycle.bind_schedulers(read_sched, write_sched);

        let err = crate::error::Kind::Upstream.err();
        lifecycle.handle_error(err);

        assert!(read_fut.get().await.is_err());
        assert!(write_fut.get().await.is_err());
        assert!(alpn_fut.get().await.is_err());

        // idempotent: a second call must not panic or change anything
        lifecycle.handle_error(crate::error::Kind::Downstream.err());
    }

    #[tokio::test]
    async fn normal_stop_fires_once_both_completions_land() {
        let (lifecycle, read_fut, write_fut, _alpn_fut) = Lifecycle::new();
        lifecycle.complete_read(Ok(()));
        assert!(!lifecycle.stopped.load(Ordering::Acquire));
        lifecycle.complete_write(Ok(()));
        assert!(lifecycle.stopped.load(Ordering::Acquire));

        assert!(read_fut.get().await.is_ok());
        assert!(write_fut.get().await.is_ok());
    }
}
