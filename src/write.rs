// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Consumes plaintext, queues it, repeatedly calls `wrap`, and emits
//! ciphertext downstream (spec.md §4.4).

use crate::{
    config::PumpConfig,
    engine::{HandshakeStatus, Status},
    executor::TaskExecutor,
    handshake::{Caller, HandshakeCoordinator, SharedEngine},
    lifecycle::Lifecycle,
    queue::WriteQueue,
    scheduler::SequentialScheduler,
    subscriber::{DownstreamSink, SubscriberWrapper, UpstreamSource},
};
use bytes::Bytes;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, OnceLock,
};

struct Inner {
    engine: SharedEngine,
    write_queue: WriteQueue,
    downstream: Mutex<Box<dyn DownstreamSink>>,
    upstream: Arc<dyn UpstreamSource>,
    coordinator: Arc<HandshakeCoordinator>,
    lifecycle: Arc<Lifecycle>,
    config: PumpConfig,
    completing: AtomicBool,
    upstream_completed: AtomicBool,
    final_emitted: AtomicBool,
    scheduler: OnceLock<SequentialScheduler>,
    read_scheduler: OnceLock<SequentialScheduler>,
}

impl SubscriberWrapper for Inner {}

/// The write half of the pump: plaintext in, ciphertext out.
#[derive(Clone)]
pub struct WritePipeline {
    inner: Arc<Inner>,
}

impl WritePipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: SharedEngine,
        write_queue: WriteQueue,
        downstream: Box<dyn DownstreamSink>,
        upstream: Arc<dyn UpstreamSource>,
        coordinator: Arc<HandshakeCoordinator>,
        lifecycle: Arc<Lifecycle>,
        config: PumpConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let inner = Arc::new(Inner {
            engine,
            write_queue,
            downstream: Mutex::new(downstream),
            upstream,
            coordinator,
            lifecycle,
            config,
            completing: AtomicBool::new(false),
            upstream_completed: AtomicBool::new(false),
            final_emitted: AtomicBool::new(false),
            scheduler: OnceLock::new(),
            read_scheduler: OnceLock::new(),
        });

        let task_inner = inner.clone();
        let scheduler = SequentialScheduler::new(executor, move || {
            task_inner.process_data();
        });

        // on_subscribe: kick off the handshake with a wrap call that
        // carries no application bytes.
        inner.write_queue.push_handshake_trigger();
        scheduler.run_or_schedule();
        let _ = inner.scheduler.set(scheduler);

        Self { inner }
    }

    pub fn scheduler(&self) -> SequentialScheduler {
        self.inner.scheduler.get().cloned().expect("scheduler bound at construction")
    }

    pub(crate) fn bind_read_scheduler(&self, read: SequentialScheduler) {
        let _ = self.inner.read_scheduler.set(read);
    }

    /// Appends plaintext and schedules processing, or (if `complete`)
    /// enqueues the completion sentinel instead. Never blocks.
    ///
    /// `complete` iff `buffers` is empty; callers must uphold this, the
    /// same invariant the source enforces by assertion.
    pub fn incoming(&self, buffers: Vec<Bytes>, complete: bool) {
        debug_assert!(!complete || buffers.is_empty(), "complete implies an empty buffer list");
        if complete {
            self.inner.completing.store(true, Ordering::Release);
            self.inner.write_queue.push_completion();
        } else {
            self.inner.write_queue.push_data(buffers);
        }
        self.scheduler().run_or_schedule();
    }

    pub fn resume(&self) {
        self.scheduler().run_or_schedule();
    }

    pub fn stop(&self) {
        self.scheduler().stop();
    }

    pub fn closing(&self) -> bool {
        self.inner.lifecycle.close_notify_received()
    }

    /// Credit to request from the plaintext upstream: withheld once the
    /// write queue backs up past the configured depth.
    pub fn upstream_window_update(&self) -> usize {
        self.inner.upstream_window_update()
    }
}

impl Inner {
    fn upstream_window_update(&self) -> usize {
        if self.write_queue.len() > self.config.write_queue_credit_threshold {
            0
        } else {
            self.base_window_update(0, 0)
        }
    }

    fn fatal(&self, e: crate::Error) {
        self.lifecycle.handle_error(e);
    }

    fn emit(&self, frame: Vec<Bytes>) -> bool {
        if let Err(e) = self.downstream.lock().unwrap().on_next(frame) {
            self.fatal(e);
            false
        } else {
            true
        }
    }

    fn emit_final(&self) {
        if self
            .final_emitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return;
        }
        if let Err(e) = self.downstream.lock().unwrap().on_complete() {
            self.fatal(e);
            return;
        }
        self.lifecycle.complete_write(Ok(()));
    }

    fn surface_alpn(&self) {
        let protocol = self.engine.lock().unwrap().application_protocol();
        self.lifecycle.surface_alpn(protocol);
    }

    fn resume_both(&self) {
        if let Some(s) = self.scheduler.get() {
            s.run_or_schedule();
        }
        if let Some(r) = self.read_scheduler.get() {
            r.run_or_schedule();
        }
    }

    fn needs_run(&self) -> bool {
        self.write_queue.has_data()
            || self.write_queue.has_handshake_trigger()
            || self.engine.lock().unwrap().handshake_status() == HandshakeStatus::NeedWrap
    }

    fn process_data(self: &Arc<Self>) {
        while self.needs_run() {
            let mut dst = vec![0u8; self.engine_packet_buffer_size()];
            let mut produced_so_far = 0usize;
            let snapshot = self.write_queue.snapshot_for_wrap();

            let (result, produced) = loop {
                let refs: Vec<&[u8]> = snapshot.iter().map(|b| b.as_ref()).collect();
                let call = self.engine.lock().unwrap().wrap(&refs, &mut dst);
                let result = match call {
                    Ok(r) => r,
                    Err(e) => {
                        self.fatal(e);
                        return;
                    }
                };

                match result.status {
                    Status::BufferOverflow => {
                        produced_so_far += result.bytes_produced;
                        let mut grown =
                            vec![0u8; self.engine_packet_buffer_size() + dst.len()];
                        grown[..produced_so_far].copy_from_slice(&dst[..produced_so_far]);
                        dst = grown;
                        continue;
                    }
                    _ => {
                        let produced = dst[..result.bytes_produced].to_vec();
                        break (result, produced);
                    }
                }
            };

            if result.status == Status::Closed {
                if !self.upstream_completed.swap(true, Ordering::AcqRel) {
                    self.upstream.cancel();
                }
                if produced.is_empty() {
                    return;
                }
                if !self.completing.swap(true, Ordering::AcqRel) {
                    self.write_queue.push_completion();
                }
            }

            if result.handshaking() {
                self.coordinator.do_handshake(&result, Caller::Writer);
            } else {
                let was_handshaking = self.coordinator.state().clear_handshaking();
                if was_handshaking {
                    self.surface_alpn();
                    self.resume_both();
                }
            }

            self.write_queue.consume(result.bytes_consumed);

            if !produced.is_empty() && !self.emit(vec![Bytes::from(produced)]) {
                return;
            }

            let completing = self.completing.load(Ordering::Acquire);
            if result.handshaking() && !completing {
                let still_need_wrap = matches!(
                    self.engine.lock().unwrap().handshake_status(),
                    HandshakeStatus::NeedWrap
                );
                if !still_need_wrap {
                    return;
                }
            }
        }

        let completing = self.completing.load(Ordering::Acquire);
        if completing && !self.write_queue.has_data() {
            self.emit_final();
            return;
        }

        let still_need_wrap = matches!(
            self.engine.lock().unwrap().handshake_status(),
            HandshakeStatus::NeedWrap
        );
        if still_need_wrap && !self.write_queue.has_handshake_trigger() {
            self.write_queue.push_handshake_trigger();
        }
    }

    fn engine_packet_buffer_size(&self) -> usize {
        self.engine.lock().unwrap().packet_buffer_size()
    }
}

#[cfg(test)]
mod tests;
