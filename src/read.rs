// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Consumes ciphertext, accumulates it into the read buffer, repeatedly
//! calls `unwrap`, and emits plaintext downstream (spec.md §4.3).

use crate::{
    buffer::SharedReadBuffer,
    config::PumpConfig,
    engine::{EngineResult, Status},
    executor::TaskExecutor,
    handshake::{Caller, HandshakeCoordinator, SharedEngine},
    lifecycle::Lifecycle,
    scheduler::SequentialScheduler,
    subscriber::{DownstreamSink, SubscriberWrapper, UpstreamSource},
};
use bytes::Bytes;
use std::sync::{atomic::{AtomicBool, Ordering}, Arc, Mutex, OnceLock};

struct Inner {
    engine: SharedEngine,
    buffer: SharedReadBuffer,
    downstream: Mutex<Box<dyn DownstreamSink>>,
    upstream: Arc<dyn UpstreamSource>,
    coordinator: Arc<HandshakeCoordinator>,
    lifecycle: Arc<Lifecycle>,
    config: PumpConfig,
    completing: AtomicBool,
    final_emitted: AtomicBool,
    scheduler: OnceLock<SequentialScheduler>,
    // used only to resume the write side when this side clears HANDSHAKING
    write_scheduler: OnceLock<SequentialScheduler>,
}

impl SubscriberWrapper for Inner {}

/// The read half of the pump: ciphertext in, plaintext out.
#[derive(Clone)]
pub struct ReadPipeline {
    inner: Arc<Inner>,
}

impl ReadPipeline {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: SharedEngine,
        downstream: Box<dyn DownstreamSink>,
        upstream: Arc<dyn UpstreamSource>,
        coordinator: Arc<HandshakeCoordinator>,
        lifecycle: Arc<Lifecycle>,
        config: PumpConfig,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        let buffer = SharedReadBuffer::new(
            config.read_buffer_initial_capacity,
            config.read_buffer_max_capacity,
        );
        let inner = Arc::new(Inner {
            engine,
            buffer,
            downstream: Mutex::new(downstream),
            upstream,
            coordinator,
            lifecycle,
            config,
            completing: AtomicBool::new(false),
            final_emitted: AtomicBool::new(false),
            scheduler: OnceLock::new(),
            write_scheduler: OnceLock::new(),
        });

        let task_inner = inner.clone();
        let scheduler = SequentialScheduler::new(executor, move || {
            task_inner.process_data();
        });
        let _ = inner.scheduler.set(scheduler);

        Self { inner }
    }

    pub fn scheduler(&self) -> SequentialScheduler {
        self.inner.scheduler.get().cloned().expect("scheduler bound at construction")
    }

    pub(crate) fn bind_write_scheduler(&self, write: SequentialScheduler) {
        let _ = self.inner.write_scheduler.set(write);
    }

    /// Appends ciphertext and schedules processing. Never blocks.
    pub fn incoming(&self, buffers: Vec<Bytes>, complete: bool) {
        {
            let mut buf = self.inner.buffer.lock();
            for b in &buffers {
                if let Err(e) = buf.push(b) {
                    drop(buf);
                    self.inner.fatal(e);
                    return;
                }
            }
        }
        if complete {
            self.inner.completing.store(true, Ordering::Release);
        }
        self.scheduler().run_or_schedule();
    }

    /// Forces re-scheduling without adding new bytes.
    pub fn resume(&self) {
        self.scheduler().run_or_schedule();
    }

    pub fn stop(&self) {
        self.scheduler().stop();
    }

    pub fn closing(&self) -> bool {
        self.inner.completing.load(Ordering::Acquire)
    }

    /// Credit to request from the ciphertext upstream: withheld once the
    /// read buffer backs up past the configured threshold.
    pub fn upstream_window_update(&self) -> usize {
        self.inner.upstream_window_update()
    }
}

impl Inner {
    /// Returns 0 when the read buffer exceeds the configured credit
    /// threshold, otherwise delegates to the base formula (spec.md §4.3).
    fn upstream_window_update(&self) -> usize {
        if self.buffer.lock().readable_len() > self.config.read_buffer_credit_threshold {
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
        self.lifecycle.complete_read(Ok(()));
    }

    fn surface_alpn(&self) {
        let protocol = self.engine.lock().unwrap().application_protocol();
        self.lifecycle.surface_alpn(protocol);
    }

    fn resume_both(&self) {
        if let Some(s) = self.scheduler.get() {
            s.run_or_schedule();
        }
        if let Some(w) = self.write_scheduler.get() {
            w.run_or_schedule();
        }
    }

    fn process_data(self: &Arc<Self>) {
        loop {
            if self.buffer.lock().is_empty() {
                break;
            }

            let mut produced_so_far = 0usize;
            let mut dst = vec![0u8; self.engine_app_buffer_size()];

            let (result, produced): (EngineResult, Vec<u8>) = loop {
                let mut buf = self.buffer.lock();
                if buf.is_empty() {
                    return;
                }
                let call = self.engine.lock().unwrap().unwrap(buf.readable(), &mut dst);
                let result = match call {
                    Ok(r) => r,
                    Err(e) => {
                        drop(buf);
                        self.fatal(e);
                        return;
                    }
                };

                match result.status {
                    Status::BufferOverflow => {
                        drop(buf);
                        produced_so_far += result.bytes_produced;
                        let mut grown =
                            vec![0u8; self.engine_app_buffer_size() + dst.len()];
                        grown[..produced_so_far].copy_from_slice(&dst[..produced_so_far]);
                        dst = grown;
                        continue;
                    }
                    Status::BufferUnderflow => {
                        let before = buf.readable_len();
                        drop(buf);
                        let credit = self.upstream_window_update();
                        if credit > 0 {
                            self.upstream.request(credit);
                        }
                        let buf_after = self.buffer.lock();
                        if buf_after.readable_len() > before {
                            drop(buf_after);
                            continue;
                        }
                        return;
                    }
                    _ => {
                        buf.consume(result.bytes_consumed);
                        let produced = dst[..result.bytes_produced].to_vec();
                        break (result, produced);
                    }
                }
            };

            let completing = self.completing.load(Ordering::Acquire);

            if !produced.is_empty() && !self.emit(vec![Bytes::from(produced)]) {
                return;
            }

            if result.status == Status::Closed {
                let coordinator = self.coordinator.clone();
                coordinator.do_closure(&result, || self.lifecycle.mark_close_notify_received());
            }

            if result.status == Status::Closed && completing {
                self.surface_alpn();
                self.emit_final();
                return;
            }

            let mut handshaking_now = false;
            if result.handshaking() && !completing {
                self.coordinator.state().set_handshaking();
                let may_continue = self.coordinator.do_handshake(&result, Caller::Reader);
                if may_continue {
                    self.resume_both();
                }
                handshaking_now = true;
            } else {
                let was_handshaking = self.coordinator.state().clear_handshaking();
                if was_handshaking {
                    self.surface_alpn();
                    self.resume_both();
                }
            }

            if handshaking_now && !completing {
                return;
            }
        }

        let completing = self.completing.load(Ordering::Acquire);
        if completing && self.buffer.lock().is_empty() {
            self.surface_alpn();
            self.emit_final();
        }
    }

    fn engine_app_buffer_size(&self) -> usize {
        self.engine.lock().unwrap().application_buffer_size()
    }
}

#[cfg(test)]
mod tests;
