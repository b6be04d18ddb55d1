// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The shared handshake state machine and the coordinator that arbitrates
//! delegated-task execution and cross-side wakeups (spec.md §3 `HandshakeState`,
//! §4.5 `HandshakeCoordinator`).

use crate::{
    engine::{EngineAdapter, EngineResult, HandshakeStatus},
    executor::TaskExecutor,
    queue::WriteQueue,
    scheduler::SequentialScheduler,
};
use std::sync::{
    atomic::{AtomicU8, Ordering},
    Arc, Mutex, OnceLock,
};

const HANDSHAKING_BIT: u8 = 0b01;
const DOING_TASKS_BIT: u8 = 0b10;

/// The composite `(mode, DOING_TASKS)` state from spec.md §3, stored as a
/// single atomic cell rather than bit-twiddled on a shared integer managed
/// by hand -- the two fields never change together, so a single `AtomicU8`
/// with read-modify-write updates is sufficient (see `SPEC_FULL.md`'s design
/// notes and `s2n_quic_dc::task::waker::worker::Status` for the analogous
/// "one flag, RMW-guarded" pattern).
pub struct HandshakeState(AtomicU8);

impl HandshakeState {
    pub fn new() -> Self {
        Self(AtomicU8::new(0))
    }

    #[inline]
    pub fn set_handshaking(&self) {
        self.0.fetch_or(HANDSHAKING_BIT, Ordering::AcqRel);
    }

    /// Clears the `HANDSHAKING` bit, preserving `DOING_TASKS`. Returns
    /// whether the bit was previously set (callers use this to know
    /// whether to surface ALPN).
    #[inline]
    pub fn clear_handshaking(&self) -> bool {
        let prev = self.0.fetch_and(!HANDSHAKING_BIT, Ordering::AcqRel);
        prev & HANDSHAKING_BIT != 0
    }

    /// Attempts to set `DOING_TASKS`. Returns `false` if it was already
    /// set (another caller is already running delegated tasks).
    #[inline]
    pub fn try_set_doing_tasks(&self) -> bool {
        loop {
            let cur = self.0.load(Ordering::Acquire);
            if cur & DOING_TASKS_BIT != 0 {
                return false;
            }
            let next = cur | DOING_TASKS_BIT;
            if self
                .0
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return true;
            }
        }
    }

    #[inline]
    pub fn clear_doing_tasks(&self) {
        self.0.fetch_and(!DOING_TASKS_BIT, Ordering::AcqRel);
    }

    #[inline]
    pub fn is_handshaking(&self) -> bool {
        self.0.load(Ordering::Acquire) & HANDSHAKING_BIT != 0
    }

    #[inline]
    pub fn is_doing_tasks(&self) -> bool {
        self.0.load(Ordering::Acquire) & DOING_TASKS_BIT != 0
    }
}

impl Default for HandshakeState {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Caller {
    Reader,
    Writer,
}

pub type SharedEngine = Arc<Mutex<dyn EngineAdapter>>;

/// Coordinates the reader and writer around the shared [`HandshakeState`]
/// and a single engine instance. Never blocks holding a lock across a
/// cross-pipeline call: it either enqueues a sentinel on the writer's queue
/// or delegates to the executor (spec.md §5's deadlock-freedom argument).
pub struct HandshakeCoordinator {
    state: HandshakeState,
    engine: SharedEngine,
    write_queue: WriteQueue,
    executor: Arc<dyn TaskExecutor>,
    read_scheduler: OnceLock<SequentialScheduler>,
    write_scheduler: OnceLock<SequentialScheduler>,
    on_error: Box<dyn Fn(crate::Error) + Send + Sync>,
}

impl HandshakeCoordinator {
    pub fn new(
        engine: SharedEngine,
        write_queue: WriteQueue,
        executor: Arc<dyn TaskExecutor>,
        on_error: impl Fn(crate::Error) + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            state: HandshakeState::new(),
            engine,
            write_queue,
            executor,
            read_scheduler: OnceLock::new(),
            write_scheduler: OnceLock::new(),
            on_error: Box::new(on_error),
        })
    }

    /// Must be called once, after both pipelines' schedulers exist, to
    /// close the construction cycle (the coordinator resumes both
    /// pipelines; the pipelines hold a reference to the coordinator).
    pub fn bind_schedulers(&self, read: SequentialScheduler, write: SequentialScheduler) {
        let _ = self.read_scheduler.set(read);
        let _ = self.write_scheduler.set(write);
    }

    pub fn state(&self) -> &HandshakeState {
        &self.state
    }

    fn resume_both(&self) {
        if let Some(r) = self.read_scheduler.get() {
            r.run_or_schedule();
        }
        if let Some(w) = self.write_scheduler.get() {
            w.run_or_schedule();
        }
    }

    /// Reacts to a handshake-carrying [`EngineResult`]. Returns `true` if
    /// the caller may continue normally (no task deferral, no cross-wake
    /// needed); `false` means the caller should treat this as a suspension
    /// point and wait for the coordinator's later resume.
    pub fn do_handshake(self: &Arc<Self>, result: &EngineResult, caller: Caller) -> bool {
        self.state.set_handshaking();
        tracing::trace!(
            target: "s2n_tls_pump::handshake",
            ?caller,
            status = ?result.handshake_status,
            "handshake step"
        );

        match result.handshake_status {
            HandshakeStatus::NeedTask => {
                if !self.state.try_set_doing_tasks() {
                    return false;
                }
                self.spawn_task_drain();
                false
            }
            HandshakeStatus::NeedWrap => {
                if caller == Caller::Reader {
                    self.write_queue.push_handshake_trigger();
                    if let Some(w) = self.write_scheduler.get() {
                        w.run_or_schedule();
                    }
                    false
                } else {
                    // the writer's own loop will itself satisfy the need
                    true
                }
            }
            HandshakeStatus::NeedUnwrapAgain | HandshakeStatus::NeedUnwrap => {
                // subsequent peer bytes will flow through the reader
                true
            }
            HandshakeStatus::NotHandshaking | HandshakeStatus::Finished => {
                // do_handshake is only ever invoked when `result.handshaking()`
                // held, so a non-handshake status here means the engine
                // reported something outside the known set between that
                // check and this dispatch -- an internal protocol violation.
                (self.on_error)(crate::error::Kind::ProtocolViolation.err());
                false
            }
        }
    }

    fn spawn_task_drain(self: &Arc<Self>) {
        let this = self.clone();
        self.executor.spawn(Box::pin(async move {
            loop {
                let tasks = this.engine.lock().unwrap().delegated_tasks();
                if tasks.is_empty() {
                    break;
                }
                for task in tasks {
                    if let Err(e) = task() {
                        (this.on_error)(e);
                        this.state.clear_doing_tasks();
                        return;
                    }
                }
                let still_need_task =
                    matches!(this.engine.lock().unwrap().handshake_status(), HandshakeStatus::NeedTask);
                if !still_need_task {
                    break;
                }
            }
            this.state.clear_doing_tasks();
            this.resume_both();
        }));
    }

    /// Invoked by the reader when `unwrap` returns `Closed`. If the engine's
    /// inbound is done, outbound isn't, and it wants to wrap, marks
    /// `close_notify_received` (via the caller-provided setter) and kicks
    /// the writer so the acknowledging close_notify is produced.
    pub fn do_closure(self: &Arc<Self>, result: &EngineResult, mark_close_notify: impl FnOnce()) {
        let engine = self.engine.lock().unwrap();
        let inbound_done = engine.is_inbound_done();
        let outbound_done = engine.is_outbound_done();
        drop(engine);

        if inbound_done && !outbound_done && result.handshake_status == HandshakeStatus::NeedWrap {
            mark_close_notify();
            self.do_handshake(result, Caller::Reader);
        }
    }
}
