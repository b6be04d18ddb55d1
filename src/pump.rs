// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Wires an [`EngineAdapter`] and an executor to a pair of downstream
//! subscribers and exposes the two demand-driven endpoints described in
//! `spec.md` §6.

use crate::{
    config::PumpConfig,
    engine::EngineAdapter,
    executor::TaskExecutor,
    handshake::HandshakeCoordinator,
    lifecycle::{Lifecycle, OnceFuture},
    queue::WriteQueue,
    read::ReadPipeline,
    subscriber::{DownstreamSink, UpstreamSource},
    write::WritePipeline,
};
use std::sync::{Arc, Mutex};

/// A bidirectional TLS record pump.
///
/// Construction wires a single engine instance to a read pipeline
/// (ciphertext in, plaintext out) and a write pipeline (plaintext in,
/// ciphertext out) that share the engine under a coordinator arbitrating
/// handshake traffic between them (spec.md §2).
pub struct Pump {
    read: ReadPipeline,
    write: WritePipeline,
    lifecycle: Arc<Lifecycle>,
    read_completion: OnceFuture<Result<(), crate::Error>>,
    write_completion: OnceFuture<Result<(), crate::Error>>,
    alpn: OnceFuture<Result<String, crate::Error>>,
}

impl Pump {
    /// Builds a pump around `engine`, delivering decrypted plaintext to
    /// `plaintext_sink` and encrypted ciphertext to `ciphertext_sink`, and
    /// running delegated handshake tasks on `executor`.
    pub fn new(
        engine: impl EngineAdapter + 'static,
        plaintext_upstream: Arc<dyn UpstreamSource>,
        plaintext_sink: Box<dyn DownstreamSink>,
        ciphertext_upstream: Arc<dyn UpstreamSource>,
        ciphertext_sink: Box<dyn DownstreamSink>,
        executor: Arc<dyn TaskExecutor>,
        config: PumpConfig,
    ) -> Self {
        let engine: crate::handshake::SharedEngine = Arc::new(Mutex::new(engine));

        let (lifecycle, read_completion, write_completion, alpn) = Lifecycle::new();
        let lifecycle = Arc::new(lifecycle);

        let write_queue = WriteQueue::new();

        let lc = lifecycle.clone();
        let coordinator = HandshakeCoordinator::new(
            engine.clone(),
            write_queue.clone(),
            executor.clone(),
            move |e| lc.handle_error(e),
        );

        let read = ReadPipeline::new(
            engine.clone(),
            plaintext_sink,
            ciphertext_upstream,
            coordinator.clone(),
            lifecycle.clone(),
            config,
            executor.clone(),
        );

        let write = WritePipeline::new(
            engine,
            write_queue,
            ciphertext_sink,
            plaintext_upstream,
            coordinator.clone(),
            lifecycle.clone(),
            config,
            executor,
        );

        read.bind_write_scheduler(write.scheduler());
        write.bind_read_scheduler(read.scheduler());
        coordinator.bind_schedulers(read.scheduler(), write.scheduler());
        lifecycle.bind_schedulers(read.scheduler(), write.scheduler());

        Self {
            read,
            write,
            lifecycle,
            read_completion,
            write_completion,
            alpn,
        }
    }

    /// The demand-driven sink for incoming ciphertext: feed peer bytes
    /// here.
    pub fn upstream_reader(&self) -> &ReadPipeline {
        &self.read
    }

    /// The demand-driven sink for outgoing plaintext: feed application
    /// bytes here.
    pub fn upstream_writer(&self) -> &WritePipeline {
        &self.write
    }

    /// Resolves to the negotiated application-protocol identifier (possibly
    /// empty) once the handshake completes, or to an error if the pump
    /// fails first.
    pub async fn alpn(&self) -> Result<String, crate::Error> {
        self.alpn.clone().get().await
    }

    pub async fn read_completion(&self) -> Result<(), crate::Error> {
        self.read_completion.clone().get().await
    }

    pub async fn write_completion(&self) -> Result<(), crate::Error> {
        self.write_completion.clone().get().await
    }

    pub fn close_notify_received(&self) -> bool {
        self.lifecycle.close_notify_received()
    }

    /// Forces the reader to re-check its state without delivering new
    /// bytes -- useful after externally releasing backpressure.
    pub fn resume_reader(&self) {
        self.read.resume();
    }

    /// Resets the reader's outgoing demand bookkeeping and re-schedules it.
    ///
    /// This crate's credit model (spec.md §9's `SubscriberWrapper` trait)
    /// has no separate demand counter to zero out -- backpressure here is
    /// derived purely from the read buffer's byte count -- so this is
    /// equivalent to [`Self::resume_reader`]. Kept as a distinct method to
    /// preserve the two-hook shape of the external contract.
    pub fn reset_reader_demand(&self) {
        self.read.resume();
    }
}
