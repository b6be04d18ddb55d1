// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A bidirectional TLS record pump mediating a plaintext application side
//! and an encrypted network side, driven by a pluggable [`EngineAdapter`].
//!
//! [`Pump`] wires together a read pipeline (ciphertext in, plaintext out)
//! and a write pipeline (plaintext in, ciphertext out) sharing one engine
//! instance, with a [`HandshakeCoordinator`] arbitrating delegated-task
//! execution and cross-pipeline handshake traffic so that neither side
//! deadlocks or busy-spins while the handshake is in progress.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod buffer;
mod config;
mod engine;
mod error;
mod executor;
mod handshake;
mod lifecycle;
mod pump;
mod queue;
mod read;
mod scheduler;
mod subscriber;
mod write;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use config::PumpConfig;
pub use engine::{DelegatedTask, EngineAdapter, EngineResult, HandshakeStatus, Status};
pub use error::{Error, Kind};
pub use executor::{BoxFuture, TaskExecutor};
pub use handshake::HandshakeCoordinator;
pub use pump::Pump;
pub use read::ReadPipeline;
pub use subscriber::{DownstreamSink, SubscriberWrapper, UpstreamSource};
pub use write::WritePipeline;

#[cfg(feature = "tokio")]
pub use executor::TokioExecutor;

#[cfg(any(test, feature = "testing"))]
pub use engine::testing::{ScriptedEngine, Step};
