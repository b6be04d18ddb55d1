// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! In-memory loopback test doubles for [`crate::subscriber::DownstreamSink`]
//! and [`crate::subscriber::UpstreamSource`], available to this crate's own
//! tests and, under the `testing` feature, to downstream integration tests
//! wiring up a full [`crate::Pump`] (spec.md §8's loopback-harness
//! requirement).

use crate::subscriber::{DownstreamSink, UpstreamSource};
use bytes::Bytes;
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct RecordingInner {
    frames: Vec<Vec<Bytes>>,
    completed: bool,
    error: Option<crate::Error>,
}

/// A downstream sink that records every frame and terminal signal it
/// receives, for assertion in tests.
#[derive(Clone, Default)]
pub struct RecordingSink(Arc<Mutex<RecordingInner>>);

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<Vec<Bytes>> {
        self.0.lock().unwrap().frames.clone()
    }

    /// Concatenates every data byte seen so far, in delivery order.
    pub fn concat(&self) -> Vec<u8> {
        self.0
            .lock()
            .unwrap()
            .frames
            .iter()
            .flatten()
            .flat_map(|b| b.iter().copied())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.0.lock().unwrap().completed
    }
}

impl DownstreamSink for RecordingSink {
    fn on_next(&mut self, frame: Vec<Bytes>) -> Result<(), crate::Error> {
        self.0.lock().unwrap().frames.push(frame);
        Ok(())
    }

    fn on_complete(&mut self) -> Result<(), crate::Error> {
        let mut inner = self.0.lock().unwrap();
        assert!(!inner.completed, "on_complete called more than once");
        assert!(inner.error.is_none(), "on_complete after on_error");
        inner.completed = true;
        Ok(())
    }
}

/// An upstream source that just counts outstanding credit requests and
/// cancellations; tests drive delivery themselves via `incoming`.
#[derive(Clone, Default)]
pub struct CountingUpstream(Arc<Mutex<CountingInner>>);

#[derive(Default)]
struct CountingInner {
    requested: usize,
    cancelled: bool,
}

impl CountingUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn requested(&self) -> usize {
        self.0.lock().unwrap().requested
    }

    pub fn cancelled(&self) -> bool {
        self.0.lock().unwrap().cancelled
    }
}

impl UpstreamSource for CountingUpstream {
    fn request(&self, n: usize) {
        self.0.lock().unwrap().requested += n;
    }

    fn cancel(&self) {
        self.0.lock().unwrap().cancelled = true;
    }
}
