// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The demand-based shim each pipeline extends on its upstream and
//! downstream sides (spec.md §4.9 "SubscriberWrapper", §6 external
//! interfaces).
//!
//! The actual transport pipes are an external collaborator
//! (spec.md §1 Out of scope), so this module only defines the contract:
//! a downstream sink frames are pushed into, and an upstream source the
//! pipeline pulls more credit from. Production call sites wire these to
//! whatever pipe implementation they have; [`crate::testing`] provides
//! simple in-memory ones for tests.

use bytes::Bytes;

/// A downstream sink accepting frames (one frame = one list of byte
/// buffers) under demand-based delivery. `on_complete`/`on_error` are
/// terminal: at most one of them is ever called, and never after the
/// other.
pub trait DownstreamSink: Send {
    fn on_next(&mut self, frame: Vec<Bytes>) -> Result<(), crate::Error>;
    fn on_complete(&mut self) -> Result<(), crate::Error>;
}

/// The upstream side of a pipeline's demand contract: requesting more
/// credit, and cancelling the subscription outright (used by the writer
/// when the engine reports its outbound is closed).
pub trait UpstreamSource: Send + Sync {
    fn request(&self, n: usize);
    fn cancel(&self);
}

/// Base upstream-window-update formula, composed into each pipeline
/// (spec.md §9: "the equivalent is a trait ... composed into each
/// pipeline" rather than inherited from a base class). Each pipeline
/// special-cases a zero-credit threshold before falling back to this.
pub trait SubscriberWrapper {
    /// Requests just enough credit to keep one frame of demand
    /// outstanding: if nothing is buffered locally and downstream isn't
    /// backed up either, ask upstream for one more frame.
    fn base_window_update(&self, current_demand: usize, downstream_queue_size: usize) -> usize {
        if current_demand == 0 && downstream_queue_size == 0 {
            1
        } else {
            0
        }
    }
}
