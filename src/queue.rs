// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The write pipeline's pending-encryption queue (spec.md §3 `WriteQueue`).
//!
//! Rather than the source's "zero-length buffer with stable object
//! identity" trick for sentinels, this models them as tagged enum variants
//! (spec.md §9 design note) -- a handshake-trigger item schedules a `wrap`
//! call that carries no application bytes, and a completion item marks
//! end-of-stream. Neither is ever confused with an ordinary zero-length
//! user buffer because the type system, not a content/identity comparison,
//! distinguishes them.

use bytes::Bytes;
use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

#[derive(Debug)]
enum Item {
    Data(Bytes),
    HandshakeTrigger,
    Completion,
}

struct Inner {
    items: VecDeque<Item>,
}

#[derive(Clone)]
pub struct WriteQueue(Arc<Mutex<Inner>>);

impl WriteQueue {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Inner {
            items: VecDeque::new(),
        })))
    }

    pub fn push_data(&self, buffers: Vec<Bytes>) {
        let mut inner = self.0.lock().unwrap();
        inner.items.extend(buffers.into_iter().map(Item::Data));
    }

    pub fn push_handshake_trigger(&self) {
        self.0.lock().unwrap().items.push_back(Item::HandshakeTrigger);
    }

    pub fn push_completion(&self) {
        self.0.lock().unwrap().items.push_back(Item::Completion);
    }

    /// True if a handshake-trigger sentinel is anywhere in the queue.
    pub fn has_handshake_trigger(&self) -> bool {
        self.0
            .lock()
            .unwrap()
            .items
            .iter()
            .any(|i| matches!(i, Item::HandshakeTrigger))
    }

    /// True if there is no pending application data (sentinels don't
    /// count; a queue holding only a completion marker is "empty" for the
    /// purposes of the write pipeline's drain check).
    pub fn has_data(&self) -> bool {
        self.0
            .lock()
            .unwrap()
            .items
            .iter()
            .any(|i| matches!(i, Item::Data(_)))
    }

    /// Total queued items, sentinels included -- used for the write
    /// pipeline's upstream-credit formula (spec.md §4.4).
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().items.len()
    }

    /// Snapshots the queued application-data slices, in order, for a single
    /// `wrap` call. A handshake-trigger occupying the front of the queue is
    /// consumed (popped) here, since its only purpose was to make the
    /// engine see *some* call to `wrap`; it never contributes bytes.
    pub fn snapshot_for_wrap(&self) -> Vec<Bytes> {
        let mut inner = self.0.lock().unwrap();
        while matches!(inner.items.front(), Some(Item::HandshakeTrigger)) {
            inner.items.pop_front();
        }
        inner
            .items
            .iter()
            .filter_map(|i| match i {
                Item::Data(b) => Some(b.clone()),
                _ => None,
            })
            .collect()
    }

    /// Removes `n` consumed bytes from the front of the queue's data items,
    /// draining any buffer that became fully consumed and trimming a
    /// partially consumed one. Also drops a leading completion sentinel,
    /// which carries no bytes and has served its purpose once observed.
    pub fn consume(&self, mut n: usize) {
        let mut inner = self.0.lock().unwrap();
        while matches!(inner.items.front(), Some(Item::Completion)) {
            inner.items.pop_front();
        }
        while n > 0 {
            match inner.items.front_mut() {
                Some(Item::Data(b)) => {
                    if b.len() <= n {
                        n -= b.len();
                        inner.items.pop_front();
                    } else {
                        let _ = b.split_to(n);
                        n = 0;
                    }
                }
                _ => break,
            }
        }
        while matches!(inner.items.front(), Some(Item::Completion)) {
            inner.items.pop_front();
        }
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handshake_trigger_is_not_mistaken_for_empty_data() {
        let q = WriteQueue::new();
        q.push_data(vec![Bytes::new()]); // an ordinary empty user buffer
        q.push_handshake_trigger();

        assert!(q.has_handshake_trigger());
        // the empty Data buffer is real application data, even though it
        // has zero length -- it must not be treated as the sentinel
        assert!(q.has_data());
    }

    #[test]
    fn snapshot_drops_leading_trigger_and_returns_data_only() {
        let q = WriteQueue::new();
        q.push_handshake_trigger();
        q.push_data(vec![Bytes::from_static(b"hi")]);

        let snap = q.snapshot_for_wrap();
        assert_eq!(snap, vec![Bytes::from_static(b"hi")]);
        assert!(!q.has_handshake_trigger());
    }

    #[test]
    fn consume_drains_full_and_trims_partial_buffers() {
        let q = WriteQueue::new();
        q.push_data(vec![Bytes::from_static(b"abc"), Bytes::from_static(b"defg")]);
        q.consume(5);
        let snap = q.snapshot_for_wrap();
        assert_eq!(snap, vec![Bytes::from_static(b"fg")]);
    }

    #[test]
    fn completion_sentinel_does_not_count_as_data() {
        let q = WriteQueue::new();
        q.push_completion();
        assert!(!q.has_data());
        assert_eq!(q.len(), 1);
    }
}
