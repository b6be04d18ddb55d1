// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The read pipeline's single growable byte region (spec.md §3 `ReadBuffer`).
//!
//! Kept in "readable" orientation the way a Java `ByteBuffer` is after
//! `flip()`: `pos` is the next byte to consume, `limit` is the end of valid
//! data. Growth is compact-then-double, unbounded up to a hard cap enforced
//! by the caller via [`ReadBuffer::push`].

use crate::error::Kind;
use std::sync::{Arc, Mutex};

pub struct ReadBuffer {
    data: Vec<u8>,
    pos: usize,
    limit: usize,
    max_capacity: usize,
}

impl ReadBuffer {
    pub fn new(initial_capacity: usize, max_capacity: usize) -> Self {
        Self {
            data: vec![0; initial_capacity],
            pos: 0,
            limit: 0,
            max_capacity,
        }
    }

    /// Appends `bytes`, compacting and growing (by doubling) as needed.
    /// Returns a fatal [`Kind::Downstream`] error if doing so would exceed
    /// `max_capacity`: the peer is outrunning what this side can drain.
    pub fn push(&mut self, bytes: &[u8]) -> Result<(), crate::Error> {
        if bytes.is_empty() {
            return Ok(());
        }

        self.compact();

        let needed = self.limit + bytes.len();
        if needed > self.max_capacity {
            return Err(Kind::Downstream.err());
        }

        if needed > self.data.len() {
            let mut new_cap = self.data.len().max(1);
            while new_cap < needed {
                new_cap *= 2;
            }
            new_cap = new_cap.min(self.max_capacity);
            self.data.resize(new_cap, 0);
        }

        self.data[self.limit..needed].copy_from_slice(bytes);
        self.limit = needed;
        Ok(())
    }

    /// Moves unread bytes to the front of the backing storage.
    fn compact(&mut self) {
        if self.pos == 0 {
            return;
        }
        self.data.copy_within(self.pos..self.limit, 0);
        self.limit -= self.pos;
        self.pos = 0;
    }

    #[inline]
    pub fn readable(&self) -> &[u8] {
        &self.data[self.pos..self.limit]
    }

    #[inline]
    pub fn readable_len(&self) -> usize {
        self.limit - self.pos
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.pos == self.limit
    }

    /// Marks `n` bytes as consumed.
    pub fn consume(&mut self, n: usize) {
        debug_assert!(self.pos + n <= self.limit);
        self.pos += n;
        if self.pos == self.limit {
            // nothing left to compact later; reset eagerly so repeated
            // small reads don't creep the storage forward uselessly
            self.pos = 0;
            self.limit = 0;
        }
    }
}

/// A [`ReadBuffer`] behind the dedicated mutex the spec requires: all
/// mutation, and every `unwrap` call that consults it, happens under this
/// lock.
#[derive(Clone)]
pub struct SharedReadBuffer(Arc<Mutex<ReadBuffer>>);

impl SharedReadBuffer {
    pub fn new(initial_capacity: usize, max_capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(ReadBuffer::new(
            initial_capacity,
            max_capacity,
        ))))
    }

    pub fn lock(&self) -> std::sync::MutexGuard<'_, ReadBuffer> {
        self.0.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doubles_capacity_as_needed() {
        let mut buf = ReadBuffer::new(4, 1024);
        buf.push(b"hello").unwrap();
        assert_eq!(buf.readable(), b"hello");
    }

    #[test]
    fn compacts_before_growing() {
        let mut buf = ReadBuffer::new(8, 1024);
        buf.push(b"abcdefgh").unwrap();
        buf.consume(6);
        buf.push(b"XY").unwrap();
        assert_eq!(buf.readable(), b"ghXY");
    }

    #[test]
    fn rejects_growth_past_hard_cap() {
        let mut buf = ReadBuffer::new(4, 8);
        assert!(buf.push(b"0123456789").is_err());
    }

    #[test]
    fn consume_all_resets_to_empty() {
        let mut buf = ReadBuffer::new(4, 1024);
        buf.push(b"ab").unwrap();
        buf.consume(2);
        assert!(buf.is_empty());
        assert_eq!(buf.readable_len(), 0);
    }
}
