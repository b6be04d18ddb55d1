// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

/// Tunables for a [`crate::Pump`], split out from the pump internals so
/// call sites can override them without touching pipeline code.
#[derive(Clone, Copy, Debug)]
pub struct PumpConfig {
    /// Initial capacity of the read buffer, in bytes.
    pub read_buffer_initial_capacity: usize,
    /// Readable-byte threshold above which the read pipeline withholds
    /// further upstream credit.
    pub read_buffer_credit_threshold: usize,
    /// Hard upper bound on the read buffer. Exceeding this is a fatal
    /// [`crate::error::Kind::Downstream`] error rather than unbounded
    /// growth.
    pub read_buffer_max_capacity: usize,
    /// Write-queue length above which the write pipeline withholds further
    /// upstream credit.
    pub write_queue_credit_threshold: usize,
}

impl Default for PumpConfig {
    fn default() -> Self {
        Self {
            read_buffer_initial_capacity: 1024,
            read_buffer_credit_threshold: 16 * 1024,
            read_buffer_max_capacity: 256 * 1024,
            write_queue_credit_threshold: 10,
        }
    }
}
