// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The "schedule this unit of work" injection point the pump requires for
//! delegated-task execution and serialized pipeline runs.

use std::{future::Future, pin::Pin};

pub type BoxFuture = Pin<Box<dyn Future<Output = ()> + Send>>;

/// Anything capable of running a future to completion on some thread.
///
/// Grounded on `s2n-quic-dc`'s pattern of spawning stream workers onto a
/// `tokio::runtime::Handle`; this trait generalizes that injection point so
/// the pump isn't hard-wired to one async runtime.
pub trait TaskExecutor: Send + Sync {
    fn spawn(&self, task: BoxFuture);
}

#[cfg(feature = "tokio")]
mod tokio_impl {
    use super::{BoxFuture, TaskExecutor};

    /// [`TaskExecutor`] backed by a `tokio::runtime::Handle`.
    #[derive(Clone)]
    pub struct TokioExecutor(tokio::runtime::Handle);

    impl TokioExecutor {
        pub fn new(handle: tokio::runtime::Handle) -> Self {
            Self(handle)
        }

        pub fn current() -> Self {
            Self(tokio::runtime::Handle::current())
        }
    }

    impl TaskExecutor for TokioExecutor {
        fn spawn(&self, task: BoxFuture) {
            self.0.spawn(task);
        }
    }
}

#[cfg(feature = "tokio")]
pub use tokio_impl::TokioExecutor;
