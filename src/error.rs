// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::{fmt, panic::Location};

/// A fatal error raised by the pump.
///
/// All errors are fatal: they cause both the reader and writer half to
/// complete exceptionally with the same cause (see [`crate::lifecycle`]).
#[derive(Clone)]
pub struct Error {
    kind: Kind,
    location: &'static Location<'static>,
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Error")
            .field("kind", &self.kind)
            .field("crate", &"s2n-tls-pump")
            .field("file", &self.file())
            .field("line", &self.location.line())
            .finish()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let Self { kind, location } = self;
        let file = self.file();
        let line = location.line();
        write!(f, "[s2n-tls-pump::{file}:{line}]: {kind}")
    }
}

impl std::error::Error for Error {}

impl Error {
    #[track_caller]
    #[inline]
    pub fn new(kind: Kind) -> Self {
        Self {
            kind,
            location: Location::caller(),
        }
    }

    #[inline]
    pub fn kind(&self) -> &Kind {
        &self.kind
    }

    #[inline]
    fn file(&self) -> &'static str {
        self.location
            .file()
            .trim_start_matches(concat!(env!("CARGO_MANIFEST_DIR"), "/src/"))
    }
}

impl From<Kind> for Error {
    #[track_caller]
    #[inline]
    fn from(kind: Kind) -> Self {
        Self::new(kind)
    }
}

/// The category of a fatal [`Error`].
///
/// Corresponds to the error kinds enumerated in the pump's error-handling
/// design: engine failures, downstream/upstream transport failures, and
/// protocol violations (an engine status outside the known set).
///
/// The read buffer's hard-cap overflow is reported as `Downstream` rather
/// than as its own kind: it is this pump's half of the downstream-failure
/// category (the peer, or whatever sits downstream of it, is not draining
/// fast enough to keep the buffer within bounds).
#[derive(Clone, Copy, Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Kind {
    #[error("the TLS engine failed during wrap, unwrap, or delegated task execution: {reason}")]
    Engine { reason: &'static str },
    #[error("emitting to a downstream subscriber failed")]
    Downstream,
    #[error("the upstream source signaled an error")]
    Upstream,
    #[error("the engine reported a handshake status outside the known set")]
    ProtocolViolation,
}

impl Kind {
    #[inline]
    #[track_caller]
    pub fn err(self) -> Error {
        Error::new(self)
    }
}
