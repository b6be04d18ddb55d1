// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A deterministic stub [`EngineAdapter`] used by the pump's own tests and
//! available to downstream crates under the `testing` feature, in the
//! spirit of `s2n_quic_core::crypto::tls::testing`.
//!
//! The stub frames each `wrap`'d payload behind a 2-byte big-endian length
//! prefix and XORs the payload bytes with a fixed key -- enough of a
//! "transform" to exercise round-trip, ordering, and buffer-sizing behavior
//! without any real cryptography (see spec.md §8, property 1).

use super::{DelegatedTask, EngineAdapter, EngineResult, HandshakeStatus, Status};
use crate::error::Kind;
use std::collections::VecDeque;

/// A single step of a scripted handshake, consumed in order by alternating
/// `wrap`/`unwrap` calls until the script is empty, at which point the
/// engine reports `Finished` and application records start flowing.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Step {
    NeedWrap,
    NeedUnwrap,
    NeedTask,
}

pub struct ScriptedEngine {
    xor_key: u8,
    alpn: Option<String>,
    script: VecDeque<Step>,
    finished: bool,
    inbound_done: bool,
    outbound_done: bool,
    send_close: bool,
    /// forces the *next* wrap/unwrap call to report BUFFER_OVERFLOW once,
    /// used to exercise the grow-and-retry path
    force_overflow_once: bool,
}

impl ScriptedEngine {
    pub fn new(xor_key: u8, alpn: Option<&str>, script: Vec<Step>) -> Self {
        Self {
            xor_key,
            alpn: alpn.map(str::to_owned),
            script: script.into(),
            finished: false,
            inbound_done: false,
            outbound_done: false,
            send_close: false,
            force_overflow_once: false,
        }
    }

    /// A stub with no handshake steps: `wrap`/`unwrap` go straight to
    /// application-record framing.
    pub fn handshake_free(xor_key: u8) -> Self {
        let mut e = Self::new(xor_key, Some(""), vec![]);
        e.finished = true;
        e
    }

    pub fn force_overflow_once(&mut self) {
        self.force_overflow_once = true;
    }

    /// Queues a peer close_notify: the next `unwrap` on empty input reports
    /// `Closed`/`NeedWrap`, and the following `wrap` call produces the
    /// acknowledging (empty-payload) close record.
    pub fn send_close_notify(&mut self) {
        self.send_close = true;
    }

    fn current_handshake_status(&self) -> HandshakeStatus {
        match self.script.front() {
            Some(Step::NeedWrap) => HandshakeStatus::NeedWrap,
            Some(Step::NeedUnwrap) => HandshakeStatus::NeedUnwrap,
            Some(Step::NeedTask) => HandshakeStatus::NeedTask,
            None if self.finished => HandshakeStatus::Finished,
            None => HandshakeStatus::NotHandshaking,
        }
    }

    fn advance_if(&mut self, step: Step) -> bool {
        if self.script.front() == Some(&step) {
            self.script.pop_front();
            if self.script.is_empty() {
                self.finished = true;
            }
            true
        } else {
            false
        }
    }

    fn frame(&self, payload: &[u8], dst: &mut [u8]) -> Result<usize, Kind> {
        let total = payload.len() + 2;
        if dst.len() < total {
            return Err(Kind::Engine {
                reason: "overflow",
            });
        }
        let len = payload.len() as u16;
        dst[0..2].copy_from_slice(&len.to_be_bytes());
        for (i, b) in payload.iter().enumerate() {
            dst[2 + i] = b ^ self.xor_key;
        }
        Ok(total)
    }
}

impl EngineAdapter for ScriptedEngine {
    fn wrap(&mut self, src: &[&[u8]], dst: &mut [u8]) -> Result<EngineResult, crate::Error> {
        if self.force_overflow_once {
            self.force_overflow_once = false;
            return Ok(EngineResult {
                status: Status::BufferOverflow,
                handshake_status: self.current_handshake_status(),
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }

        if self.send_close && self.script.is_empty() && self.finished {
            self.send_close = false;
            self.outbound_done = true;
            let produced = self
                .frame(&[], dst)
                .map_err(|k| k.err())?;
            return Ok(EngineResult {
                status: Status::Closed,
                handshake_status: HandshakeStatus::NotHandshaking,
                bytes_consumed: 0,
                bytes_produced: produced,
            });
        }

        if self.advance_if(Step::NeedWrap) {
            // advances the handshake; produces a zero-length marker record
            let produced = self.frame(&[], dst).map_err(|k| k.err())?;
            return Ok(EngineResult {
                status: Status::Ok,
                handshake_status: self.current_handshake_status(),
                bytes_consumed: 0,
                bytes_produced: produced,
            });
        }

        if matches!(
            self.script.front(),
            Some(Step::NeedUnwrap) | Some(Step::NeedTask)
        ) {
            return Ok(EngineResult {
                status: Status::Ok,
                handshake_status: self.current_handshake_status(),
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }

        // application data: flatten and frame
        let payload: Vec<u8> = src.iter().flat_map(|c| c.iter().copied()).collect();
        if payload.is_empty() {
            return Ok(EngineResult {
                status: Status::Ok,
                handshake_status: HandshakeStatus::NotHandshaking,
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }
        match self.frame(&payload, dst) {
            Ok(produced) => Ok(EngineResult {
                status: Status::Ok,
                handshake_status: HandshakeStatus::NotHandshaking,
                bytes_consumed: payload.len(),
                bytes_produced: produced,
            }),
            Err(_) => Ok(EngineResult {
                status: Status::BufferOverflow,
                handshake_status: HandshakeStatus::NotHandshaking,
                bytes_consumed: 0,
                bytes_produced: 0,
            }),
        }
    }

    fn unwrap(&mut self, src: &[u8], dst: &mut [u8]) -> Result<EngineResult, crate::Error> {
        if self.force_overflow_once {
            self.force_overflow_once = false;
            return Ok(EngineResult {
                status: Status::BufferOverflow,
                handshake_status: self.current_handshake_status(),
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }

        if self.advance_if(Step::NeedUnwrap) {
            return Ok(EngineResult {
                status: Status::Ok,
                handshake_status: self.current_handshake_status(),
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }

        if matches!(
            self.script.front(),
            Some(Step::NeedWrap) | Some(Step::NeedTask)
        ) {
            return Ok(EngineResult {
                status: Status::Ok,
                handshake_status: self.current_handshake_status(),
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }

        if src.len() < 2 {
            return Ok(EngineResult {
                status: Status::BufferUnderflow,
                handshake_status: HandshakeStatus::NotHandshaking,
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }
        let len = u16::from_be_bytes([src[0], src[1]]) as usize;
        if src.len() < 2 + len {
            return Ok(EngineResult {
                status: Status::BufferUnderflow,
                handshake_status: HandshakeStatus::NotHandshaking,
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }

        if len == 0 {
            // a zero-length application record signals peer close_notify
            self.inbound_done = true;
            return Ok(EngineResult {
                status: Status::Closed,
                handshake_status: HandshakeStatus::NeedWrap,
                bytes_consumed: 2,
                bytes_produced: 0,
            });
        }

        if dst.len() < len {
            return Ok(EngineResult {
                status: Status::BufferOverflow,
                handshake_status: HandshakeStatus::NotHandshaking,
                bytes_consumed: 0,
                bytes_produced: 0,
            });
        }

        for i in 0..len {
            dst[i] = src[2 + i] ^ self.xor_key;
        }

        Ok(EngineResult {
            status: Status::Ok,
            handshake_status: HandshakeStatus::NotHandshaking,
            bytes_consumed: 2 + len,
            bytes_produced: len,
        })
    }

    fn delegated_tasks(&mut self) -> Vec<DelegatedTask> {
        if self.advance_if(Step::NeedTask) {
            vec![Box::new(|| Ok(()))]
        } else {
            vec![]
        }
    }

    fn handshake_status(&self) -> HandshakeStatus {
        self.current_handshake_status()
    }

    fn packet_buffer_size(&self) -> usize {
        4096
    }

    fn application_buffer_size(&self) -> usize {
        4096
    }

    fn is_inbound_done(&self) -> bool {
        self.inbound_done
    }

    fn is_outbound_done(&self) -> bool {
        self.outbound_done
    }

    fn application_protocol(&self) -> Option<String> {
        if self.finished {
            self.alpn.clone()
        } else {
            None
        }
    }
}
