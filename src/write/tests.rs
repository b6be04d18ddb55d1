// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::*;
use crate::{
    engine::testing::{ScriptedEngine, Step},
    executor::TokioExecutor,
    handshake::HandshakeCoordinator,
    lifecycle::Lifecycle,
    testing::{CountingUpstream, RecordingSink},
};
use std::sync::Mutex as StdMutex;

fn frame(key: u8, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(2 + payload.len());
    out.extend_from_slice(&(payload.len() as u16).to_be_bytes());
    out.extend(payload.iter().map(|b| b ^ key));
    out
}

struct Harness {
    pipeline: WritePipeline,
    sink: RecordingSink,
    upstream: CountingUpstream,
}

fn harness(engine: ScriptedEngine) -> Harness {
    let executor = std::sync::Arc::new(TokioExecutor::current());
    let engine: SharedEngine = std::sync::Arc::new(StdMutex::new(engine));
    let (lifecycle, _read_fut, _write_fut, _alpn_fut) = Lifecycle::new();
    let lifecycle = std::sync::Arc::new(lifecycle);
    let write_queue = WriteQueue::new();
    let lc = lifecycle.clone();
    let coordinator = HandshakeCoordinator::new(engine.clone(), write_queue.clone(), executor.clone(), move |e| {
        lc.handle_error(e)
    });
    let sink = RecordingSink::new();
    let upstream = CountingUpstream::new();
    let pipeline = WritePipeline::new(
        engine,
        write_queue,
        Box::new(sink.clone()),
        std::sync::Arc::new(upstream.clone()),
        coordinator,
        lifecycle,
        PumpConfig::default(),
        executor,
    );
    Harness {
        pipeline,
        sink,
        upstream,
    }
}

async fn settle() {
    tokio::task::yield_now().await;
    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
}

#[tokio::test]
async fn hello_world_frames_and_completes() {
    let h = harness(ScriptedEngine::handshake_free(0xAA));
    settle().await; // drain the on_subscribe handshake-trigger no-op

    h.pipeline.incoming(vec![Bytes::from_static(b"hello")], false);
    settle().await;
    assert_eq!(h.sink.concat(), frame(0xAA, b"hello"));

    h.pipeline.incoming(vec![], true);
    settle().await;
    assert!(h.sink.is_complete());
}

#[tokio::test]
async fn overflow_grows_and_retries() {
    let mut engine = ScriptedEngine::handshake_free(0x3);
    engine.force_overflow_once();
    let h = harness(engine);
    // no settle here: queue the data before the spawned on_subscribe run
    // is first polled, so the forced overflow lands on this data-bearing
    // wrap rather than being absorbed by the empty handshake-trigger one.
    h.pipeline.incoming(vec![Bytes::from_static(b"world")], false);
    settle().await;

    assert_eq!(h.sink.concat(), frame(0x3, b"world"));
}

#[tokio::test]
async fn need_wrap_handshake_step_is_consumed_without_returning_true() {
    let engine = ScriptedEngine::new(0x9, None, vec![Step::NeedWrap, Step::NeedUnwrap]);
    let h = harness(engine);
    settle().await;

    // the initial on_subscribe trigger drives the NEED_WRAP step; the
    // pipeline should have produced a zero-length marker record and then
    // stopped (handshake now needs the peer's unwrap).
    assert_eq!(h.sink.concat().len(), 2); // just the 2-byte length prefix
}

#[tokio::test]
async fn peer_close_notify_produces_ack_and_completes_once() {
    let mut engine = ScriptedEngine::handshake_free(0x1);
    engine.send_close_notify();
    let h = harness(engine);
    settle().await;

    // the close_notify record itself (2-byte empty length frame) should
    // have been produced by the on_subscribe trigger's wrap call, and the
    // write half completed without any further application data.
    assert!(h.sink.is_complete());
    assert_eq!(h.sink.concat(), vec![0u8, 0u8]);

    // a redundant completion signal afterward must not panic or re-fire.
    h.pipeline.incoming(vec![], true);
    settle().await;
    assert!(h.sink.is_complete());
}
