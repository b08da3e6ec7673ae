//! Tests for the event bus reader over an in-memory duplex stream.

use std::time::Duration;

use bytes::{Bytes, BytesMut};
use serde_json::json;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;

use restart_cascade::supervisor::amp::{AmpArg, AmpCodec};
use restart_cascade::supervisor::pm2::run_bus_reader;

fn frame(args: Vec<AmpArg>) -> BytesMut {
    let mut buf = BytesMut::new();
    AmpCodec::new().encode(args, &mut buf).unwrap();
    buf
}

fn launching_api() -> BytesMut {
    frame(vec![
        AmpArg::Str("process:event".into()),
        AmpArg::Json(json!({
            "event": "online",
            "manually": false,
            "process": { "name": "api", "pm_id": 0, "status": "launching" }
        })),
    ])
}

#[tokio::test]
async fn skips_undecodable_payload_and_keeps_reading() {
    let (mut daemon, client) = tokio::io::duplex(4096);
    let (tx, mut rx) = mpsc::channel(8);
    let reader = tokio::spawn(run_bus_reader(client, tx, CancellationToken::new()));

    daemon
        .write_all(&frame(vec![
            AmpArg::Str("process:msg".into()),
            AmpArg::Blob(Bytes::from_static(br#"j:{"data":"\ud800"}"#)),
        ]))
        .await
        .unwrap();
    daemon.write_all(&launching_api()).await.unwrap();

    let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("event arrives")
        .expect("reader still running");
    assert_eq!(event.process.name, "api");
    assert!(!reader.is_finished());
}

#[tokio::test]
async fn stops_when_framing_is_lost() {
    let (mut daemon, client) = tokio::io::duplex(4096);
    let (tx, mut rx) = mpsc::channel(8);
    let reader = tokio::spawn(run_bus_reader(client, tx, CancellationToken::new()));

    // Version nibble 2 cannot be resynchronised.
    daemon.write_all(&[0x21, 0, 0, 0, 0]).await.unwrap();
    daemon.write_all(&launching_api()).await.unwrap();

    let next = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("channel closes");
    assert!(next.is_none());
    tokio::time::timeout(Duration::from_secs(2), reader)
        .await
        .expect("reader exits")
        .unwrap();
}
