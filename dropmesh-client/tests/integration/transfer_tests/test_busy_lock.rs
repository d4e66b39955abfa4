use dropmesh_client::{OutgoingFile, SendStatus};
use dropmesh_core::{ControlFrame, Frame};
use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncReadExt, ReadBuf};

use crate::integration::{create_test_mesh, init_tracing};
use crate::utils::{
    MockRoomControl, connect_pair, eventually, payload, room_with, small_chunks, spawn_peer,
};

/// Source whose disk goes away.
struct BrokenReader;

impl AsyncRead for BrokenReader {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("device removed")))
    }
}

#[tokio::test]
async fn test_busy_is_set_then_cleared_around_a_send() {
    init_tracing();

    let (network, relay) = create_test_mesh();
    let mut a = spawn_peer(&network, &relay);
    let mut b = spawn_peer(&network, &relay);
    connect_pair(&mut a, &mut b).await;

    let room = MockRoomControl::new();
    let engine = a.engine(&room, small_chunks(1024));
    let state = room_with(&a.id, &[&b.id]);

    let file = OutgoingFile::new("notes.txt", 4096, Cursor::new(payload(4096)));
    let report = engine
        .send_file(&state, &[b.id.clone()], file, |_| {})
        .await
        .unwrap();

    assert_eq!(report.status, SendStatus::Completed);
    assert_eq!(room.busy_calls().await, vec![true, false]);
    assert!(!engine.is_sending());
}

#[tokio::test]
async fn test_read_failure_still_clears_busy_and_sends_eof() {
    init_tracing();

    let (network, relay) = create_test_mesh();
    let mut a = spawn_peer(&network, &relay);
    let mut b = spawn_peer(&network, &relay);
    connect_pair(&mut a, &mut b).await;

    let room = MockRoomControl::new();
    let engine = a.engine(&room, small_chunks(1024));
    let state = room_with(&a.id, &[&b.id]);

    let reader = Cursor::new(payload(100)).chain(BrokenReader);
    let file = OutgoingFile::new("video.mp4", 10_000, reader);
    let report = engine
        .send_file(&state, &[b.id.clone()], file, |_| {})
        .await
        .unwrap();

    assert!(matches!(report.status, SendStatus::Failed(_)));
    assert!(report.sent < 10_000);
    assert_eq!(room.busy_calls().await, vec![true, false]);

    let frames = b.frames_until_eof(&a.id).await;
    assert!(matches!(
        frames.first(),
        Some(Frame::Control(ControlFrame::Meta { .. }))
    ));
    assert_eq!(frames.last(), Some(&Frame::Control(ControlFrame::Eof)));
}

#[tokio::test]
async fn test_all_targets_closing_aborts_and_clears_busy() {
    init_tracing();

    let (network, relay) = create_test_mesh();
    let mut a = spawn_peer(&network, &relay);
    let mut b = spawn_peer(&network, &relay);
    connect_pair(&mut a, &mut b).await;

    // Stall the transfer on backpressure so the close lands mid-send.
    network.set_buffered_amount(usize::MAX);

    let room = MockRoomControl::new();
    let engine = a.engine(&room, small_chunks(1024));
    let state = room_with(&a.id, &[&b.id]);
    let targets = vec![b.id.clone()];

    let task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            let file = OutgoingFile::new("big.iso", 8192, Cursor::new(payload(8192)));
            engine.send_file(&state, &targets, file, |_| {}).await
        })
    };

    let busy_room = &room;
    assert!(eventually(|| async move { busy_room.busy_calls().await == vec![true] }).await);
    assert!(engine.is_sending());

    b.manager.close(a.id.clone());
    a.wait_disconnected(&b.id).await;

    let report = task.await.unwrap().unwrap();
    assert_eq!(report.status, SendStatus::Aborted);
    assert!(report.delivered.is_empty());
    assert_eq!(room.busy_calls().await, vec![true, false]);
    assert!(!engine.is_sending());
    assert_eq!(network.frames_sent(), 0);
}
