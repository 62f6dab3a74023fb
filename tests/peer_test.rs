use std::collections::VecDeque;
use std::io::{self, ErrorKind};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use framelink::diagnostics::{Direction, FrameTap};
use framelink::network::StreamConnection;
use framelink::{
    AppError, AppResult, AsciiFrameCodec, Connection, EndpointDescriptor, FrameCodec, Peer,
    PeerState,
};
use parking_lot::Mutex;
use tokio::io::{duplex, split, AsyncReadExt, AsyncWriteExt, DuplexStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn endpoint() -> EndpointDescriptor {
    "127.0.0.1:7000".parse::<SocketAddr>().unwrap().into()
}

fn wire(payloads: &[&[u8]]) -> Vec<u8> {
    let mut out = Vec::new();
    for payload in payloads {
        out.extend_from_slice(&AsciiFrameCodec.encode(payload).unwrap());
    }
    out
}

/// A peer over one end of an in-memory pipe; the other end is returned raw.
fn duplex_peer() -> (Arc<Peer>, DuplexStream) {
    let (ours, theirs) = duplex(4096);
    let (reader, writer) = split(ours);
    let connection = Arc::new(StreamConnection::new(reader, writer, endpoint()));
    (
        Arc::new(Peer::new(connection, Arc::new(AsciiFrameCodec))),
        theirs,
    )
}

/// Replays a fixed sequence of read results, then reports end of stream.
struct ScriptedConnection {
    remote: EndpointDescriptor,
    script: Mutex<VecDeque<AppResult<Vec<u8>>>>,
    closed: AtomicBool,
}

impl ScriptedConnection {
    fn new(script: Vec<AppResult<Vec<u8>>>) -> ScriptedConnection {
        ScriptedConnection {
            remote: endpoint(),
            script: Mutex::new(script.into()),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn remote_identity(&self) -> &EndpointDescriptor {
        &self.remote
    }

    async fn send(&self, _data: &[u8]) -> AppResult<()> {
        Ok(())
    }

    async fn receive(&self, buf: &mut [u8]) -> AppResult<usize> {
        match self.script.lock().pop_front() {
            Some(Ok(chunk)) => {
                buf[..chunk.len()].copy_from_slice(&chunk);
                Ok(chunk.len())
            }
            Some(Err(e)) => Err(e),
            None => Ok(0),
        }
    }

    async fn close(&self) -> AppResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[derive(Default)]
struct RecordingTap {
    seen: Mutex<Vec<(Direction, String, u64, Vec<u8>)>>,
}

#[async_trait]
impl FrameTap for RecordingTap {
    async fn observe(&self, direction: Direction, remote: &str, frame_index: u64, frame: &[u8]) {
        self.seen
            .lock()
            .push((direction, remote.to_string(), frame_index, frame.to_vec()));
    }
}

async fn collect_frames(peer: &Peer, cancel: CancellationToken) -> (AppResult<()>, Vec<Vec<u8>>) {
    let frames = Arc::new(Mutex::new(Vec::new()));
    let sink = frames.clone();
    let result = peer
        .receive_loop(
            move |frame| {
                sink.lock().push(frame.to_vec());
                async {}
            },
            cancel,
        )
        .await;
    let frames = frames.lock().clone();
    (result, frames)
}

#[tokio::test]
async fn test_frames_dispatched_in_order() {
    let (peer, mut remote) = duplex_peer();

    let stream = wire(&[b"one", b"two", b"three"]);
    let writer = tokio::spawn(async move {
        // split mid-frame to exercise partial accumulation
        remote.write_all(&stream[..5]).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        remote.write_all(&stream[5..]).await.unwrap();
        remote.shutdown().await.unwrap();
        remote
    });

    let (result, frames) = collect_frames(&peer, CancellationToken::new()).await;
    let _remote = writer.await.unwrap();

    assert!(result.is_ok());
    assert_eq!(
        frames,
        vec![b"one".to_vec(), b"two".to_vec(), b"three".to_vec()]
    );
    assert_eq!(peer.state(), PeerState::Closed);
    assert!(peer.connection().is_closed());
}

#[tokio::test]
async fn test_handler_awaited_before_next_frame() {
    let (peer, mut remote) = duplex_peer();
    remote.write_all(&wire(&[b"a", b"b", b"c"])).await.unwrap();
    remote.shutdown().await.unwrap();

    let (tx, mut rx) = mpsc::unbounded_channel();
    let in_flight = Arc::new(AtomicBool::new(false));
    let result = peer
        .receive_loop(
            |frame| {
                let tx = tx.clone();
                let in_flight = in_flight.clone();
                async move {
                    assert!(!in_flight.swap(true, Ordering::SeqCst));
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    tx.send(frame.to_vec()).unwrap();
                    in_flight.store(false, Ordering::SeqCst);
                }
            },
            CancellationToken::new(),
        )
        .await;
    assert!(result.is_ok());

    let mut order = Vec::new();
    while let Ok(frame) = rx.try_recv() {
        order.push(frame);
    }
    assert_eq!(order, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
}

#[tokio::test]
async fn test_reset_after_frame_is_graceful() {
    let connection = Arc::new(ScriptedConnection::new(vec![
        Ok(wire(&[b"PING"])),
        Err(io::Error::new(ErrorKind::ConnectionReset, "reset by peer").into()),
    ]));
    let peer = Peer::new(connection.clone(), Arc::new(AsciiFrameCodec));

    let (result, frames) = collect_frames(&peer, CancellationToken::new()).await;

    assert!(result.is_ok());
    assert_eq!(frames, vec![b"PING".to_vec()]);
    assert!(connection.is_closed());
    assert_eq!(peer.state(), PeerState::Closed);
}

#[tokio::test]
async fn test_reset_mid_frame_drops_partial() {
    let connection = Arc::new(ScriptedConnection::new(vec![
        Ok(wire(&[b"PING"])[..6].to_vec()),
        Err(io::Error::new(ErrorKind::ConnectionReset, "reset by peer").into()),
    ]));
    let peer = Peer::new(connection.clone(), Arc::new(AsciiFrameCodec));

    let (result, frames) = collect_frames(&peer, CancellationToken::new()).await;

    assert!(result.is_ok());
    assert!(frames.is_empty());
    assert!(connection.is_closed());
    assert_eq!(peer.state(), PeerState::Closed);
}

#[tokio::test]
async fn test_transport_fault_propagates() {
    let connection = Arc::new(ScriptedConnection::new(vec![
        Ok(wire(&[b"first"])),
        Err(io::Error::new(ErrorKind::Other, "device unplugged").into()),
        Ok(wire(&[b"never"])),
    ]));
    let peer = Peer::new(connection.clone(), Arc::new(AsciiFrameCodec));

    let (result, frames) = collect_frames(&peer, CancellationToken::new()).await;

    assert!(matches!(result, Err(AppError::IoError(ref e)) if e.kind() == ErrorKind::Other));
    assert_eq!(frames, vec![b"first".to_vec()]);
    assert!(connection.is_closed());
    assert_eq!(peer.state(), PeerState::Faulted);
}

#[tokio::test]
async fn test_garbage_then_frame_in_one_read() {
    let mut chunk = b"noise\n00003".to_vec();
    chunk.extend_from_slice(&wire(&[b"PING"]));
    let connection = Arc::new(ScriptedConnection::new(vec![Ok(chunk)]));
    let peer = Peer::new(connection, Arc::new(AsciiFrameCodec));

    let (result, frames) = collect_frames(&peer, CancellationToken::new()).await;

    assert!(result.is_ok());
    assert_eq!(frames, vec![b"PING".to_vec()]);
}

#[tokio::test]
async fn test_cancel_stops_idle_loop() {
    let (peer, _remote) = duplex_peer();
    let cancel = CancellationToken::new();

    let task = {
        let peer = peer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { collect_frames(&peer, cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(peer.state(), PeerState::Receiving);

    cancel.cancel();
    let (result, frames) = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_ok());
    assert!(frames.is_empty());
    assert!(peer.connection().is_closed());
    assert_eq!(peer.state(), PeerState::Closed);
}

#[tokio::test]
async fn test_cancel_discards_buffered_partial() {
    let (peer, mut remote) = duplex_peer();
    remote.write_all(&wire(&[b"PING"])[..6]).await.unwrap();
    let cancel = CancellationToken::new();

    let task = {
        let peer = peer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { collect_frames(&peer, cancel).await })
    };
    // let the loop pull the half frame into its buffer
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(peer.state(), PeerState::Receiving);

    cancel.cancel();
    let (result, frames) = tokio::time::timeout(Duration::from_secs(5), task)
        .await
        .unwrap()
        .unwrap();

    assert!(result.is_ok());
    assert!(frames.is_empty());
    assert!(peer.connection().is_closed());
    assert_eq!(peer.state(), PeerState::Closed);
}

#[tokio::test]
async fn test_already_cancelled_token() {
    let (peer, _remote) = duplex_peer();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let (result, frames) = collect_frames(&peer, cancel).await;
    assert!(result.is_ok());
    assert!(frames.is_empty());
    assert!(peer.connection().is_closed());
}

#[tokio::test]
async fn test_second_loop_rejected() {
    let (peer, _remote) = duplex_peer();
    let cancel = CancellationToken::new();

    let task = {
        let peer = peer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { collect_frames(&peer, cancel).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    let (second, _) = collect_frames(&peer, CancellationToken::new()).await;
    assert!(matches!(second, Err(AppError::IllegalStateError(_))));

    cancel.cancel();
    let (first, _) = task.await.unwrap();
    assert!(first.is_ok());

    let (after_close, _) = collect_frames(&peer, CancellationToken::new()).await;
    assert!(matches!(after_close, Err(AppError::UseAfterClose(_))));
}

#[tokio::test]
async fn test_send_while_receiving() {
    let (peer, mut remote) = duplex_peer();
    let cancel = CancellationToken::new();

    let task = {
        let peer = peer.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { collect_frames(&peer, cancel).await })
    };

    peer.send(b"PING").await.unwrap();
    let mut received = [0u8; 11];
    remote.read_exact(&mut received).await.unwrap();
    assert_eq!(&received[..], b"\n00009PING\r");

    cancel.cancel();
    let (result, _) = task.await.unwrap();
    assert!(result.is_ok());
    assert!(matches!(
        peer.send(b"late").await,
        Err(AppError::UseAfterClose(_))
    ));
}

#[tokio::test]
async fn test_tap_sees_frames_with_indices() {
    let (ours, mut remote) = duplex(4096);
    let (reader, writer) = split(ours);
    let connection = Arc::new(StreamConnection::new(reader, writer, endpoint()));
    let tap = Arc::new(RecordingTap::default());
    let peer = Peer::new(connection, Arc::new(AsciiFrameCodec)).with_tap(tap.clone());

    peer.send(b"out").await.unwrap();
    let mut sent = vec![0u8; 10];
    remote.read_exact(&mut sent).await.unwrap();

    remote.write_all(&wire(&[b"in-1", b"in-2"])).await.unwrap();
    remote.shutdown().await.unwrap();
    let (result, frames) = collect_frames(&peer, CancellationToken::new()).await;
    assert!(result.is_ok());
    assert_eq!(frames.len(), 2);

    let seen = tap.seen.lock().clone();
    assert_eq!(
        seen,
        vec![
            (Direction::Tx, "127.0.0.1:7000".to_string(), 1, b"out".to_vec()),
            (Direction::Rx, "127.0.0.1:7000".to_string(), 1, b"in-1".to_vec()),
            (Direction::Rx, "127.0.0.1:7000".to_string(), 2, b"in-2".to_vec()),
        ]
    );
}
