use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use framelink::network::{TcpConnection, TcpListener};
use framelink::service::AckHandler;
use framelink::{
    AppError, AsciiFrameCodec, Connection, ConnectionManager, Listener, Peer, Server,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

fn any_local_port() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[tokio::test]
async fn test_listener_lifecycle() {
    let mut listener = TcpListener::new(any_local_port());
    assert!(matches!(
        listener.accept().await,
        Err(AppError::IllegalStateError(_))
    ));

    listener.start().await.unwrap();
    assert!(matches!(
        listener.start().await,
        Err(AppError::IllegalStateError(_))
    ));
    let addr = listener.local_addr().unwrap();
    assert_ne!(addr.port(), 0);

    let client = tokio::spawn(async move { TcpConnection::connect(addr).await });
    let accepted = listener.accept().await.unwrap();
    let client = client.await.unwrap().unwrap();

    client.send(b"\n00009PING\r").await.unwrap();
    let mut buf = [0u8; 32];
    let read = accepted.receive(&mut buf).await.unwrap();
    assert_eq!(&buf[..read], b"\n00009PING\r");

    listener.close().await;
    listener.close().await;
    assert!(matches!(
        listener.accept().await,
        Err(AppError::UseAfterClose(_))
    ));

    // orderly close surfaces as end of stream on the other side
    client.close().await.unwrap();
    assert_eq!(accepted.receive(&mut buf).await.unwrap(), 0);
    assert!(matches!(
        client.send(b"x").await,
        Err(AppError::UseAfterClose(_))
    ));
}

#[tokio::test]
async fn test_server_acks_frames() {
    let mut listener = TcpListener::new(any_local_port());
    listener.start().await.unwrap();
    let addr = listener.local_addr().unwrap();

    let manager = Arc::new(ConnectionManager::new());
    let mut server = Server::new(
        Box::new(listener),
        Arc::new(AsciiFrameCodec),
        manager.clone(),
        8,
    );
    let cancel = CancellationToken::new();
    let server_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move { server.run(Arc::new(AckHandler), cancel).await })
    };

    let connection = TcpConnection::connect_timeout(addr, Duration::from_secs(5))
        .await
        .unwrap();
    let peer = Arc::new(Peer::new(Arc::new(connection), Arc::new(AsciiFrameCodec)));
    let client_cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let client_task = {
        let peer = peer.clone();
        let client_cancel = client_cancel.clone();
        tokio::spawn(async move {
            peer.receive_loop(
                move |frame| {
                    let tx = tx.clone();
                    async move {
                        let _ = tx.send(frame.to_vec());
                    }
                },
                client_cancel,
            )
            .await
        })
    };

    peer.send(b"PING").await.unwrap();
    peer.send(b"hello").await.unwrap();

    let first = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    let second = tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(first, b"ACK: PING".to_vec());
    assert_eq!(second, b"ACK: hello".to_vec());
    assert_eq!(manager.len(), 1);

    // shutting the server down closes the accepted side, which ends the client loop
    cancel.cancel();
    let server_result = tokio::time::timeout(Duration::from_secs(5), server_task)
        .await
        .unwrap()
        .unwrap();
    assert!(server_result.is_ok());
    assert!(manager.is_empty());

    let client_result = tokio::time::timeout(Duration::from_secs(5), client_task)
        .await
        .unwrap()
        .unwrap();
    assert!(client_result.is_ok());
    client_cancel.cancel();
}
