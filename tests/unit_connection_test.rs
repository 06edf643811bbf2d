mod common;

use citrine::connection::ConnectionHandler;
use common::*;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;

/// Binds a loopback listener wired to the engine and returns its address.
async fn spawn_server() -> (std::net::SocketAddr, broadcast::Sender<()>) {
    let engine = test_engine();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (shutdown_tx, _) = broadcast::channel(1);

    let accept_shutdown = shutdown_tx.clone();
    tokio::spawn(async move {
        let mut next_id = 1u64;
        while let Ok((socket, peer)) = listener.accept().await {
            let (handler, outbox_rx) = ConnectionHandler::new(engine.clone(), next_id, peer);
            next_id += 1;
            let shutdown_rx = accept_shutdown.subscribe();
            tokio::spawn(handler.run(socket, outbox_rx, shutdown_rx));
        }
    });

    (addr, shutdown_tx)
}

async fn read_reply(stream: &mut TcpStream, expected_len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; expected_len];
    tokio::time::timeout(Duration::from_secs(5), stream.read_exact(&mut buf))
        .await
        .expect("timed out reading reply")
        .unwrap();
    buf
}

#[tokio::test]
async fn test_set_get_over_the_wire() {
    let (addr, _shutdown) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$3\r\nfoo\r\n$3\r\nbar\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream, 5).await, b"+OK\r\n");

    stream
        .write_all(b"*2\r\n$3\r\nGET\r\n$3\r\nfoo\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream, 9).await, b"$3\r\nbar\r\n");
}

#[tokio::test]
async fn test_inline_command_over_the_wire() {
    let (addr, _shutdown) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"PING\r\n").await.unwrap();
    assert_eq!(read_reply(&mut stream, 7).await, b"+PONG\r\n");
}

#[tokio::test]
async fn test_pipelined_commands_answered_in_order() {
    let (addr, _shutdown) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream
        .write_all(b"*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n*2\r\n$4\r\nINCR\r\n$1\r\na\r\n*2\r\n$3\r\nGET\r\n$1\r\na\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut stream, 5).await, b"+OK\r\n");
    assert_eq!(read_reply(&mut stream, 4).await, b":2\r\n");
    assert_eq!(read_reply(&mut stream, 7).await, b"$1\r\n2\r\n");
}

#[tokio::test]
async fn test_protocol_error_keeps_connection_alive() {
    let (addr, _shutdown) = spawn_server().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    stream.write_all(b"$oops\r\n").await.unwrap();
    let mut prefix = [0u8; 1];
    stream.read_exact(&mut prefix).await.unwrap();
    assert_eq!(&prefix, b"-", "expected an error reply");
    // Drain the rest of the error line.
    let mut one = [0u8; 1];
    loop {
        stream.read_exact(&mut one).await.unwrap();
        if one[0] == b'\n' {
            break;
        }
    }

    // The stream must still be usable afterwards.
    stream.write_all(b"PING\r\n").await.unwrap();
    assert_eq!(read_reply(&mut stream, 7).await, b"+PONG\r\n");
}

#[tokio::test]
async fn test_pubsub_over_the_wire() {
    let (addr, _shutdown) = spawn_server().await;
    let mut subscriber = TcpStream::connect(addr).await.unwrap();
    let mut publisher = TcpStream::connect(addr).await.unwrap();

    subscriber
        .write_all(b"*2\r\n$9\r\nSUBSCRIBE\r\n$1\r\nc\r\n")
        .await
        .unwrap();
    let confirm = b"*3\r\n$9\r\nsubscribe\r\n$1\r\nc\r\n:1\r\n";
    assert_eq!(read_reply(&mut subscriber, confirm.len()).await, confirm);

    publisher
        .write_all(b"*3\r\n$7\r\nPUBLISH\r\n$1\r\nc\r\n$2\r\nhi\r\n")
        .await
        .unwrap();
    assert_eq!(read_reply(&mut publisher, 4).await, b":1\r\n");

    let message = b"*3\r\n$7\r\nmessage\r\n$1\r\nc\r\n$2\r\nhi\r\n";
    assert_eq!(read_reply(&mut subscriber, message.len()).await, message);
}
