mod common;

use bytes::Bytes;
use citrine::connection::Session;
use citrine::core::RespValue;
use citrine::core::protocol::RespFrame;
use common::*;
use tokio::sync::mpsc;

fn subscriber(id: u64) -> (Session, mpsc::UnboundedReceiver<RespFrame>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (Session::new(id, tx), rx)
}

fn message_frame(kind: &str, channel: &str, tail: RespFrame) -> RespFrame {
    RespFrame::Array(vec![
        RespFrame::BulkString(Bytes::copy_from_slice(kind.as_bytes())),
        RespFrame::BulkString(Bytes::copy_from_slice(channel.as_bytes())),
        tail,
    ])
}

#[tokio::test]
async fn test_subscribe_confirmation() {
    let engine = test_engine();
    let (mut session, mut rx) = subscriber(1);

    assert_eq!(
        run(&engine, &mut session, "SUBSCRIBE c1 c2").await,
        RespValue::NoReply
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        message_frame("subscribe", "c1", RespFrame::Integer(1))
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        message_frame("subscribe", "c2", RespFrame::Integer(2))
    );
}

#[tokio::test]
async fn test_publish_fanout_to_two_subscribers() {
    let engine = test_engine();
    let (mut sub1, mut rx1) = subscriber(1);
    let (mut sub2, mut rx2) = subscriber(2);
    let mut publisher = Session::fake();

    run(&engine, &mut sub1, "SUBSCRIBE c").await;
    run(&engine, &mut sub2, "SUBSCRIBE c").await;
    rx1.recv().await.unwrap();
    rx2.recv().await.unwrap();

    assert_eq!(run(&engine, &mut publisher, "PUBLISH c hi").await, int(2));

    let expected = message_frame(
        "message",
        "c",
        RespFrame::BulkString(Bytes::from_static(b"hi")),
    );
    assert_eq!(rx1.recv().await.unwrap(), expected);
    assert_eq!(rx2.recv().await.unwrap(), expected);
}

#[tokio::test]
async fn test_publish_to_empty_channel() {
    let engine = test_engine();
    let mut publisher = Session::fake();
    assert_eq!(run(&engine, &mut publisher, "PUBLISH nobody hi").await, int(0));
}

#[tokio::test]
async fn test_duplicate_subscribe_is_idempotent() {
    let engine = test_engine();
    let (mut session, mut rx) = subscriber(1);
    let mut publisher = Session::fake();

    run(&engine, &mut session, "SUBSCRIBE c").await;
    run(&engine, &mut session, "SUBSCRIBE c").await;
    rx.recv().await.unwrap();

    assert_eq!(run(&engine, &mut publisher, "PUBLISH c m").await, int(1));
    // Exactly one message despite subscribing twice.
    let first = rx.recv().await.unwrap();
    assert_eq!(
        first,
        message_frame("message", "c", RespFrame::BulkString(Bytes::from_static(b"m")))
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribe_stops_delivery() {
    let engine = test_engine();
    let (mut session, mut rx) = subscriber(1);
    let mut publisher = Session::fake();

    run(&engine, &mut session, "SUBSCRIBE c").await;
    rx.recv().await.unwrap();
    assert_eq!(
        run(&engine, &mut session, "UNSUBSCRIBE c").await,
        RespValue::NoReply
    );
    assert_eq!(
        rx.recv().await.unwrap(),
        message_frame("unsubscribe", "c", RespFrame::Integer(0))
    );

    assert_eq!(run(&engine, &mut publisher, "PUBLISH c hi").await, int(0));
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_unsubscribe_with_no_args_leaves_everything() {
    let engine = test_engine();
    let (mut session, mut rx) = subscriber(1);
    let mut publisher = Session::fake();

    run(&engine, &mut session, "SUBSCRIBE c1 c2").await;
    rx.recv().await.unwrap();
    rx.recv().await.unwrap();

    run(&engine, &mut session, "UNSUBSCRIBE").await;
    // Two unsubscribe confirmations, then silence.
    rx.recv().await.unwrap();
    rx.recv().await.unwrap();

    assert_eq!(run(&engine, &mut publisher, "PUBLISH c1 hi").await, int(0));
    assert_eq!(run(&engine, &mut publisher, "PUBLISH c2 hi").await, int(0));
}

#[tokio::test]
async fn test_unsubscribe_while_not_subscribed() {
    let engine = test_engine();
    let (mut session, mut rx) = subscriber(1);
    run(&engine, &mut session, "UNSUBSCRIBE").await;
    assert_eq!(
        rx.recv().await.unwrap(),
        RespFrame::Array(vec![
            RespFrame::BulkString(Bytes::from_static(b"unsubscribe")),
            RespFrame::Null,
            RespFrame::Integer(0),
        ])
    );
}

#[tokio::test]
async fn test_disconnect_cleanup_unsubscribes() {
    let engine = test_engine();
    let (mut session, mut rx) = subscriber(1);
    let mut publisher = Session::fake();

    run(&engine, &mut session, "SUBSCRIBE c").await;
    rx.recv().await.unwrap();
    engine.hub.unsubscribe_all(&mut session).await;

    assert_eq!(run(&engine, &mut publisher, "PUBLISH c hi").await, int(0));
    assert!(session.subscribed.is_empty());
}
