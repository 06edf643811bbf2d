mod common;

use citrine::connection::Session;
use citrine::core::RespValue;
use common::*;

#[tokio::test]
async fn test_hset_hget() {
    let engine = test_engine();
    let mut session = Session::fake();
    assert_eq!(run(&engine, &mut session, "HSET h f1 v1 f2 v2").await, int(2));
    assert_eq!(run(&engine, &mut session, "HSET h f1 v1b f3 v3").await, int(1));
    assert_eq!(run(&engine, &mut session, "HGET h f1").await, bulk("v1b"));
    assert_eq!(
        run(&engine, &mut session, "HGET h missing").await,
        RespValue::Null
    );
    assert_eq!(
        run(&engine, &mut session, "HGET missing f").await,
        RespValue::Null
    );
    assert_eq!(run(&engine, &mut session, "HLEN h").await, int(3));
}

#[tokio::test]
async fn test_hset_odd_pairs_rejected() {
    let engine = test_engine();
    let mut session = Session::fake();
    let reply = run(&engine, &mut session, "HSET h f1 v1 f2").await;
    assert_error_contains(&reply, "wrong number of arguments");
}

#[tokio::test]
async fn test_hdel_and_key_removal() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "HSET h f1 v1 f2 v2").await;
    assert_eq!(run(&engine, &mut session, "HDEL h f1 nope").await, int(1));
    assert_eq!(run(&engine, &mut session, "HEXISTS h f1").await, int(0));
    assert_eq!(run(&engine, &mut session, "HEXISTS h f2").await, int(1));
    assert_eq!(run(&engine, &mut session, "HDEL h f2").await, int(1));
    assert_eq!(run(&engine, &mut session, "EXISTS h").await, int(0));
}

#[tokio::test]
async fn test_hgetall_flat_pairs() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "HSET h f1 v1 f2 v2").await;
    let RespValue::Array(flat) = run(&engine, &mut session, "HGETALL h").await else {
        panic!("expected array");
    };
    assert_eq!(flat.len(), 4);
    // Pair order is unspecified; check membership pairwise.
    let pairs: Vec<(RespValue, RespValue)> = flat
        .chunks_exact(2)
        .map(|c| (c[0].clone(), c[1].clone()))
        .collect();
    assert!(pairs.contains(&(bulk("f1"), bulk("v1"))));
    assert!(pairs.contains(&(bulk("f2"), bulk("v2"))));

    assert_eq!(
        run(&engine, &mut session, "HGETALL missing").await,
        RespValue::Array(vec![])
    );
}

#[tokio::test]
async fn test_hash_wrong_type() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "SET s v").await;
    let reply = run(&engine, &mut session, "HSET s f v").await;
    assert_error_contains(&reply, "WRONGTYPE");
}
