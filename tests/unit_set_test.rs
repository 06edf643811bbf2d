mod common;

use citrine::connection::Session;
use citrine::core::RespValue;
use common::*;

#[tokio::test]
async fn test_sadd_and_membership() {
    let engine = test_engine();
    let mut session = Session::fake();
    assert_eq!(run(&engine, &mut session, "SADD s a b c").await, int(3));
    assert_eq!(run(&engine, &mut session, "SADD s b d").await, int(1));
    assert_eq!(run(&engine, &mut session, "SCARD s").await, int(4));
    assert_eq!(run(&engine, &mut session, "SISMEMBER s a").await, int(1));
    assert_eq!(run(&engine, &mut session, "SISMEMBER s nope").await, int(0));
    assert_eq!(run(&engine, &mut session, "SISMEMBER missing a").await, int(0));
}

#[tokio::test]
async fn test_smembers() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "SADD s a b").await;
    let RespValue::Array(mut members) = run(&engine, &mut session, "SMEMBERS s").await else {
        panic!("expected array");
    };
    members.sort_by_key(|v| format!("{v:?}"));
    assert_eq!(members, vec![bulk("a"), bulk("b")]);
}

#[tokio::test]
async fn test_srem_and_key_removal() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "SADD s a b").await;
    assert_eq!(run(&engine, &mut session, "SREM s a nope").await, int(1));
    assert_eq!(run(&engine, &mut session, "SREM s b").await, int(1));
    assert_eq!(run(&engine, &mut session, "EXISTS s").await, int(0));
    assert_eq!(run(&engine, &mut session, "SREM s x").await, int(0));
}

#[tokio::test]
async fn test_set_wrong_type() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "RPUSH l a").await;
    let reply = run(&engine, &mut session, "SADD l x").await;
    assert_error_contains(&reply, "WRONGTYPE");
}
