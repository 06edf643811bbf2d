mod common;

use citrine::connection::Session;
use citrine::core::RespValue;
use common::*;

#[tokio::test]
async fn test_push_and_range() {
    let engine = test_engine();
    let mut session = Session::fake();
    assert_eq!(run(&engine, &mut session, "RPUSH l a b c").await, int(3));
    assert_eq!(run(&engine, &mut session, "LPUSH l z").await, int(4));
    assert_eq!(
        run(&engine, &mut session, "LRANGE l 0 -1").await,
        RespValue::Array(vec![bulk("z"), bulk("a"), bulk("b"), bulk("c")])
    );
    assert_eq!(
        run(&engine, &mut session, "LRANGE l 1 2").await,
        RespValue::Array(vec![bulk("a"), bulk("b")])
    );
    assert_eq!(
        run(&engine, &mut session, "LRANGE l -2 -1").await,
        RespValue::Array(vec![bulk("b"), bulk("c")])
    );
    assert_eq!(
        run(&engine, &mut session, "LRANGE l 5 9").await,
        RespValue::Array(vec![])
    );
}

#[tokio::test]
async fn test_lpush_prepends_in_argument_order() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "LPUSH l a b c").await;
    assert_eq!(
        run(&engine, &mut session, "LRANGE l 0 -1").await,
        RespValue::Array(vec![bulk("c"), bulk("b"), bulk("a")])
    );
}

#[tokio::test]
async fn test_pop_both_ends() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "RPUSH l a b c").await;
    assert_eq!(run(&engine, &mut session, "LPOP l").await, bulk("a"));
    assert_eq!(run(&engine, &mut session, "RPOP l").await, bulk("c"));
    assert_eq!(run(&engine, &mut session, "LLEN l").await, int(1));
}

#[tokio::test]
async fn test_popping_last_element_removes_key() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "RPUSH l only").await;
    assert_eq!(run(&engine, &mut session, "LPOP l").await, bulk("only"));
    assert_eq!(run(&engine, &mut session, "EXISTS l").await, int(0));
    assert_eq!(run(&engine, &mut session, "LPOP l").await, RespValue::Null);
}

#[tokio::test]
async fn test_llen_missing_and_wrong_type() {
    let engine = test_engine();
    let mut session = Session::fake();
    assert_eq!(run(&engine, &mut session, "LLEN missing").await, int(0));
    run(&engine, &mut session, "SET s v").await;
    let reply = run(&engine, &mut session, "LLEN s").await;
    assert_error_contains(&reply, "WRONGTYPE");
    let reply = run(&engine, &mut session, "RPUSH s x").await;
    assert_error_contains(&reply, "WRONGTYPE");
}
