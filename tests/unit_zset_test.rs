mod common;

use citrine::connection::Session;
use citrine::core::RespValue;
use common::*;

async fn seed(engine: &std::sync::Arc<citrine::core::database::Engine>, session: &mut Session) {
    assert_eq!(
        run(engine, session, "ZADD z 1 a 2 b 3 c 4 d").await,
        int(4)
    );
}

#[tokio::test]
async fn test_zadd_zscore_zcard() {
    let engine = test_engine();
    let mut session = Session::fake();
    seed(&engine, &mut session).await;
    assert_eq!(run(&engine, &mut session, "ZADD z 2.5 b 5 e").await, int(1));
    assert_eq!(run(&engine, &mut session, "ZSCORE z b").await, bulk("2.5"));
    assert_eq!(run(&engine, &mut session, "ZSCORE z a").await, bulk("1"));
    assert_eq!(
        run(&engine, &mut session, "ZSCORE z nope").await,
        RespValue::Null
    );
    assert_eq!(run(&engine, &mut session, "ZCARD z").await, int(5));
}

#[tokio::test]
async fn test_zadd_invalid_score() {
    let engine = test_engine();
    let mut session = Session::fake();
    let reply = run(&engine, &mut session, "ZADD z abc m").await;
    assert_error_contains(&reply, "not a valid float");
    // The failed command must not have created the key.
    assert_eq!(run(&engine, &mut session, "EXISTS z").await, int(0));
}

#[tokio::test]
async fn test_zrank() {
    let engine = test_engine();
    let mut session = Session::fake();
    seed(&engine, &mut session).await;
    assert_eq!(run(&engine, &mut session, "ZRANK z a").await, int(0));
    assert_eq!(run(&engine, &mut session, "ZRANK z d").await, int(3));
    assert_eq!(
        run(&engine, &mut session, "ZRANK z nope").await,
        RespValue::Null
    );
}

#[tokio::test]
async fn test_zrange_with_negative_indices() {
    let engine = test_engine();
    let mut session = Session::fake();
    seed(&engine, &mut session).await;
    assert_eq!(
        run(&engine, &mut session, "ZRANGE z 0 -1").await,
        RespValue::Array(vec![bulk("a"), bulk("b"), bulk("c"), bulk("d")])
    );
    assert_eq!(
        run(&engine, &mut session, "ZRANGE z 1 2 WITHSCORES").await,
        RespValue::Array(vec![bulk("b"), bulk("2"), bulk("c"), bulk("3")])
    );
}

#[tokio::test]
async fn test_zrangebyscore_borders_and_limit() {
    let engine = test_engine();
    let mut session = Session::fake();
    seed(&engine, &mut session).await;
    assert_eq!(
        run(&engine, &mut session, "ZRANGEBYSCORE z 2 3").await,
        RespValue::Array(vec![bulk("b"), bulk("c")])
    );
    assert_eq!(
        run(&engine, &mut session, "ZRANGEBYSCORE z (2 +inf").await,
        RespValue::Array(vec![bulk("c"), bulk("d")])
    );
    assert_eq!(
        run(&engine, &mut session, "ZRANGEBYSCORE z -inf +inf LIMIT 1 2").await,
        RespValue::Array(vec![bulk("b"), bulk("c")])
    );
    let reply = run(&engine, &mut session, "ZRANGEBYSCORE z bogus 3").await;
    assert_error_contains(&reply, "min or max is not a float");
}

#[tokio::test]
async fn test_zcount() {
    let engine = test_engine();
    let mut session = Session::fake();
    seed(&engine, &mut session).await;
    assert_eq!(run(&engine, &mut session, "ZCOUNT z 2 3").await, int(2));
    assert_eq!(run(&engine, &mut session, "ZCOUNT z (1 +inf").await, int(3));
    assert_eq!(run(&engine, &mut session, "ZCOUNT missing 0 1").await, int(0));
}

#[tokio::test]
async fn test_zrem_and_key_removal() {
    let engine = test_engine();
    let mut session = Session::fake();
    seed(&engine, &mut session).await;
    assert_eq!(run(&engine, &mut session, "ZREM z a nope").await, int(1));
    assert_eq!(run(&engine, &mut session, "ZREM z b c d").await, int(3));
    assert_eq!(run(&engine, &mut session, "EXISTS z").await, int(0));
}

#[tokio::test]
async fn test_zset_wrong_type() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "SET s v").await;
    let reply = run(&engine, &mut session, "ZADD s 1 m").await;
    assert_error_contains(&reply, "WRONGTYPE");
}
