mod common;

use citrine::connection::Session;
use citrine::core::RespValue;
use common::*;

#[tokio::test]
async fn test_exec_applies_queued_commands() {
    let engine = test_engine();
    let mut session = Session::fake();
    assert_eq!(run(&engine, &mut session, "MULTI").await, ok());
    assert_eq!(
        run(&engine, &mut session, "SET a 1").await,
        RespValue::SimpleString("QUEUED".into())
    );
    assert_eq!(
        run(&engine, &mut session, "SET b 2").await,
        RespValue::SimpleString("QUEUED".into())
    );
    assert_eq!(
        run(&engine, &mut session, "EXEC").await,
        RespValue::Array(vec![ok(), ok()])
    );
    assert_eq!(run(&engine, &mut session, "GET a").await, bulk("1"));
    assert_eq!(run(&engine, &mut session, "GET b").await, bulk("2"));
}

#[tokio::test]
async fn test_queueing_does_not_execute_early() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "MULTI").await;
    run(&engine, &mut session, "SET a 1").await;
    // A second session must not see the write before EXEC.
    let mut other = Session::fake();
    assert_eq!(run(&engine, &mut other, "GET a").await, RespValue::Null);
    run(&engine, &mut session, "EXEC").await;
    assert_eq!(run(&engine, &mut other, "GET a").await, bulk("1"));
}

#[tokio::test]
async fn test_nested_multi_rejected() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "MULTI").await;
    let reply = run(&engine, &mut session, "MULTI").await;
    assert_error_contains(&reply, "MULTI calls can not be nested");
}

#[tokio::test]
async fn test_exec_without_multi_rejected() {
    let engine = test_engine();
    let mut session = Session::fake();
    let reply = run(&engine, &mut session, "EXEC").await;
    assert_error_contains(&reply, "EXEC without MULTI");
    let reply = run(&engine, &mut session, "DISCARD").await;
    assert_error_contains(&reply, "DISCARD without MULTI");
}

#[tokio::test]
async fn test_queued_syntax_error_aborts_exec() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "MULTI").await;
    run(&engine, &mut session, "SET a 1").await;
    let reply = run(&engine, &mut session, "NOSUCHCMD x").await;
    assert_error_contains(&reply, "unknown command");
    run(&engine, &mut session, "SET b 2").await;

    let reply = run(&engine, &mut session, "EXEC").await;
    assert_error_contains(&reply, "EXECABORT");
    // Nothing was applied.
    assert_eq!(run(&engine, &mut session, "EXISTS a b").await, int(0));
}

#[tokio::test]
async fn test_queued_arity_error_aborts_exec() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "MULTI").await;
    let reply = run(&engine, &mut session, "GET").await;
    assert_error_contains(&reply, "wrong number of arguments");
    let reply = run(&engine, &mut session, "EXEC").await;
    assert_error_contains(&reply, "EXECABORT");
}

#[tokio::test]
async fn test_discard_clears_queue() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "MULTI").await;
    run(&engine, &mut session, "SET a 1").await;
    assert_eq!(run(&engine, &mut session, "DISCARD").await, ok());
    assert_eq!(run(&engine, &mut session, "EXISTS a").await, int(0));
    // The session left MULTI: commands execute immediately again.
    assert_eq!(run(&engine, &mut session, "SET a 2").await, ok());
}

#[tokio::test]
async fn test_watch_conflict_aborts_exec() {
    let engine = test_engine();
    let mut conn_a = Session::fake();
    let mut conn_b = Session::fake();

    assert_eq!(run(&engine, &mut conn_a, "WATCH x").await, ok());
    run(&engine, &mut conn_a, "MULTI").await;
    run(&engine, &mut conn_a, "INCR x").await;

    // Another connection writes the watched key between WATCH and EXEC.
    assert_eq!(run(&engine, &mut conn_b, "SET x 10").await, ok());

    assert_eq!(
        run(&engine, &mut conn_a, "EXEC").await,
        RespValue::NullArray
    );
    assert_eq!(run(&engine, &mut conn_a, "GET x").await, bulk("10"));
}

#[tokio::test]
async fn test_exec_succeeds_when_watched_keys_unchanged() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "SET x 5").await;
    assert_eq!(run(&engine, &mut session, "WATCH x").await, ok());
    run(&engine, &mut session, "MULTI").await;
    run(&engine, &mut session, "INCR x").await;
    assert_eq!(
        run(&engine, &mut session, "EXEC").await,
        RespValue::Array(vec![int(6)])
    );
}

#[tokio::test]
async fn test_watch_is_cleared_by_exec() {
    let engine = test_engine();
    let mut conn_a = Session::fake();
    let mut conn_b = Session::fake();

    run(&engine, &mut conn_a, "WATCH x").await;
    run(&engine, &mut conn_a, "MULTI").await;
    run(&engine, &mut conn_a, "SET y 1").await;
    assert_eq!(
        run(&engine, &mut conn_a, "EXEC").await,
        RespValue::Array(vec![ok()])
    );

    // The earlier watch must not affect a new transaction.
    run(&engine, &mut conn_b, "SET x changed").await;
    run(&engine, &mut conn_a, "MULTI").await;
    run(&engine, &mut conn_a, "SET y 2").await;
    assert_eq!(
        run(&engine, &mut conn_a, "EXEC").await,
        RespValue::Array(vec![ok()])
    );
}

#[tokio::test]
async fn test_watch_inside_multi_rejected() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "MULTI").await;
    let reply = run(&engine, &mut session, "WATCH x").await;
    assert_error_contains(&reply, "WATCH inside MULTI is not allowed");
}

#[tokio::test]
async fn test_unwatch_discards_tokens() {
    let engine = test_engine();
    let mut conn_a = Session::fake();
    let mut conn_b = Session::fake();

    run(&engine, &mut conn_a, "WATCH x").await;
    assert_eq!(run(&engine, &mut conn_a, "UNWATCH").await, ok());
    run(&engine, &mut conn_b, "SET x 10").await;

    run(&engine, &mut conn_a, "MULTI").await;
    run(&engine, &mut conn_a, "SET y 1").await;
    assert_eq!(
        run(&engine, &mut conn_a, "EXEC").await,
        RespValue::Array(vec![ok()])
    );
}

#[tokio::test]
async fn test_runtime_error_does_not_roll_back() {
    let engine = test_engine();
    let mut session = Session::fake();
    run(&engine, &mut session, "SET s text").await;
    run(&engine, &mut session, "MULTI").await;
    run(&engine, &mut session, "SET a 1").await;
    run(&engine, &mut session, "INCR s").await; // runtime error, not syntax
    run(&engine, &mut session, "SET b 2").await;

    let RespValue::Array(replies) = run(&engine, &mut session, "EXEC").await else {
        panic!("expected array of replies");
    };
    assert_eq!(replies.len(), 3);
    assert_eq!(replies[0], ok());
    assert!(matches!(replies[1], RespValue::Error(_)));
    assert_eq!(replies[2], ok());
    // Classic semantics: the successful commands stay applied.
    assert_eq!(run(&engine, &mut session, "GET a").await, bulk("1"));
    assert_eq!(run(&engine, &mut session, "GET b").await, bulk("2"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_watch_exec_increments_are_lost_update_free() {
    let engine = test_engine();
    let mut setup = Session::fake();
    run(&engine, &mut setup, "SET counter 0").await;

    const CLIENTS: usize = 8;
    let mut handles = Vec::new();
    for id in 0..CLIENTS {
        let engine = engine.clone();
        handles.push(tokio::spawn(async move {
            let mut session = Session::fake();
            session.id = id as u64 + 1;
            loop {
                run(&engine, &mut session, "WATCH counter").await;
                let current = match run(&engine, &mut session, "GET counter").await {
                    RespValue::BulkString(b) => String::from_utf8_lossy(&b).parse::<i64>().unwrap(),
                    other => panic!("unexpected GET reply {other:?}"),
                };
                run(&engine, &mut session, "MULTI").await;
                run(&engine, &mut session, &format!("SET counter {}", current + 1)).await;
                match run(&engine, &mut session, "EXEC").await {
                    // Conflict: another client won the race, try again.
                    RespValue::NullArray => continue,
                    RespValue::Array(_) => break,
                    other => panic!("unexpected EXEC reply {other:?}"),
                }
            }
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    // Optimistic concurrency means no increment is ever lost.
    assert_eq!(
        run(&engine, &mut setup, "GET counter").await,
        bulk(&CLIENTS.to_string())
    );
}

#[tokio::test]
async fn test_version_bumps_before_write_visibility() {
    let engine = test_engine();
    let mut session = Session::fake();
    let db = engine.db_at(0).unwrap();
    let key = bytes::Bytes::from_static(b"v");

    assert_eq!(db.get_version(&key), 0);
    run(&engine, &mut session, "SET v 1").await;
    let after_first = db.get_version(&key);
    assert!(after_first > 0);
    run(&engine, &mut session, "SET v 2").await;
    assert!(db.get_version(&key) > after_first);
}
