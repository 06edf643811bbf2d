mod common;

use citrine::config::{AppendFsync, Config};
use citrine::connection::Session;
use citrine::core::CmdLine;
use citrine::core::RespValue;
use citrine::core::aof::AofListener;
use citrine::core::database::Engine;
use common::*;
use std::sync::{Arc, Mutex};
use std::time::Duration;

fn aof_config(dir: &tempfile::TempDir, fsync: AppendFsync) -> Arc<Config> {
    Arc::new(Config {
        databases: 2,
        appendonly: true,
        appendfilename: dir
            .path()
            .join("appendonly.aof")
            .to_string_lossy()
            .into_owned(),
        appendfsync: fsync,
        ..Default::default()
    })
}

async fn start(config: &Arc<Config>) -> Arc<Engine> {
    Engine::with_persistence(config.clone()).await.unwrap()
}

async fn shutdown(engine: &Arc<Engine>) {
    engine.aof().unwrap().close().await;
}

#[tokio::test]
async fn test_replay_restores_mixed_types() {
    let dir = tempfile::tempdir().unwrap();
    let config = aof_config(&dir, AppendFsync::Always);

    let engine = start(&config).await;
    let mut session = Session::fake();
    run(&engine, &mut session, "SET s hello").await;
    run(&engine, &mut session, "RPUSH l a b c").await;
    run(&engine, &mut session, "HSET h f v").await;
    run(&engine, &mut session, "SADD st m1 m2").await;
    run(&engine, &mut session, "ZADD z 1.5 m").await;
    run(&engine, &mut session, "INCR n").await;
    run(&engine, &mut session, "DEL st").await;
    shutdown(&engine).await;

    let restored = start(&config).await;
    let mut session = Session::fake();
    assert_eq!(run(&restored, &mut session, "GET s").await, bulk("hello"));
    assert_eq!(
        run(&restored, &mut session, "LRANGE l 0 -1").await,
        RespValue::Array(vec![bulk("a"), bulk("b"), bulk("c")])
    );
    assert_eq!(run(&restored, &mut session, "HGET h f").await, bulk("v"));
    assert_eq!(run(&restored, &mut session, "EXISTS st").await, int(0));
    assert_eq!(run(&restored, &mut session, "ZSCORE z m").await, bulk("1.5"));
    assert_eq!(run(&restored, &mut session, "GET n").await, bulk("1"));
    shutdown(&restored).await;
}

#[tokio::test]
async fn test_replay_tracks_select_across_databases() {
    let dir = tempfile::tempdir().unwrap();
    let config = aof_config(&dir, AppendFsync::Always);

    let engine = start(&config).await;
    let mut session = Session::fake();
    run(&engine, &mut session, "SET k zero").await;
    run(&engine, &mut session, "SELECT 1").await;
    run(&engine, &mut session, "SET k one").await;
    shutdown(&engine).await;

    let restored = start(&config).await;
    let mut session = Session::fake();
    assert_eq!(run(&restored, &mut session, "GET k").await, bulk("zero"));
    run(&restored, &mut session, "SELECT 1").await;
    assert_eq!(run(&restored, &mut session, "GET k").await, bulk("one"));
    shutdown(&restored).await;
}

#[tokio::test]
async fn test_replay_tolerates_torn_tail() {
    let dir = tempfile::tempdir().unwrap();
    let config = aof_config(&dir, AppendFsync::Always);

    let engine = start(&config).await;
    let mut session = Session::fake();
    run(&engine, &mut session, "SET good value").await;
    shutdown(&engine).await;

    // Simulate a torn write: a truncated frame at the end of the file.
    use std::io::Write;
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .open(&config.appendfilename)
        .unwrap();
    file.write_all(b"*3\r\n$3\r\nSET\r\n$4\r\nhal").unwrap();
    drop(file);

    let restored = start(&config).await;
    let mut session = Session::fake();
    assert_eq!(run(&restored, &mut session, "GET good").await, bulk("value"));
    assert_eq!(run(&restored, &mut session, "EXISTS hal").await, int(0));
    shutdown(&restored).await;
}

#[tokio::test]
async fn test_ttl_survives_replay_as_absolute_time() {
    let dir = tempfile::tempdir().unwrap();
    let config = aof_config(&dir, AppendFsync::Always);

    let engine = start(&config).await;
    let mut session = Session::fake();
    run(&engine, &mut session, "SET k v").await;
    run(&engine, &mut session, "EXPIRE k 100").await;
    run(&engine, &mut session, "SET dead v").await;
    run(&engine, &mut session, "PEXPIRE dead 30").await;
    tokio::time::sleep(Duration::from_millis(80)).await;
    shutdown(&engine).await;

    let restored = start(&config).await;
    let mut session = Session::fake();
    match run(&restored, &mut session, "TTL k").await {
        RespValue::Integer(secs) => assert!((90..=100).contains(&secs), "ttl {secs}"),
        other => panic!("unexpected ttl {other:?}"),
    }
    // The already-expired key converges to absent on replay.
    assert_eq!(run(&restored, &mut session, "GET dead").await, RespValue::Null);
    shutdown(&restored).await;
}

#[tokio::test]
async fn test_everysec_writes_drain_on_close() {
    let dir = tempfile::tempdir().unwrap();
    let config = aof_config(&dir, AppendFsync::EverySec);

    let engine = start(&config).await;
    let mut session = Session::fake();
    for i in 0..50 {
        run(&engine, &mut session, &format!("SET k{i} v{i}")).await;
    }
    shutdown(&engine).await;

    let restored = start(&config).await;
    let mut session = Session::fake();
    for i in 0..50 {
        assert_eq!(
            run(&restored, &mut session, &format!("GET k{i}")).await,
            bulk(&format!("v{i}"))
        );
    }
    shutdown(&restored).await;
}

#[tokio::test]
async fn test_writes_after_close_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let config = aof_config(&dir, AppendFsync::Always);

    let engine = start(&config).await;
    let mut session = Session::fake();
    run(&engine, &mut session, "SET before 1").await;
    shutdown(&engine).await;
    // The engine still accepts commands; they just stop being persisted.
    run(&engine, &mut session, "SET after 1").await;

    let restored = start(&config).await;
    let mut session = Session::fake();
    assert_eq!(run(&restored, &mut session, "GET before").await, bulk("1"));
    assert_eq!(
        run(&restored, &mut session, "GET after").await,
        RespValue::Null
    );
    shutdown(&restored).await;
}

#[tokio::test]
async fn test_replay_works_with_requirepass() {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(Config {
        requirepass: Some("sekret".into()),
        ..(*aof_config(&dir, AppendFsync::Always)).clone()
    });

    let engine = start(&config).await;
    let mut session = Session::fake();
    run(&engine, &mut session, "AUTH sekret").await;
    run(&engine, &mut session, "SET k v").await;
    shutdown(&engine).await;

    let restored = start(&config).await;
    let mut session = Session::fake();
    run(&restored, &mut session, "AUTH sekret").await;
    assert_eq!(run(&restored, &mut session, "GET k").await, bulk("v"));
    shutdown(&restored).await;
}

#[derive(Default)]
struct RecordingListener {
    lines: Mutex<Vec<CmdLine>>,
}

impl AofListener for RecordingListener {
    fn callback(&self, lines: &[CmdLine]) {
        self.lines.lock().unwrap().extend(lines.iter().cloned());
    }
}

#[tokio::test]
async fn test_listener_observes_durable_payloads_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let config = aof_config(&dir, AppendFsync::Always);

    let engine = start(&config).await;
    let listener = Arc::new(RecordingListener::default());
    let registered: Arc<dyn AofListener> = listener.clone();
    engine.aof().unwrap().add_listener(registered).await;

    let mut session = Session::fake();
    run(&engine, &mut session, "SET a 1").await;
    run(&engine, &mut session, "SELECT 1").await;
    run(&engine, &mut session, "SET b 2").await;
    shutdown(&engine).await;

    let lines = listener.lines.lock().unwrap();
    let rendered: Vec<String> = lines
        .iter()
        .map(|line| {
            line.iter()
                .map(|p| String::from_utf8_lossy(p).into_owned())
                .collect::<Vec<_>>()
                .join(" ")
        })
        .collect();
    assert_eq!(rendered, vec!["SET a 1", "SELECT 1", "SET b 2"]);
}

#[tokio::test]
async fn test_rewrite_preserves_state_and_tail_writes() {
    let dir = tempfile::tempdir().unwrap();
    let config = aof_config(&dir, AppendFsync::Always);

    let engine = start(&config).await;
    let mut session = Session::fake();

    // A churny history: many overwrites so the rewrite has something to compact.
    for i in 0..300 {
        run(&engine, &mut session, &format!("SET churn {i}")).await;
    }
    for i in 0..100 {
        run(&engine, &mut session, &format!("SET k{i} v{i}")).await;
    }
    run(&engine, &mut session, "RPUSH l a b c").await;
    run(&engine, &mut session, "HSET h f v").await;
    run(&engine, &mut session, "ZADD z 2 m").await;
    run(&engine, &mut session, "EXPIRE k1 100").await;
    run(&engine, &mut session, "SELECT 1").await;
    run(&engine, &mut session, "SET other db1").await;
    run(&engine, &mut session, "SELECT 0").await;

    let size_before = std::fs::metadata(&config.appendfilename).unwrap().len();

    let aof = engine.aof().unwrap();
    let rewrite = {
        let aof = aof.clone();
        tokio::spawn(async move { aof.rewrite().await })
    };
    // Keep writing while the rewrite runs; these must survive the swap.
    for i in 0..50 {
        run(&engine, &mut session, &format!("SET during{i} x")).await;
    }
    rewrite.await.unwrap().unwrap();
    for i in 0..10 {
        run(&engine, &mut session, &format!("SET post{i} y")).await;
    }
    shutdown(&engine).await;

    let size_after = std::fs::metadata(&config.appendfilename).unwrap().len();
    assert!(
        size_after < size_before,
        "rewrite should compact the churned history ({size_before} -> {size_after})"
    );

    let restored = start(&config).await;
    let mut session = Session::fake();
    assert_eq!(run(&restored, &mut session, "GET churn").await, bulk("299"));
    for i in 0..100 {
        assert_eq!(
            run(&restored, &mut session, &format!("GET k{i}")).await,
            bulk(&format!("v{i}"))
        );
    }
    assert_eq!(
        run(&restored, &mut session, "LRANGE l 0 -1").await,
        RespValue::Array(vec![bulk("a"), bulk("b"), bulk("c")])
    );
    assert_eq!(run(&restored, &mut session, "HGET h f").await, bulk("v"));
    assert_eq!(run(&restored, &mut session, "ZSCORE z m").await, bulk("2"));
    for i in 0..50 {
        assert_eq!(
            run(&restored, &mut session, &format!("GET during{i}")).await,
            bulk("x"),
            "write during rewrite lost: during{i}"
        );
    }
    for i in 0..10 {
        assert_eq!(
            run(&restored, &mut session, &format!("GET post{i}")).await,
            bulk("y")
        );
    }
    match run(&restored, &mut session, "TTL k1").await {
        RespValue::Integer(secs) => assert!((90..=100).contains(&secs)),
        other => panic!("unexpected ttl {other:?}"),
    }
    run(&restored, &mut session, "SELECT 1").await;
    assert_eq!(run(&restored, &mut session, "GET other").await, bulk("db1"));
    shutdown(&restored).await;
}
