// src/core/aof/mod.rs

//! Append-Only-File persistence: a bounded durability queue drained by a
//! single writer, the three fsync policies, startup replay, and the
//! listener registry replication taps into.
//!
//! The file handle, the db cursor and the listener set all live behind one
//! async mutex. That mutex doubles as the *pause* mutex: the rewrite phases
//! take it to guarantee no torn write is in flight while they snapshot or
//! splice the file.

pub mod rewrite;

use crate::config::AppendFsync;
use crate::connection::session::Session;
use crate::core::database::Engine;
use crate::core::protocol::{RespFrame, RespValue, parse_frame};
use crate::core::{CitrineError, CmdLine};
use bytes::Bytes;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Mutex, mpsc, oneshot};
use tracing::{error, info, warn};

/// Capacity of the durability queue. A full queue blocks producers, which is
/// the intended backpressure.
const AOF_QUEUE_SIZE: usize = 1 << 16;

/// One unit of durable work: the command line and the database it ran in.
#[derive(Debug, Clone)]
pub struct AofPayload {
    pub db_index: usize,
    pub line: CmdLine,
}

/// Receives every durable payload after it has been written, in write order.
/// This is the integration point replication attaches to.
pub trait AofListener: Send + Sync {
    fn callback(&self, lines: &[CmdLine]);
}

pub(crate) fn select_cmd(db_index: usize) -> CmdLine {
    vec![
        Bytes::from_static(b"SELECT"),
        Bytes::from(db_index.to_string()),
    ]
}

/// The mutable file state guarded by the pause mutex.
struct AofFile {
    file: std::fs::File,
    /// The database the last written payload belonged to. A payload for a
    /// different database is preceded by a `SELECT` line.
    current_db: usize,
    listeners: Vec<Arc<dyn AofListener>>,
}

impl AofFile {
    /// Renders the payload as RESP multi-bulk lines and appends them,
    /// emitting a `SELECT` first when the database cursor moves. Write
    /// errors are logged and the payload is skipped; retrying individual
    /// appends is pointless once the descriptor is broken.
    fn write_payload(&mut self, payload: &AofPayload) {
        let mut batch: Vec<CmdLine> = Vec::with_capacity(2);

        if payload.db_index != self.current_db {
            let select = select_cmd(payload.db_index);
            let bytes = RespFrame::from_cmdline(&select).encode_to_vec();
            if let Err(e) = self.file.write_all(&bytes) {
                warn!("failed to write SELECT to AOF: {e}");
                return;
            }
            self.current_db = payload.db_index;
            batch.push(select);
        }

        let bytes = RespFrame::from_cmdline(&payload.line).encode_to_vec();
        batch.push(payload.line.clone());
        if let Err(e) = self.file.write_all(&bytes) {
            warn!("failed to append to AOF: {e}");
            return;
        }

        for listener in &self.listeners {
            listener.callback(&batch);
        }
    }

    fn sync(&self) -> std::io::Result<()> {
        self.file.sync_all()
    }
}

/// The AOF persister.
pub struct Aof {
    engine: Weak<Engine>,
    path: PathBuf,
    fsync: AppendFsync,
    /// The pause mutex; see the module docs.
    file: Arc<Mutex<AofFile>>,
    /// Producer side of the durability queue. Taken on close so the worker
    /// drains and exits.
    tx: parking_lot::RwLock<Option<mpsc::Sender<AofPayload>>>,
    /// False while replaying (the replay path must not re-log) and after close.
    accepting: AtomicBool,
    /// Signalled by the worker when it has drained the queue and stopped.
    finished: Mutex<Option<oneshot::Receiver<()>>>,
    closed: Arc<AtomicBool>,
}

impl Aof {
    /// Opens (and optionally replays) the AOF at `path`, spawns the writer
    /// worker and, for `everysec`, the fsync ticker.
    pub async fn new(
        engine: &Arc<Engine>,
        path: PathBuf,
        fsync: AppendFsync,
        load: bool,
    ) -> Result<Arc<Self>, CitrineError> {
        let mut start_db = 0;
        if load {
            start_db = replay_file(engine, &path, None).await?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)?;

        let file = Arc::new(Mutex::new(AofFile {
            file,
            current_db: start_db,
            listeners: Vec::new(),
        }));

        let (tx, mut rx) = mpsc::channel::<AofPayload>(AOF_QUEUE_SIZE);
        let (done_tx, done_rx) = oneshot::channel();
        let closed = Arc::new(AtomicBool::new(false));

        // The single writer: drains the queue and appends under the pause
        // mutex, one payload at a time.
        let worker_file = Arc::clone(&file);
        tokio::spawn(async move {
            while let Some(payload) = rx.recv().await {
                let mut guard = worker_file.lock().await;
                guard.write_payload(&payload);
            }
            let _ = done_tx.send(());
        });

        if fsync == AppendFsync::EverySec {
            let ticker_file = Arc::clone(&file);
            let ticker_closed = Arc::clone(&closed);
            tokio::spawn(async move {
                let mut ticker = tokio::time::interval(Duration::from_secs(1));
                ticker.tick().await;
                loop {
                    ticker.tick().await;
                    if ticker_closed.load(Ordering::Acquire) {
                        return;
                    }
                    let guard = ticker_file.lock().await;
                    if let Err(e) = guard.sync() {
                        error!("periodic AOF fsync failed: {e}");
                    }
                }
            });
        }

        Ok(Arc::new(Self {
            engine: Arc::downgrade(engine),
            path,
            fsync,
            file,
            tx: parking_lot::RwLock::new(Some(tx)),
            accepting: AtomicBool::new(true),
            finished: Mutex::new(Some(done_rx)),
            closed,
        }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Accepts one durable payload.
    ///
    /// `always` writes and fsyncs synchronously on the caller's task, under
    /// the pause mutex. The other policies enqueue; a full queue blocks the
    /// caller until the worker catches up, and a closed queue silently drops.
    pub async fn save_cmd_line(&self, db_index: usize, line: CmdLine) {
        if !self.accepting.load(Ordering::Acquire) {
            return;
        }
        let payload = AofPayload { db_index, line };

        if self.fsync == AppendFsync::Always {
            let mut guard = self.file.lock().await;
            guard.write_payload(&payload);
            if let Err(e) = guard.sync() {
                error!("AOF fsync failed: {e}");
            }
            return;
        }

        let tx = self.tx.read().clone();
        if let Some(tx) = tx {
            let _ = tx.send(payload).await;
        }
    }

    /// Registers a listener. The listener set is guarded by the pause mutex,
    /// so registration is consistently ordered against rewrite and writes.
    pub async fn add_listener(&self, listener: Arc<dyn AofListener>) {
        self.file.lock().await.listeners.push(listener);
    }

    pub async fn remove_listener(&self, listener: &Arc<dyn AofListener>) {
        self.file
            .lock()
            .await
            .listeners
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    /// Shuts the persister down: stop accepting, let the worker drain the
    /// queue, then fsync and release the file.
    pub async fn close(&self) {
        self.accepting.store(false, Ordering::Release);
        let tx = self.tx.write().take();
        drop(tx);
        if let Some(done) = self.finished.lock().await.take() {
            let _ = done.await;
        }
        self.closed.store(true, Ordering::Release);
        let guard = self.file.lock().await;
        if let Err(e) = guard.sync() {
            error!("final AOF fsync failed: {e}");
        }
        info!("AOF persister closed");
    }
}

/// Replays the AOF at `path` into `engine` through a fake session that only
/// carries the selected-db cursor. At most `max_bytes` of the file are read
/// when given. Returns the database the replay cursor ended on.
///
/// A partial trailing command (torn write) terminates the replay cleanly.
pub(crate) async fn replay_file(
    engine: &Arc<Engine>,
    path: &Path,
    max_bytes: Option<u64>,
) -> Result<usize, CitrineError> {
    let data = match std::fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };
    let limit = max_bytes.map_or(data.len(), |m| (m as usize).min(data.len()));
    let mut buf = &data[..limit];

    let mut session = Session::fake();
    // The replay link is trusted: pre-authenticate it so a configured
    // requirepass does not reject the file's own commands.
    session.password = engine.config.requirepass.clone();
    let mut replayed = 0u64;
    while !buf.is_empty() {
        match parse_frame(buf) {
            Ok((frame, consumed)) => {
                buf = &buf[consumed..];
                let Ok(line) = frame.into_cmdline() else {
                    warn!("skipping non-multibulk frame in AOF");
                    continue;
                };
                if line.is_empty() {
                    continue;
                }
                let reply = engine.exec(&mut session, &line).await;
                if let RespValue::Error(msg) = reply {
                    warn!("error replaying AOF command: {msg}");
                }
                replayed += 1;
            }
            Err(CitrineError::IncompleteData) => {
                // Torn tail from an interrupted write; everything before it
                // already replayed.
                break;
            }
            Err(e) => {
                warn!("stopping AOF replay at unparseable frame: {e}");
                break;
            }
        }
    }
    info!(commands = replayed, "AOF replay finished");
    Ok(session.db_index)
}
