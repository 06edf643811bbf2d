// src/core/database/engine.rs

//! The database engine: the set of numbered databases plus the command
//! dispatcher that routes between system commands, the transaction engine,
//! the Pub/Sub hub and the per-database execution path.

use crate::config::Config;
use crate::connection::session::Session;
use crate::core::aof::Aof;
use crate::core::database::core::Database;
use crate::core::database::transaction;
use crate::core::pubsub::Hub;
use crate::core::timewheel::TimeWheel;
use crate::core::{CitrineError, RespValue};
use bytes::Bytes;
use futures::FutureExt;
use once_cell::sync::OnceCell;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

pub struct Engine {
    dbs: Vec<Arc<Database>>,
    pub hub: Arc<Hub>,
    pub wheel: TimeWheel,
    pub config: Arc<Config>,
    aof: OnceCell<Arc<Aof>>,
    started_at: Instant,
}

impl Engine {
    /// Creates a bare engine with no persistence attached. Used directly by
    /// tests and by the AOF rewrite for its private replay target.
    pub fn new(config: Arc<Config>) -> Arc<Self> {
        let wheel = TimeWheel::with_defaults();
        let dbs = (0..config.databases)
            .map(|index| Database::new(index, wheel.clone()))
            .collect();
        Arc::new(Self {
            dbs,
            hub: Arc::new(Hub::new()),
            wheel,
            config,
            aof: OnceCell::new(),
            started_at: Instant::now(),
        })
    }

    /// Creates the engine and, when `appendonly` is configured, replays the
    /// existing AOF and installs the persister hooks.
    pub async fn with_persistence(config: Arc<Config>) -> Result<Arc<Self>, CitrineError> {
        let engine = Self::new(config.clone());
        if config.appendonly {
            let aof = Aof::new(
                &engine,
                config.appendfilename.clone().into(),
                config.appendfsync,
                true,
            )
            .await?;
            engine.install_aof(aof);
            info!(path = %config.appendfilename, "append-only persistence enabled");
        }
        Ok(engine)
    }

    /// Wires the persister into every database's write path.
    pub fn install_aof(&self, aof: Arc<Aof>) {
        let _ = self.aof.set(aof.clone());
        for db in &self.dbs {
            let aof = aof.clone();
            db.set_aof_hook(Arc::new(move |db_index, line| {
                let aof = aof.clone();
                async move { aof.save_cmd_line(db_index, line).await }.boxed()
            }));
        }
    }

    pub fn aof(&self) -> Option<Arc<Aof>> {
        self.aof.get().cloned()
    }

    pub fn database_count(&self) -> usize {
        self.dbs.len()
    }

    pub fn db_at(&self, index: usize) -> Result<Arc<Database>, CitrineError> {
        self.dbs
            .get(index)
            .cloned()
            .ok_or(CitrineError::DbIndexOutOfRange)
    }

    /// Top-level dispatch. Never fails: errors become `-ERR ...` replies.
    pub async fn exec(self: &Arc<Self>, session: &mut Session, line: &[Bytes]) -> RespValue {
        match self.exec_inner(session, line).await {
            Ok(reply) => reply,
            Err(e) => RespValue::Error(e.to_string()),
        }
    }

    async fn exec_inner(
        self: &Arc<Self>,
        session: &mut Session,
        line: &[Bytes],
    ) -> Result<RespValue, CitrineError> {
        if line.is_empty() {
            return Err(CitrineError::ProtocolError("empty command".into()));
        }
        let name = String::from_utf8_lossy(&line[0]).to_lowercase();

        if name == "auth" {
            return self.exec_auth(session, &line[1..]);
        }
        if let Some(required) = self.config.requirepass.as_deref() {
            if session.password.as_deref() != Some(required) {
                return Err(CitrineError::AuthRequired);
            }
        }

        // Transaction control commands are routed directly; everything else
        // is queued while the session is inside MULTI.
        match name.as_str() {
            "multi" => return transaction::start_multi(session),
            "discard" => return transaction::discard(session),
            "exec" => return transaction::exec_multi(self, session).await,
            "watch" => return transaction::watch(self, session, &line[1..]),
            _ => {}
        }
        if session.in_multi {
            return Ok(transaction::enqueue(session, line));
        }

        match name.as_str() {
            "ping" => exec_ping(&line[1..]),
            "select" => self.exec_select(session, &line[1..]),
            "unwatch" => transaction::unwatch(session),
            "info" => self.exec_info(&line[1..]),
            "bgrewriteaof" => self.exec_bgrewriteaof(),
            "subscribe" => {
                if line.len() < 2 {
                    return Err(CitrineError::WrongArgumentCount(name));
                }
                self.hub.subscribe(session, &line[1..]).await;
                Ok(RespValue::NoReply)
            }
            "unsubscribe" => {
                self.hub.unsubscribe(session, &line[1..]).await;
                Ok(RespValue::NoReply)
            }
            "publish" => {
                if line.len() != 3 {
                    return Err(CitrineError::WrongArgumentCount(name));
                }
                let receivers = self.hub.publish(&line[1], &line[2]).await;
                Ok(RespValue::Integer(receivers as i64))
            }
            _ => {
                let db = self.db_at(session.db_index)?;
                db.exec_normal(line).await
            }
        }
    }

    fn exec_auth(
        &self,
        session: &mut Session,
        args: &[Bytes],
    ) -> Result<RespValue, CitrineError> {
        if args.len() != 1 {
            return Err(CitrineError::WrongArgumentCount("auth".into()));
        }
        let Some(required) = self.config.requirepass.as_deref() else {
            return Err(CitrineError::InvalidState(
                "Client sent AUTH, but no password is set".into(),
            ));
        };
        let presented = String::from_utf8_lossy(&args[0]).to_string();
        let accepted = presented == required;
        session.password = Some(presented);
        if accepted {
            Ok(RespValue::ok())
        } else {
            Err(CitrineError::InvalidPassword)
        }
    }

    fn exec_select(
        &self,
        session: &mut Session,
        args: &[Bytes],
    ) -> Result<RespValue, CitrineError> {
        if args.len() != 1 {
            return Err(CitrineError::WrongArgumentCount("select".into()));
        }
        let index = std::str::from_utf8(&args[0])
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .ok_or(CitrineError::DbIndexOutOfRange)?;
        if index >= self.dbs.len() {
            return Err(CitrineError::DbIndexOutOfRange);
        }
        session.db_index = index;
        Ok(RespValue::ok())
    }

    fn exec_info(&self, args: &[Bytes]) -> Result<RespValue, CitrineError> {
        let section = match args {
            [] => None,
            [section] => Some(String::from_utf8_lossy(section).to_lowercase()),
            _ => return Err(CitrineError::WrongArgumentCount("info".into())),
        };

        let mut out = String::new();
        if section.as_deref().is_none_or(|s| s == "server") {
            out.push_str("# Server\r\n");
            out.push_str(&format!(
                "citrine_version:{}\r\n",
                env!("CARGO_PKG_VERSION")
            ));
            out.push_str("role:master\r\n");
            out.push_str(&format!("tcp_port:{}\r\n", self.config.port));
            out.push_str(&format!(
                "uptime_in_seconds:{}\r\n",
                self.started_at.elapsed().as_secs()
            ));
            out.push_str("\r\n");
        }
        if section.as_deref().is_none_or(|s| s == "keyspace") {
            out.push_str("# Keyspace\r\n");
            for db in &self.dbs {
                let keys = db.key_count();
                if keys > 0 {
                    out.push_str(&format!("db{}:keys={}\r\n", db.index(), keys));
                }
            }
            out.push_str("\r\n");
        }
        if section.as_deref().is_none_or(|s| s == "persistence") {
            out.push_str("# Persistence\r\n");
            out.push_str(&format!(
                "aof_enabled:{}\r\n",
                if self.aof.get().is_some() { 1 } else { 0 }
            ));
            out.push_str("\r\n");
        }
        Ok(RespValue::BulkString(Bytes::from(out)))
    }

    fn exec_bgrewriteaof(self: &Arc<Self>) -> Result<RespValue, CitrineError> {
        let Some(aof) = self.aof.get().cloned() else {
            return Err(CitrineError::InvalidState(
                "Append Only File persistence is not enabled".into(),
            ));
        };
        tokio::spawn(async move {
            if let Err(e) = aof.rewrite().await {
                warn!("AOF rewrite failed: {e}");
            }
        });
        Ok(RespValue::SimpleString(
            "Background append only file rewriting started".into(),
        ))
    }
}

fn exec_ping(args: &[Bytes]) -> Result<RespValue, CitrineError> {
    match args {
        [] => Ok(RespValue::SimpleString("PONG".into())),
        [message] => Ok(RespValue::BulkString(message.clone())),
        _ => Err(CitrineError::WrongArgumentCount("ping".into())),
    }
}
