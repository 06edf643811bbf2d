// src/connection/session.rs

//! Defines the state associated with a single client session.

use crate::core::CmdLine;
use crate::core::protocol::RespFrame;
use std::collections::{HashMap, HashSet};
use bytes::Bytes;
use tokio::sync::mpsc::UnboundedSender;

/// Holds the state specific to a single client session.
#[derive(Debug)]
pub struct Session {
    /// Unique id assigned by the accept loop.
    pub id: u64,
    /// The index of the database the client is currently using.
    pub db_index: usize,
    /// The password the client presented via `AUTH`, if any.
    pub password: Option<String>,
    /// True if the client is within a `MULTI`/`EXEC` block.
    pub in_multi: bool,
    /// Command lines queued since `MULTI`.
    pub queued: Vec<CmdLine>,
    /// Errors recorded while queueing; a non-empty list aborts `EXEC`.
    pub tx_errors: Vec<String>,
    /// Optimistic-concurrency tokens: key -> version observed at `WATCH` time.
    pub watching: HashMap<Bytes, u32>,
    /// The set of channels the client is subscribed to.
    pub subscribed: HashSet<Bytes>,
    /// Sender for out-of-band frames (Pub/Sub pushes). `None` for the fake
    /// session the AOF replay path drives.
    pub outbox: Option<UnboundedSender<RespFrame>>,
}

impl Session {
    pub fn new(id: u64, outbox: UnboundedSender<RespFrame>) -> Self {
        Self {
            id,
            db_index: 0,
            password: None,
            in_multi: false,
            queued: Vec::new(),
            tx_errors: Vec::new(),
            watching: HashMap::new(),
            subscribed: HashSet::new(),
            outbox: Some(outbox),
        }
    }

    /// A connection-less session holding only a selected-db cursor, used to
    /// replay the AOF through the regular dispatch path.
    pub fn fake() -> Self {
        Self {
            id: 0,
            db_index: 0,
            password: None,
            in_multi: false,
            queued: Vec::new(),
            tx_errors: Vec::new(),
            watching: HashMap::new(),
            subscribed: HashSet::new(),
            outbox: None,
        }
    }

    /// Clears all transaction state (queue, errors, watches).
    pub fn reset_transaction(&mut self) {
        self.in_multi = false;
        self.queued.clear();
        self.tx_errors.clear();
        self.watching.clear();
    }

    /// Pushes a frame to the client's outbox, if it has one.
    pub fn push_frame(&self, frame: RespFrame) {
        if let Some(outbox) = &self.outbox {
            let _ = outbox.send(frame);
        }
    }
}
