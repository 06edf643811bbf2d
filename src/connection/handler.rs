// src/connection/handler.rs

//! Drives one client connection: decodes RESP frames into command lines,
//! dispatches them to the engine, and pumps replies (and Pub/Sub pushes)
//! back through the connection's outbox.

use crate::connection::session::Session;
use crate::core::CitrineError;
use crate::core::database::Engine;
use crate::core::protocol::{RespFrame, RespFrameCodec, RespValue};
use bytes::BytesMut;
use futures::{FutureExt, SinkExt};
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{Decoder, FramedWrite};
use tracing::{debug, error, warn};

/// How long a closing connection waits for its pending replies to flush.
const CLOSE_DRAIN_TIMEOUT: Duration = Duration::from_secs(10);

const READ_BUFFER_CAPACITY: usize = 4096;

pub struct ConnectionHandler {
    engine: Arc<Engine>,
    session: Session,
    addr: SocketAddr,
}

impl ConnectionHandler {
    pub fn new(
        engine: Arc<Engine>,
        id: u64,
        addr: SocketAddr,
    ) -> (Self, mpsc::UnboundedReceiver<RespFrame>) {
        let (outbox_tx, outbox_rx) = mpsc::unbounded_channel();
        let session = Session::new(id, outbox_tx);
        (
            Self {
                engine,
                session,
                addr,
            },
            outbox_rx,
        )
    }

    /// Runs the connection until the peer disconnects, a fatal transport
    /// error occurs, or the server shuts down.
    pub async fn run(
        mut self,
        socket: TcpStream,
        mut outbox_rx: mpsc::UnboundedReceiver<RespFrame>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) {
        let (mut read_half, write_half) = socket.into_split();

        // All bytes to the client flow through the outbox so that replies and
        // Pub/Sub pushes interleave in a single ordered stream.
        let writer_task = tokio::spawn(async move {
            let mut writer = FramedWrite::new(write_half, RespFrameCodec);
            while let Some(frame) = outbox_rx.recv().await {
                if writer.send(frame).await.is_err() {
                    break;
                }
            }
            let _ = writer.flush().await;
        });

        // The decoder is driven by hand rather than through `FramedRead`:
        // a protocol error must produce an error reply and leave the stream
        // running, while `FramedRead` fuses after the first decode error.
        let mut codec = RespFrameCodec;
        let mut buf = BytesMut::with_capacity(READ_BUFFER_CAPACITY);

        'conn: loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!(addr = %self.addr, "closing connection on server shutdown");
                    break 'conn;
                }
                read = read_half.read_buf(&mut buf) => {
                    let eof = match read {
                        Ok(0) => true,
                        Ok(_) => false,
                        Err(e) => {
                            debug!(addr = %self.addr, "connection read error: {e}");
                            break 'conn;
                        }
                    };

                    loop {
                        match codec.decode(&mut buf) {
                            Ok(Some(frame)) => {
                                if !self.handle_frame(frame).await {
                                    break 'conn;
                                }
                            }
                            Ok(None) => break,
                            Err(CitrineError::Io(e)) => {
                                debug!(addr = %self.addr, "connection io error: {e}");
                                break 'conn;
                            }
                            Err(e) => {
                                // Protocol error: report it, keep the stream alive.
                                self.session.push_frame(RespFrame::Error(e.to_string()));
                            }
                        }
                    }

                    if eof {
                        break 'conn;
                    }
                }
            }
        }

        // Leaving: drop out of every subscribed channel, then give the writer
        // a bounded window to flush what is still queued.
        self.engine.hub.unsubscribe_all(&mut self.session).await;
        self.session.outbox = None;
        if tokio::time::timeout(CLOSE_DRAIN_TIMEOUT, writer_task)
            .await
            .is_err()
        {
            warn!(addr = %self.addr, "timed out draining replies on close");
        }
        debug!(addr = %self.addr, "connection closed");
    }

    /// Dispatches one decoded frame. Returns false when the connection
    /// should stop.
    async fn handle_frame(&mut self, frame: RespFrame) -> bool {
        let line = match frame.into_cmdline() {
            Ok(line) => line,
            Err(e) => {
                self.session.push_frame(RespFrame::Error(e.to_string()));
                return true;
            }
        };
        // Blank inline lines decode to an empty command; ignore them.
        if line.is_empty() {
            return true;
        }

        // A panicking command handler must not take the server down: catch
        // it at the connection boundary, answer with an error, carry on.
        let exec = AssertUnwindSafe(self.engine.exec(&mut self.session, &line));
        let reply = match exec.catch_unwind().await {
            Ok(reply) => reply,
            Err(panic) => {
                error!(addr = %self.addr, ?panic, "command handler panicked");
                RespValue::Error("ERR internal error: unknown error".into())
            }
        };

        match reply {
            RespValue::NoReply => {}
            reply => self.session.push_frame(reply.into()),
        }
        true
    }
}
