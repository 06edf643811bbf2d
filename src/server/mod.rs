// src/server/mod.rs

//! The TCP accept loop: thin glue binding the listener, the per-connection
//! tasks, the client registry, and graceful shutdown.

use crate::config::Config;
use crate::connection::ConnectionHandler;
use crate::core::database::Engine;
use anyhow::{Context, Result};
use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tracing::{info, warn};

/// Registry entry for a connected client.
#[derive(Debug)]
pub struct ClientHandle {
    pub addr: SocketAddr,
}

pub async fn run(config: Config) -> Result<()> {
    config.validate()?;
    let config = Arc::new(config);
    let engine = Engine::with_persistence(config.clone())
        .await
        .context("failed to initialize database engine")?;

    let listener = TcpListener::bind((config.bind.as_str(), config.port))
        .await
        .with_context(|| format!("failed to bind {}:{}", config.bind, config.port))?;
    info!("citrine listening on {}:{}", config.bind, config.port);

    let clients: Arc<DashMap<u64, ClientHandle>> = Arc::new(DashMap::new());
    let next_client_id = AtomicU64::new(1);
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("shutdown signal received");
                break;
            }
            accepted = listener.accept() => {
                let (socket, addr) = match accepted {
                    Ok(pair) => pair,
                    Err(e) => {
                        warn!("accept failed: {e}");
                        continue;
                    }
                };

                if clients.len() >= config.maxclients {
                    reject_client(socket).await;
                    continue;
                }

                let id = next_client_id.fetch_add(1, Ordering::Relaxed);
                clients.insert(id, ClientHandle { addr });

                let engine = engine.clone();
                let clients = clients.clone();
                let shutdown_rx = shutdown_tx.subscribe();
                tokio::spawn(async move {
                    let (handler, outbox_rx) = ConnectionHandler::new(engine, id, addr);
                    handler.run(socket, outbox_rx, shutdown_rx).await;
                    clients.remove(&id);
                });
            }
        }
    }

    // Graceful shutdown: close client connections, then the persistence
    // pipeline (drain the queue, final fsync).
    let _ = shutdown_tx.send(());
    if let Some(aof) = engine.aof() {
        aof.close().await;
    }
    engine.wheel.stop();
    info!("citrine stopped");
    Ok(())
}

async fn reject_client(mut socket: TcpStream) {
    warn!("rejecting connection: max number of clients reached");
    let _ = socket
        .write_all(b"-ERR max number of clients reached\r\n")
        .await;
    let _ = socket.shutdown().await;
}
