// src/core/aof/rewrite.rs

//! The three-phase AOF rewrite: compacts the file into the minimum command
//! sequence that reconstructs the current keyspace, while regular writes
//! keep flowing.
//!
//! Phase 1 snapshots `(size, current_db)` under the pause mutex. Phase 2
//! runs without any lock: it replays the snapshot prefix into a private
//! engine and dumps reconstruction commands into a temporary file. Phase 3
//! retakes the mutex, splices in the tail the live file grew during phase 2,
//! and atomically renames the temporary file over the live one.

use super::{Aof, replay_file, select_cmd};
use crate::core::CitrineError;
use crate::core::database::Engine;
use crate::core::database::commands::pexpireat_cmd;
use crate::core::protocol::RespFrame;
use std::io::{Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Snapshot metadata carried across the three phases.
pub struct RewriteContext {
    tmp_file: std::fs::File,
    tmp_path: PathBuf,
    /// Live file size at the start of the rewrite; everything past this
    /// offset was written while the rewrite ran.
    base_size: u64,
    /// The db cursor at the start of the rewrite.
    base_db: usize,
}

impl Aof {
    /// Runs a full rewrite cycle.
    pub async fn rewrite(self: &Arc<Self>) -> Result<(), CitrineError> {
        let ctx = self.start_rewrite().await?;
        let ctx = self.do_rewrite(ctx).await?;
        self.finish_rewrite(ctx).await?;
        info!("AOF rewrite finished");
        Ok(())
    }

    /// Phase 1: under the pause mutex, fsync the live file and snapshot its
    /// size and db cursor; create the temporary target.
    pub(crate) async fn start_rewrite(&self) -> Result<RewriteContext, CitrineError> {
        let guard = self.file.lock().await;
        guard
            .sync()
            .map_err(|e| CitrineError::AofError(format!("fsync before rewrite failed: {e}")))?;

        let base_size = std::fs::metadata(&self.path)?.len();
        let tmp_path = self.path.with_extension("rewrite");
        let tmp_file = std::fs::File::create(&tmp_path)?;

        Ok(RewriteContext {
            tmp_file,
            tmp_path,
            base_size,
            base_db: guard.current_db,
        })
    }

    /// Phase 2: no lock held. Replay the first `base_size` bytes into a
    /// private engine, then dump every database as reconstruction commands.
    pub(crate) async fn do_rewrite(
        &self,
        mut ctx: RewriteContext,
    ) -> Result<RewriteContext, CitrineError> {
        let engine = self
            .engine
            .upgrade()
            .ok_or_else(|| CitrineError::Internal("engine gone during rewrite".into()))?;

        let shadow = Engine::new(engine.config.clone());
        replay_file(&shadow, &self.path, Some(ctx.base_size)).await?;

        for index in 0..shadow.database_count() {
            ctx.tmp_file
                .write_all(&RespFrame::from_cmdline(&select_cmd(index)).encode_to_vec())?;

            let db = shadow.db_at(index)?;
            let mut io_result = Ok(());
            db.for_each(|key, entity, expiration| {
                let rebuild = entity.to_rebuild_cmd(key);
                if let Err(e) = ctx
                    .tmp_file
                    .write_all(&RespFrame::from_cmdline(&rebuild).encode_to_vec())
                {
                    io_result = Err(e);
                    return false;
                }
                if let Some(at) = expiration {
                    let expire = pexpireat_cmd(key, at);
                    if let Err(e) = ctx
                        .tmp_file
                        .write_all(&RespFrame::from_cmdline(&expire).encode_to_vec())
                    {
                        io_result = Err(e);
                        return false;
                    }
                }
                true
            });
            io_result?;
        }

        // The shadow engine's wheel would otherwise keep ticking forever.
        shadow.wheel.stop();
        Ok(ctx)
    }

    /// Phase 3: under the pause mutex, splice the tail written during the
    /// rewrite onto the temporary file, atomically swap it in, and re-align
    /// the cursor of the reopened live file.
    pub(crate) async fn finish_rewrite(&self, mut ctx: RewriteContext) -> Result<(), CitrineError> {
        let mut guard = self.file.lock().await;

        let mut live = std::fs::File::open(&self.path)?;
        live.seek(SeekFrom::Start(ctx.base_size))?;

        // The tail was written relative to the snapshot's db cursor.
        ctx.tmp_file
            .write_all(&RespFrame::from_cmdline(&select_cmd(ctx.base_db)).encode_to_vec())?;
        std::io::copy(&mut live, &mut ctx.tmp_file)?;
        ctx.tmp_file.sync_all()?;
        drop(ctx.tmp_file);
        drop(live);

        std::fs::rename(&ctx.tmp_path, &self.path)?;

        let reopened = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        guard.file = reopened;

        // Keep the on-disk cursor aligned with the in-memory one.
        let select_frame = RespFrame::from_cmdline(&select_cmd(guard.current_db)).encode_to_vec();
        guard.file.write_all(&select_frame)?;
        Ok(())
    }
}
