use std::{
    path::PathBuf,
    sync::{mpsc, Arc, Mutex},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{error, info};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;
use super::models::KvEntry;
use super::repositories::kv;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests understood by the storage thread.
pub(crate) enum DbCommand {
    Get { key: String, reply: Reply<Option<KvEntry>> },
    Put { key: String, value: String, reply: Reply<()> },
    Close,
}

impl DbCommand {
    fn apply(self, conn: &Connection) -> bool {
        match self {
            DbCommand::Get { key, reply } => respond(reply, kv::select_entry(conn, &key)),
            DbCommand::Put { key, value, reply } => respond(reply, kv::upsert(conn, &key, &value)),
            DbCommand::Close => return false,
        }
        true
    }
}

fn respond<T>(reply: Reply<T>, result: Result<T>) {
    if reply.send(result).is_err() {
        error!("DB caller dropped before receiving result");
    }
}

struct DatabaseInner {
    sender: mpsc::Sender<DbCommand>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl DatabaseInner {
    fn take_worker(&self) -> Option<JoinHandle<()>> {
        match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Ask the thread to stop; returns its handle if it was still running.
    fn shut_down(&self) -> Option<JoinHandle<()>> {
        let handle = self.take_worker()?;
        if self.sender.send(DbCommand::Close).is_err() {
            error!("DB thread already gone before close");
        }
        Some(handle)
    }
}

impl Drop for DatabaseInner {
    fn drop(&mut self) {
        if let Some(handle) = self.shut_down() {
            if let Err(join_err) = handle.join() {
                error!("Failed to join DB thread: {join_err:?}");
            }
        }
    }
}

/// Handle to the SQLite connection, which lives on its own thread.
///
/// Requests travel to that thread as [`DbCommand`]s and answers come back over a
/// oneshot, so async callers never block on disk I/O. Clones share the thread.
#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let (command_tx, command_rx) = mpsc::channel::<DbCommand>();
        let (ready_tx, ready_rx) = mpsc::channel();
        let path_for_thread = db_path.clone();

        let worker = thread::Builder::new()
            .name("sleeptrack-db".into())
            .spawn(move || {
                let mut conn = match Connection::open(&path_for_thread) {
                    Ok(connection) => connection,
                    Err(err) => {
                        let _ = ready_tx.send(Err(anyhow::Error::new(err)
                            .context("failed to open SQLite database")));
                        return;
                    }
                };

                if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
                    error!("Failed to enable WAL mode: {err}");
                }

                let init_result =
                    run_migrations(&mut conn).context("failed to run database migrations");
                if ready_tx.send(init_result).is_err() {
                    error!("DB initialization receiver dropped before ready signal");
                    return;
                }

                while let Ok(command) = command_rx.recv() {
                    if !command.apply(&conn) {
                        break;
                    }
                }

                info!("Database thread shutting down");
            })
            .context("failed to spawn database worker thread")?;

        ready_rx
            .recv()
            .context("database worker exited before signaling readiness")??;

        info!("Database initialized at {}", db_path.display());

        Ok(Self {
            inner: Arc::new(DatabaseInner {
                sender: command_tx,
                worker: Mutex::new(Some(worker)),
            }),
        })
    }

    pub(crate) async fn request<T>(&self, build: impl FnOnce(Reply<T>) -> DbCommand) -> Result<T> {
        let (reply_tx, reply_rx) = oneshot::channel();

        self.inner
            .sender
            .send(build(reply_tx))
            .map_err(|_| anyhow!("database is closed"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("database thread terminated unexpectedly"))?
    }

    /// Stop the storage thread and wait for it to exit. Later requests on any
    /// clone fail with "database is closed".
    pub async fn close(&self) -> Result<()> {
        let Some(handle) = self.inner.shut_down() else {
            return Ok(());
        };

        tokio::task::spawn_blocking(move || handle.join())
            .await
            .context("database close worker failed to join")?
            .map_err(|_| anyhow!("database thread panicked"))?;

        info!("Database closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn requests_fail_once_closed() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::new(dir.path().join("close.sqlite3")).unwrap();
        let other = db.clone();

        db.put_value("k", "v".into()).await.unwrap();
        db.close().await.unwrap();
        db.close().await.unwrap();

        let err = other.get_value("k").await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }

    #[tokio::test]
    async fn reopening_sees_data_written_before_close() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reopen.sqlite3");

        let db = Database::new(path.clone()).unwrap();
        db.put_value("k", "v".into()).await.unwrap();
        db.close().await.unwrap();

        let reopened = Database::new(path).unwrap();
        assert_eq!(reopened.get_value("k").await.unwrap().as_deref(), Some("v"));
    }
}
