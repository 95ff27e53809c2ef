use std::{
    path::PathBuf,
    sync::{mpsc, Arc},
    thread::{self, JoinHandle},
};

use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

type Job = Box<dyn FnOnce(&mut Connection) + Send + 'static>;

/// Owns the thread that holds the connection. Dropping the last handle closes
/// the job queue, lets the thread drain it and joins it.
struct Worker {
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Alert log worker panicked");
            }
        }
    }
}

/// Handle to the SQLite alert log. All statements run on one worker thread;
/// callers await the reply over a oneshot channel.
#[derive(Clone)]
pub struct Database {
    worker: Arc<Worker>,
}

impl Database {
    /// Opens (or creates) the log at `db_path` and brings the schema up to
    /// date before any job is accepted.
    pub fn new(db_path: PathBuf) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create database directory {}", parent.display())
            })?;
        }

        let mut conn = Connection::open(&db_path)
            .with_context(|| format!("failed to open alert log at {}", db_path.display()))?;
        if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("Alert log stays in rollback journal mode: {err}");
        }
        run_migrations(&mut conn).context("failed to run database migrations")?;

        let (jobs, queue) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name("walksafe-db".into())
            .spawn(move || {
                for job in queue {
                    job(&mut conn);
                }
                debug!("Alert log worker stopped");
            })
            .context("failed to spawn database worker thread")?;

        info!("Alert log ready at {}", db_path.display());

        Ok(Self {
            worker: Arc::new(Worker {
                jobs: Some(jobs),
                thread: Some(thread),
            }),
        })
    }

    pub async fn execute<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let (reply_tx, reply_rx) = oneshot::channel();
        let job: Job = Box::new(move |conn| {
            // the caller may have given up waiting
            let _ = reply_tx.send(task(conn));
        });

        self.worker
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("alert log is closed"))?
            .send(job)
            .map_err(|_| anyhow!("alert log worker has stopped"))?;

        reply_rx
            .await
            .map_err(|_| anyhow!("alert log worker dropped the request"))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn user_version(db: &Database) -> i32 {
        db.execute(|conn| Ok(conn.query_row("PRAGMA user_version", [], |row| row.get(0))?))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn schema_is_ready_before_first_job() {
        let dir = tempdir().unwrap();
        let db = Database::new(dir.path().join("log.sqlite3")).unwrap();
        assert_eq!(user_version(&db).await, 2);
    }

    #[tokio::test]
    async fn last_handle_closes_the_worker() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log.sqlite3");

        let db = Database::new(path.clone()).unwrap();
        let clone = db.clone();
        drop(db);
        clone
            .execute(|conn| {
                conn.execute_batch("CREATE TABLE scratch (id INTEGER)")?;
                Ok(())
            })
            .await
            .unwrap();
        drop(clone);

        let reopened = Database::new(path).unwrap();
        let tables: i64 = reopened
            .execute(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 'scratch'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[test]
    fn unopenable_path_is_reported() {
        let dir = tempdir().unwrap();
        // a directory cannot be opened as a database file
        assert!(Database::new(dir.path().to_path_buf()).is_err());
    }
}
