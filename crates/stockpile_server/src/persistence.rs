//! Periodic dirty-flush writer.

use crate::error::{ServerError, ServerResult};
use std::sync::Arc;
use std::time::Duration;
use stockpile_core::{Database, EntryFile};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info};

/// Background task that rewrites the entry file while the database is dirty.
///
/// Every `interval` the writer asks the database for a dirty snapshot. If
/// there is one, the whole file is rewritten on the blocking pool and the
/// snapshot is marked as flushed. A failed write is logged and leaves the
/// database dirty, so the next tick retries.
///
/// # Example
///
/// ```rust,ignore
/// let (stop_tx, stop_rx) = tokio::sync::watch::channel(false);
/// let task = PersistenceWriter::new(db, file, Duration::from_secs(900)).spawn(stop_rx);
/// // ...
/// stop_tx.send(true)?;
/// task.await?;
/// ```
pub struct PersistenceWriter {
    db: Arc<Database>,
    file: Arc<EntryFile>,
    interval: Duration,
    flush_on_shutdown: bool,
}

impl PersistenceWriter {
    /// Creates a writer for `db` backed by `file`.
    pub fn new(db: Arc<Database>, file: Arc<EntryFile>, interval: Duration) -> Self {
        Self {
            db,
            file,
            interval,
            flush_on_shutdown: true,
        }
    }

    /// Enables or disables the final flush when the writer is stopped.
    pub fn with_flush_on_shutdown(mut self, enabled: bool) -> Self {
        self.flush_on_shutdown = enabled;
        self
    }

    /// Writes the database out if it is dirty.
    ///
    /// Returns true if a write happened.
    ///
    /// # Errors
    ///
    /// Returns an error if the file could not be rewritten. The database
    /// stays dirty in that case.
    pub async fn flush_once(&self) -> ServerResult<bool> {
        let Some(ticket) = self.db.take_dirty_snapshot() else {
            return Ok(false);
        };

        let file = Arc::clone(&self.file);
        let ticket = tokio::task::spawn_blocking(move || {
            file.write(ticket.entries()).map(|()| ticket)
        })
        .await
        .map_err(|e| ServerError::Internal(format!("flush task failed: {e}")))??;

        let clean = self.db.complete_flush(&ticket);
        debug!(
            path = %self.file.path().display(),
            entries = ticket.entries().len(),
            version = ticket.version(),
            clean,
            "flushed entry file"
        );
        Ok(true)
    }

    /// Runs until `shutdown` turns true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        info!(
            path = %self.file.path().display(),
            interval_ms = self.interval.as_millis() as u64,
            "persistence writer started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.flush_once().await {
                        error!(path = %self.file.path().display(), error = %err, "flush failed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        if self.flush_on_shutdown {
            match self.flush_once().await {
                Ok(true) => info!(path = %self.file.path().display(), "final flush written"),
                Ok(false) => {}
                Err(err) => {
                    error!(path = %self.file.path().display(), error = %err, "final flush failed");
                }
            }
        }
        info!(path = %self.file.path().display(), "persistence writer stopped");
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(self.run(shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use stockpile_protocol::Entry;
    use tempfile::TempDir;

    fn setup(dir: &TempDir) -> (Arc<Database>, Arc<EntryFile>) {
        let path = dir.path().join("entries.db");
        let file = EntryFile::open(&path).unwrap();
        let db = Database::from_entries(file.load().unwrap().entries);
        (Arc::new(db), Arc::new(file))
    }

    #[tokio::test]
    async fn flush_once_skips_clean_database() {
        let dir = TempDir::new().unwrap();
        let (db, file) = setup(&dir);
        let writer = PersistenceWriter::new(db, file, Duration::from_secs(60));
        assert!(!writer.flush_once().await.unwrap());
    }

    #[tokio::test]
    async fn flush_once_writes_and_clears_dirty() {
        let dir = TempDir::new().unwrap();
        let (db, file) = setup(&dir);
        db.apply("+1|0|ax").unwrap();
        db.apply("+1|1|by").unwrap();

        let writer = PersistenceWriter::new(Arc::clone(&db), file, Duration::from_secs(60));
        assert!(writer.flush_once().await.unwrap());
        assert!(!db.is_dirty());
        assert_eq!(
            fs::read_to_string(dir.path().join("entries.db")).unwrap(),
            "1|0|ax\n1|1|by\n"
        );
    }

    #[tokio::test]
    async fn missing_remove_flushes_identical_bytes() {
        let dir = TempDir::new().unwrap();
        let (db, file) = setup(&dir);
        db.apply("+1|0|ax").unwrap();
        let writer = PersistenceWriter::new(Arc::clone(&db), file, Duration::from_secs(60));
        writer.flush_once().await.unwrap();
        let before = fs::read(dir.path().join("entries.db")).unwrap();

        db.apply("-1|0|zz").unwrap();
        writer.flush_once().await.unwrap();
        let after = fs::read(dir.path().join("entries.db")).unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn failed_write_keeps_database_dirty() {
        let dir = TempDir::new().unwrap();
        let (db, file) = setup(&dir);
        db.apply("+1|0|ax").unwrap();

        // A directory where the temp file should go makes the write fail.
        fs::create_dir(dir.path().join("entries.db.tmp")).unwrap();
        let writer = PersistenceWriter::new(Arc::clone(&db), file, Duration::from_secs(60));
        assert!(writer.flush_once().await.is_err());
        assert!(db.is_dirty());

        fs::remove_dir(dir.path().join("entries.db.tmp")).unwrap();
        assert!(writer.flush_once().await.unwrap());
        assert!(!db.is_dirty());
    }

    #[tokio::test]
    async fn periodic_cycle_persists_mutation() {
        let dir = TempDir::new().unwrap();
        let (db, file) = setup(&dir);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = PersistenceWriter::new(Arc::clone(&db), file, Duration::from_millis(100))
            .with_flush_on_shutdown(false)
            .spawn(stop_rx);

        db.apply("+1|0|ax").unwrap();
        time::sleep(Duration::from_millis(200)).await;
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        assert_eq!(
            fs::read_to_string(dir.path().join("entries.db")).unwrap(),
            "1|0|ax\n"
        );
        assert!(!db.is_dirty());
    }

    #[tokio::test]
    async fn shutdown_performs_final_flush() {
        let dir = TempDir::new().unwrap();
        let (db, file) = setup(&dir);
        let (stop_tx, stop_rx) = watch::channel(false);
        let task = PersistenceWriter::new(Arc::clone(&db), file, Duration::from_secs(3600))
            .spawn(stop_rx);

        db.apply("+3|0|fookitchen").unwrap();
        stop_tx.send(true).unwrap();
        task.await.unwrap();

        let report =
            stockpile_core::read_entries(&dir.path().join("entries.db")).unwrap();
        assert_eq!(report.entries, vec![Entry::new("foo", "kitchen", 0)]);
    }
}
