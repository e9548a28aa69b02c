use std::path::PathBuf;
use std::sync::Arc;

use ignite_core::config::Config;
use ignite_core::content::Dirty;
use ignite_core::db::ContentDb;
use ignite_core::publish::ModeChange;
use ignite_core::types::{EntityKind, Id};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

/// Events pushed to `/api/events` subscribers.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// A content row or its draft changed.
    Update { kind: EntityKind, id: Id },
    ModeChange(ModeChange),
    /// Completion flags were recomputed in the background.
    Progress { recomputed: usize },
}

impl ServerEvent {
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Update { .. } => "update",
            ServerEvent::ModeChange(_) => "mode_change",
            ServerEvent::Progress { .. } => "progress",
        }
    }
}

/// Shared application state passed to all route handlers.
#[derive(Clone)]
pub struct AppState {
    pub root: PathBuf,
    pub db: Arc<ContentDb>,
    pub config: Arc<Config>,
    pub event_tx: broadcast::Sender<ServerEvent>,
    recompute_tx: mpsc::UnboundedSender<Dirty>,
}

impl AppState {
    /// Open the project database under `root` and start the recompute worker.
    pub fn open(root: PathBuf) -> ignite_core::Result<Self> {
        let config = Arc::new(Config::load(&root)?);
        let db = Arc::new(ContentDb::open_root(&root)?);
        let (event_tx, _) = broadcast::channel(64);
        let (recompute_tx, recompute_rx) = mpsc::unbounded_channel();

        // Guard: only spawn if inside a Tokio runtime (skipped in sync unit tests).
        if tokio::runtime::Handle::try_current().is_ok() {
            tokio::spawn(recompute_worker(
                db.clone(),
                config.clone(),
                event_tx.clone(),
                recompute_rx,
            ));
        }

        Ok(Self {
            root,
            db,
            config,
            event_tx,
            recompute_tx,
        })
    }

    /// Broadcast to SSE listeners. Having no listener is not an error.
    pub fn notify(&self, event: ServerEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Queue lesson and project states for background recomputation.
    pub fn schedule_recompute(&self, dirty: Dirty) {
        if dirty.lesson_states.is_empty() && dirty.project_states.is_empty() {
            return;
        }
        if self.recompute_tx.send(dirty).is_err() {
            tracing::warn!("recompute worker is not running; completion flags may be stale");
        }
    }
}

/// Drain queued dirty sets in batches and recompute them in one write
/// transaction per batch.
async fn recompute_worker(
    db: Arc<ContentDb>,
    config: Arc<Config>,
    event_tx: broadcast::Sender<ServerEvent>,
    mut rx: mpsc::UnboundedReceiver<Dirty>,
) {
    let batch = config.server.recompute_batch.max(1);
    while let Some(first) = rx.recv().await {
        let mut dirty = first;
        let mut queued = 1;
        while queued < batch {
            match rx.try_recv() {
                Ok(more) => {
                    dirty.lesson_states.extend(more.lesson_states);
                    dirty.project_states.extend(more.project_states);
                    queued += 1;
                }
                Err(_) => break,
            }
        }
        dirty.lesson_states.sort_unstable();
        dirty.lesson_states.dedup();
        dirty.project_states.sort_unstable();
        dirty.project_states.dedup();

        let db = db.clone();
        let progress = config.progress.clone();
        let result = tokio::task::spawn_blocking(move || {
            db.update(|tx| ignite_core::progress::recompute_dirty(tx, &progress, &dirty))
        })
        .await;

        match result {
            Ok(Ok(recomputed)) => {
                tracing::debug!(recomputed, "background recompute finished");
                let _ = event_tx.send(ServerEvent::Progress { recomputed });
            }
            Ok(Err(e)) => tracing::error!(error = %e, "background recompute failed"),
            Err(e) => tracing::error!(error = %e, "recompute task join error"),
        }
    }
    tracing::debug!("recompute worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn init(dir: &TempDir) {
        Config::new("test").save(dir.path()).unwrap();
    }

    #[test]
    fn open_requires_init() {
        let dir = TempDir::new().unwrap();
        let err = AppState::open(dir.path().to_path_buf()).err().unwrap();
        assert!(matches!(err, ignite_core::IgniteError::NotInitialized));
    }

    #[test]
    fn open_stores_root_and_config() {
        let dir = TempDir::new().unwrap();
        init(&dir);
        let state = AppState::open(dir.path().to_path_buf()).unwrap();
        assert_eq!(state.root, dir.path());
        assert_eq!(state.config.project.name, "test");
    }

    #[test]
    fn event_names() {
        assert_eq!(
            ServerEvent::Update { kind: EntityKind::Step, id: 1 }.name(),
            "update"
        );
        assert_eq!(ServerEvent::Progress { recomputed: 0 }.name(), "progress");
    }
}
