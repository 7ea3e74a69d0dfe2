//! Configuration file watcher for hot reload.
//!
//! Every content change re-reads and validates the file. Only configs that pass
//! validation reach the channel; a broken edit is logged and dropped, and the gate
//! keeps its current policies.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

use crate::config::loader::load_config;
use crate::config::schema::GateConfig;

/// Poll interval for backends without native change notification.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Watches one config file and pushes validated configs to the server.
pub struct ConfigWatcher {
    path: PathBuf,
    updates: mpsc::UnboundedSender<GateConfig>,
}

impl ConfigWatcher {
    /// Returns the watcher and the receiving end of the reload channel.
    pub fn new(path: &Path) -> (Self, mpsc::UnboundedReceiver<GateConfig>) {
        let (updates, update_rx) = mpsc::unbounded_channel();
        (
            Self {
                path: path.to_path_buf(),
                updates,
            },
            update_rx,
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start watching on notify's background thread.
    ///
    /// Reloads stop when the returned handle is dropped.
    pub fn run(self) -> Result<RecommendedWatcher, notify::Error> {
        let Self { path, updates } = self;
        let watched = path.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| match res {
                Ok(event) if is_content_change(&event.kind) => push_reload(&watched, &updates),
                Ok(_) => {}
                Err(e) => tracing::warn!(error = %e, "Config watch error"),
            },
            Config::default().with_poll_interval(POLL_INTERVAL),
        )?;
        watcher.watch(&path, RecursiveMode::NonRecursive)?;

        tracing::info!(path = %path.display(), "Config watcher started");
        Ok(watcher)
    }
}

/// Creates and data writes count; permission or timestamp changes do not.
fn is_content_change(kind: &EventKind) -> bool {
    match kind {
        EventKind::Create(_) => true,
        EventKind::Modify(ModifyKind::Metadata(_)) => false,
        EventKind::Modify(_) => true,
        _ => false,
    }
}

fn push_reload(path: &Path, updates: &mpsc::UnboundedSender<GateConfig>) {
    match load_config(path) {
        Ok(config) => {
            tracing::info!(path = %path.display(), "Config change detected");
            if updates.send(config).is_err() {
                tracing::debug!("Reload receiver gone, ignoring change");
            }
        }
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                error = %e,
                "Rejected config change, keeping current policies"
            );
        }
    }
}
