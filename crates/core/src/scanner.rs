//! Bulk discovery of scripts and manifests under a workspace root.
//!
//! Used to seed the indices when they are enabled. Paths are delivered in
//! batches; cancellation is only observed between batches.

use crate::index::is_manifest_path;
use crate::script::is_script_path;
use ignore::WalkBuilder;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const DEFAULT_BATCH_SIZE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanTarget {
    Scripts,
    Manifests,
}

impl ScanTarget {
    pub fn matches(self, path: &Path) -> bool {
        match self {
            ScanTarget::Scripts => is_script_path(path),
            ScanTarget::Manifests => is_manifest_path(path),
        }
    }
}

/// Directories never worth descending into.
pub fn is_relevant_path(path: &Path) -> bool {
    if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
        if name.starts_with('.') && name.len() > 1 {
            return false;
        }
        if name == "target" || name == "build" || name == "node_modules" {
            return false;
        }
    }
    true
}

/// Whether a watched `path` would also have been picked up by a scan of
/// `root`: every component below the root has to pass [`is_relevant_path`].
pub fn is_watched_path(root: &Path, path: &Path) -> bool {
    let Ok(relative) = path.strip_prefix(root) else {
        return false;
    };
    relative
        .components()
        .all(|component| is_relevant_path(Path::new(component.as_os_str())))
}

pub struct Scanner;

impl Scanner {
    /// Walks `root` and hands matching files to `on_batch` in groups of
    /// `batch_size`. Stops early once `token` is cancelled; returns the
    /// number of paths delivered.
    pub fn scan_batches(
        root: &Path,
        target: ScanTarget,
        token: &CancellationToken,
        batch_size: usize,
        mut on_batch: impl FnMut(Vec<PathBuf>) -> bool,
    ) -> usize {
        let batch_size = batch_size.max(1);
        let mut delivered = 0;
        let mut batch = Vec::with_capacity(batch_size);

        // Every script under the root counts, ignore files included
        let walker = WalkBuilder::new(root)
            .hidden(false)
            .git_ignore(false)
            .git_global(false)
            .git_exclude(false)
            .ignore(false)
            .parents(false)
            .filter_entry(|entry| entry.depth() == 0 || is_relevant_path(entry.path()))
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    warn!("Failed to read entry during scan: {}", err);
                    continue;
                }
            };
            let is_file = entry.file_type().is_some_and(|t| t.is_file());
            if !is_file || !target.matches(entry.path()) {
                continue;
            }
            batch.push(entry.into_path());

            if batch.len() >= batch_size {
                if token.is_cancelled() {
                    debug!("Scan of {} cancelled", root.display());
                    return delivered;
                }
                delivered += batch.len();
                if !on_batch(std::mem::replace(&mut batch, Vec::with_capacity(batch_size))) {
                    return delivered;
                }
            }
        }

        if !batch.is_empty() && !token.is_cancelled() {
            delivered += batch.len();
            on_batch(batch);
        }
        delivered
    }

    /// Runs [`Scanner::scan_batches`] on the blocking pool and streams the
    /// batches over a channel. The channel closes when the walk ends.
    pub fn spawn(
        root: PathBuf,
        target: ScanTarget,
        token: CancellationToken,
    ) -> mpsc::Receiver<Vec<PathBuf>> {
        let (tx, rx) = mpsc::channel(4);
        tokio::task::spawn_blocking(move || {
            let total = Self::scan_batches(&root, target, &token, DEFAULT_BATCH_SIZE, |batch| {
                tx.blocking_send(batch).is_ok()
            });
            debug!("Scan of {} for {:?} found {} files", root.display(), target, total);
        });
        rx
    }

    pub fn collect_paths(root: &Path, target: ScanTarget) -> Vec<PathBuf> {
        let mut paths = Vec::new();
        let token = CancellationToken::new();
        Self::scan_batches(root, target, &token, DEFAULT_BATCH_SIZE, |batch| {
            paths.extend(batch);
            true
        });
        paths
    }
}
