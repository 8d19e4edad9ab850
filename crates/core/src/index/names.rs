//! Name-heuristic index: logical script name -> files carrying that name.

use crate::script::{self, ScriptFile};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

/// Buckets of script paths keyed by logical name.
///
/// Name collisions across directories are expected; a bucket keeps every
/// path in the order it was observed and the resolver scores them.
#[derive(Debug, Default)]
pub struct NameIndex {
    enabled: bool,
    buckets: HashMap<String, Vec<PathBuf>>,
    scan_token: Option<CancellationToken>,
}

impl NameIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Turns the index on. Returns the token the caller's bulk scan must
    /// honour, or `None` when the index was already enabled.
    pub fn enable(&mut self) -> Option<CancellationToken> {
        if self.enabled {
            return None;
        }
        self.enabled = true;
        let token = CancellationToken::new();
        self.scan_token = Some(token.clone());
        info!("Name index enabled");
        Some(token)
    }

    /// Turns the index off and drops all state, cancelling any scan.
    pub fn disable(&mut self) {
        if let Some(token) = self.scan_token.take() {
            token.cancel();
        }
        self.buckets.clear();
        if self.enabled {
            info!("Name index disabled");
        }
        self.enabled = false;
    }

    pub fn on_file_created(&mut self, path: &Path) {
        if !self.enabled {
            trace!("Ignoring create for {} while disabled", path.display());
            return;
        }
        let Some(file) = ScriptFile::from_path(path) else {
            return;
        };
        let bucket = self.buckets.entry(file.name).or_default();
        if !bucket.contains(&file.path) {
            bucket.push(file.path);
        }
    }

    pub fn on_file_deleted(&mut self, path: &Path) {
        if !self.enabled {
            return;
        }
        let Some(file) = ScriptFile::from_path(path) else {
            return;
        };
        let Some(bucket) = self.buckets.get_mut(&file.name) else {
            return;
        };
        if let Some(position) = bucket.iter().position(|p| *p == file.path) {
            bucket.remove(position);
        }
        if bucket.is_empty() {
            self.buckets.remove(&file.name);
        }
    }

    /// Drops every entry under a removed directory.
    pub fn on_directory_deleted(&mut self, dir: &Path) {
        if !self.enabled {
            return;
        }
        let dir = script::normalize_path(dir);
        self.buckets.retain(|_, bucket| {
            bucket.retain(|p| !p.starts_with(&dir));
            !bucket.is_empty()
        });
    }

    /// Applies one batch of bulk-scan results. Batches delivered after the
    /// scan was cancelled are dropped; earlier batches stay in place.
    pub fn seed(&mut self, batch: &[PathBuf], token: &CancellationToken) -> bool {
        if token.is_cancelled() || !self.enabled {
            debug!("Dropping scan batch of {} paths", batch.len());
            return false;
        }
        for path in batch {
            self.on_file_created(path);
        }
        true
    }

    /// Marks the bulk scan as finished so `disable` has nothing to cancel.
    pub fn finish_scan(&mut self, token: &CancellationToken) {
        if let Some(current) = &self.scan_token {
            if !current.is_cancelled() && !token.is_cancelled() {
                self.scan_token = None;
            }
        }
    }

    pub fn lookup_by_name(&self, name: &str) -> &[PathBuf] {
        self.buckets.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    /// Reconciles a manifest-derived guess (a path without extension) with
    /// the files actually on disk.
    ///
    /// Checked in priority order over the whole bucket: a directory module
    /// whose directory is the candidate, a file whose suffix-stripped path is
    /// the candidate, the candidate plus the default extension, and finally
    /// the candidate itself (a manifest `$path` naming a file). Without an
    /// index nothing can be validated and the default extension is assumed.
    pub fn find_corrected_path(&self, candidate: &Path, expected_name: &str) -> Option<PathBuf> {
        if !self.enabled {
            return Some(script::with_default_extension(candidate));
        }
        let bucket = self.lookup_by_name(expected_name);

        if let Some(found) = bucket
            .iter()
            .find(|p| script::is_directory_module(p) && p.parent() == Some(candidate))
        {
            return Some(found.clone());
        }
        if let Some(found) = bucket
            .iter()
            .find(|p| script::strip_script_suffix(p).as_deref() == Some(candidate))
        {
            return Some(found.clone());
        }
        let with_extension = script::with_default_extension(candidate);
        if let Some(found) = bucket.iter().find(|p| **p == with_extension) {
            return Some(found.clone());
        }
        bucket.iter().find(|p| p.as_path() == candidate).cloned()
    }
}
