//! Output engine: owns the indices for one workspace, keeps them current
//! from filesystem events and answers resolve/process calls.
//!
//! Index mutation is serialized behind a single lock; the watcher applies
//! one event at a time, so readers always see a fully applied event.

use crate::config::Settings;
use crate::error::Result;
use crate::index::{ScriptIndex, is_manifest_path};
use crate::pipeline::TextPipeline;
use crate::resolver::{ResolvePath, Resolver};
use crate::scanner::{ScanTarget, Scanner, is_watched_path};
use crate::script::{is_script_path, normalize_path};
use crate::watch::{FsWatcher, WatchEvent};
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub scripts: usize,
    pub manifests: usize,
}

pub struct OutputEngine {
    root: PathBuf,
    index: RwLock<ScriptIndex>,
    settings: RwLock<Settings>,
    cancel_token: CancellationToken,
}

impl OutputEngine {
    pub fn new(root: PathBuf, settings: Settings) -> Self {
        let root = root
            .canonicalize()
            .unwrap_or_else(|_| normalize_path(&root));
        Self {
            root,
            index: RwLock::new(ScriptIndex::new()),
            settings: RwLock::new(settings),
            cancel_token: CancellationToken::new(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn settings(&self) -> Settings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn read_index(&self) -> RwLockReadGuard<'_, ScriptIndex> {
        self.index.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_index(&self) -> RwLockWriteGuard<'_, ScriptIndex> {
        self.index.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn stats(&self) -> IndexStats {
        let index = self.read_index();
        IndexStats {
            scripts: index.names.len(),
            manifests: index.manifests.len(),
        }
    }

    pub fn resolve(&self, instance_path: &str) -> Option<PathBuf> {
        let mode = self.settings().script_path_resolver;
        let index = self.read_index();
        Resolver::new(&index, mode).resolve(instance_path)
    }

    /// Runs raw engine output through the text pipeline.
    pub fn process(&self, raw: &str) -> String {
        let settings = self.settings();
        let index = self.read_index();
        let resolver = Resolver::new(&index, settings.script_path_resolver);
        TextPipeline::new(&settings, &resolver)
            .with_root(&self.root)
            .process(raw)
    }

    /// Enables the indices the configured resolver mode needs and seeds the
    /// newly enabled ones with a bulk scan. Calling it again is cheap.
    pub async fn enable(&self) {
        let mode = self.settings().script_path_resolver;
        let pending = {
            let mut index = self.write_index();
            index.apply_mode(mode)
        };
        if let Some(token) = pending.names {
            self.seed_scripts(token).await;
        }
        if let Some(token) = pending.manifests {
            self.seed_manifests(token).await;
        }
        let stats = self.stats();
        info!(
            "Indices ready: {} scripts, {} manifests",
            stats.scripts, stats.manifests
        );
    }

    pub fn disable(&self) {
        self.write_index().disable();
    }

    pub async fn update_settings(&self, settings: Settings) {
        *self
            .settings
            .write()
            .unwrap_or_else(PoisonError::into_inner) = settings;
        self.enable().await;
    }

    /// Stops background tasks and drops all index state.
    pub fn shutdown(&self) {
        self.cancel_token.cancel();
        self.disable();
    }

    async fn seed_scripts(&self, token: CancellationToken) {
        let mut batches = Scanner::spawn(self.root.clone(), ScanTarget::Scripts, token.clone());
        while let Some(batch) = batches.recv().await {
            let applied = {
                let mut index = self.write_index();
                index.names.seed(&batch, &token)
            };
            if !applied {
                debug!("Script scan cancelled");
                return;
            }
        }
        self.write_index().names.finish_scan(&token);
    }

    async fn seed_manifests(&self, token: CancellationToken) {
        let mut batches = Scanner::spawn(self.root.clone(), ScanTarget::Manifests, token.clone());
        while let Some(batch) = batches.recv().await {
            for path in batch {
                if token.is_cancelled() {
                    debug!("Manifest scan cancelled");
                    return;
                }
                self.manifest_created(&path).await;
            }
        }
        self.write_index().manifests.finish_scan(&token);
    }

    async fn manifest_created(&self, path: &Path) {
        let registered = {
            let mut index = self.write_index();
            index.manifests.register(path)
        };
        if registered {
            self.reload_manifest(path).await;
        }
    }

    async fn manifest_changed(&self, path: &Path) {
        let registered = {
            let mut index = self.write_index();
            index.manifests.is_registered(path) || index.manifests.register(path)
        };
        if registered {
            self.reload_manifest(path).await;
        }
    }

    /// Reads outside the lock; a manifest deleted meanwhile stays deleted.
    async fn reload_manifest(&self, path: &Path) {
        let contents = tokio::fs::read(path).await;
        let mut index = self.write_index();
        if !index.manifests.is_registered(path) {
            debug!("Manifest {} went away during read", path.display());
            return;
        }
        index.manifests.apply_contents(path, contents);
    }

    async fn directory_created(&self, dir: PathBuf) {
        let found = tokio::task::spawn_blocking(move || {
            (
                Scanner::collect_paths(&dir, ScanTarget::Scripts),
                Scanner::collect_paths(&dir, ScanTarget::Manifests),
            )
        })
        .await;
        let Ok((scripts, manifests)) = found else {
            return;
        };
        {
            let mut index = self.write_index();
            for script in &scripts {
                index.names.on_file_created(script);
            }
        }
        for manifest in &manifests {
            self.manifest_created(manifest).await;
        }
    }

    /// Applies one filesystem event to whichever index cares about it.
    /// Paths a bulk scan would skip are skipped here too.
    pub async fn handle_event(&self, event: WatchEvent) {
        if !is_watched_path(&self.root, event.path()) {
            trace!("Ignoring event for {}", event.path().display());
            return;
        }
        match event {
            WatchEvent::Created(path) => {
                if is_script_path(&path) {
                    self.write_index().names.on_file_created(&path);
                } else if is_manifest_path(&path) {
                    self.manifest_created(&path).await;
                } else if path.is_dir() {
                    self.directory_created(path).await;
                }
            }
            WatchEvent::Changed(path) => {
                if is_manifest_path(&path) {
                    self.manifest_changed(&path).await;
                }
            }
            WatchEvent::Deleted(path) => {
                let mut index = self.write_index();
                if is_script_path(&path) {
                    index.names.on_file_deleted(&path);
                } else if is_manifest_path(&path) {
                    index.manifests.on_manifest_deleted(&path);
                } else {
                    index.names.on_directory_deleted(&path);
                    index.manifests.on_directory_deleted(&path);
                }
            }
        }
    }

    /// Watch for filesystem changes and update the indices incrementally.
    /// The watcher task exits when `cancel_token` is cancelled.
    pub async fn start_watch_with_token(
        self: Arc<Self>,
        cancel_token: CancellationToken,
    ) -> Result<()> {
        let root = self.root.clone();
        let mut watcher = FsWatcher::new(&root)?;
        let engine_weak = Arc::downgrade(&self);

        tokio::spawn(async move {
            info!("Started watching {}", root.display());
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        break;
                    }
                    events = watcher.next_events() => {
                        let Some(events) = events else {
                            break;
                        };
                        let Some(engine) = engine_weak.upgrade() else {
                            break;
                        };
                        for event in events {
                            engine.handle_event(event).await;
                        }
                    }
                }
            }
            info!("File watcher task ended for {}", root.display());
        });

        Ok(())
    }

    /// Watches with the engine-wide cancellation token.
    pub async fn watch(self: Arc<Self>) -> Result<()> {
        let cancel_token = self.cancel_token.clone();
        self.start_watch_with_token(cancel_token).await
    }
}

impl ResolvePath for OutputEngine {
    fn resolve(&self, instance_path: &str) -> Option<PathBuf> {
        OutputEngine::resolve(self, instance_path)
    }
}
