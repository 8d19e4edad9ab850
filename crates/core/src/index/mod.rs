pub mod manifest;
pub mod names;

pub use manifest::{ManifestIndex, ManifestMatch, ManifestNode, ManifestTree, is_manifest_path};
pub use names::NameIndex;

use crate::config::ResolverMode;
use tokio_util::sync::CancellationToken;

/// Both indices, mutated together by the event loop and read by the
/// resolver.
#[derive(Debug, Default)]
pub struct ScriptIndex {
    pub names: NameIndex,
    pub manifests: ManifestIndex,
}

/// Scan tokens handed out by [`ScriptIndex::apply_mode`] for indices that
/// were just switched on.
#[derive(Debug, Default)]
pub struct PendingScans {
    pub names: Option<CancellationToken>,
    pub manifests: Option<CancellationToken>,
}

impl ScriptIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enables the indices `mode` needs and disables the rest.
    pub fn apply_mode(&mut self, mode: ResolverMode) -> PendingScans {
        let mut pending = PendingScans::default();
        if mode.uses_names() {
            pending.names = self.names.enable();
        } else {
            self.names.disable();
        }
        if mode.uses_manifests() {
            pending.manifests = self.manifests.enable();
        } else {
            self.manifests.disable();
        }
        pending
    }

    pub fn disable(&mut self) {
        self.names.disable();
        self.manifests.disable();
    }
}
