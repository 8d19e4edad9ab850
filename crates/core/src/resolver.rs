//! Maps engine instance paths (`Workspace.Scripts.Main`) to script files.

use crate::config::ResolverMode;
use crate::index::ScriptIndex;
use crate::script::{self, normalize_path};
use std::path::{Path, PathBuf};

/// Anything that can turn an instance path into a file.
pub trait ResolvePath {
    fn resolve(&self, instance_path: &str) -> Option<PathBuf>;
}

/// Read-only view over the indices. Owns no state of its own, so two calls
/// without intervening index events always agree.
pub struct Resolver<'a> {
    index: &'a ScriptIndex,
    mode: ResolverMode,
}

impl<'a> Resolver<'a> {
    pub fn new(index: &'a ScriptIndex, mode: ResolverMode) -> Self {
        Self { index, mode }
    }

    /// Manifest prefix match, reconciled against the name index.
    pub fn resolve_by_manifest(&self, instance_path: &str) -> Option<PathBuf> {
        let found = self.index.manifests.lookup(instance_path)?;
        let rest = instance_path[found.prefix_len..].trim_start_matches('.');
        let segments: Vec<&str> = rest.split('.').filter(|s| !s.is_empty()).collect();

        let mut candidate = found.directory.clone();
        for segment in &segments {
            candidate.push(segment);
        }
        let candidate = normalize_path(&candidate);

        let expected_name = segments
            .last()
            .copied()
            .or_else(|| instance_path.rsplit('.').next())?;

        self.index
            .names
            .find_corrected_path(&candidate, expected_name)
            .map(|p| normalize_path(&p))
    }

    /// Pure name heuristic: pick the file whose ancestor directories best
    /// match the instance path read right to left.
    pub fn resolve_by_name(&self, instance_path: &str) -> Option<PathBuf> {
        let mut segments: Vec<&str> = instance_path.split('.').collect();
        let name = segments.pop()?;
        let candidates = self.index.names.lookup_by_name(name);

        let mut best: Option<(&PathBuf, usize)> = None;
        for candidate in candidates {
            let score = ancestry_score(candidate, &segments);
            best = match best {
                None => Some((candidate, score)),
                Some((current, current_score)) => {
                    if score > current_score || (score == current_score && candidate < current) {
                        Some((candidate, score))
                    } else {
                        Some((current, current_score))
                    }
                }
            };
        }
        best.map(|(path, _)| path.clone())
    }
}

impl ResolvePath for Resolver<'_> {
    fn resolve(&self, instance_path: &str) -> Option<PathBuf> {
        if instance_path.is_empty() {
            return None;
        }
        if self.mode.uses_manifests() {
            if let Some(path) = self.resolve_by_manifest(instance_path) {
                return Some(path);
            }
        }
        if self.mode.uses_names() {
            return self.resolve_by_name(instance_path);
        }
        None
    }
}

/// Number of consecutive parent directories matching `segments` from the
/// right. A directory module starts one level up.
fn ancestry_score(path: &Path, segments: &[&str]) -> usize {
    let mut dir = path.parent();
    if script::is_directory_module(path) {
        dir = dir.and_then(Path::parent);
    }

    let mut count = 0;
    for segment in segments.iter().rev() {
        let Some(current) = dir else {
            break;
        };
        if current.file_name().and_then(|n| n.to_str()) != Some(*segment) {
            break;
        }
        count += 1;
        dir = current.parent();
    }
    count
}
