//! Manifest-tree index built from `*.project.json` files.
//!
//! Each manifest declares a tree of named nodes; a node carrying `$path`
//! maps its dotted instance path to a location relative to the manifest.
//! Trees are replaced wholesale on every successful rebuild.

use crate::error::{OutsyncError, Result};
use crate::script::normalize_path;
use indexmap::IndexMap;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const MANIFEST_SUFFIX: &str = ".project.json";
const META_MARKER: char = '$';
const PATH_KEY: &str = "$path";

pub fn is_manifest_path(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| name.len() > MANIFEST_SUFFIX.len() && name.ends_with(MANIFEST_SUFFIX))
}

/// A parsed manifest node. Keys starting with `$` are metadata; every other
/// key holding an object is a child node.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestNode {
    pub path: Option<PathBuf>,
    pub children: Vec<(String, ManifestNode)>,
}

impl ManifestNode {
    pub fn from_value(value: &Value) -> Result<Self> {
        let Value::Object(map) = value else {
            return Err(OutsyncError::Manifest("node is not an object".to_string()));
        };

        let path = map.get(PATH_KEY).and_then(declared_path);

        let mut children = Vec::new();
        for (key, child) in map {
            if key.starts_with(META_MARKER) || !child.is_object() {
                continue;
            }
            children.push((key.clone(), Self::from_value(child)?));
        }

        Ok(Self { path, children })
    }
}

/// A `$path` is a string or `{ "optional": "<path>" }`. Anything else, and
/// an empty path, maps nothing; the rest of the tree is still walked.
fn declared_path(value: &Value) -> Option<PathBuf> {
    let raw = match value {
        Value::String(path) => Some(path.as_str()),
        Value::Object(optional) => optional.get("optional").and_then(Value::as_str),
        _ => None,
    };
    match raw {
        Some(path) if !path.is_empty() => Some(PathBuf::from(path)),
        Some(_) => None,
        None => {
            warn!("Skipping malformed {} value {}", PATH_KEY, value);
            None
        }
    }
}

/// One manifest's instance-path prefix map at a point in time.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ManifestTree {
    pub source: PathBuf,
    pub prefixes: IndexMap<String, PathBuf>,
}

impl ManifestTree {
    pub fn empty(source: PathBuf) -> Self {
        Self {
            source,
            prefixes: IndexMap::new(),
        }
    }

    pub fn parse(source: &Path, bytes: &[u8]) -> Result<Self> {
        let project: Value = serde_json::from_slice(bytes)?;
        let tree = project
            .get("tree")
            .ok_or_else(|| OutsyncError::Manifest("missing 'tree'".to_string()))?;
        let root = ManifestNode::from_value(tree)?;
        Ok(Self::from_root(source, &root))
    }

    /// Walks the typed tree depth-first. The root contributes no segment.
    pub fn from_root(source: &Path, root: &ManifestNode) -> Self {
        let source = normalize_path(source);
        let base = source.parent().map(Path::to_path_buf).unwrap_or_default();
        let mut prefixes = IndexMap::new();
        let mut segments: Vec<&str> = Vec::new();
        collect(root, &base, &mut segments, &mut prefixes);
        Self { source, prefixes }
    }

    /// Longest dot-boundary prefix of `instance_path` declared in this tree.
    pub fn lookup(&self, instance_path: &str) -> Option<ManifestMatch> {
        let mut best: Option<(&String, &PathBuf)> = None;
        for (prefix, location) in &self.prefixes {
            if !is_segment_prefix(prefix, instance_path) {
                continue;
            }
            match best {
                Some((current, _)) if current.len() >= prefix.len() => {}
                _ => best = Some((prefix, location)),
            }
        }
        best.map(|(prefix, location)| ManifestMatch {
            directory: location.clone(),
            prefix_len: prefix.len(),
        })
    }
}

fn collect<'a>(
    node: &'a ManifestNode,
    base: &Path,
    segments: &mut Vec<&'a str>,
    prefixes: &mut IndexMap<String, PathBuf>,
) {
    if let Some(path) = &node.path {
        prefixes.insert(segments.join("."), normalize_path(&base.join(path)));
    }
    for (name, child) in &node.children {
        segments.push(name);
        collect(child, base, segments, prefixes);
        segments.pop();
    }
}

/// The empty prefix covers everything; otherwise the match must end on a
/// segment boundary.
fn is_segment_prefix(prefix: &str, instance_path: &str) -> bool {
    if prefix.is_empty() {
        return true;
    }
    match instance_path.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.'),
        None => false,
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestMatch {
    pub directory: PathBuf,
    pub prefix_len: usize,
}

#[derive(Debug, Default)]
pub struct ManifestIndex {
    enabled: bool,
    trees: IndexMap<PathBuf, ManifestTree>,
    scan_token: Option<CancellationToken>,
}

impl ManifestIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn enable(&mut self) -> Option<CancellationToken> {
        if self.enabled {
            return None;
        }
        self.enabled = true;
        let token = CancellationToken::new();
        self.scan_token = Some(token.clone());
        info!("Manifest index enabled");
        Some(token)
    }

    pub fn disable(&mut self) {
        if let Some(token) = self.scan_token.take() {
            token.cancel();
        }
        self.trees.clear();
        if self.enabled {
            info!("Manifest index disabled");
        }
        self.enabled = false;
    }

    pub fn finish_scan(&mut self, token: &CancellationToken) {
        if let Some(current) = &self.scan_token {
            if !current.is_cancelled() && !token.is_cancelled() {
                self.scan_token = None;
            }
        }
    }

    pub fn on_manifest_deleted(&mut self, path: &Path) {
        if self.trees.shift_remove(&normalize_path(path)).is_some() {
            debug!("Dropped manifest {}", path.display());
        }
    }

    pub fn on_directory_deleted(&mut self, dir: &Path) {
        let dir = normalize_path(dir);
        self.trees.retain(|source, _| !source.starts_with(&dir));
    }

    /// Inserts an empty placeholder tree ahead of the first read. A tree
    /// that is already registered is left as it is.
    pub fn register(&mut self, path: &Path) -> bool {
        if !self.enabled {
            return false;
        }
        let source = normalize_path(path);
        self.trees
            .entry(source.clone())
            .or_insert_with(|| ManifestTree::empty(source));
        true
    }

    pub fn is_registered(&self, path: &Path) -> bool {
        self.trees.contains_key(&normalize_path(path))
    }

    /// Replaces the tree for `path` with one parsed from `contents`.
    /// A failed read or parse keeps whatever tree was there before.
    pub fn apply_contents(&mut self, path: &Path, contents: std::io::Result<Vec<u8>>) -> bool {
        if !self.enabled {
            return false;
        }
        let bytes = match contents {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("Failed to read manifest {}: {}", path.display(), err);
                return false;
            }
        };
        match ManifestTree::parse(path, &bytes) {
            Ok(tree) => {
                debug!(
                    "Rebuilt manifest {} with {} prefixes",
                    path.display(),
                    tree.prefixes.len()
                );
                self.trees.insert(tree.source.clone(), tree);
                true
            }
            Err(err) => {
                warn!("Failed to parse manifest {}: {}", path.display(), err);
                false
            }
        }
    }

    pub fn tree(&self, path: &Path) -> Option<&ManifestTree> {
        self.trees.get(&normalize_path(path))
    }

    pub fn len(&self) -> usize {
        self.trees.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// First registered tree with any matching prefix wins.
    pub fn lookup(&self, instance_path: &str) -> Option<ManifestMatch> {
        self.trees
            .values()
            .find_map(|tree| tree.lookup(instance_path))
    }
}
