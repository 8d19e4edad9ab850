//! Naming rules for script files.
//!
//! A script's logical name is its file name without the source extension
//! and without an optional `.server` / `.client` context suffix. A file
//! named `init` stands in for its containing directory, so its logical
//! name is the directory's name.

use std::path::{Component, Path, PathBuf};

pub const DEFAULT_EXTENSION: &str = "lua";
pub const SCRIPT_EXTENSIONS: &[&str] = &["lua", "luau"];
pub const CONTEXT_SUFFIXES: &[&str] = &["server", "client"];
pub const MODULE_SENTINEL: &str = "init";

/// One on-disk source file eligible for resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ScriptFile {
    pub path: PathBuf,
    pub name: String,
}

impl ScriptFile {
    /// Returns `None` for anything that is not a recognized script.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = script_name(path)?;
        Some(Self {
            path: normalize_path(path),
            name,
        })
    }

    pub fn is_directory_module(&self) -> bool {
        is_directory_module(&self.path)
    }
}

pub fn is_script_path(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            SCRIPT_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
        .unwrap_or(false)
}

/// `Foo.server.lua` -> `Foo`, `Foo.luau` -> `Foo`, `Foo.txt` -> `None`.
pub fn script_stem(file_name: &str) -> Option<&str> {
    let (rest, ext) = file_name.rsplit_once('.')?;
    if !SCRIPT_EXTENSIONS
        .iter()
        .any(|candidate| ext.eq_ignore_ascii_case(candidate))
    {
        return None;
    }
    if let Some((stem, suffix)) = rest.rsplit_once('.') {
        if CONTEXT_SUFFIXES
            .iter()
            .any(|candidate| suffix.eq_ignore_ascii_case(candidate))
        {
            return Some(stem);
        }
    }
    Some(rest)
}

pub fn is_directory_module(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .and_then(script_stem)
        .is_some_and(|stem| stem == MODULE_SENTINEL)
}

/// Logical script name for `path`, or `None` if it is not a script.
pub fn script_name(path: &Path) -> Option<String> {
    let file_name = path.file_name()?.to_str()?;
    let stem = script_stem(file_name)?;
    if stem != MODULE_SENTINEL {
        return Some(stem.to_string());
    }
    let dir_name = path.parent()?.file_name()?.to_str()?;
    if dir_name.is_empty() {
        return None;
    }
    Some(dir_name.to_string())
}

/// Drops extension and context suffix but keeps the directory.
pub fn strip_script_suffix(path: &Path) -> Option<PathBuf> {
    let stem = script_stem(path.file_name()?.to_str()?)?;
    Some(path.with_file_name(stem))
}

/// Appends the default source extension to a candidate without one.
pub fn with_default_extension(candidate: &Path) -> PathBuf {
    let mut raw = candidate.as_os_str().to_os_string();
    raw.push(".");
    raw.push(DEFAULT_EXTENSION);
    PathBuf::from(raw)
}

/// Lexically normalizes a path: makes it absolute against the current
/// directory and folds `.` / `..` without touching the filesystem, so it
/// also works for files that were just deleted.
pub fn normalize_path(path: &Path) -> PathBuf {
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(path))
            .unwrap_or_else(|_| path.to_path_buf())
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}
