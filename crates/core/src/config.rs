//! Runtime settings for path display and resolution.
//!
//! Settings are read from a JSON file (`.outsync.json` at the workspace root
//! by default). Every key is optional; missing keys take their defaults.

use crate::error::{OutsyncError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const CONFIG_FILE_NAME: &str = ".outsync.json";
pub const DEFAULT_PORT: u16 = 32337;

/// How resolved script references are displayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScriptPathMode {
    /// Leave engine-native instance paths untouched.
    Roblox,
    /// Replace instance paths with file links.
    File,
    /// File links followed by the original text in parentheses.
    #[default]
    FileAndRoblox,
}

/// Which indices back the resolver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResolverMode {
    Rojo,
    Name,
    #[default]
    RojoName,
}

impl ResolverMode {
    pub fn uses_manifests(self) -> bool {
        matches!(self, ResolverMode::Rojo | ResolverMode::RojoName)
    }

    pub fn uses_names(self) -> bool {
        matches!(self, ResolverMode::Name | ResolverMode::RojoName)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Settings {
    pub script_path_mode: ScriptPathMode,
    pub script_path_resolver: ResolverMode,
    pub script_path_relative: bool,
    pub script_path_always_quoted: bool,
    pub script_path_mini: bool,
    pub use_colorizer_labels: bool,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            script_path_mode: ScriptPathMode::default(),
            script_path_resolver: ResolverMode::default(),
            script_path_relative: true,
            script_path_always_quoted: false,
            script_path_mini: true,
            use_colorizer_labels: false,
            port: DEFAULT_PORT,
        }
    }
}

impl Settings {
    pub fn from_json(source: &str) -> Result<Self> {
        serde_json::from_str(source).map_err(|e| OutsyncError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        serde_json::from_str(&source)
            .map_err(|e| OutsyncError::Config(format!("{}: {}", path.display(), e)))
    }

    /// Loads `<root>/.outsync.json` if it exists, defaults otherwise.
    pub fn discover(root: &Path) -> Result<Self> {
        let path = root.join(CONFIG_FILE_NAME);
        if path.is_file() {
            tracing::debug!("Loading settings from {}", path.display());
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }
}
