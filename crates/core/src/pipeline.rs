//! Rewrites raw engine log text for display.
//!
//! Steps, always in this order:
//! 1. optional: colour-coded error/warning/info spans become labelled lines
//! 2. all remaining ANSI escape sequences are stripped
//! 3. `Script '<instance path>', Line <n>` references become file links
//! 4. optional: bare `Service.Child.Script:<n>` references become file links
//!
//! Nothing here fails: a reference that does not resolve is left as it was.

use crate::config::{ScriptPathMode, Settings};
use crate::resolver::ResolvePath;
use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::path::Path;

pub const ERROR_LABEL: &str = "[Error] ";
pub const WARNING_LABEL: &str = "[Warning] ";
pub const INFO_LABEL: &str = "[Info] ";

/// Top-level containers an engine-native path can start with.
pub const SERVICE_NAMES: &[&str] = &[
    "Workspace",
    "Players",
    "Lighting",
    "MaterialService",
    "ReplicatedFirst",
    "ReplicatedStorage",
    "ServerScriptService",
    "ServerStorage",
    "StarterGui",
    "StarterPack",
    "StarterPlayer",
    "Teams",
    "SoundService",
    "Chat",
    "TextChatService",
    "LocalizationService",
    "TestService",
    "CoreGui",
];

static ANSI_ESCAPE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b(?:\[[0-?]*[ -/]*[@-~]|\][^\x07\x1b]*(?:\x07|\x1b\\)|[@-_])")
        .expect("valid ANSI pattern")
});

static LABEL_SPAN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)\x1b\[(?:[01];)?(3[134]|9[134])m(.*?)\x1b\[(?:0|39)?m")
        .expect("valid label span pattern")
});

static LABEL_START: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\x1b\[(?:[01];)?(?:3[134]|9[134])m").expect("valid label start pattern")
});

static SCRIPT_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"Script '([^'\r\n]+)', Line (\d+)").expect("valid script reference pattern")
});

static COMPACT_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    let pattern = format!(
        r"\b((?:game\.)?((?:{})(?:\.[A-Za-z_][A-Za-z0-9_]*)+))(?::(\d+))?",
        SERVICE_NAMES.join("|")
    );
    Regex::new(&pattern).expect("valid compact reference pattern")
});

pub struct TextPipeline<'a> {
    settings: &'a Settings,
    root: Option<&'a Path>,
    resolver: &'a dyn ResolvePath,
}

impl<'a> TextPipeline<'a> {
    pub fn new(settings: &'a Settings, resolver: &'a dyn ResolvePath) -> Self {
        Self {
            settings,
            root: None,
            resolver,
        }
    }

    /// Root that relative links are computed against.
    pub fn with_root(mut self, root: &'a Path) -> Self {
        self.root = Some(root);
        self
    }

    pub fn process(&self, raw: &str) -> String {
        let labelled;
        let text = if self.settings.use_colorizer_labels {
            labelled = apply_labels(raw);
            labelled.as_str()
        } else {
            raw
        };

        let stripped = strip_ansi(text);
        if self.settings.script_path_mode == ScriptPathMode::Roblox {
            return stripped;
        }
        self.rewrite_references(&stripped)
    }

    fn rewrite_references(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for caps in SCRIPT_REFERENCE.captures_iter(text) {
            let (Some(whole), Some(instance), Some(line)) = (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            self.rewrite_compact(&text[last..whole.start()], &mut out);
            match self.resolver.resolve(instance.as_str()) {
                Some(file) => {
                    out.push_str(&self.format_link(&file, Some(line.as_str())));
                    if self.settings.script_path_mode == ScriptPathMode::FileAndRoblox {
                        out.push_str(" (");
                        out.push_str(whole.as_str());
                        out.push(')');
                    }
                }
                None => out.push_str(whole.as_str()),
            }
            last = whole.end();
        }
        self.rewrite_compact(&text[last..], &mut out);
        out
    }

    /// Compact references are only looked for between canonical ones, so
    /// nothing already rewritten is touched twice.
    fn rewrite_compact(&self, segment: &str, out: &mut String) {
        if !self.settings.script_path_mini {
            out.push_str(segment);
            return;
        }
        let mut last = 0;
        for caps in COMPACT_REFERENCE.captures_iter(segment) {
            let (Some(whole), Some(reference), Some(instance)) =
                (caps.get(0), caps.get(1), caps.get(2))
            else {
                continue;
            };
            out.push_str(&segment[last..whole.start()]);
            out.push_str(&self.rewrite_compact_match(
                &caps,
                reference.as_str(),
                instance.as_str(),
                whole.as_str(),
            ));
            last = whole.end();
        }
        out.push_str(&segment[last..]);
    }

    /// `reference` is the text as printed, including a leading `game.`;
    /// `instance` is the path handed to the resolver.
    fn rewrite_compact_match(
        &self,
        caps: &Captures<'_>,
        reference: &str,
        instance: &str,
        original: &str,
    ) -> String {
        let Some(file) = self.resolver.resolve(instance) else {
            return original.to_string();
        };
        let mut link = self.format_link(&file, caps.get(3).map(|m| m.as_str()));
        if self.settings.script_path_mode == ScriptPathMode::FileAndRoblox {
            link.push_str(" (");
            link.push_str(reference);
            link.push(')');
        }
        link
    }

    pub fn format_link(&self, file: &Path, line: Option<&str>) -> String {
        let shown = if self.settings.script_path_relative {
            self.root
                .and_then(|root| file.strip_prefix(root).ok())
                .filter(|rel| !rel.as_os_str().is_empty())
                .unwrap_or(file)
        } else {
            file
        };
        let mut shown = shown.display().to_string();
        if self.settings.script_path_always_quoted || shown.chars().any(char::is_whitespace) {
            shown = format!("\"{}\"", shown);
        }
        match line {
            Some(line) => format!("{}:{}", shown, line),
            None => shown,
        }
    }
}

pub fn strip_ansi(text: &str) -> String {
    ANSI_ESCAPE.replace_all(text, "").into_owned()
}

/// Prefixes every line inside a coloured span with its severity label and
/// drops the span's escape markers.
pub fn apply_labels(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last = 0;
    for caps in LABEL_SPAN.captures_iter(text) {
        let (Some(whole), Some(code), Some(body)) = (caps.get(0), caps.get(1), caps.get(2)) else {
            continue;
        };
        out.push_str(&text[last..whole.start()]);
        let label = match code.as_str() {
            "31" | "91" => ERROR_LABEL,
            "33" | "93" => WARNING_LABEL,
            _ => INFO_LABEL,
        };
        for line in body.as_str().split_inclusive('\n') {
            if !line.trim().is_empty() {
                out.push_str(label);
            }
            out.push_str(line);
        }
        last = whole.end();
    }
    out.push_str(&text[last..]);
    out
}

/// Whether `text` opens a coloured span that no reset has closed yet.
pub fn has_open_label_span(text: &str) -> bool {
    let closed = LABEL_SPAN
        .find_iter(text)
        .last()
        .map_or(0, |span| span.end());
    LABEL_START.is_match(&text[closed..])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;

    struct MapResolver(HashMap<&'static str, PathBuf>);

    impl ResolvePath for MapResolver {
        fn resolve(&self, instance_path: &str) -> Option<PathBuf> {
            self.0.get(instance_path).cloned()
        }
    }

    fn resolver() -> MapResolver {
        let mut map = HashMap::new();
        map.insert("Workspace.A.Main", PathBuf::from("/proj/src/A/Main.lua"));
        map.insert(
            "ServerScriptService.Game",
            PathBuf::from("/proj/my scripts/Game.server.lua"),
        );
        MapResolver(map)
    }

    fn settings(mode: ScriptPathMode) -> Settings {
        Settings {
            script_path_mode: mode,
            ..Settings::default()
        }
    }

    #[test]
    fn test_strip_ansi() {
        assert_eq!(strip_ansi("\x1b[1;32mok\x1b[0m done"), "ok done");
        assert_eq!(strip_ansi("\x1b]0;title\x07plain"), "plain");
        assert_eq!(strip_ansi("no escapes"), "no escapes");
    }

    #[test]
    fn test_error_span_gets_label_on_each_line() {
        let out = apply_labels("\x1b[31mfirst line\nsecond line\x1b[0m\nafter");
        assert_eq!(out, "[Error] first line\n[Error] second line\nafter");
        assert!(!out.contains('\x1b'));
    }

    #[test]
    fn test_warning_and_info_spans() {
        let out = apply_labels("\x1b[93mcareful\x1b[39m \x1b[34mfyi\r\n\x1b[m");
        assert_eq!(out, "[Warning] careful [Info] fyi\r\n");
    }

    #[test]
    fn test_open_label_span() {
        assert!(has_open_label_span("\x1b[31mfirst line"));
        assert!(has_open_label_span("\x1b[33mone\x1b[0m \x1b[91mtwo\n"));
        assert!(!has_open_label_span("\x1b[31mfirst\nsecond\x1b[0m"));
        assert!(!has_open_label_span("\x1b[1;32mgreen only"));
        assert!(!has_open_label_span("plain"));
    }

    #[test]
    fn test_labels_only_when_enabled() {
        let resolver = resolver();
        let mut settings = settings(ScriptPathMode::Roblox);
        let raw = "\x1b[31mboom\x1b[0m";

        assert_eq!(TextPipeline::new(&settings, &resolver).process(raw), "boom");
        settings.use_colorizer_labels = true;
        assert_eq!(TextPipeline::new(&settings, &resolver).process(raw), "[Error] boom");
    }

    #[test]
    fn test_script_reference_file_mode() {
        let resolver = resolver();
        let settings = settings(ScriptPathMode::File);
        let pipeline = TextPipeline::new(&settings, &resolver).with_root(Path::new("/proj"));
        assert_eq!(
            pipeline.process("Script 'Workspace.A.Main', Line 12 - function run"),
            "src/A/Main.lua:12 - function run"
        );
    }

    #[test]
    fn test_script_reference_keeps_original() {
        let resolver = resolver();
        let settings = settings(ScriptPathMode::FileAndRoblox);
        let pipeline = TextPipeline::new(&settings, &resolver).with_root(Path::new("/proj"));
        assert_eq!(
            pipeline.process("Script 'Workspace.A.Main', Line 3"),
            "src/A/Main.lua:3 (Script 'Workspace.A.Main', Line 3)"
        );
    }

    #[test]
    fn test_roblox_mode_leaves_references() {
        let resolver = resolver();
        let settings = settings(ScriptPathMode::Roblox);
        let raw = "Script 'Workspace.A.Main', Line 3 Workspace.A.Main:4:";
        assert_eq!(TextPipeline::new(&settings, &resolver).process(raw), raw);
    }

    #[test]
    fn test_unresolved_reference_untouched() {
        let resolver = resolver();
        let settings = settings(ScriptPathMode::File);
        let raw = "Script 'Workspace.Nope', Line 1 and Workspace.Nope.Either:2: bad";
        assert_eq!(TextPipeline::new(&settings, &resolver).process(raw), raw);
    }

    #[test]
    fn test_quoting_and_absolute_paths() {
        let resolver = resolver();
        let mut settings = settings(ScriptPathMode::File);
        settings.script_path_relative = false;
        let pipeline = TextPipeline::new(&settings, &resolver).with_root(Path::new("/proj"));
        assert_eq!(
            pipeline.process("Script 'ServerScriptService.Game', Line 7"),
            "\"/proj/my scripts/Game.server.lua\":7"
        );

        settings.script_path_always_quoted = true;
        let pipeline = TextPipeline::new(&settings, &resolver);
        assert_eq!(
            pipeline.process("Script 'Workspace.A.Main', Line 1"),
            "\"/proj/src/A/Main.lua\":1"
        );
    }

    #[test]
    fn test_compact_references() {
        let resolver = resolver();
        let settings = settings(ScriptPathMode::File);
        let pipeline = TextPipeline::new(&settings, &resolver).with_root(Path::new("/proj"));
        assert_eq!(
            pipeline.process("Workspace.A.Main:27: attempt to index nil"),
            "src/A/Main.lua:27: attempt to index nil"
        );
        assert_eq!(
            pipeline.process("required by game.Workspace.A.Main"),
            "required by src/A/Main.lua"
        );
        assert_eq!(
            pipeline.process("Requested module experienced an error while loading: game.Workspace.A.Main:4"),
            "Requested module experienced an error while loading: src/A/Main.lua:4"
        );
        // Not a recognised container
        assert_eq!(pipeline.process("MyWorkspace.A.Main:1"), "MyWorkspace.A.Main:1");
    }

    #[test]
    fn test_compact_game_prefix_kept_in_original() {
        let resolver = resolver();
        let settings = settings(ScriptPathMode::FileAndRoblox);
        let pipeline = TextPipeline::new(&settings, &resolver).with_root(Path::new("/proj"));
        assert_eq!(
            pipeline.process("game.Workspace.A.Main:9: bad"),
            "src/A/Main.lua:9 (game.Workspace.A.Main): bad"
        );
        // Unresolved references keep their prefix
        assert_eq!(pipeline.process("game.Workspace.Gone:1"), "game.Workspace.Gone:1");
    }

    #[test]
    fn test_compact_disabled() {
        let resolver = resolver();
        let mut settings = settings(ScriptPathMode::File);
        settings.script_path_mini = false;
        let pipeline = TextPipeline::new(&settings, &resolver);
        assert_eq!(pipeline.process("Workspace.A.Main:27: x"), "Workspace.A.Main:27: x");
    }

    #[test]
    fn test_compact_not_applied_inside_rewritten_reference() {
        let resolver = resolver();
        let settings = settings(ScriptPathMode::FileAndRoblox);
        let pipeline = TextPipeline::new(&settings, &resolver).with_root(Path::new("/proj"));
        assert_eq!(
            pipeline.process("Script 'Workspace.A.Main', Line 5\nWorkspace.A.Main:6: oops"),
            "src/A/Main.lua:5 (Script 'Workspace.A.Main', Line 5)\nsrc/A/Main.lua:6 (Workspace.A.Main): oops"
        );
    }

    #[test]
    fn test_full_pipeline_with_labels_and_links() {
        let resolver = resolver();
        let settings = Settings {
            script_path_mode: ScriptPathMode::File,
            use_colorizer_labels: true,
            ..Settings::default()
        };
        let pipeline = TextPipeline::new(&settings, &resolver).with_root(Path::new("/proj"));
        assert_eq!(
            pipeline.process("\x1b[31mWorkspace.A.Main:2: boom\nStack End\x1b[0m"),
            "[Error] src/A/Main.lua:2: boom\n[Error] Stack End"
        );
    }
}
