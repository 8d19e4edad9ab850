use outsync_core::config::{ResolverMode, ScriptPathMode, Settings};
use outsync_core::watch::WatchEvent;
use outsync_core::OutputEngine;
use std::fs;
use std::path::Path;

const MANIFEST: &str = r#"{
    "name": "game",
    "tree": {
        "$className": "DataModel",
        "ServerScriptService": { "$path": "src/server" },
        "ReplicatedStorage": {
            "Shared": { "$path": "src/shared" }
        }
    }
}"#;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn workspace() -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    write(root, "default.project.json", MANIFEST);
    write(root, "src/server/Main.server.lua", "print('hi')");
    write(root, "src/shared/Util/init.lua", "return {}");
    write(root, "src/shared/Format.luau", "return {}");
    dir
}

fn settings(mode: ResolverMode) -> Settings {
    Settings {
        script_path_resolver: mode,
        ..Settings::default()
    }
}

#[tokio::test]
async fn test_enable_seeds_both_indices() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), Settings::default());
    engine.enable().await;

    let stats = engine.stats();
    assert_eq!(stats.scripts, 3);
    assert_eq!(stats.manifests, 1);

    let root = engine.root().to_path_buf();
    assert_eq!(
        engine.resolve("ServerScriptService.Main"),
        Some(root.join("src/server/Main.server.lua"))
    );
    assert_eq!(
        engine.resolve("ReplicatedStorage.Shared.Util"),
        Some(root.join("src/shared/Util/init.lua"))
    );
    assert_eq!(
        engine.resolve("ReplicatedStorage.Shared.Format"),
        Some(root.join("src/shared/Format.luau"))
    );
    assert_eq!(engine.resolve(""), None);
}

#[tokio::test]
async fn test_name_mode_ignores_manifests() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), settings(ResolverMode::Name));
    engine.enable().await;

    assert_eq!(engine.stats().manifests, 0);
    assert_eq!(
        engine.resolve("Anything.server.Main"),
        Some(engine.root().join("src/server/Main.server.lua"))
    );
}

#[tokio::test]
async fn test_rojo_mode_assumes_default_extension() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), settings(ResolverMode::Rojo));
    engine.enable().await;

    assert_eq!(engine.stats().scripts, 0);
    assert_eq!(
        engine.resolve("ServerScriptService.Missing"),
        Some(engine.root().join("src/server/Missing.lua"))
    );
    assert_eq!(engine.resolve("Workspace.Main"), None);
}

#[tokio::test]
async fn test_script_events_update_resolution() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), Settings::default());
    engine.enable().await;
    let root = engine.root().to_path_buf();

    let added = root.join("src/server/Added.lua");
    fs::write(&added, "").unwrap();
    engine.handle_event(WatchEvent::Created(added.clone())).await;
    assert_eq!(engine.resolve("ServerScriptService.Added"), Some(added.clone()));

    fs::remove_file(&added).unwrap();
    engine.handle_event(WatchEvent::Deleted(added)).await;
    assert_eq!(engine.stats().scripts, 3);
}

#[tokio::test]
async fn test_rename_moves_entry() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), settings(ResolverMode::Name));
    engine.enable().await;
    let root = engine.root().to_path_buf();

    let old = root.join("src/shared/Format.luau");
    let new = root.join("src/shared/Layout.luau");
    fs::rename(&old, &new).unwrap();
    engine.handle_event(WatchEvent::Deleted(old)).await;
    engine.handle_event(WatchEvent::Created(new.clone())).await;

    assert_eq!(engine.resolve("Shared.Format"), None);
    assert_eq!(engine.resolve("shared.Layout"), Some(new));
}

#[tokio::test]
async fn test_manifest_events_replace_tree() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), settings(ResolverMode::Rojo));
    engine.enable().await;
    let root = engine.root().to_path_buf();
    let manifest = root.join("default.project.json");

    fs::write(
        &manifest,
        r#"{ "tree": { "ServerStorage": { "$path": "src/server" } } }"#,
    )
    .unwrap();
    engine.handle_event(WatchEvent::Changed(manifest.clone())).await;
    assert_eq!(engine.resolve("ServerScriptService.Main"), None);
    assert_eq!(
        engine.resolve("ServerStorage.Main"),
        Some(root.join("src/server/Main.lua"))
    );

    // A broken rewrite keeps the last good tree
    fs::write(&manifest, "{ not json").unwrap();
    engine.handle_event(WatchEvent::Changed(manifest.clone())).await;
    assert!(engine.resolve("ServerStorage.Main").is_some());

    fs::remove_file(&manifest).unwrap();
    engine.handle_event(WatchEvent::Deleted(manifest)).await;
    assert_eq!(engine.stats().manifests, 0);
    assert_eq!(engine.resolve("ServerStorage.Main"), None);
}

#[tokio::test]
async fn test_created_directory_is_scanned() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), settings(ResolverMode::Name));
    engine.enable().await;
    let root = engine.root().to_path_buf();

    write(&root, "src/extra/Deep/Thing.client.lua", "");
    engine.handle_event(WatchEvent::Created(root.join("src/extra"))).await;
    assert_eq!(
        engine.resolve("Deep.Thing"),
        Some(root.join("src/extra/Deep/Thing.client.lua"))
    );

    fs::remove_dir_all(root.join("src/extra")).unwrap();
    engine.handle_event(WatchEvent::Deleted(root.join("src/extra"))).await;
    assert_eq!(engine.resolve("Deep.Thing"), None);
}

#[tokio::test]
async fn test_disable_clears_and_switching_modes_reseeds() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), Settings::default());
    engine.enable().await;

    engine.disable();
    assert_eq!(engine.stats().scripts, 0);
    assert_eq!(engine.stats().manifests, 0);
    assert_eq!(engine.resolve("ServerScriptService.Main"), None);

    // Events while disabled are dropped
    let root = engine.root().to_path_buf();
    engine
        .handle_event(WatchEvent::Created(root.join("src/server/Main.server.lua")))
        .await;
    assert_eq!(engine.stats().scripts, 0);

    engine.update_settings(settings(ResolverMode::Name)).await;
    assert_eq!(engine.stats().scripts, 3);
    assert_eq!(engine.stats().manifests, 0);
}

#[tokio::test]
async fn test_process_rewrites_references() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), Settings::default());
    engine.enable().await;

    let out = engine.process("Script 'ServerScriptService.Main', Line 12 - Studio");
    assert_eq!(
        out,
        "src/server/Main.server.lua:12 (Script 'ServerScriptService.Main', Line 12) - Studio"
    );

    engine
        .update_settings(Settings {
            script_path_mode: ScriptPathMode::Roblox,
            ..Settings::default()
        })
        .await;
    let raw = "Script 'ServerScriptService.Main', Line 12";
    assert_eq!(engine.process(raw), raw);
}

#[tokio::test]
async fn test_gitignored_packages_still_resolve() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path();
    fs::create_dir_all(root.join(".git")).unwrap();
    write(root, ".gitignore", "Packages/\n");
    write(
        root,
        "default.project.json",
        r#"{ "tree": { "ReplicatedStorage": { "Packages": { "$path": "Packages" } } } }"#,
    );
    write(root, "Packages/Promise.lua", "return {}");

    let engine = OutputEngine::new(root.to_path_buf(), Settings::default());
    engine.enable().await;

    assert_eq!(engine.stats().scripts, 1);
    assert_eq!(
        engine.resolve("ReplicatedStorage.Packages.Promise"),
        Some(engine.root().join("Packages/Promise.lua"))
    );
}

#[tokio::test]
async fn test_events_under_skipped_directories_are_ignored() {
    let dir = workspace();
    let engine = OutputEngine::new(dir.path().to_path_buf(), settings(ResolverMode::Name));
    engine.enable().await;
    let root = engine.root().to_path_buf();

    write(&root, "build/Later.lua", "");
    engine
        .handle_event(WatchEvent::Created(root.join("build/Later.lua")))
        .await;
    assert_eq!(engine.resolve("Later"), None);
    assert_eq!(engine.stats().scripts, 3);

    write(&root, "node_modules/pkg/Dep.lua", "");
    engine
        .handle_event(WatchEvent::Created(root.join("node_modules")))
        .await;
    assert_eq!(engine.resolve("pkg.Dep"), None);
    assert_eq!(engine.stats().scripts, 3);
}
