use nu_ansi_term::Color;
use outsync_core::config::Settings;
use outsync_core::OutputEngine;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing::info;

pub async fn run(
    root: PathBuf,
    settings: Settings,
    paths: Vec<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let engine = OutputEngine::new(root, settings);
    engine.enable().await;

    let stats = engine.stats();
    info!(
        "Resolving {} paths against {} scripts and {} manifests",
        paths.len(),
        stats.scripts,
        stats.manifests
    );

    let color = std::io::stdout().is_terminal();
    for instance_path in &paths {
        let resolved = engine.resolve(instance_path);
        println!(
            "{}",
            render(instance_path, resolved.as_deref(), engine.root(), color)
        );
    }

    engine.shutdown();
    Ok(())
}

fn render(instance_path: &str, resolved: Option<&Path>, root: &Path, color: bool) -> String {
    let target = match resolved {
        Some(file) => file.strip_prefix(root).unwrap_or(file).display().to_string(),
        None => "(unresolved)".to_string(),
    };
    if !color {
        return format!("{instance_path} -> {target}");
    }
    let target = match resolved {
        Some(_) => Color::Yellow.paint(target),
        None => Color::Red.paint(target),
    };
    format!("{} -> {}", Color::LightBlue.bold().paint(instance_path), target)
}
