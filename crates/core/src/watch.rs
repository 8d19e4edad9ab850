use notify::event::{ModifyKind, RenameMode};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;

/// Filesystem change as the indices see it. Renames arrive as a delete of
/// the old path followed by a create of the new one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Created(PathBuf),
    Changed(PathBuf),
    Deleted(PathBuf),
}

impl WatchEvent {
    pub fn path(&self) -> &Path {
        match self {
            WatchEvent::Created(p) | WatchEvent::Changed(p) | WatchEvent::Deleted(p) => p,
        }
    }
}

pub fn classify(event: &Event) -> Vec<WatchEvent> {
    match &event.kind {
        EventKind::Create(_) => event.paths.iter().cloned().map(WatchEvent::Created).collect(),
        EventKind::Remove(_) => event.paths.iter().cloned().map(WatchEvent::Deleted).collect(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            event.paths.iter().cloned().map(WatchEvent::Deleted).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            event.paths.iter().cloned().map(WatchEvent::Created).collect()
        }
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![
                WatchEvent::Deleted(from.clone()),
                WatchEvent::Created(to.clone()),
            ],
            _ => Vec::new(),
        },
        // Platforms that cannot tell which side of a rename this is
        EventKind::Modify(ModifyKind::Name(_)) => event
            .paths
            .iter()
            .map(|p| {
                if p.exists() {
                    WatchEvent::Created(p.clone())
                } else {
                    WatchEvent::Deleted(p.clone())
                }
            })
            .collect(),
        EventKind::Modify(_) => event.paths.iter().cloned().map(WatchEvent::Changed).collect(),
        _ => Vec::new(),
    }
}

pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    rx: mpsc::UnboundedReceiver<notify::Result<Event>>,
}

impl FsWatcher {
    pub fn new(root: &Path) -> notify::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut watcher = RecommendedWatcher::new(
            move |res| {
                let _ = tx.send(res);
            },
            Config::default(),
        )?;
        watcher.watch(root, RecursiveMode::Recursive)?;
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// Next batch of classified events; `None` once the watcher is gone.
    pub async fn next_events(&mut self) -> Option<Vec<WatchEvent>> {
        loop {
            match self.rx.recv().await? {
                Ok(event) => return Some(classify(&event)),
                Err(err) => tracing::warn!("Watcher error: {}", err),
            }
        }
    }
}
