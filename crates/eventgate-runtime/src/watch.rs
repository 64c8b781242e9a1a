//! Reload signal for the sources file.

use std::ffi::OsString;
use std::path::Path;

use anyhow::Context;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;

/// Watch `path` for writes, renames and deletes.
///
/// The parent directory is watched so editors that replace the file
/// atomically keep triggering. Bursts coalesce into one pending signal.
/// Dropping the returned watcher stops the signals and closes the channel.
pub fn watch_file(path: &Path) -> anyhow::Result<(RecommendedWatcher, mpsc::Receiver<()>)> {
    let file_name: OsString = path
        .file_name()
        .with_context(|| format!("{} does not name a file", path.display()))?
        .to_owned();
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => std::env::current_dir().context("failed to resolve working directory")?,
    };

    let (tx, rx) = mpsc::channel::<()>(1);
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            if touches(&event, &file_name) {
                // Full means a reload is already pending.
                let _ = tx.try_send(());
            }
        }
        Err(e) => tracing::warn!("sources watcher error: {e}"),
    })
    .context("failed to create file watcher")?;

    watcher
        .watch(&dir, RecursiveMode::NonRecursive)
        .with_context(|| format!("failed to watch {}", dir.display()))?;
    tracing::info!(path = %path.display(), "watching sources file");
    Ok((watcher, rx))
}

fn touches(event: &Event, file_name: &OsString) -> bool {
    matches!(
        event.kind,
        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
    ) && event
        .paths
        .iter()
        .any(|p| p.file_name() == Some(file_name.as_os_str()))
}
