use aleph_core::{App, ChangeRouter, FsChange};
use anyhow::Context;
use indexmap::IndexMap;
use notify::event::{EventKind, ModifyKind};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, info, warn};

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Watch the project directory and feed changes to the app until the
/// watcher goes away. The returned watcher must be kept alive.
pub fn spawn(app: Arc<App>) -> anyhow::Result<RecommendedWatcher> {
    let root = app.config().working_dir.clone();
    let (tx, rx) = mpsc::unbounded_channel();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            for change in changes(&event) {
                let _ = tx.send(change);
            }
        }
        Err(e) => warn!("watch error: {}", e),
    })
    .context("failed to initialize filesystem watcher")?;

    watcher
        .watch(&root, RecursiveMode::Recursive)
        .with_context(|| format!("failed to watch {}", root.display()))?;
    info!("watching {} for changes", root.display());

    tokio::spawn(route_changes(ChangeRouter::new(app), rx));
    Ok(watcher)
}

fn changes(event: &Event) -> Vec<FsChange> {
    event
        .paths
        .iter()
        .filter_map(|path| classify(&event.kind, path))
        .collect()
}

fn classify(kind: &EventKind, path: &Path) -> Option<FsChange> {
    let path = path.to_path_buf();
    match kind {
        EventKind::Create(_) => Some(FsChange::Created(path)),
        // renames report both ends; what is still on disk was created
        EventKind::Modify(ModifyKind::Name(_)) => {
            if path.exists() {
                Some(FsChange::Created(path))
            } else {
                Some(FsChange::Removed(path))
            }
        }
        EventKind::Modify(ModifyKind::Metadata(_)) => None,
        EventKind::Modify(_) => Some(FsChange::Modified(path)),
        EventKind::Remove(_) => Some(FsChange::Removed(path)),
        _ => None,
    }
}

/// Collect changes until the window passes without new ones, keeping the
/// last change per path, then apply them in arrival order.
async fn route_changes(router: ChangeRouter, mut rx: mpsc::UnboundedReceiver<FsChange>) {
    while let Some(first) = rx.recv().await {
        let mut pending: IndexMap<PathBuf, FsChange> = IndexMap::new();
        pending.insert(first.path().to_path_buf(), first);

        let sleep = tokio::time::sleep(DEBOUNCE_WINDOW);
        tokio::pin!(sleep);
        loop {
            tokio::select! {
                _ = &mut sleep => break,
                next = rx.recv() => match next {
                    Some(change) => {
                        pending.insert(change.path().to_path_buf(), merge(&pending, change));
                        sleep.as_mut().reset(Instant::now() + DEBOUNCE_WINDOW);
                    }
                    None => break,
                },
            }
        }

        debug!("applying {} file changes", pending.len());
        for (_, change) in pending {
            let path = change.path().to_path_buf();
            if let Err(e) = router.apply(change).await {
                warn!("failed to apply change to {}: {}", path.display(), e);
            }
        }
    }
}

/// A file created and then written in the same window is still new
fn merge(pending: &IndexMap<PathBuf, FsChange>, change: FsChange) -> FsChange {
    match (pending.get(change.path()), change) {
        (Some(FsChange::Created(_)), FsChange::Modified(path)) => FsChange::Created(path),
        (_, change) => change,
    }
}
