//! Live indexing of a watched directory.
//!
//! `notify` delivers raw events on its own thread. They are translated into
//! [`FileEvent`]s, filtered through the same [`PathFilter`] a scan uses, and
//! sent over a bounded channel to a tokio task that indexes up to
//! `watch.concurrency` files at a time.
//!
//! Bursts of create+modify for one path are not serialized. The second pass
//! hits the content-hash short-circuit and writes nothing.

use anyhow::{Context, Result};
use futures::StreamExt;
use notify::event::{EventKind, ModifyKind, RenameMode};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use crate::config::WatchConfig;
use crate::indexer::{log_index_error, IndexOutcome, Indexer};
use crate::scanner::PathFilter;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A change to one path, as far as the index is concerned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileEvent {
    /// Created or modified: (re)index it.
    Upsert(PathBuf),
    /// Deleted or renamed away: forget it.
    Remove(PathBuf),
}

impl FileEvent {
    pub fn path(&self) -> &Path {
        match self {
            FileEvent::Upsert(p) | FileEvent::Remove(p) => p,
        }
    }
}

#[derive(Clone)]
pub struct Watcher {
    indexer: Indexer,
    filter: PathFilter,
    concurrency: usize,
}

/// Keeps the OS watch alive while events are processed.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
    task: JoinHandle<()>,
}

impl WatchHandle {
    /// Wait for the processing task. It only ends if the watch is torn down.
    pub async fn join(self) -> Result<()> {
        self.task.await.context("watch task panicked")
    }
}

impl Watcher {
    pub fn new(indexer: Indexer, filter: PathFilter, concurrency: usize) -> Self {
        Self {
            indexer,
            filter,
            concurrency: concurrency.max(1),
        }
    }

    /// Build a watcher for `[watch]`. The root is canonicalized so event
    /// paths and stored document paths agree.
    pub fn from_config(watch: &WatchConfig, indexer: Indexer) -> Result<Self> {
        let root = std::fs::canonicalize(&watch.root).unwrap_or_else(|_| watch.root.clone());
        let filter = PathFilter::from_config(watch)?.with_root(&root);
        Ok(Self::new(indexer, filter, watch.concurrency))
    }

    pub fn root(&self) -> &Path {
        self.filter.root()
    }

    /// Start watching. A failure to start is logged and yields `None`; the
    /// caller decides whether to carry on without live updates.
    pub fn spawn(self) -> Option<WatchHandle> {
        let root = self.filter.root().to_path_buf();
        match self.start() {
            Ok(handle) => {
                info!(root = %root.display(), concurrency = self.concurrency, "watching for changes");
                Some(handle)
            }
            Err(e) => {
                error!(root = %root.display(), error = %format!("{:#}", e), "failed to start watcher");
                None
            }
        }
    }

    fn start(&self) -> Result<WatchHandle> {
        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let filter = self.filter.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => {
                for file_event in translate(&event) {
                    if !filter.accepts(file_event.path()) {
                        continue;
                    }
                    // Runs on notify's thread, outside the runtime.
                    if tx.blocking_send(file_event).is_err() {
                        return;
                    }
                }
            }
            Err(e) => warn!(error = %e, "watch error"),
        })?;

        watcher
            .watch(self.filter.root(), RecursiveMode::Recursive)
            .with_context(|| format!("cannot watch {}", self.filter.root().display()))?;

        let this = self.clone();
        let task = tokio::spawn(async move { this.process(rx).await });

        Ok(WatchHandle {
            _watcher: watcher,
            task,
        })
    }

    /// Drain `rx`, handling up to `concurrency` events at once. Returns when
    /// every sender is gone.
    pub async fn process(&self, rx: mpsc::Receiver<FileEvent>) {
        ReceiverStream::new(rx)
            .for_each_concurrent(self.concurrency, |event| async move {
                self.handle(event).await;
            })
            .await;
    }

    async fn handle(&self, event: FileEvent) {
        match event {
            FileEvent::Upsert(path) => {
                if !path.is_file() {
                    return;
                }
                match self.indexer.index_file(&path).await {
                    Ok(IndexOutcome::Unchanged(_)) => {
                        debug!(path = %path.display(), "event for unchanged file")
                    }
                    Ok(outcome) => {
                        debug!(path = %path.display(), outcome = outcome.label(), "indexed from watch event")
                    }
                    Err(e) => log_index_error(&path, &e),
                }
            }
            FileEvent::Remove(path) => {
                // A rename can report the old name after a new file took it.
                if path.exists() {
                    return;
                }
                if let Err(e) = self.indexer.remove_file(&path).await {
                    error!(path = %path.display(), error = %format!("{:#}", e), "failed to remove document");
                }
            }
        }
    }
}

/// Map a raw `notify` event to index operations.
///
/// Metadata-only and access events are ignored. A rename with both ends
/// known removes the old path and indexes the new one.
pub fn translate(event: &Event) -> Vec<FileEvent> {
    let upsert_all = || event.paths.iter().cloned().map(FileEvent::Upsert).collect();
    let remove_all = || event.paths.iter().cloned().map(FileEvent::Remove).collect();

    match &event.kind {
        EventKind::Create(_) => upsert_all(),
        EventKind::Remove(_) => remove_all(),
        EventKind::Modify(ModifyKind::Metadata(_)) => Vec::new(),
        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => remove_all(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => upsert_all(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match event.paths.as_slice() {
            [from, to] => vec![FileEvent::Remove(from.clone()), FileEvent::Upsert(to.clone())],
            _ => by_existence(&event.paths),
        },
        EventKind::Modify(ModifyKind::Name(_)) => by_existence(&event.paths),
        EventKind::Modify(_) => upsert_all(),
        EventKind::Access(_) | EventKind::Any | EventKind::Other => Vec::new(),
    }
}

fn by_existence(paths: &[PathBuf]) -> Vec<FileEvent> {
    paths
        .iter()
        .map(|p| {
            if p.exists() {
                FileEvent::Upsert(p.clone())
            } else {
                FileEvent::Remove(p.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

    fn event(kind: EventKind, paths: &[&str]) -> Event {
        paths
            .iter()
            .fold(Event::new(kind), |e, p| e.add_path(PathBuf::from(p)))
    }

    #[test]
    fn create_and_modify_index_the_path() {
        assert_eq!(
            translate(&event(EventKind::Create(CreateKind::File), &["/w/a.txt"])),
            vec![FileEvent::Upsert(PathBuf::from("/w/a.txt"))]
        );
        assert_eq!(
            translate(&event(
                EventKind::Modify(ModifyKind::Data(DataChange::Content)),
                &["/w/a.txt"]
            )),
            vec![FileEvent::Upsert(PathBuf::from("/w/a.txt"))]
        );
    }

    #[test]
    fn remove_forgets_the_path() {
        assert_eq!(
            translate(&event(EventKind::Remove(RemoveKind::File), &["/w/a.txt"])),
            vec![FileEvent::Remove(PathBuf::from("/w/a.txt"))]
        );
    }

    #[test]
    fn rename_moves_the_document() {
        assert_eq!(
            translate(&event(
                EventKind::Modify(ModifyKind::Name(RenameMode::Both)),
                &["/w/old.txt", "/w/new.txt"]
            )),
            vec![
                FileEvent::Remove(PathBuf::from("/w/old.txt")),
                FileEvent::Upsert(PathBuf::from("/w/new.txt"))
            ]
        );
    }

    #[test]
    fn metadata_and_access_are_ignored() {
        assert!(translate(&event(
            EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions)),
            &["/w/a.txt"]
        ))
        .is_empty());
        assert!(translate(&event(EventKind::Access(AccessKind::Any), &["/w/a.txt"])).is_empty());
    }
}
