//! Background threads for directory reads and searches.
//!
//! The UI thread keeps sole ownership of the [`TreeModel`]. Reads and searches
//! run elsewhere and come back as [`WorkerEvent`]s that the UI applies when it
//! polls.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, Sender};

use crate::cancel::{CancellationToken, SearchVersionTracker};
use crate::error::{Result, TreeError};
use crate::fs_access::{FileSystem, load_children};
use crate::node::DirectoryNode;
use crate::query::SearchQuery;
use crate::shared_reads::SharedReads;
use crate::search::{SearchLimits, SearchMatch, SearchObserver, SearchStats, search};
use crate::tree::TreeModel;

#[derive(Debug)]
pub enum WorkerEvent {
    /// Result of an expand request.
    Listed {
        path: PathBuf,
        listing: Result<Vec<DirectoryNode>>,
    },
    /// A search read a directory the UI tree may not have yet.
    SearchLoaded { search_id: u64, dir: DirectoryNode },
    SearchMatch { search_id: u64, found: SearchMatch },
    SearchError {
        search_id: u64,
        path: PathBuf,
        error: TreeError,
    },
    SearchFinished { search_id: u64, stats: SearchStats },
}

impl WorkerEvent {
    pub fn search_id(&self) -> Option<u64> {
        match self {
            Self::Listed { .. } => None,
            Self::SearchLoaded { search_id, .. }
            | Self::SearchMatch { search_id, .. }
            | Self::SearchError { search_id, .. }
            | Self::SearchFinished { search_id, .. } => Some(*search_id),
        }
    }
}

pub struct TreeWorker {
    reads: Arc<SharedReads>,
    request_tx: Sender<PathBuf>,
    event_tx: Sender<WorkerEvent>,
    event_rx: Receiver<WorkerEvent>,
    pending: HashSet<PathBuf>,
    versions: SearchVersionTracker,
}

impl TreeWorker {
    pub fn start(fs: Arc<dyn FileSystem>) -> Result<Self> {
        let (request_tx, request_rx) = mpsc::channel::<PathBuf>();
        let (event_tx, event_rx) = mpsc::channel();
        let reads = Arc::new(SharedReads::new(fs));

        let listing_tx = event_tx.clone();
        let listing_reads = Arc::clone(&reads);
        std::thread::Builder::new()
            .name("filetree-listing".to_string())
            .spawn(move || {
                while let Ok(path) = request_rx.recv() {
                    let listing = load_children(listing_reads.as_ref(), &path);
                    if listing_tx.send(WorkerEvent::Listed { path, listing }).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| TreeError::Worker(e.to_string()))?;

        Ok(Self {
            reads,
            request_tx,
            event_tx,
            event_rx,
            pending: HashSet::new(),
            versions: SearchVersionTracker::new(),
        })
    }

    /// Queues a read of `path`. Returns `false` when a read of the same path is
    /// already in flight; the caller then receives that read's result.
    pub fn request_listing(&mut self, path: &Path) -> bool {
        if self.pending.contains(path) {
            tracing::debug!(path = %path.display(), "coalesced duplicate listing request");
            return false;
        }
        // Claimed before queueing so a search started meanwhile waits for this read.
        self.reads.claim(path);
        if self.request_tx.send(path.to_path_buf()).is_err() {
            tracing::error!("listing worker is gone");
            self.reads.release(path);
            return false;
        }
        self.pending.insert(path.to_path_buf());
        true
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains(path)
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Cancels any running search and starts a new one over `snapshot`.
    /// Returns the id that tags this search's events. The snapshot reads
    /// through the same shared reads as expand requests.
    pub fn start_search(
        &mut self,
        mut snapshot: TreeModel,
        query: SearchQuery,
        limits: SearchLimits,
    ) -> Result<u64> {
        snapshot.set_filesystem(self.reads.clone());
        let token = self.versions.next_token();
        let search_id = token.version();
        let tx = self.event_tx.clone();

        // Reads already queued stay shared until this search is done with them.
        let held: Vec<PathBuf> = self.pending.iter().cloned().collect();
        for path in &held {
            self.reads.claim(path);
        }
        let reads = Arc::clone(&self.reads);
        let spawned = std::thread::Builder::new()
            .name(format!("filetree-search-{search_id}"))
            .spawn(move || {
                run_search(snapshot, query, limits, token, tx);
                for path in &held {
                    reads.release(path);
                }
            });
        if let Err(err) = spawned {
            for path in &self.pending {
                self.reads.release(path);
            }
            return Err(TreeError::Worker(err.to_string()));
        }

        Ok(search_id)
    }

    /// Cancels the running search, if any.
    pub fn cancel_search(&self) {
        self.versions.next_version();
    }

    pub fn current_search(&self) -> u64 {
        self.versions.current_version()
    }

    pub fn try_recv(&mut self) -> Option<WorkerEvent> {
        let event = self.event_rx.try_recv().ok()?;
        if let WorkerEvent::Listed { path, .. } = &event {
            self.pending.remove(path);
            self.reads.release(path);
        }
        Some(event)
    }
}

struct ChannelObserver {
    search_id: u64,
    tx: Sender<WorkerEvent>,
}

impl SearchObserver for ChannelObserver {
    fn on_directory_loaded(&mut self, dir: &DirectoryNode) {
        let _ = self.tx.send(WorkerEvent::SearchLoaded {
            search_id: self.search_id,
            dir: dir.clone(),
        });
    }

    fn on_node_error(&mut self, path: &Path, error: &TreeError) {
        let _ = self.tx.send(WorkerEvent::SearchError {
            search_id: self.search_id,
            path: path.to_path_buf(),
            error: error.clone(),
        });
    }
}

fn run_search(
    mut snapshot: TreeModel,
    query: SearchQuery,
    limits: SearchLimits,
    token: CancellationToken,
    tx: Sender<WorkerEvent>,
) {
    let search_id = token.version();
    let observer = ChannelObserver {
        search_id,
        tx: tx.clone(),
    };
    tracing::debug!(search_id, query = query.text(), "search started");

    let mut walk = search(&mut snapshot, query, observer, token, limits);
    for found in walk.by_ref() {
        if tx.send(WorkerEvent::SearchMatch { search_id, found }).is_err() {
            return;
        }
    }
    let stats = walk.stats();
    tracing::debug!(search_id, ?stats, "search finished");
    let _ = tx.send(WorkerEvent::SearchFinished { search_id, stats });
}
