//! Directory reads shared between the listing thread and search threads.
//!
//! A read of a path that another thread is already performing waits for that
//! read and reuses its entries. A claimed path keeps its result until every
//! claim is released, so an expand request and a search started while it is
//! pending read the directory once between them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::error::{Result, TreeError};
use crate::fs_access::{FileSystem, RawEntry, ResolvedLink};

enum SlotState {
    Queued,
    Reading,
    Done(Result<Vec<RawEntry>>),
}

struct Slot {
    state: Mutex<SlotState>,
    changed: Condvar,
    claims: AtomicUsize,
}

impl Slot {
    fn new(claims: usize) -> Self {
        Self {
            state: Mutex::new(SlotState::Queued),
            changed: Condvar::new(),
            claims: AtomicUsize::new(claims),
        }
    }
}

pub struct SharedReads {
    inner: Arc<dyn FileSystem>,
    slots: Mutex<HashMap<PathBuf, Arc<Slot>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SharedReads {
    pub fn new(inner: Arc<dyn FileSystem>) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Keeps the next read of `path` available until a matching
    /// [`release`](Self::release).
    pub fn claim(&self, path: &Path) {
        let mut slots = lock(&self.slots);
        match slots.get(path) {
            Some(slot) => {
                slot.claims.fetch_add(1, Ordering::SeqCst);
            }
            None => {
                slots.insert(path.to_path_buf(), Arc::new(Slot::new(1)));
            }
        }
    }

    /// Drops one claim on `path`. With none left, later reads go to the
    /// filesystem.
    pub fn release(&self, path: &Path) {
        let mut slots = lock(&self.slots);
        let last = slots
            .get(path)
            .is_some_and(|slot| slot.claims.fetch_sub(1, Ordering::SeqCst) <= 1);
        if last {
            slots.remove(path);
        }
    }

    pub fn is_tracked(&self, path: &Path) -> bool {
        lock(&self.slots).contains_key(path)
    }

    fn forget(&self, path: &Path, slot: &Arc<Slot>) {
        let mut slots = lock(&self.slots);
        let unclaimed = slots.get(path).is_some_and(|current| {
            Arc::ptr_eq(current, slot) && current.claims.load(Ordering::SeqCst) == 0
        });
        if unclaimed {
            slots.remove(path);
        }
    }
}

impl FileSystem for SharedReads {
    fn list_directory(&self, path: &Path) -> Result<Vec<RawEntry>> {
        let slot = {
            let mut slots = lock(&self.slots);
            Arc::clone(
                slots
                    .entry(path.to_path_buf())
                    .or_insert_with(|| Arc::new(Slot::new(0))),
            )
        };

        let mut state = lock(&slot.state);
        loop {
            if let SlotState::Done(result) = &*state {
                tracing::debug!(path = %path.display(), "reused shared directory read");
                return result.clone();
            }
            if !matches!(*state, SlotState::Reading) {
                break;
            }
            state = slot
                .changed
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *state = SlotState::Reading;
        drop(state);

        let result = self.inner.list_directory(path);

        // A transient failure is not shared; the retry reads again.
        let transient = result.as_ref().is_err_and(TreeError::is_transient);
        *lock(&slot.state) = if transient {
            SlotState::Queued
        } else {
            SlotState::Done(result.clone())
        };
        slot.changed.notify_all();
        self.forget(path, &slot);
        result
    }

    fn resolve_symlink(&self, path: &Path) -> Result<ResolvedLink> {
        self.inner.resolve_symlink(path)
    }

    fn is_directory(&self, path: &Path) -> bool {
        self.inner.is_directory(path)
    }
}
