//! In-memory filesystem for tests that need to count reads or inject failures.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{Result, TreeError};
use crate::fs_access::{FileSystem, RawEntry, ResolvedLink};
use crate::node::NodeKind;

#[derive(Debug, Clone)]
enum FakeEntry {
    File,
    Dir,
    Link(Option<(PathBuf, NodeKind)>),
}

#[derive(Default)]
struct State {
    entries: BTreeMap<PathBuf, FakeEntry>,
    denied: Vec<PathBuf>,
    transient: HashMap<PathBuf, usize>,
    reads: HashMap<PathBuf, usize>,
}

impl State {
    /// `path` with every directory link along it replaced by its target, the
    /// way the OS follows links when reading through them.
    fn real_path(&self, path: &Path) -> PathBuf {
        let mut real = PathBuf::new();
        for component in path.components() {
            real.push(component);
            for _ in 0..32 {
                match self.entries.get(&real) {
                    Some(FakeEntry::Link(Some((target, NodeKind::Directory)))) => {
                        real = target.clone();
                    }
                    _ => break,
                }
            }
        }
        real
    }
}

pub(crate) struct FakeFileSystem {
    state: Mutex<State>,
}

impl FakeFileSystem {
    pub(crate) fn new(root: &str) -> Self {
        let fs = Self {
            state: Mutex::new(State::default()),
        };
        fs.add_dir(root);
        fs
    }

    pub(crate) fn add_dir(&self, path: &str) {
        self.insert(PathBuf::from(path), FakeEntry::Dir);
    }

    pub(crate) fn add_file(&self, path: &str) {
        self.insert(PathBuf::from(path), FakeEntry::File);
    }

    pub(crate) fn add_link(&self, path: &str, target: Option<(&str, NodeKind)>) {
        let target = target.map(|(p, k)| (PathBuf::from(p), k));
        self.insert(PathBuf::from(path), FakeEntry::Link(target));
    }

    pub(crate) fn deny(&self, path: &str) {
        self.state.lock().unwrap().denied.push(PathBuf::from(path));
    }

    pub(crate) fn fail_transient(&self, path: &str, times: usize) {
        self.state
            .lock()
            .unwrap()
            .transient
            .insert(PathBuf::from(path), times);
    }

    pub(crate) fn reads(&self, path: &str) -> usize {
        self.state
            .lock()
            .unwrap()
            .reads
            .get(Path::new(path))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn total_reads(&self) -> usize {
        self.state.lock().unwrap().reads.values().sum()
    }

    fn insert(&self, path: PathBuf, entry: FakeEntry) {
        let mut state = self.state.lock().unwrap();
        let mut parent = path.parent();
        while let Some(p) = parent {
            if p.as_os_str().is_empty() {
                break;
            }
            state
                .entries
                .entry(p.to_path_buf())
                .or_insert(FakeEntry::Dir);
            parent = p.parent();
        }
        state.entries.insert(path, entry);
    }
}

impl FileSystem for FakeFileSystem {
    fn list_directory(&self, path: &Path) -> Result<Vec<RawEntry>> {
        let mut state = self.state.lock().unwrap();
        *state.reads.entry(path.to_path_buf()).or_insert(0) += 1;

        if let Some(remaining) = state.transient.get_mut(path) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(TreeError::TransientIo {
                    path: path.to_path_buf(),
                    message: "too many open files".to_string(),
                });
            }
        }
        if state.denied.iter().any(|d| d == path) {
            return Err(TreeError::AccessDenied(path.to_path_buf()));
        }
        let real = state.real_path(path);
        match state.entries.get(&real) {
            Some(FakeEntry::Dir) => {}
            Some(_) => return Err(TreeError::NotADirectory(path.to_path_buf())),
            None => return Err(TreeError::NotFound(path.to_path_buf())),
        }

        Ok(state
            .entries
            .iter()
            .filter(|(p, _)| p.parent() == Some(real.as_path()))
            .map(|(p, e)| {
                let name = p
                    .file_name()
                    .map(|s| s.to_string_lossy().to_string())
                    .unwrap_or_default();
                RawEntry {
                    hidden: name.starts_with('.'),
                    name,
                    kind: if matches!(e, FakeEntry::Dir) {
                        NodeKind::Directory
                    } else {
                        NodeKind::File
                    },
                    is_symlink: matches!(e, FakeEntry::Link(_)),
                }
            })
            .collect())
    }

    fn resolve_symlink(&self, path: &Path) -> Result<ResolvedLink> {
        let state = self.state.lock().unwrap();
        let parent = path.parent().map(|p| state.real_path(p));
        let real = match (parent, path.file_name()) {
            (Some(parent), Some(name)) => parent.join(name),
            _ => path.to_path_buf(),
        };
        match state.entries.get(&real) {
            Some(FakeEntry::Link(Some((target, kind)))) => Ok(ResolvedLink {
                target: target.clone(),
                kind: *kind,
            }),
            _ => Err(TreeError::UnresolvedLink(path.to_path_buf())),
        }
    }

    fn is_directory(&self, path: &Path) -> bool {
        let state = self.state.lock().unwrap();
        matches!(state.entries.get(&state.real_path(path)), Some(FakeEntry::Dir))
    }
}
