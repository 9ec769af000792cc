use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use crate::error::TreeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Directory,
}

/// Per-node expansion state.
///
/// `Unloaded -> Loaded | Expanded`, then `Expanded <-> Collapsed`. `Loaded`
/// means the children were read (by search or a failed read) but never shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Unloaded,
    Loaded,
    Expanded,
    Collapsed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DirectoryNode {
    path: PathBuf,
    name: String,
    kind: NodeKind,
    state: LoadState,
    children: Vec<DirectoryNode>,
    is_link: bool,
    link_target: Option<PathBuf>,
    unresolved: bool,
    hidden: bool,
    error: Option<TreeError>,
}

impl DirectoryNode {
    /// Root node for a folder. The display name falls back to the full path for
    /// drive roots and `/`.
    pub fn root(path: PathBuf) -> Self {
        let name = display_name(&path);
        Self {
            path,
            name,
            kind: NodeKind::Directory,
            state: LoadState::Unloaded,
            children: Vec::new(),
            is_link: false,
            link_target: None,
            unresolved: false,
            hidden: false,
            error: None,
        }
    }

    pub fn entry(path: PathBuf, name: String, kind: NodeKind) -> Self {
        Self {
            path,
            name,
            kind,
            state: LoadState::Unloaded,
            children: Vec::new(),
            is_link: false,
            link_target: None,
            unresolved: false,
            hidden: false,
            error: None,
        }
    }

    /// Marks the node as a link. `None` means the target could not be
    /// resolved, which turns the node into an error leaf.
    pub(crate) fn with_link(mut self, target: Option<PathBuf>) -> Self {
        self.is_link = true;
        self.unresolved = target.is_none();
        if self.unresolved {
            self.kind = NodeKind::File;
            self.error = Some(TreeError::UnresolvedLink(self.path.clone()));
        }
        self.link_target = target;
        self
    }

    pub(crate) fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> NodeKind {
        self.kind
    }

    pub fn is_dir(&self) -> bool {
        self.kind == NodeKind::Directory
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_loaded(&self) -> bool {
        self.state != LoadState::Unloaded
    }

    pub fn is_expanded(&self) -> bool {
        self.state == LoadState::Expanded
    }

    pub fn children(&self) -> &[DirectoryNode] {
        &self.children
    }

    pub fn is_link(&self) -> bool {
        self.is_link
    }

    /// Canonical target of a resolved link.
    pub fn link_target(&self) -> Option<&Path> {
        self.link_target.as_deref()
    }

    pub fn is_unresolved(&self) -> bool {
        self.unresolved
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden
    }

    pub fn error(&self) -> Option<&TreeError> {
        self.error.as_ref()
    }

    pub fn child(&self, name: &str) -> Option<&DirectoryNode> {
        self.children.iter().find(|c| c.name == name)
    }

    pub(crate) fn child_mut(&mut self, name: &str) -> Option<&mut DirectoryNode> {
        self.children.iter_mut().find(|c| c.name == name)
    }

    pub(crate) fn set_state(&mut self, state: LoadState) {
        self.state = state;
    }

    /// Replaces the children with a fresh snapshot, or with nothing plus an
    /// error annotation when the read failed.
    pub(crate) fn install(&mut self, listing: Result<Vec<DirectoryNode>, TreeError>) {
        match listing {
            Ok(children) => {
                self.children = children;
                self.error = None;
            }
            Err(err) => {
                self.children.clear();
                self.error = Some(err);
            }
        }
    }

    /// Drops whatever was materialized below this node.
    pub(crate) fn reset(&mut self) {
        if self.is_dir() {
            self.state = LoadState::Unloaded;
            self.children.clear();
            self.error = None;
        }
    }

    pub(crate) fn collapse_descendants(&mut self) {
        for child in &mut self.children {
            if child.state == LoadState::Expanded {
                child.state = LoadState::Collapsed;
            }
            child.collapse_descendants();
        }
    }
}

/// Directories first, then case-insensitive name order. Exact name breaks ties
/// so the order is deterministic.
pub fn compare_nodes(a: &DirectoryNode, b: &DirectoryNode) -> Ordering {
    b.is_dir()
        .cmp(&a.is_dir())
        .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
        .then_with(|| a.name.cmp(&b.name))
}

pub fn sort_nodes(nodes: &mut [DirectoryNode]) {
    nodes.sort_by(compare_nodes);
}

pub fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| path.display().to_string())
}
