use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cancel::CancellationToken;
use crate::config::SearchConfig;
use crate::error::TreeError;
use crate::node::{DirectoryNode, NodeKind};
use crate::query::SearchQuery;
use crate::tree::TreeModel;

/// Callbacks from the engine to whoever displays the tree.
pub trait SearchObserver {
    fn on_match_found(&mut self, _found: &SearchMatch) {}

    fn on_ancestors_need_expansion(&mut self, _ancestors: &[PathBuf]) {}

    /// A directory was read for the first time while searching.
    fn on_directory_loaded(&mut self, _dir: &DirectoryNode) {}

    fn on_node_error(&mut self, _path: &Path, _error: &TreeError) {}
}

impl SearchObserver for () {}

impl<O: SearchObserver + ?Sized> SearchObserver for &mut O {
    fn on_match_found(&mut self, found: &SearchMatch) {
        (**self).on_match_found(found);
    }

    fn on_ancestors_need_expansion(&mut self, ancestors: &[PathBuf]) {
        (**self).on_ancestors_need_expansion(ancestors);
    }

    fn on_directory_loaded(&mut self, dir: &DirectoryNode) {
        (**self).on_directory_loaded(dir);
    }

    fn on_node_error(&mut self, path: &Path, error: &TreeError) {
        (**self).on_node_error(path, error);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchMatch {
    pub path: PathBuf,
    pub name: String,
    pub kind: NodeKind,
    /// Root first, parent last.
    pub ancestors: Vec<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchLimits {
    pub max_visited: usize,
    pub max_matches: Option<usize>,
    pub include_hidden: bool,
}

impl Default for SearchLimits {
    fn default() -> Self {
        Self {
            max_visited: 4000,
            max_matches: None,
            include_hidden: false,
        }
    }
}

impl SearchLimits {
    pub fn from_config(config: &SearchConfig, include_hidden: bool) -> Self {
        Self {
            max_visited: config.max_visited,
            max_matches: None,
            include_hidden,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SearchStats {
    pub visited: usize,
    pub directories_loaded: usize,
    pub matches: usize,
    pub cancelled: bool,
    /// Stopped because `max_visited` was reached.
    pub truncated: bool,
}

/// Real locations of the directories between the root and a pending entry,
/// innermost first.
#[derive(Debug)]
struct Lineage {
    real: PathBuf,
    parent: Option<Arc<Lineage>>,
}

impl Lineage {
    /// True when `target` is one of these directories or contains one.
    fn encloses(&self, target: &Path) -> bool {
        let mut cursor = Some(self);
        while let Some(dir) = cursor {
            if dir.real.starts_with(target) {
                return true;
            }
            cursor = dir.parent.as_deref();
        }
        false
    }
}

struct Pending {
    path: PathBuf,
    /// Directories above `path`. `None` only for the root.
    lineage: Option<Arc<Lineage>>,
}

/// Depth-first walk over the tree that yields matches lazily.
///
/// Directories are read only when the walk reaches them. Matched entries have
/// their ancestors expanded before they are yielded. Directory links are
/// followed unless their target is already on the current branch or was
/// reached through another link.
pub struct Search<'t, O: SearchObserver> {
    tree: &'t mut TreeModel,
    query: SearchQuery,
    observer: O,
    cancel: CancellationToken,
    limits: SearchLimits,
    stack: Vec<Pending>,
    root: PathBuf,
    followed_links: HashSet<PathBuf>,
    stats: SearchStats,
    done: bool,
}

pub fn search<'t, O: SearchObserver>(
    tree: &'t mut TreeModel,
    query: SearchQuery,
    observer: O,
    cancel: CancellationToken,
    limits: SearchLimits,
) -> Search<'t, O> {
    let root = tree.root_path().map(Path::to_path_buf);
    let (stack, root, done) = match root {
        Some(root) if !query.is_empty() => {
            let start = Pending {
                path: root.clone(),
                lineage: None,
            };
            (vec![start], root, false)
        }
        Some(root) => (Vec::new(), root, true),
        None => (Vec::new(), PathBuf::new(), true),
    };
    Search {
        tree,
        query,
        observer,
        cancel,
        limits,
        stack,
        root,
        followed_links: HashSet::new(),
        stats: SearchStats::default(),
        done,
    }
}

impl<O: SearchObserver> Search<'_, O> {
    pub fn stats(&self) -> SearchStats {
        self.stats
    }

    pub fn tree(&self) -> &TreeModel {
        self.tree
    }

    fn finish(&mut self) -> Option<SearchMatch> {
        self.done = true;
        self.stack.clear();
        None
    }

    /// Where the walk would really read the directory at `path`, or `None`
    /// when entering it would revisit a directory.
    fn real_location(
        &mut self,
        path: &Path,
        link_target: Option<PathBuf>,
        lineage: Option<&Arc<Lineage>>,
    ) -> Option<PathBuf> {
        let Some(lineage) = lineage else {
            return Some(self.tree.real_path(path));
        };
        let Some(target) = link_target else {
            return path.file_name().map(|name| lineage.real.join(name));
        };
        if lineage.encloses(&target) || !self.followed_links.insert(target.clone()) {
            tracing::debug!(path = %path.display(), target = %target.display(), "link not followed");
            return None;
        }
        Some(target)
    }

    /// Reads `dir` if needed and schedules its children in display order.
    fn descend(&mut self, dir: &Path, lineage: Arc<Lineage>) {
        let was_loaded = self.tree.find(dir).is_some_and(DirectoryNode::is_loaded);
        let outcome = self.tree.load(dir);
        if !was_loaded {
            self.stats.directories_loaded += 1;
            if let Some(node) = self.tree.find(dir) {
                self.observer.on_directory_loaded(node);
            }
        }
        if let Err(err) = outcome {
            tracing::debug!(path = %dir.display(), error = %err, "search skipped directory");
            self.observer.on_node_error(dir, &err);
            return;
        }

        let Some(node) = self.tree.find(dir) else {
            return;
        };
        let include_hidden = self.limits.include_hidden;
        self.stack.extend(
            node.children()
                .iter()
                .rev()
                .filter(|c| include_hidden || !c.is_hidden())
                .map(|c| Pending {
                    path: c.path().to_path_buf(),
                    lineage: Some(lineage.clone()),
                }),
        );
    }

    fn report(&mut self, path: &Path, name: String, kind: NodeKind) -> Option<SearchMatch> {
        let ancestors = match self.tree.reveal(path) {
            Ok(ancestors) => ancestors,
            Err(err) => {
                self.observer.on_node_error(path, &err);
                return None;
            }
        };
        self.observer.on_ancestors_need_expansion(&ancestors);
        let found = SearchMatch {
            path: path.to_path_buf(),
            name,
            kind,
            ancestors,
        };
        self.observer.on_match_found(&found);
        self.stats.matches += 1;
        Some(found)
    }
}

impl<O: SearchObserver> Iterator for Search<'_, O> {
    type Item = SearchMatch;

    fn next(&mut self) -> Option<SearchMatch> {
        if self.done {
            return None;
        }
        if self
            .limits
            .max_matches
            .is_some_and(|max| self.stats.matches >= max)
        {
            return self.finish();
        }

        while let Some(Pending { path, lineage }) = self.stack.pop() {
            if self.stats.visited >= self.limits.max_visited {
                self.stats.truncated = true;
                return self.finish();
            }

            let Some(node) = self.tree.find(&path) else {
                continue;
            };
            let name = node.name().to_string();
            let kind = node.kind();
            let link_target = node.link_target().map(Path::to_path_buf);
            let is_root = path == self.root;

            if kind == NodeKind::Directory {
                if let Some(real) = self.real_location(&path, link_target, lineage.as_ref()) {
                    if self.cancel.is_cancelled() {
                        self.stats.cancelled = true;
                        tracing::debug!(query = self.query.text(), "search cancelled");
                        return self.finish();
                    }
                    let inner = Arc::new(Lineage {
                        real,
                        parent: lineage,
                    });
                    self.descend(&path, inner);
                }
            }

            if is_root {
                continue;
            }
            self.stats.visited += 1;

            if self.query.matches(&name, kind) {
                if let Some(found) = self.report(&path, name, kind) {
                    return Some(found);
                }
            }
        }

        self.finish()
    }
}
