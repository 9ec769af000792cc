use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{Result, TreeError};
use crate::fs_access::{FileSystem, OsFileSystem, load_children};
use crate::node::{DirectoryNode, LoadState, NodeKind};
use crate::query::PatternSet;

/// What the view wants to see when flattening the tree.
#[derive(Debug, Clone, Copy, Default)]
pub struct ViewOptions<'a> {
    pub show_hidden: bool,
    pub patterns: Option<&'a PatternSet>,
}

/// One displayable line of the tree.
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleRow {
    pub path: PathBuf,
    pub name: String,
    pub depth: usize,
    pub kind: NodeKind,
    pub state: LoadState,
    pub is_link: bool,
    pub unresolved: bool,
    pub error: Option<TreeError>,
}

/// Whether an expand request could be served from memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpandPlan {
    /// The node is now expanded (or was a no-op).
    Done,
    /// The node has never been read; its listing must be fetched first.
    NeedsListing,
}

/// The lazily materialized tree below a user-chosen folder.
#[derive(Clone)]
pub struct TreeModel {
    fs: Arc<dyn FileSystem>,
    root: Option<DirectoryNode>,
}

impl TreeModel {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs, root: None }
    }

    pub fn with_os_filesystem() -> Self {
        Self::new(Arc::new(OsFileSystem))
    }

    pub fn filesystem(&self) -> Arc<dyn FileSystem> {
        Arc::clone(&self.fs)
    }

    /// Reads future listings through `fs`. Nodes already loaded are kept.
    pub fn set_filesystem(&mut self, fs: Arc<dyn FileSystem>) {
        self.fs = fs;
    }

    /// Canonical location of `path`, or `path` itself when it cannot be
    /// resolved.
    pub(crate) fn real_path(&self, path: &Path) -> PathBuf {
        self.fs
            .resolve_symlink(path)
            .map(|resolved| resolved.target)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    pub fn set_root(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let abs = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::path::absolute(path).map_err(|_| TreeError::InvalidPath(path.to_path_buf()))?
        };
        if !self.fs.is_directory(&abs) {
            return Err(TreeError::InvalidPath(abs));
        }
        tracing::info!(root = %abs.display(), "root changed");
        self.root = Some(DirectoryNode::root(abs));
        Ok(())
    }

    pub fn clear(&mut self) {
        self.root = None;
    }

    pub fn root(&self) -> Option<&DirectoryNode> {
        self.root.as_ref()
    }

    pub fn root_path(&self) -> Option<&Path> {
        self.root.as_ref().map(|r| r.path())
    }

    pub fn find(&self, path: &Path) -> Option<&DirectoryNode> {
        let root = self.root.as_ref()?;
        let rel = path.strip_prefix(root.path()).ok()?;
        let mut node = root;
        for component in rel.components() {
            node = node.child(&component.as_os_str().to_string_lossy())?;
        }
        Some(node)
    }

    fn find_mut(&mut self, path: &Path) -> Option<&mut DirectoryNode> {
        let root = self.root.as_mut()?;
        let rel = path.strip_prefix(root.path()).ok()?.to_path_buf();
        let mut node = root;
        for component in rel.components() {
            node = node.child_mut(&component.as_os_str().to_string_lossy())?;
        }
        Some(node)
    }

    fn directory_mut(&mut self, path: &Path) -> Result<&mut DirectoryNode> {
        let node = self
            .find_mut(path)
            .ok_or_else(|| TreeError::NotFound(path.to_path_buf()))?;
        if !node.is_dir() {
            return Err(TreeError::NotADirectory(path.to_path_buf()));
        }
        Ok(node)
    }

    /// Shows the children of `path`, reading the filesystem only on first use.
    pub fn expand(&mut self, path: &Path) -> Result<()> {
        match self.plan_expand(path)? {
            ExpandPlan::Done => Ok(()),
            ExpandPlan::NeedsListing => {
                let listing = load_children(self.fs.as_ref(), path);
                self.install_listing(path, listing, true)
            }
        }
    }

    /// Expands from memory when possible. Used by the UI before deciding to
    /// hand a read to the background worker.
    pub fn plan_expand(&mut self, path: &Path) -> Result<ExpandPlan> {
        let node = self.directory_mut(path)?;
        match node.state() {
            LoadState::Unloaded => Ok(ExpandPlan::NeedsListing),
            LoadState::Loaded | LoadState::Collapsed => {
                node.set_state(LoadState::Expanded);
                Ok(ExpandPlan::Done)
            }
            LoadState::Expanded => Ok(ExpandPlan::Done),
        }
    }

    /// Materializes the children of `path` without showing them.
    pub fn load(&mut self, path: &Path) -> Result<()> {
        let node = self.directory_mut(path)?;
        if node.is_loaded() {
            return match node.error() {
                Some(err) => Err(err.clone()),
                None => Ok(()),
            };
        }
        let listing = load_children(self.fs.as_ref(), path);
        self.install_listing(path, listing, false)
    }

    pub fn collapse(&mut self, path: &Path) -> Result<()> {
        let node = self.directory_mut(path)?;
        if node.is_loaded() {
            node.set_state(LoadState::Collapsed);
        }
        Ok(())
    }

    /// Collapses every expanded directory below the root.
    pub fn collapse_all(&mut self) {
        if let Some(root) = self.root.as_mut() {
            root.collapse_descendants();
        }
    }

    /// Re-reads `path`, discarding its cached subtree.
    pub fn refresh(&mut self, path: &Path) -> Result<()> {
        let node = self.directory_mut(path)?;
        let was_expanded = node.is_expanded();
        node.set_state(LoadState::Unloaded);
        let listing = load_children(self.fs.as_ref(), path);
        self.install_listing(path, listing, was_expanded)
    }

    /// Applies a listing produced elsewhere. A node that is already loaded keeps
    /// its snapshot; only its visibility follows `expand`.
    pub fn install_listing(
        &mut self,
        path: &Path,
        listing: Result<Vec<DirectoryNode>>,
        expand: bool,
    ) -> Result<()> {
        let node = self.directory_mut(path)?;
        if node.is_loaded() {
            if expand {
                node.set_state(LoadState::Expanded);
            }
            return Ok(());
        }

        let failure = listing.as_ref().err().cloned();
        node.install(listing);
        match failure {
            Some(err) => {
                tracing::warn!(path = %path.display(), error = %err, "directory read failed");
                node.set_state(LoadState::Loaded);
                Err(err)
            }
            None => {
                node.set_state(if expand {
                    LoadState::Expanded
                } else {
                    LoadState::Loaded
                });
                Ok(())
            }
        }
    }

    /// Installs a directory that a search snapshot materialized.
    pub fn install_loaded(&mut self, loaded: &DirectoryNode) -> Result<()> {
        let listing = match loaded.error() {
            Some(err) => Err(err.clone()),
            None => Ok(loaded
                .children()
                .iter()
                .map(|c| {
                    let mut c = c.clone();
                    c.reset();
                    c
                })
                .collect()),
        };
        self.install_listing(loaded.path(), listing, false)
    }

    /// Expands every ancestor of `path`, from the root down, and returns them.
    pub fn reveal(&mut self, path: &Path) -> Result<Vec<PathBuf>> {
        let root = self
            .root_path()
            .ok_or_else(|| TreeError::NotFound(path.to_path_buf()))?
            .to_path_buf();
        let mut ancestors: Vec<PathBuf> = path
            .ancestors()
            .skip(1)
            .take_while(|p| p.starts_with(&root))
            .map(Path::to_path_buf)
            .collect();
        ancestors.reverse();
        for ancestor in &ancestors {
            self.expand(ancestor)?;
        }
        Ok(ancestors)
    }

    /// Flattens the shown part of the tree. The root itself is not a row.
    pub fn visible_rows(&self, view: ViewOptions<'_>) -> Vec<VisibleRow> {
        let mut out = Vec::new();
        if let Some(root) = self.root.as_ref() {
            if root.is_expanded() {
                push_rows(root, 0, view, &mut out);
            }
        }
        out
    }
}

fn push_rows(dir: &DirectoryNode, depth: usize, view: ViewOptions<'_>, out: &mut Vec<VisibleRow>) {
    for child in dir.children() {
        if child.is_hidden() && !view.show_hidden {
            continue;
        }
        if !child.is_dir() {
            if let Some(patterns) = view.patterns {
                if !patterns.is_empty() && !patterns.matches(child.name()) {
                    continue;
                }
            }
        }
        out.push(VisibleRow {
            path: child.path().to_path_buf(),
            name: child.name().to_string(),
            depth,
            kind: child.kind(),
            state: child.state(),
            is_link: child.is_link(),
            unresolved: child.is_unresolved(),
            error: child.error().cloned(),
        });
        if child.is_expanded() {
            push_rows(child, depth + 1, view, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFileSystem;

    fn tree_with(fs: &Arc<FakeFileSystem>) -> TreeModel {
        let mut tree = TreeModel::new(fs.clone());
        tree.set_root("/r").expect("root");
        tree
    }

    fn sample_fs() -> Arc<FakeFileSystem> {
        let fs = Arc::new(FakeFileSystem::new("/r"));
        fs.add_file("/r/b.txt");
        fs.add_file("/r/A.md");
        fs.add_dir("/r/src");
        fs.add_file("/r/src/main.rs");
        fs.add_dir("/r/docs");
        fs
    }

    #[test]
    fn set_root_rejects_missing_and_file_paths() {
        let fs = sample_fs();
        let mut tree = TreeModel::new(fs);
        assert_eq!(
            tree.set_root("/nowhere"),
            Err(TreeError::InvalidPath(PathBuf::from("/nowhere")))
        );
        assert!(matches!(tree.set_root("/r/b.txt"), Err(TreeError::InvalidPath(_))));
        assert!(tree.root().is_none());
    }

    #[test]
    fn set_root_starts_unloaded() {
        let fs = sample_fs();
        let tree = tree_with(&fs);
        assert_eq!(tree.root().unwrap().state(), LoadState::Unloaded);
        assert_eq!(fs.total_reads(), 0);
    }

    #[test]
    fn double_expand_reads_once() {
        let fs = sample_fs();
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        tree.expand(Path::new("/r")).unwrap();
        assert_eq!(fs.reads("/r"), 1);
        assert!(tree.root().unwrap().is_expanded());
    }

    #[test]
    fn collapse_then_expand_reuses_cache() {
        let fs = sample_fs();
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        tree.expand(Path::new("/r/src")).unwrap();
        tree.collapse(Path::new("/r/src")).unwrap();
        assert_eq!(
            tree.find(Path::new("/r/src")).unwrap().state(),
            LoadState::Collapsed
        );
        assert_eq!(tree.find(Path::new("/r/src")).unwrap().children().len(), 1);

        tree.expand(Path::new("/r/src")).unwrap();
        assert_eq!(fs.reads("/r/src"), 1);
        assert!(tree.find(Path::new("/r/src")).unwrap().is_expanded());
    }

    #[test]
    fn refresh_always_reads_exactly_once() {
        let fs = sample_fs();
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        fs.add_file("/r/new.txt");

        tree.refresh(Path::new("/r")).unwrap();
        assert_eq!(fs.reads("/r"), 2);
        assert!(tree.find(Path::new("/r/new.txt")).is_some());
        assert!(tree.root().unwrap().is_expanded());
    }

    #[test]
    fn refresh_discards_materialized_subtree() {
        let fs = sample_fs();
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        tree.expand(Path::new("/r/src")).unwrap();
        tree.refresh(Path::new("/r")).unwrap();
        assert_eq!(
            tree.find(Path::new("/r/src")).unwrap().state(),
            LoadState::Unloaded
        );
    }

    #[test]
    fn children_are_sorted_directories_first() {
        let fs = sample_fs();
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        let names: Vec<&str> = tree
            .root()
            .unwrap()
            .children()
            .iter()
            .map(|c| c.name())
            .collect();
        assert_eq!(names, vec!["docs", "src", "A.md", "b.txt"]);
    }

    #[test]
    fn access_denied_subdirectory_keeps_siblings() {
        let fs = Arc::new(FakeFileSystem::new("/r"));
        fs.add_file("/r/one/a.txt");
        fs.add_dir("/r/locked");
        fs.add_file("/r/three/c.txt");
        fs.deny("/r/locked");
        let mut tree = tree_with(&fs);

        tree.expand(Path::new("/r")).unwrap();
        let results: Vec<_> = ["/r/one", "/r/locked", "/r/three"]
            .iter()
            .map(|p| tree.expand(Path::new(p)))
            .collect();

        assert!(results[0].is_ok());
        assert_eq!(
            results[1],
            Err(TreeError::AccessDenied(PathBuf::from("/r/locked")))
        );
        assert!(results[2].is_ok());

        let root = tree.root().unwrap();
        assert_eq!(root.children().len(), 3);
        let errored: Vec<&str> = root
            .children()
            .iter()
            .filter(|c| c.error().is_some())
            .map(|c| c.name())
            .collect();
        assert_eq!(errored, vec!["locked"]);

        let locked = tree.find(Path::new("/r/locked")).unwrap();
        assert_eq!(locked.state(), LoadState::Loaded);
        assert!(locked.children().is_empty());
        assert_eq!(tree.find(Path::new("/r/one")).unwrap().children().len(), 1);
    }

    #[test]
    fn expanding_a_file_is_rejected() {
        let fs = sample_fs();
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        assert_eq!(
            tree.expand(Path::new("/r/b.txt")),
            Err(TreeError::NotADirectory(PathBuf::from("/r/b.txt")))
        );
    }

    #[test]
    fn broken_link_is_an_unresolved_leaf() {
        let fs = Arc::new(FakeFileSystem::new("/r"));
        fs.add_link("/r/dangling", None);
        fs.add_link("/r/alias", Some(("/elsewhere", NodeKind::Directory)));
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();

        let alias = tree.find(Path::new("/r/alias")).unwrap();
        assert!(alias.is_dir());
        assert!(alias.is_link());
        let dangling = tree.find(Path::new("/r/dangling")).unwrap();
        assert_eq!(dangling.kind(), NodeKind::File);
        assert!(dangling.is_unresolved());
    }

    #[test]
    fn directory_link_expands_into_its_target() {
        let fs = Arc::new(FakeFileSystem::new("/r"));
        fs.add_file("/outside/target.md");
        fs.add_link("/r/alias", Some(("/outside", NodeKind::Directory)));
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        tree.expand(Path::new("/r/alias")).unwrap();

        let alias = tree.find(Path::new("/r/alias")).unwrap();
        assert_eq!(alias.link_target(), Some(Path::new("/outside")));
        assert!(alias.is_expanded());
        assert!(tree.find(Path::new("/r/alias/target.md")).is_some());
        assert_eq!(fs.reads("/r/alias"), 1);
    }

    #[test]
    fn reveal_expands_all_ancestors() {
        let fs = Arc::new(FakeFileSystem::new("/r"));
        fs.add_file("/r/a/b/c.txt");
        let mut tree = tree_with(&fs);

        let ancestors = tree.reveal(Path::new("/r/a/b/c.txt")).unwrap();
        assert_eq!(
            ancestors,
            vec![
                PathBuf::from("/r"),
                PathBuf::from("/r/a"),
                PathBuf::from("/r/a/b")
            ]
        );
        assert!(tree.find(Path::new("/r/a/b")).unwrap().is_expanded());
    }

    #[test]
    fn collapse_all_keeps_root_expanded() {
        let fs = sample_fs();
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        tree.expand(Path::new("/r/src")).unwrap();
        tree.collapse_all();
        assert!(tree.root().unwrap().is_expanded());
        assert_eq!(
            tree.find(Path::new("/r/src")).unwrap().state(),
            LoadState::Collapsed
        );
    }

    #[test]
    fn visible_rows_follow_expansion_and_filters() {
        let fs = sample_fs();
        fs.add_file("/r/.hidden");
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        tree.expand(Path::new("/r/src")).unwrap();

        let rows = tree.visible_rows(ViewOptions::default());
        let names: Vec<(&str, usize)> = rows.iter().map(|r| (r.name.as_str(), r.depth)).collect();
        assert_eq!(
            names,
            vec![("docs", 0), ("src", 0), ("main.rs", 1), ("A.md", 0), ("b.txt", 0)]
        );

        let patterns = PatternSet::parse("*.md");
        let rows = tree.visible_rows(ViewOptions {
            show_hidden: true,
            patterns: Some(&patterns),
        });
        let names: Vec<&str> = rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["docs", "src", "A.md"]);
    }

    #[test]
    fn install_listing_does_not_overwrite_loaded_node() {
        let fs = sample_fs();
        let mut tree = tree_with(&fs);
        tree.expand(Path::new("/r")).unwrap();
        tree.install_listing(Path::new("/r"), Ok(Vec::new()), true)
            .unwrap();
        assert_eq!(tree.root().unwrap().children().len(), 4);
    }
}
