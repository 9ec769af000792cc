use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Result, TreeError};
use crate::node::{DirectoryNode, NodeKind, sort_nodes};

/// One entry as reported by a directory read, before link resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntry {
    pub name: String,
    pub kind: NodeKind,
    pub is_symlink: bool,
    pub hidden: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLink {
    pub target: PathBuf,
    pub kind: NodeKind,
}

pub trait FileSystem: Send + Sync {
    /// Immediate entries of `path`, non-recursive, in no particular order.
    fn list_directory(&self, path: &Path) -> Result<Vec<RawEntry>>;

    fn resolve_symlink(&self, path: &Path) -> Result<ResolvedLink>;

    fn is_directory(&self, path: &Path) -> bool;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct OsFileSystem;

impl FileSystem for OsFileSystem {
    fn list_directory(&self, path: &Path) -> Result<Vec<RawEntry>> {
        let read_dir = fs::read_dir(path).map_err(|e| TreeError::from_io(path, e))?;

        let mut entries = Vec::new();
        for entry in read_dir {
            // A single unreadable entry must not hide its siblings.
            let Ok(entry) = entry else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().to_string();
            let Ok(file_type) = entry.file_type() else {
                entries.push(RawEntry {
                    hidden: is_hidden_entry(&entry.path(), &name),
                    name,
                    kind: NodeKind::File,
                    is_symlink: false,
                });
                continue;
            };
            let kind = if file_type.is_dir() {
                NodeKind::Directory
            } else {
                NodeKind::File
            };
            entries.push(RawEntry {
                hidden: is_hidden_entry(&entry.path(), &name),
                name,
                kind,
                is_symlink: file_type.is_symlink(),
            });
        }
        Ok(entries)
    }

    fn resolve_symlink(&self, path: &Path) -> Result<ResolvedLink> {
        let unresolved = |_| TreeError::UnresolvedLink(path.to_path_buf());
        let target = fs::canonicalize(path).map_err(unresolved)?;
        let meta = fs::metadata(&target).map_err(unresolved)?;
        let kind = if meta.is_dir() {
            NodeKind::Directory
        } else {
            NodeKind::File
        };
        Ok(ResolvedLink { target, kind })
    }

    fn is_directory(&self, path: &Path) -> bool {
        path.is_dir()
    }
}

#[cfg(windows)]
fn is_hidden_entry(path: &Path, _name: &str) -> bool {
    use std::os::windows::fs::MetadataExt;
    use windows::Win32::Storage::FileSystem::{FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_SYSTEM};

    let Ok(meta) = fs::symlink_metadata(path) else {
        return false;
    };
    let attrs = meta.file_attributes();
    (attrs & FILE_ATTRIBUTE_HIDDEN.0) != 0 || (attrs & FILE_ATTRIBUTE_SYSTEM.0) != 0
}

#[cfg(not(windows))]
fn is_hidden_entry(_path: &Path, name: &str) -> bool {
    name.starts_with('.')
}

/// Reads the immediate children of `dir` and turns them into sorted, unloaded
/// nodes. A transient failure is retried once before it settles into an
/// access-denied error. Links take their target's kind, or become
/// unresolved file leaves.
pub fn load_children(fs: &dyn FileSystem, dir: &Path) -> Result<Vec<DirectoryNode>> {
    let entries = match fs.list_directory(dir) {
        Err(err) if err.is_transient() => {
            tracing::debug!(path = %dir.display(), "transient read failure, retrying once");
            fs.list_directory(dir).map_err(TreeError::settle)?
        }
        other => other?,
    };

    let mut nodes: Vec<DirectoryNode> = entries
        .into_iter()
        .map(|entry| {
            let path = dir.join(&entry.name);
            if !entry.is_symlink {
                return DirectoryNode::entry(path, entry.name, entry.kind).with_hidden(entry.hidden);
            }
            match fs.resolve_symlink(&path) {
                Ok(link) => DirectoryNode::entry(path, entry.name, link.kind)
                    .with_hidden(entry.hidden)
                    .with_link(Some(link.target)),
                Err(err) => {
                    tracing::debug!(path = %path.display(), error = %err, "unresolved link");
                    DirectoryNode::entry(path, entry.name, NodeKind::File)
                        .with_hidden(entry.hidden)
                        .with_link(None)
                }
            }
        })
        .collect();

    sort_nodes(&mut nodes);
    tracing::debug!(path = %dir.display(), count = nodes.len(), "enumerated directory");
    Ok(nodes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeFileSystem;
    use std::fs as stdfs;

    #[test]
    fn os_listing_returns_files_and_dirs() {
        let dir = tempfile::tempdir().expect("temp dir");
        stdfs::write(dir.path().join("file1.txt"), "").unwrap();
        stdfs::create_dir(dir.path().join("subdir")).unwrap();

        let nodes = load_children(&OsFileSystem, dir.path()).expect("list");
        let names: Vec<&str> = nodes.iter().map(|n| n.name()).collect();
        assert_eq!(names, vec!["subdir", "file1.txt"]);
        assert!(nodes[0].is_dir());
        assert!(!nodes[1].is_dir());
    }

    #[test]
    fn os_listing_of_missing_dir_is_not_found() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("nope");
        let err = load_children(&OsFileSystem, &missing).unwrap_err();
        assert_eq!(err, TreeError::NotFound(missing));
    }

    #[cfg(unix)]
    #[test]
    fn os_listing_resolves_links_to_target_kind() {
        let dir = tempfile::tempdir().expect("temp dir");
        stdfs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("alias")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("gone"), dir.path().join("dangling")).unwrap();

        let nodes = load_children(&OsFileSystem, dir.path()).expect("list");
        let alias = nodes.iter().find(|n| n.name() == "alias").unwrap();
        assert!(alias.is_dir());
        assert!(alias.is_link());
        assert!(!alias.is_unresolved());
        let real = stdfs::canonicalize(dir.path().join("real")).unwrap();
        assert_eq!(alias.link_target(), Some(real.as_path()));

        let dangling = nodes.iter().find(|n| n.name() == "dangling").unwrap();
        assert!(!dangling.is_dir());
        assert!(dangling.is_unresolved());
    }

    #[cfg(unix)]
    #[test]
    fn dot_files_are_hidden() {
        let dir = tempfile::tempdir().expect("temp dir");
        stdfs::write(dir.path().join(".env"), "").unwrap();
        let nodes = load_children(&OsFileSystem, dir.path()).expect("list");
        assert!(nodes[0].is_hidden());
    }

    #[test]
    fn transient_failure_is_retried_once() {
        let fs = FakeFileSystem::new("/r");
        fs.add_file("/r/a.txt");
        fs.fail_transient("/r", 1);

        let nodes = load_children(&fs, Path::new("/r")).expect("retry succeeds");
        assert_eq!(nodes.len(), 1);
        assert_eq!(fs.reads("/r"), 2);
    }

    #[test]
    fn persistent_transient_failure_settles_as_access_denied() {
        let fs = FakeFileSystem::new("/r");
        fs.fail_transient("/r", 5);

        let err = load_children(&fs, Path::new("/r")).unwrap_err();
        assert_eq!(err, TreeError::AccessDenied(PathBuf::from("/r")));
        assert_eq!(fs.reads("/r"), 2);
    }
}
