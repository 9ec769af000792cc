//! Plain-text recursive dump of a folder, printed when the window cannot open.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::fs_access::{FileSystem, load_children};
use crate::node::DirectoryNode;

/// Writes an indented tree of `root` to `out`. Unreadable folders are
/// annotated inline. Directory links are followed unless they lead back to a
/// folder already being printed.
pub fn write_listing(
    fs: &dyn FileSystem,
    root: &Path,
    show_hidden: bool,
    out: &mut dyn Write,
) -> io::Result<()> {
    writeln!(out, "{}", root.display())?;
    let real_root = fs
        .resolve_symlink(root)
        .map(|resolved| resolved.target)
        .unwrap_or_else(|_| root.to_path_buf());
    let mut open_dirs = vec![real_root];
    write_dir(fs, root, show_hidden, "", &mut open_dirs, out)
}

fn write_dir(
    fs: &dyn FileSystem,
    dir: &Path,
    show_hidden: bool,
    prefix: &str,
    open_dirs: &mut Vec<PathBuf>,
    out: &mut dyn Write,
) -> io::Result<()> {
    let children = match load_children(fs, dir) {
        Ok(children) => children,
        Err(err) => {
            writeln!(out, "{prefix}└── [{}]", err.annotation())?;
            return Ok(());
        }
    };
    let children: Vec<DirectoryNode> = children
        .into_iter()
        .filter(|c| show_hidden || !c.is_hidden())
        .collect();

    for (idx, child) in children.iter().enumerate() {
        let last = idx + 1 == children.len();
        let branch = if last { "└── " } else { "├── " };
        let real = match child.link_target() {
            Some(target) => target.to_path_buf(),
            None => open_dirs
                .last()
                .map_or_else(|| child.path().to_path_buf(), |parent| parent.join(child.name())),
        };
        let cycle = child.is_link() && open_dirs.iter().any(|open| open.starts_with(&real));
        let suffix = match child.link_target() {
            _ if child.is_unresolved() => " [broken link]".to_string(),
            Some(target) if cycle => format!(" -> {} [cycle]", target.display()),
            Some(target) => format!(" -> {}", target.display()),
            None if child.is_dir() => "/".to_string(),
            None => String::new(),
        };
        writeln!(out, "{prefix}{branch}{}{suffix}", child.name())?;

        if child.is_dir() && !cycle {
            let nested = format!("{prefix}{}", if last { "    " } else { "│   " });
            open_dirs.push(real);
            let written = write_dir(fs, child.path(), show_hidden, &nested, open_dirs, out);
            open_dirs.pop();
            written?;
        }
    }
    Ok(())
}
