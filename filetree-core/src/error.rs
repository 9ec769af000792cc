use std::io;
use std::path::{Path, PathBuf};

/// Raw OS codes for "too many open files/handles".
#[cfg(unix)]
const TOO_MANY_OPEN_CODES: &[i32] = &[23, 24];
#[cfg(windows)]
const TOO_MANY_OPEN_CODES: &[i32] = &[4];
#[cfg(not(any(unix, windows)))]
const TOO_MANY_OPEN_CODES: &[i32] = &[];

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    #[error("Not a folder: {0}")]
    InvalidPath(PathBuf),

    #[error("Access denied: {0}")]
    AccessDenied(PathBuf),

    #[error("Unresolved link: {0}")]
    UnresolvedLink(PathBuf),

    #[error("Transient I/O error on {path}: {message}")]
    TransientIo { path: PathBuf, message: String },

    #[error("Path not found: {0}")]
    NotFound(PathBuf),

    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("I/O error on {path}: {message}")]
    Io { path: PathBuf, message: String },

    #[error("Background worker error: {0}")]
    Worker(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;

impl TreeError {
    /// Classifies an OS error raised while touching `path`.
    pub fn from_io(path: &Path, err: io::Error) -> Self {
        if let Some(code) = err.raw_os_error() {
            if TOO_MANY_OPEN_CODES.contains(&code) {
                return Self::TransientIo {
                    path: path.to_path_buf(),
                    message: err.to_string(),
                };
            }
        }
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            io::ErrorKind::PermissionDenied => Self::AccessDenied(path.to_path_buf()),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                message: err.to_string(),
            },
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientIo { .. })
    }

    /// A transient failure that survived its retry is reported like a denied read.
    pub fn settle(self) -> Self {
        match self {
            Self::TransientIo { path, .. } => Self::AccessDenied(path),
            other => other,
        }
    }

    /// Short label for the per-node annotation shown next to a row.
    pub fn annotation(&self) -> &'static str {
        match self {
            Self::InvalidPath(_) | Self::NotADirectory(_) => "not a folder",
            Self::AccessDenied(_) | Self::TransientIo { .. } => "locked",
            Self::UnresolvedLink(_) => "broken link",
            Self::NotFound(_) => "missing",
            Self::Io { .. } | Self::Worker(_) => "error",
        }
    }
}
