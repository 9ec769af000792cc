use std::path::Path;

/// Puts the full path of `path` on the system clipboard as text.
pub fn copy_path(path: &Path) -> Result<(), arboard::Error> {
    let mut clipboard = arboard::Clipboard::new()?;
    clipboard.set_text(path.display().to_string())
}
