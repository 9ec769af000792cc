use std::path::{Path, PathBuf};

/// Folder the file manager should open for `path`: the folder itself, or the
/// folder containing a file.
pub fn reveal_target(path: &Path, is_dir: bool) -> PathBuf {
    if is_dir {
        return path.to_path_buf();
    }
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => path.to_path_buf(),
    }
}

/// Opens the folder holding `path` in the platform file manager.
pub fn reveal(path: &Path, is_dir: bool) -> std::io::Result<()> {
    let target = reveal_target(path, is_dir);
    tracing::debug!(target = %target.display(), "opening in file manager");
    open_folder(&target)
}

#[cfg(windows)]
fn open_folder(target: &Path) -> std::io::Result<()> {
    use std::os::windows::ffi::OsStrExt;

    use windows::core::PCWSTR;
    use windows::Win32::UI::Shell::ShellExecuteW;
    use windows::Win32::UI::WindowsAndMessaging::SW_SHOWNORMAL;

    let wide_path: Vec<u16> = target
        .as_os_str()
        .encode_wide()
        .chain(std::iter::once(0))
        .collect();
    let wide_open: Vec<u16> = "open".encode_utf16().chain(std::iter::once(0)).collect();

    let result = unsafe {
        ShellExecuteW(
            None,
            PCWSTR(wide_open.as_ptr()),
            PCWSTR(wide_path.as_ptr()),
            PCWSTR::null(),
            PCWSTR::null(),
            SW_SHOWNORMAL,
        )
    };
    // Values above 32 mean success.
    if result.0 as isize > 32 {
        Ok(())
    } else {
        Err(std::io::Error::other(format!(
            "ShellExecuteW failed with code {}",
            result.0 as isize
        )))
    }
}

#[cfg(not(windows))]
fn open_folder(target: &Path) -> std::io::Result<()> {
    open::that_detached(target)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_reveals_itself() {
        let dir = Path::new("/work/src");
        assert_eq!(reveal_target(dir, true), PathBuf::from("/work/src"));
    }

    #[test]
    fn file_reveals_its_parent() {
        let file = Path::new("/work/src/main.rs");
        assert_eq!(reveal_target(file, false), PathBuf::from("/work/src"));
    }

    #[test]
    fn bare_file_name_falls_back_to_itself() {
        assert_eq!(
            reveal_target(Path::new("notes.txt"), false),
            PathBuf::from("notes.txt")
        );
    }
}
