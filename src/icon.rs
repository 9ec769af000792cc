use std::collections::HashMap;
use std::path::Path;

use eframe::egui::{self, TextureHandle, TextureOptions};
use filetree_core::NodeKind;

const ICON_SIZE: u32 = 16;

/// Extensions whose icon lives in the file itself rather than in the
/// association for the extension.
const PER_FILE_EXTENSIONS: &[&str] = &["exe", "lnk", "ico", "url"];

pub struct IconData {
    pub width: u32,
    pub height: u32,
    pub bgra: Vec<u8>,
}

/// Shell icons turned into egui textures, keyed so that files sharing an
/// extension share a texture. Lookups that fail are remembered too.
pub struct IconCache {
    enabled: bool,
    textures: HashMap<String, Option<TextureHandle>>,
}

impl IconCache {
    pub fn new(enabled: bool) -> Self {
        Self {
            enabled,
            textures: HashMap::new(),
        }
    }

    pub fn icon_for(
        &mut self,
        ctx: &egui::Context,
        path: &Path,
        kind: NodeKind,
    ) -> Option<egui::TextureId> {
        if !self.enabled {
            return None;
        }
        let key = cache_key(path, kind);
        if let Some(cached) = self.textures.get(&key) {
            return cached.as_ref().map(TextureHandle::id);
        }

        let texture = extract_icon(path, kind).map(|data| {
            let image = egui::ColorImage::from_rgba_unmultiplied(
                [data.width as usize, data.height as usize],
                &bgra_to_rgba(&data.bgra),
            );
            ctx.load_texture(format!("icon:{key}"), image, TextureOptions::LINEAR)
        });
        let id = texture.as_ref().map(TextureHandle::id);
        self.textures.insert(key, texture);
        id
    }
}

pub fn cache_key(path: &Path, kind: NodeKind) -> String {
    if kind == NodeKind::Directory {
        return "<dir>".to_string();
    }
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if PER_FILE_EXTENSIONS.contains(&ext.as_str()) {
        path.display().to_string()
    } else {
        format!(".{ext}")
    }
}

fn bgra_to_rgba(bgra: &[u8]) -> Vec<u8> {
    let mut rgba = bgra.to_vec();
    for px in rgba.chunks_exact_mut(4) {
        px.swap(0, 2);
    }
    // Icons without an alpha channel report every pixel as transparent.
    if rgba.chunks_exact(4).all(|px| px[3] == 0) {
        for px in rgba.chunks_exact_mut(4) {
            px[3] = 0xFF;
        }
    }
    rgba
}

#[cfg(not(windows))]
fn extract_icon(_path: &Path, _kind: NodeKind) -> Option<IconData> {
    None
}

#[cfg(windows)]
fn extract_icon(path: &Path, kind: NodeKind) -> Option<IconData> {
    use std::os::windows::ffi::OsStrExt;

    use windows::Win32::Storage::FileSystem::{
        FILE_ATTRIBUTE_DIRECTORY, FILE_ATTRIBUTE_NORMAL, FILE_FLAGS_AND_ATTRIBUTES,
    };
    use windows::Win32::UI::Shell::{
        SHGetFileInfoW, SHFILEINFOW, SHGFI_ICON, SHGFI_SMALLICON, SHGFI_USEFILEATTRIBUTES,
    };
    use windows::Win32::UI::WindowsAndMessaging::DestroyIcon;

    let key = cache_key(path, kind);
    let per_file = kind == NodeKind::File && !key.starts_with('.');

    // Shared icons are resolved from attributes alone so that no file is
    // opened for them.
    let (query, attributes, extra) = if per_file {
        (path.as_os_str().to_owned(), FILE_FLAGS_AND_ATTRIBUTES(0), None)
    } else if kind == NodeKind::Directory {
        (
            "folder".into(),
            FILE_ATTRIBUTE_DIRECTORY,
            Some(SHGFI_USEFILEATTRIBUTES),
        )
    } else {
        (
            format!("file{key}").into(),
            FILE_ATTRIBUTE_NORMAL,
            Some(SHGFI_USEFILEATTRIBUTES),
        )
    };

    let wide_path: Vec<u16> = query.encode_wide().chain(std::iter::once(0)).collect();
    let mut flags = SHGFI_ICON | SHGFI_SMALLICON;
    if let Some(extra) = extra {
        flags |= extra;
    }

    unsafe {
        let mut shfi = SHFILEINFOW::default();
        let result = SHGetFileInfoW(
            windows::core::PCWSTR(wide_path.as_ptr()),
            attributes,
            Some(&mut shfi),
            std::mem::size_of::<SHFILEINFOW>() as u32,
            flags,
        );

        if result == 0 || shfi.hIcon.is_invalid() {
            tracing::debug!(key = %key, "no shell icon");
            return None;
        }

        let icon_data = win::hicon_to_bgra(shfi.hIcon);
        let _ = DestroyIcon(shfi.hIcon);
        icon_data
    }
}

#[cfg(windows)]
mod win {
    use windows::Win32::Graphics::Gdi::{
        CreateCompatibleDC, DeleteDC, DeleteObject, GetDIBits, SelectObject, BITMAPINFO,
        BITMAPINFOHEADER, BI_RGB, DIB_RGB_COLORS,
    };
    use windows::Win32::UI::WindowsAndMessaging::{GetIconInfo, HICON, ICONINFO};

    use super::{IconData, ICON_SIZE};

    pub(super) fn hicon_to_bgra(hicon: HICON) -> Option<IconData> {
        unsafe {
            let mut icon_info = ICONINFO::default();
            if GetIconInfo(hicon, &mut icon_info).is_err() {
                return None;
            }
            let _cleanup = BitmapCleanup(&icon_info);

            let hdc = CreateCompatibleDC(None);
            if hdc.is_invalid() {
                return None;
            }

            let mut bmi = BITMAPINFO {
                bmiHeader: BITMAPINFOHEADER {
                    biSize: std::mem::size_of::<BITMAPINFOHEADER>() as u32,
                    biWidth: ICON_SIZE as i32,
                    biHeight: -(ICON_SIZE as i32), // top-down
                    biPlanes: 1,
                    biBitCount: 32,
                    biCompression: BI_RGB.0 as u32,
                    ..Default::default()
                },
                ..Default::default()
            };

            let mut pixels = vec![0u8; (ICON_SIZE * ICON_SIZE * 4) as usize];
            if !icon_info.hbmColor.is_invalid() {
                let old = SelectObject(hdc, icon_info.hbmColor.into());
                GetDIBits(
                    hdc,
                    icon_info.hbmColor,
                    0,
                    ICON_SIZE,
                    Some(pixels.as_mut_ptr() as *mut _),
                    &mut bmi,
                    DIB_RGB_COLORS,
                );
                SelectObject(hdc, old);
            }
            let _ = DeleteDC(hdc);

            if pixels.iter().all(|&b| b == 0) {
                return None;
            }

            Some(IconData {
                width: ICON_SIZE,
                height: ICON_SIZE,
                bgra: pixels,
            })
        }
    }

    struct BitmapCleanup<'a>(&'a ICONINFO);

    impl Drop for BitmapCleanup<'_> {
        fn drop(&mut self) {
            unsafe {
                if !self.0.hbmColor.is_invalid() {
                    let _ = DeleteObject(self.0.hbmColor.into());
                }
                if !self.0.hbmMask.is_invalid() {
                    let _ = DeleteObject(self.0.hbmMask.into());
                }
            }
        }
    }
}
