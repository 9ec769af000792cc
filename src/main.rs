#![cfg_attr(all(windows, not(debug_assertions)), windows_subsystem = "windows")]

mod app;
mod clipboard;
mod icon;
mod launcher;
mod logging;
mod session;

use std::path::{Path, PathBuf};

use clap::Parser;
use eframe::egui;
use filetree_core::config::{Config, RendererConfig, WgpuBackendConfig};
use filetree_core::listing::write_listing;
use filetree_core::OsFileSystem;

const WINDOW_TITLE: &str = "File Tree Viewer";

#[derive(Parser, Debug)]
#[command(name = "filetree", version, about = "Browse and search a folder tree")]
struct Cli {
    /// Folder to open. Defaults to the configured start folder.
    path: Option<PathBuf>,

    /// Print a recursive listing to stdout instead of opening a window.
    #[arg(long)]
    list: bool,

    /// Read settings from FILE instead of the default config path.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();

    logging::init(
        Config::config_dir()
            .map(|dir| dir.join("filetree.log"))
            .as_deref(),
    );

    let config = match cli.config.as_deref() {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    let root = cli.path.clone().unwrap_or_else(|| config.start_folder());

    if cli.list {
        print_listing(&root, config.appearance.show_hidden);
        return;
    }

    let options = native_options(&config);
    let init = app::AppInit {
        config: config.clone(),
        root: root.clone(),
    };
    let result = eframe::run_native(
        WINDOW_TITLE,
        options,
        Box::new(move |cc| Ok(Box::new(app::FileTreeApp::new(cc, init)))),
    );

    if let Err(err) = result {
        tracing::error!(error = %err, "failed to start the window, printing a listing instead");
        print_listing(&root, config.appearance.show_hidden);
    }
}

fn print_listing(root: &Path, show_hidden: bool) {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    if let Err(err) = write_listing(&OsFileSystem, root, show_hidden, &mut out) {
        tracing::error!(root = %root.display(), error = %err, "listing failed");
        eprintln!("{}: {err}", root.display());
        std::process::exit(1);
    }
}

fn native_options(config: &Config) -> eframe::NativeOptions {
    let viewport = egui::ViewportBuilder::default()
        .with_title(WINDOW_TITLE)
        .with_inner_size(egui::vec2(
            config.appearance.window_width.max(320) as f32,
            config.appearance.window_height.max(240) as f32,
        ))
        .with_min_inner_size(egui::vec2(320.0, 240.0));

    let mut options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };

    match config.general.renderer {
        RendererConfig::Glow => options.renderer = eframe::Renderer::Glow,
        RendererConfig::Wgpu | RendererConfig::Auto => {
            options.renderer = eframe::Renderer::Wgpu;
            if let Some(backends) = wgpu_backends(config.general.wgpu_backend) {
                let mut setup = eframe::egui_wgpu::WgpuSetupCreateNew::default();
                setup.instance_descriptor.backends = backends;
                options.wgpu_options.wgpu_setup = eframe::egui_wgpu::WgpuSetup::CreateNew(setup);
            }
        }
    }

    options
}

fn wgpu_backends(backend: WgpuBackendConfig) -> Option<wgpu::Backends> {
    match backend {
        WgpuBackendConfig::Auto => None,
        WgpuBackendConfig::Dx12 => Some(wgpu::Backends::DX12),
        WgpuBackendConfig::Vulkan => Some(wgpu::Backends::VULKAN),
        WgpuBackendConfig::Gl => Some(wgpu::Backends::GL),
    }
}
