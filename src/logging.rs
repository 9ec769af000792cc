use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. Logs go to `log_file` when it can be
/// created, otherwise to stderr. `RUST_LOG` overrides the `info` default.
pub fn init(log_file: Option<&Path>) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file = log_file.and_then(|path| {
        if let Some(dir) = path.parent() {
            let _ = std::fs::create_dir_all(dir);
        }
        File::create(path).ok()
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    let result = match file {
        Some(file) => registry
            .with(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
            .try_init(),
        None => registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };
    if let Err(err) = result {
        eprintln!("logging already initialized: {err}");
    }
}
