//! Glue Host
//!
//! Minimal binary that boots a script runtime, installs the native bindings
//! and runs one script file.
//!
//! Usage: `glue-host <script.js> [settings.json]`

mod bindings;

use std::path::PathBuf;

use anyhow::{Context as _, Result};
use glue_convert::{ScriptRuntime, Settings};

fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt::init();

    let mut args = std::env::args_os().skip(1);
    let script = args
        .next()
        .map(PathBuf::from)
        .context("usage: glue-host <script.js> [settings.json]")?;
    let settings = match args.next().map(PathBuf::from) {
        Some(path) => Settings::load(&path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };

    tracing::info!("Glue host v{}", glue_convert::VERSION);
    let runtime = ScriptRuntime::with_settings(settings)?;
    tracing::info!(strategy = ?runtime.classifier().strategy(), "Runtime initialized");

    let factory = runtime.bridge_factory();
    runtime
        .context
        .with(|ctx| bindings::install(&ctx, &factory))
        .context("installing native bindings")?;

    runtime
        .execute_file(&script)
        .with_context(|| format!("running {}", script.display()))?;

    for (name, count) in runtime.stats().snapshot() {
        tracing::info!(counter = name, count, "conversion stats");
    }
    Ok(())
}
