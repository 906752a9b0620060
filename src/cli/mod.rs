//! Command-line interface.

pub mod commands;
pub mod output;
pub mod types;

use anyhow::{Context, Result};

use crate::application::WorkflowRuntime;
use crate::infrastructure::config::ConfigLoader;

pub use types::{Cli, Commands};

/// Load configuration and open the runtime over the configured database.
pub async fn open_runtime() -> Result<WorkflowRuntime> {
    let config = ConfigLoader::load()?;
    let runtime = WorkflowRuntime::open(config)
        .await
        .context("Failed to open workflow database. Run 'privflow init' first.")?;
    Ok(runtime)
}

/// Log side-effect counters once a command is done with the runtime.
pub fn log_counters(runtime: &WorkflowRuntime) {
    let counters = runtime.counters();
    if counters.total_failures() > 0 {
        tracing::warn!(?counters, "side effects failed during command");
    } else {
        tracing::debug!(?counters, "side-effect counters");
    }
}

/// Print an error and exit with status 1.
pub fn handle_error(err: anyhow::Error, json_mode: bool) -> ! {
    if json_mode {
        let value = serde_json::json!({
            "success": false,
            "error": err.to_string(),
            "causes": err.chain().skip(1).map(ToString::to_string).collect::<Vec<_>>(),
        });
        eprintln!("{}", serde_json::to_string_pretty(&value).unwrap_or_default());
    } else {
        eprintln!("{}", output::action_failure(&format!("{err:#}")));
    }
    std::process::exit(1)
}
