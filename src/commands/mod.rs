// Entitlement changes and planning
pub mod entitlements;

// Read-only queries over recorded flows
pub mod flows;

use anyhow::{Context as AnyhowContext, Result};
use flowkit::{FlowListener, NoopListener};
use std::sync::Arc;
use store::Store;

use crate::Context;
use crate::config::AppConfig;
use crate::engine::EntitlementService;
use crate::progress::ProgressListener;

fn load_config(ctx: &Context) -> Result<AppConfig> {
    let config = AppConfig::load(ctx.config.as_deref())?;
    log::debug!(
        "Registry {}, database {}",
        config.registry_path().display(),
        config.database_path().display()
    );
    Ok(config)
}

/// Service with a progress bar unless output is quiet
pub(crate) fn open_service(ctx: &Context) -> Result<EntitlementService> {
    let config = load_config(ctx)?;
    let listener: Arc<dyn FlowListener> = if ctx.quiet {
        Arc::new(NoopListener)
    } else {
        Arc::new(ProgressListener::new())
    };
    EntitlementService::open(&config, listener)
}

/// Store alone, for queries
pub(crate) fn open_store(ctx: &Context) -> Result<Store> {
    let config = load_config(ctx)?;
    let path = config.database_path();
    Store::open(&path).with_context(|| format!("Failed to open database {}", path.display()))
}
