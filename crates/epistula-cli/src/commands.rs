//! Command handlers

use crate::config::CliConfig;
use anyhow::{Context, Result};
use epistula_dispatch::{AvailabilityQuery, DispatchCoordinator, DispatchSummary, StreamResult};
use epistula_signature::SigningIdentity;
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// Printed by `keygen`.
#[derive(Debug, Serialize)]
pub struct KeygenOutput {
    /// Secret seed; store it in the config or a seed file
    pub seed_hex: String,
    /// Public identity other parties address requests to
    pub identity: String,
}

/// Printed by `query`.
#[derive(Debug, Serialize)]
pub struct QueryOutput {
    /// One entry per target, in request order
    pub results: Vec<StreamResult>,
    /// Column view over `results`
    pub summary: DispatchSummary,
}

/// Generate a fresh identity.
pub fn keygen() -> KeygenOutput {
    let identity = SigningIdentity::generate();
    KeygenOutput {
        seed_hex: identity.seed_hex(),
        identity: identity.identity().to_string(),
    }
}

/// Stream a chat request to `uids`.
pub async fn query(config: &CliConfig, uids: &[u16], body_path: &Path) -> Result<QueryOutput> {
    let body = tokio::fs::read(body_path)
        .await
        .with_context(|| format!("failed to read request body {}", body_path.display()))?;
    let coordinator = DispatchCoordinator::new(config.dispatch_context().await?)?;

    let results = coordinator.dispatch_uids(uids, &body).await;
    if results.is_empty() && !uids.is_empty() {
        warn!(?uids, "no results; check that every uid is in the target table");
    }
    let summary = DispatchSummary::from_results(&results);
    info!(
        targets = results.len(),
        succeeded = summary.success_count(),
        "query finished"
    );
    Ok(QueryOutput { results, summary })
}

/// Ask `uids` which of `tasks` and `models` they serve.
pub async fn availability(
    config: &CliConfig,
    uids: &[u16],
    tasks: &[String],
    models: &[String],
) -> Result<Vec<serde_json::Value>> {
    let coordinator = DispatchCoordinator::new(config.dispatch_context().await?)?;
    let query = AvailabilityQuery::new(tasks.iter().cloned(), models.iter().cloned());

    let maps = coordinator.query_availabilities_uids(uids, &query).await;
    info!(
        targets = maps.len(),
        responded = maps.iter().filter(|m| !m.is_empty()).count(),
        "availability finished"
    );
    Ok(uids
        .iter()
        .zip(maps)
        .map(|(uid, capabilities)| serde_json::json!({"uid": uid, "capabilities": capabilities}))
        .collect())
}
