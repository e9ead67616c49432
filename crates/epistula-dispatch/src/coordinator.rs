//! Fan-out coordinator
//!
//! Each target gets its own spawned task; the coordinator then joins every
//! handle in input order. A target that fails (or whose task panics) only
//! affects its own slot. The coordinator itself never returns an error: if the
//! fan-out cannot even be set up it logs and returns an empty list.

use crate::availability::{AvailabilityProbe, AvailabilityQuery};
use crate::context::DispatchContext;
use crate::error::Result;
use crate::registry::QueryTarget;
use crate::result::{CapabilityMap, Outcome, StreamResult};
use crate::stream::StreamCollector;
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error, warn};

struct Shared {
    context: DispatchContext,
    inference_client: reqwest::Client,
    availability_client: reqwest::Client,
}

/// Concurrent, failure-isolated dispatch to many miners.
#[derive(Clone)]
pub struct DispatchCoordinator {
    shared: Arc<Shared>,
}

impl DispatchCoordinator {
    /// Build HTTP clients for both call types.
    pub fn new(context: DispatchContext) -> Result<Self> {
        let config = context.config();
        let inference_client = reqwest::Client::builder()
            .connect_timeout(config.inference.connect())
            .build()?;
        let availability_client = reqwest::Client::builder()
            .connect_timeout(config.availability.connect())
            .build()?;

        Ok(Self {
            shared: Arc::new(Shared {
                context,
                inference_client,
                availability_client,
            }),
        })
    }

    /// Shared context
    pub fn context(&self) -> &DispatchContext {
        &self.shared.context
    }

    /// Stream `body` to every target; one result per target, in input order.
    pub async fn dispatch(&self, targets: &[QueryTarget], body: &[u8]) -> Vec<StreamResult> {
        let body: Arc<[u8]> = Arc::from(body);
        let handles = targets.iter().cloned().map(|target| {
            let shared = Arc::clone(&self.shared);
            let body = Arc::clone(&body);
            tokio::spawn(async move {
                let config = shared.context.config();
                StreamCollector::new(&shared.inference_client, shared.context.identity(), config)
                    .collect(&target, &body)
                    .await
            })
        });

        let results: Vec<StreamResult> = join_all(handles)
            .await
            .into_iter()
            .zip(targets)
            .map(|(joined, target)| {
                joined.unwrap_or_else(|e| {
                    error!(uid = target.uid, "dispatch task aborted: {e}");
                    StreamResult::failed(target, Outcome::Failed(e.to_string()))
                })
            })
            .collect();

        debug!(
            targets = results.len(),
            succeeded = results.iter().filter(|r| r.is_success()).count(),
            "dispatch complete"
        );
        results
    }

    /// Resolve `uids` through the registry, then [`dispatch`](Self::dispatch).
    pub async fn dispatch_uids(&self, uids: &[u16], body: &[u8]) -> Vec<StreamResult> {
        match self.shared.context.registry().resolve_all(uids) {
            Ok(targets) => self.dispatch(&targets, body).await,
            Err(e) => {
                error!("inference fan-out setup failed: {e}");
                Vec::new()
            }
        }
    }

    /// Probe every target; one capability map per target, in input order.
    pub async fn query_availabilities(
        &self,
        targets: &[QueryTarget],
        query: &AvailabilityQuery,
    ) -> Vec<CapabilityMap> {
        let query = Arc::new(query.clone());
        let handles = targets.iter().cloned().map(|target| {
            let shared = Arc::clone(&self.shared);
            let query = Arc::clone(&query);
            tokio::spawn(async move {
                AvailabilityProbe::new(&shared.availability_client, shared.context.config())
                    .probe(&target, &query)
                    .await
            })
        });

        join_all(handles)
            .await
            .into_iter()
            .zip(targets)
            .map(|(joined, target)| {
                joined.unwrap_or_else(|e| {
                    warn!(uid = target.uid, "availability task aborted: {e}");
                    CapabilityMap::new()
                })
            })
            .collect()
    }

    /// Resolve `uids`, then [`query_availabilities`](Self::query_availabilities).
    pub async fn query_availabilities_uids(
        &self,
        uids: &[u16],
        query: &AvailabilityQuery,
    ) -> Vec<CapabilityMap> {
        match self.shared.context.registry().resolve_all(uids) {
            Ok(targets) => self.query_availabilities(&targets, query).await,
            Err(e) => {
                error!("availability fan-out setup failed: {e}");
                Vec::new()
            }
        }
    }
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchCoordinator")
            .field("context", &self.shared.context)
            .finish_non_exhaustive()
    }
}
