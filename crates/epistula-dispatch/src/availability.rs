//! Availability probing
//!
//! A probe is a single unsigned POST asking a miner which tasks and models it
//! currently serves. Any failure, of any kind, yields an empty map.

use crate::config::DispatchConfig;
use crate::registry::QueryTarget;
use crate::result::CapabilityMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::trace;

/// Body of an availability request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityQuery {
    /// Task names to ask about
    pub task_availabilities: BTreeMap<String, bool>,
    /// Model names to ask about
    pub llm_model_availabilities: BTreeMap<String, bool>,
}

impl AvailabilityQuery {
    /// Query asking about `tasks` and `models`, all initially unavailable.
    pub fn new<T, M>(tasks: T, models: M) -> Self
    where
        T: IntoIterator,
        T::Item: Into<String>,
        M: IntoIterator,
        M::Item: Into<String>,
    {
        Self {
            task_availabilities: tasks.into_iter().map(|t| (t.into(), false)).collect(),
            llm_model_availabilities: models.into_iter().map(|m| (m.into(), false)).collect(),
        }
    }
}

/// Probes one target's availability endpoint.
#[derive(Debug, Clone, Copy)]
pub struct AvailabilityProbe<'a> {
    client: &'a reqwest::Client,
    config: &'a DispatchConfig,
}

impl<'a> AvailabilityProbe<'a> {
    /// Probe using a shared client.
    pub fn new(client: &'a reqwest::Client, config: &'a DispatchConfig) -> Self {
        Self { client, config }
    }

    /// Ask `target` for its capabilities. Never fails.
    pub async fn probe(&self, target: &QueryTarget, query: &AvailabilityQuery) -> CapabilityMap {
        match self.try_probe(target, query).await {
            Ok(capabilities) => capabilities,
            Err(reason) => {
                trace!(uid = target.uid, %reason, "availability probe failed");
                CapabilityMap::new()
            }
        }
    }

    async fn try_probe(
        &self,
        target: &QueryTarget,
        query: &AvailabilityQuery,
    ) -> Result<CapabilityMap, String> {
        let url = target.url(&self.config.scheme, &self.config.availability_path);
        let read_timeout = self.config.availability.read();
        let timed_out = || format!("read timed out after {} ms", read_timeout.as_millis());

        let request = self
            .client
            .post(&url)
            .json(query)
            .timeout(self.config.neuron_timeout())
            .send();
        let response = tokio::time::timeout(read_timeout, request)
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| e.to_string())?
            .error_for_status()
            .map_err(|e| e.to_string())?;

        let bytes = tokio::time::timeout(read_timeout, response.bytes())
            .await
            .map_err(|_| timed_out())?
            .map_err(|e| e.to_string())?;

        serde_json::from_slice(&bytes).map_err(|e| e.to_string())
    }
}
