//! Peer registry
//!
//! Dispatch never owns the uid → address mapping. It is handed a
//! [`PeerRegistry`] and treats it as a read-only lookup.

use crate::error::{DispatchError, Result};
use epistula_signature::Identity;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A miner that can be queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryTarget {
    /// Slot in the external registry
    pub uid: u16,
    /// Public identity the request is signed for
    pub identity: Identity,
    /// `host:port`
    pub address: String,
}

impl QueryTarget {
    /// Create a new target
    pub fn new(uid: u16, identity: Identity, address: impl Into<String>) -> Self {
        Self {
            uid,
            identity,
            address: address.into(),
        }
    }

    /// Full URL for `path` on this target.
    pub fn url(&self, scheme: &str, path: &str) -> String {
        format!("{scheme}://{}{path}", self.address)
    }
}

/// Read-only lookup from uid to target.
pub trait PeerRegistry: Send + Sync {
    /// Look up one uid.
    fn resolve(&self, uid: u16) -> Option<QueryTarget>;

    /// Look up every uid, in order. Fails on the first unknown uid.
    fn resolve_all(&self, uids: &[u16]) -> Result<Vec<QueryTarget>> {
        uids.iter()
            .map(|&uid| {
                self.resolve(uid).ok_or_else(|| {
                    DispatchError::resolution(format!("uid {uid} is not registered"))
                })
            })
            .collect()
    }
}

/// In-memory registry built from a fixed target list.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    targets: HashMap<u16, QueryTarget>,
}

impl StaticRegistry {
    /// Build from a list; later entries win on duplicate uids.
    pub fn new(targets: impl IntoIterator<Item = QueryTarget>) -> Self {
        Self {
            targets: targets.into_iter().map(|t| (t.uid, t)).collect(),
        }
    }

    /// Number of registered targets
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    /// Whether the registry is empty
    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }
}

impl PeerRegistry for StaticRegistry {
    fn resolve(&self, uid: u16) -> Option<QueryTarget> {
        self.targets.get(&uid).cloned()
    }
}
