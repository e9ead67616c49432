//! Epistula dispatch
//!
//! Fans a signed query out to many untrusted miners at once and gathers one
//! uniform result per miner, in the order the miners were given:
//!
//! - [`coordinator`]: spawns a task per target and joins them in input order
//! - [`stream`]: signs one streaming call and accumulates timed content chunks
//! - [`availability`]: lightweight capability probes that degrade to `{}`
//! - [`registry`], [`context`], [`config`]: read-only inputs shared by all tasks
//! - [`cleaners`]: optional post-processing of collected completions
//!
//! A failing miner only ever degrades its own entry. Connection failures are
//! reported as status 502, every other failure as 500, and chunks received
//! before a failure are kept.

pub mod availability;
pub mod cleaners;
pub mod config;
pub mod context;
pub mod coordinator;
pub mod error;
pub mod registry;
pub mod result;
pub mod stream;

pub use availability::{AvailabilityProbe, AvailabilityQuery};
pub use cleaners::{Cleaner, CleanerPipeline, Position};
pub use config::{DispatchConfig, TimeoutConfig};
pub use context::DispatchContext;
pub use coordinator::DispatchCoordinator;
pub use error::{DispatchError, Result};
pub use registry::{PeerRegistry, QueryTarget, StaticRegistry};
pub use result::{
    CapabilityMap, ChunkAccumulator, DispatchSummary, Outcome, StreamResult,
    STATUS_CONNECTION_FAILED, STATUS_FAILED, STATUS_SUCCESS,
};
pub use stream::{FragmentDecoder, StreamCollector};
