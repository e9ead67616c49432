//! Per-target dispatch results

use crate::cleaners::CleanerPipeline;
use crate::registry::QueryTarget;
use epistula_signature::Identity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;

/// Status code for a completed stream.
pub const STATUS_SUCCESS: u16 = 200;
/// Status code for any failure other than reaching the peer.
pub const STATUS_FAILED: u16 = 500;
/// Status code for connection-level failures.
pub const STATUS_CONNECTION_FAILED: u16 = 502;

/// Capability name to availability flag, as reported by a miner.
pub type CapabilityMap = BTreeMap<String, bool>;

/// Terminal classification of one call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Stream ran to completion
    Success,
    /// Peer could not be reached (refused, unreachable, connect timeout)
    ConnectionFailed(String),
    /// Anything else: bad status, malformed stream, read timeout, bad body
    Failed(String),
}

impl Outcome {
    /// Numeric status for this outcome
    pub fn status_code(&self) -> u16 {
        match self {
            Outcome::Success => STATUS_SUCCESS,
            Outcome::ConnectionFailed(_) => STATUS_CONNECTION_FAILED,
            Outcome::Failed(_) => STATUS_FAILED,
        }
    }

    /// Error text, if the call failed
    pub fn exception(&self) -> Option<&str> {
        match self {
            Outcome::Success => None,
            Outcome::ConnectionFailed(msg) | Outcome::Failed(msg) => Some(msg),
        }
    }
}

/// Chunks collected from one target while its stream is open.
///
/// Owned by the task handling that target. Content and timing are pushed
/// together so both sequences always have the same length.
#[derive(Debug)]
pub struct ChunkAccumulator {
    started: Instant,
    chunks: Vec<String>,
    timings: Vec<f64>,
}

impl ChunkAccumulator {
    /// Start the clock.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
            chunks: Vec::new(),
            timings: Vec::new(),
        }
    }

    /// Record a content fragment. Empty fragments are ignored.
    pub fn push(&mut self, content: &str) {
        if content.is_empty() {
            return;
        }
        self.chunks.push(content.to_string());
        self.timings.push(self.started.elapsed().as_secs_f64());
    }

    /// Number of fragments collected so far
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Whether nothing has been collected yet
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Seal into a result for `target`.
    pub fn finish(self, target: &QueryTarget, outcome: Outcome) -> StreamResult {
        let status_message = match outcome.exception() {
            None => "Success".to_string(),
            Some(msg) => msg.to_string(),
        };
        StreamResult {
            uid: target.uid,
            identity: target.identity,
            status_code: outcome.status_code(),
            exception: outcome.exception().map(str::to_string),
            status_message,
            accumulated_chunks: self.chunks,
            accumulated_chunks_timings: self.timings,
        }
    }
}

/// Final outcome of streaming from one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamResult {
    uid: u16,
    identity: Identity,
    accumulated_chunks: Vec<String>,
    accumulated_chunks_timings: Vec<f64>,
    status_code: u16,
    status_message: String,
    exception: Option<String>,
}

impl StreamResult {
    /// Result for a target that never produced any output.
    pub fn failed(target: &QueryTarget, outcome: Outcome) -> Self {
        ChunkAccumulator::start().finish(target, outcome)
    }

    /// Target uid
    pub fn uid(&self) -> u16 {
        self.uid
    }

    /// Target identity
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Content fragments in arrival order
    pub fn chunks(&self) -> &[String] {
        &self.accumulated_chunks
    }

    /// Seconds since call start for each fragment
    pub fn timings(&self) -> &[f64] {
        &self.accumulated_chunks_timings
    }

    /// 200, 500 or 502
    pub fn status_code(&self) -> u16 {
        self.status_code
    }

    /// `"Success"` or the error text
    pub fn status_message(&self) -> &str {
        &self.status_message
    }

    /// Error text when the call failed
    pub fn exception(&self) -> Option<&str> {
        self.exception.as_deref()
    }

    /// Whether the stream completed
    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_SUCCESS
    }

    /// All fragments joined together
    pub fn completion(&self) -> String {
        self.accumulated_chunks.concat()
    }

    /// Completion passed through a cleaning pipeline
    pub fn cleaned_completion(&self, pipeline: &CleanerPipeline) -> String {
        pipeline.apply(&self.completion())
    }
}

/// Column view over a dispatch, in target order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DispatchSummary {
    /// Target uids
    pub uids: Vec<u16>,
    /// Joined completions
    pub completions: Vec<String>,
    /// Status codes
    pub status_codes: Vec<u16>,
    /// Status messages
    pub status_messages: Vec<String>,
    /// Per-chunk timings for each target
    pub timings: Vec<Vec<f64>>,
}

impl DispatchSummary {
    /// Summarise `results`.
    pub fn from_results(results: &[StreamResult]) -> Self {
        let mut summary = Self::default();
        for result in results {
            summary.uids.push(result.uid());
            summary.completions.push(result.completion());
            summary.status_codes.push(result.status_code());
            summary
                .status_messages
                .push(result.status_message().to_string());
            summary.timings.push(result.timings().to_vec());
        }
        summary
    }

    /// Number of targets that completed
    pub fn success_count(&self) -> usize {
        self.status_codes
            .iter()
            .filter(|&&code| code == STATUS_SUCCESS)
            .count()
    }
}
