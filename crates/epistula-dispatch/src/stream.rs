//! Streaming chat-completion collection
//!
//! A [`StreamCollector`] issues one signed streaming call and folds the
//! response into a [`StreamResult`]. Every exit path builds an explicit
//! [`Outcome`]; partial chunks survive any failure.
//!
//! Responses are newline-delimited JSON fragments. Server-sent-event framing
//! (`data: ` prefixes, `:` comments, a closing `data: [DONE]`) is accepted too.

use crate::config::DispatchConfig;
use crate::registry::QueryTarget;
use crate::result::{ChunkAccumulator, Outcome, StreamResult};
use epistula_signature::{RequestSigner, SigningIdentity};
use futures::StreamExt;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, trace};

const DONE_SENTINEL: &str = "[DONE]";

/// Headers set by the collector or the HTTP client, never by body parameters.
const TRANSPORT_HEADERS: [&str; 6] = [
    "authorization",
    "connection",
    "content-length",
    "content-type",
    "host",
    "transfer-encoding",
];

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Option<ChunkDelta>,
}

#[derive(Debug, Deserialize)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Errors raised while decoding a response stream.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    /// A line was not valid UTF-8
    #[error("Malformed stream: invalid UTF-8")]
    InvalidUtf8,
    /// A line was not a valid fragment
    #[error("Malformed stream fragment: {message}")]
    InvalidFragment {
        /// Parser error
        message: String,
    },
}

/// Incremental line decoder for streamed fragments.
///
/// Bytes may arrive split anywhere, including inside a UTF-8 sequence, so
/// input is buffered until a full line is available.
#[derive(Debug, Default)]
pub struct FragmentDecoder {
    buffer: Vec<u8>,
    done: bool,
}

impl FragmentDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the `[DONE]` sentinel has been seen
    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Feed bytes, returning the content deltas of every completed line.
    pub fn feed(&mut self, bytes: &[u8]) -> Result<Vec<String>, DecodeError> {
        let mut contents = Vec::new();
        self.feed_with(bytes, |content| contents.push(content))?;
        Ok(contents)
    }

    /// Feed bytes, handing each content delta to `emit` as soon as its line
    /// decodes. Deltas before a malformed line are emitted before the error.
    pub fn feed_with(
        &mut self,
        bytes: &[u8],
        mut emit: impl FnMut(String),
    ) -> Result<(), DecodeError> {
        self.buffer.extend_from_slice(bytes);
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).collect();
            if let Some(content) = self.decode_line(&line)? {
                emit(content);
            }
        }
        Ok(())
    }

    /// Flush a trailing line that had no newline.
    pub fn finish(&mut self) -> Result<Option<String>, DecodeError> {
        let line = std::mem::take(&mut self.buffer);
        self.decode_line(&line)
    }

    fn decode_line(&mut self, raw: &[u8]) -> Result<Option<String>, DecodeError> {
        if self.done {
            return Ok(None);
        }
        let line = std::str::from_utf8(raw)
            .map_err(|_| DecodeError::InvalidUtf8)?
            .trim();
        if line.is_empty() || line.starts_with(':') {
            return Ok(None);
        }
        if line.starts_with("event:") || line.starts_with("id:") || line.starts_with("retry:") {
            return Ok(None);
        }
        let payload = line.strip_prefix("data:").map_or(line, str::trim_start);
        if payload == DONE_SENTINEL {
            self.done = true;
            return Ok(None);
        }

        let chunk: ChatChunk =
            serde_json::from_str(payload).map_err(|e| DecodeError::InvalidFragment {
                message: e.to_string(),
            })?;
        Ok(chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta)
            .and_then(|delta| delta.content)
            .filter(|content| !content.is_empty()))
    }
}

/// Classify a transport error from the HTTP client.
pub(crate) fn classify(err: &reqwest::Error) -> Outcome {
    if err.is_connect() {
        Outcome::ConnectionFailed(err.to_string())
    } else {
        Outcome::Failed(err.to_string())
    }
}

/// Prepare the wire body: a JSON object with `model` and `messages`, streaming on.
pub(crate) fn streaming_body(body: &[u8]) -> Result<Vec<u8>, Outcome> {
    let value: serde_json::Value = serde_json::from_slice(body)
        .map_err(|e| Outcome::Failed(format!("Invalid request body: {e}")))?;
    let serde_json::Value::Object(mut payload) = value else {
        return Err(Outcome::Failed(
            "Invalid request body: expected a JSON object".to_string(),
        ));
    };
    for required in ["model", "messages"] {
        if !payload.contains_key(required) {
            return Err(Outcome::Failed(format!(
                "Invalid request body: missing '{required}'"
            )));
        }
    }
    payload.insert("stream".to_string(), serde_json::Value::Bool(true));
    serde_json::to_vec(&payload).map_err(|e| Outcome::Failed(format!("Invalid request body: {e}")))
}

/// Streams one inference call from one target.
#[derive(Debug, Clone, Copy)]
pub struct StreamCollector<'a> {
    client: &'a reqwest::Client,
    identity: &'a SigningIdentity,
    config: &'a DispatchConfig,
}

impl<'a> StreamCollector<'a> {
    /// Collector using a shared client and identity.
    pub fn new(
        client: &'a reqwest::Client,
        identity: &'a SigningIdentity,
        config: &'a DispatchConfig,
    ) -> Self {
        Self {
            client,
            identity,
            config,
        }
    }

    /// Run the call to completion. Never fails; failures are in the result.
    pub async fn collect(&self, target: &QueryTarget, body: &[u8]) -> StreamResult {
        let mut acc = ChunkAccumulator::start();
        let outcome = match self.stream_into(target, body, &mut acc).await {
            Ok(()) => Outcome::Success,
            Err(outcome) => {
                trace!(
                    uid = target.uid,
                    chunks = acc.len(),
                    error = outcome.exception().unwrap_or_default(),
                    "miner stream failed"
                );
                outcome
            }
        };
        acc.finish(target, outcome)
    }

    async fn stream_into(
        &self,
        target: &QueryTarget,
        body: &[u8],
        acc: &mut ChunkAccumulator,
    ) -> Result<(), Outcome> {
        let payload = streaming_body(body)?;
        let headers = request_headers(
            self.identity,
            target,
            &payload,
            self.config.bearer_token.as_deref(),
        )?;
        let url = target.url(&self.config.scheme, &self.config.inference_path);

        let request = self
            .client
            .post(&url)
            .headers(headers)
            .timeout(self.config.neuron_timeout())
            .body(payload);

        let read_timeout = self.config.inference.read();
        let response = tokio::time::timeout(read_timeout, request.send())
            .await
            .map_err(|_| read_timed_out(read_timeout))?
            .map_err(|e| classify(&e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Outcome::Failed(format!("Miner returned HTTP {status}")));
        }
        debug!(uid = target.uid, %url, "miner stream opened");

        let mut stream = response.bytes_stream();
        let mut decoder = FragmentDecoder::new();
        loop {
            let next = tokio::time::timeout(read_timeout, stream.next())
                .await
                .map_err(|_| read_timed_out(read_timeout))?;
            let Some(bytes) = next else { break };
            let bytes = bytes.map_err(|e| classify(&e))?;
            decoder
                .feed_with(&bytes, |content| acc.push(&content))
                .map_err(|e| Outcome::Failed(e.to_string()))?;
            if decoder.is_done() {
                break;
            }
        }
        if let Some(content) = decoder
            .finish()
            .map_err(|e| Outcome::Failed(e.to_string()))?
        {
            acc.push(&content);
        }
        Ok(())
    }
}

fn read_timed_out(limit: Duration) -> Outcome {
    Outcome::Failed(format!("Read timed out after {} ms", limit.as_millis()))
}

/// Signed protocol headers and forwarded parameters, then the transport
/// headers the collector owns. Forwarded keys never shadow a transport header.
pub(crate) fn request_headers(
    identity: &SigningIdentity,
    target: &QueryTarget,
    payload: &[u8],
    bearer_token: Option<&str>,
) -> Result<HeaderMap, Outcome> {
    let headers = RequestSigner::new(identity)
        .build(payload, Some(&target.identity))
        .map_err(|e| Outcome::Failed(e.to_string()))?;

    let mut map = HeaderMap::new();
    for (name, value) in headers.to_pairs() {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(&value),
        ) {
            (Ok(name), _) if TRANSPORT_HEADERS.contains(&name.as_str()) => {
                trace!(header = %name, "skipping parameter that shadows a transport header");
            }
            (Ok(name), Ok(value)) => {
                map.insert(name, value);
            }
            _ => trace!(header = %name, "skipping parameter that is not a valid header"),
        }
    }

    map.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    if let Some(token) = bearer_token {
        let value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
            Outcome::Failed("Bearer token is not a valid header value".to_string())
        })?;
        map.insert(AUTHORIZATION, value);
    }
    Ok(map)
}
