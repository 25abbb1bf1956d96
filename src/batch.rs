//! Batch upload engine for the bulk index endpoint.
//!
//! Documents are accumulated into a [`BatchState`] until either the byte or
//! the document bound is reached (the service rejects oversized requests and
//! either bound can be the binding constraint depending on document shape),
//! or the caller forces a flush. A flush wraps the buffer as
//! `{"value": [...]}` and POSTs it in one request.
//!
//! Delivery is best effort: a failed flush is reported through the ignored
//! count and a stderr diagnostic, and the buffer is cleared either way.

use anyhow::Result;
use serde_json::{json, Value};

use crate::document::Document;
use crate::transport::Transport;

/// Accumulating payload buffer for one indexing run.
///
/// Owned by the caller (one per run) rather than shared engine state, so
/// concurrent indexing runs cannot interleave their buffers.
#[derive(Debug, Default)]
pub struct BatchState {
    payload: Vec<Value>,
    /// Wire size of the buffered documents in bytes.
    pub payload_size: usize,
    /// Number of buffered documents.
    pub payload_count: usize,
    /// Parent (top-level, non-file) documents buffered since the last flush
    /// on a parent boundary. This is the ignored count when a flush fails.
    pub parent_count: usize,
}

impl BatchState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    fn clear(&mut self) {
        self.payload.clear();
        self.payload_size = 0;
        self.payload_count = 0;
    }
}

/// Accumulates documents and ships them to the bulk index endpoint.
pub struct BatchUploader<'a> {
    transport: &'a dyn Transport,
    url: String,
    max_payload_bytes: usize,
    max_payload_docs: usize,
    state: BatchState,
}

impl<'a> BatchUploader<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        url: String,
        max_payload_bytes: usize,
        max_payload_docs: usize,
    ) -> Self {
        Self {
            transport,
            url,
            max_payload_bytes,
            max_payload_docs,
            state: BatchState::new(),
        }
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    /// Flush decision: forced, or either accumulation bound reached.
    pub fn ready_to_send(&self, send_now: bool) -> bool {
        send_now
            || self.state.payload_size >= self.max_payload_bytes
            || self.state.payload_count >= self.max_payload_docs
    }

    /// Buffer a document and flush when ready.
    ///
    /// Returns the number of documents this call gave up on: 1 when the
    /// document itself fails to serialize (that document alone is dropped,
    /// nothing is buffered), or the buffered parent-document count when a
    /// flush is rejected by the service. `is_parent` marks top-level
    /// documents for that accounting.
    pub async fn add(
        &mut self,
        doc: Option<&Document>,
        is_parent: bool,
        send_now: bool,
    ) -> Result<usize> {
        if let Some(doc) = doc {
            // Measure the document's wire size; a document that cannot be
            // encoded is dropped on its own without touching the buffer.
            let encoded = match serde_json::to_string(doc) {
                Ok(encoded) if !encoded.is_empty() => encoded,
                _ => {
                    eprintln!("Warning: dropping document {}: not JSON-encodable", doc.id);
                    return Ok(1);
                }
            };

            self.state.payload.push(serde_json::to_value(doc)?);
            self.state.payload_size += encoded.len();
            self.state.payload_count += 1;
            if is_parent {
                self.state.parent_count += 1;
            }
        }

        if !self.ready_to_send(send_now) || self.state.is_empty() {
            return Ok(0);
        }

        self.flush(is_parent).await
    }

    /// POST the buffered payload and interpret the response.
    ///
    /// The buffer is cleared unconditionally; the parent-document counter is
    /// reset only when this flush was triggered on a parent boundary.
    async fn flush(&mut self, on_parent_boundary: bool) -> Result<usize> {
        let body = serde_json::to_string(&json!({ "value": self.state.payload }))?;
        let response = self.transport.post(&self.url, body).await?;

        let ignored = if response.status == 413 {
            // TODO: retry the payload one document at a time instead of
            // counting the whole batch as ignored.
            eprintln!("Warning: bulk index request failed: Request Entity Too Large");
            self.state.parent_count
        } else if !response.is_success() {
            eprintln!(
                "Warning: bulk index request failed: error code {}",
                response.status
            );
            self.state.parent_count
        } else {
            0
        };

        self.state.clear();
        if on_parent_boundary {
            self.state.parent_count = 0;
        }

        Ok(ignored)
    }
}
