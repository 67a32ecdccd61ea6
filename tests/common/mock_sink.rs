//! Recording bulk sink.
//!
//! Captures every payload and answers from a script (default: `200 {}`).

use search_sync::publisher::{BulkResponse, BulkSink};
use search_sync::source::BoxFuture;
use search_sync::SyncError;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

#[derive(Default)]
struct SinkState {
    payloads: Vec<String>,
    script: VecDeque<Result<BulkResponse, SyncError>>,
}

/// Cloneable handle; clones share the same recording.
#[derive(Clone, Default)]
pub struct RecordingSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the answer to a future request.
    pub fn respond(&self, response: Result<BulkResponse, SyncError>) {
        self.state.lock().unwrap().script.push_back(response);
    }

    pub fn reject_next(&self, status: u16) {
        self.respond(Ok(BulkResponse {
            status,
            body: r#"{"error":{"type":"cluster_block_exception"}}"#.to_string(),
        }));
    }

    pub fn payloads(&self) -> Vec<String> {
        self.state.lock().unwrap().payloads.clone()
    }

    /// Document ids per bulk request, read from the action lines.
    pub fn batches(&self) -> Vec<Vec<Uuid>> {
        self.payloads()
            .iter()
            .map(|payload| {
                payload
                    .lines()
                    .step_by(2)
                    .map(|line| {
                        let action: serde_json::Value = serde_json::from_str(line).unwrap();
                        action["index"]["_id"].as_str().unwrap().parse().unwrap()
                    })
                    .collect()
            })
            .collect()
    }

    /// Document bodies of every request, flattened.
    pub fn documents(&self) -> Vec<serde_json::Value> {
        self.payloads()
            .iter()
            .flat_map(|payload| {
                payload
                    .lines()
                    .skip(1)
                    .step_by(2)
                    .map(|line| serde_json::from_str(line).unwrap())
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    pub fn published_ids(&self) -> Vec<Uuid> {
        self.batches().into_iter().flatten().collect()
    }
}

impl BulkSink for RecordingSink {
    fn send_bulk(&self, payload: String) -> BoxFuture<'_, BulkResponse> {
        let response = {
            let mut state = self.state.lock().unwrap();
            state.payloads.push(payload);
            state
                .script
                .pop_front()
                .unwrap_or_else(|| Ok(BulkResponse::ok("{}")))
        };
        Box::pin(async move { response })
    }
}
