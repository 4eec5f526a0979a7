//! Flow files and the session a processor pass talks to.
//!
//! The surrounding flow engine (queues, relationships, scheduling) is not part
//! of this crate. A pass only needs two things from it: somewhere to hand off
//! the flow files it produced, and a way to say "nothing to do, back off".
//! [`FlowSession`] is that seam.

use crate::store::ContentClaim;
use serde::Serialize;
use std::collections::BTreeMap;

pub const FILENAME: &str = "filename";
pub const PATH: &str = "path";
pub const ABSOLUTE_PATH: &str = "absolute.path";

/// A unit of work: key/value attributes plus an optional content claim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlowFile {
    attributes: BTreeMap<String, String>,
    claim: Option<ContentClaim>,
    size: u64,
}

impl FlowFile {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set_attribute(key, value);
        self
    }

    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Attach content. The caller is responsible for counting this flow file
    /// as a claimant in the content store.
    pub fn set_content(&mut self, claim: ContentClaim, size: u64) {
        self.claim = Some(claim);
        self.size = size;
    }

    pub fn claim(&self) -> Option<&ContentClaim> {
        self.claim.as_ref()
    }

    pub fn size(&self) -> u64 {
        self.size
    }
}

/// What a processor pass can do with the outside world.
pub trait FlowSession {
    /// Hand a finished flow file to the success relationship.
    fn transfer(&mut self, flow_file: FlowFile);

    /// Signal that the pass produced nothing and the scheduler may back off.
    fn yield_processor(&mut self);
}

/// Session that simply records what happened. Used by tests and the CLI.
#[derive(Debug, Default)]
pub struct RecordingSession {
    pub transferred: Vec<FlowFile>,
    pub yields: usize,
}

impl RecordingSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn yielded(&self) -> bool {
        self.yields > 0
    }

    /// Values of one attribute across all transferred flow files, in order.
    pub fn attribute_values(&self, key: &str) -> Vec<String> {
        self.transferred
            .iter()
            .filter_map(|f| f.attribute(key).map(str::to_string))
            .collect()
    }

    /// Forget everything recorded so far, as between two scheduler runs.
    pub fn reset(&mut self) {
        self.transferred.clear();
        self.yields = 0;
    }
}

impl FlowSession for RecordingSession {
    fn transfer(&mut self, flow_file: FlowFile) {
        self.transferred.push(flow_file);
    }

    fn yield_processor(&mut self) {
        self.yields += 1;
    }
}
