use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// One file or URL submitted for processing.
///
/// The locator string is the item's identity: every response, error and
/// progress snapshot refers back to it verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkItem(String);

impl WorkItem {
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self(path.as_ref().to_string_lossy().into_owned())
    }

    pub fn remote(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Remote items carry a URL scheme (`https://...`); everything else is a local path.
    pub fn is_file(&self) -> bool {
        !self.0.contains("://")
    }

    pub fn path(&self) -> Option<PathBuf> {
        self.is_file().then(|| PathBuf::from(&self.0))
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn square(side: u32) -> Self {
        Self::new(side, side)
    }
}

impl fmt::Display for Size {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisationRequest {
    /// Random request ID, also used as the cancellation token.
    pub id: String,
    pub items: Vec<WorkItem>,
    #[serde(default)]
    pub size: Option<Size>,
    #[serde(default)]
    pub downscale_factor: Option<f64>,
    #[serde(default)]
    pub speed_up_factor: Option<f64>,
    pub hide_floating_result: bool,
    pub copy_to_clipboard: bool,
    pub aggressive_optimisation: bool,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisationResponse {
    pub for_item: WorkItem,
    /// Where the optimised result was written.
    pub path: String,
    #[serde(default)]
    pub converted_from: Option<String>,
    #[serde(default)]
    pub old_bytes: u64,
    #[serde(default)]
    pub new_bytes: u64,
    #[serde(default)]
    pub old_size: Option<Size>,
    #[serde(default)]
    pub new_size: Option<Size>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimisationResponseError {
    pub for_item: WorkItem,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSnapshot {
    pub for_item: WorkItem,
    pub fraction_completed: f64,
    #[serde(default)]
    pub status: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopRequest {
    pub ids: Vec<String>,
    pub remove: bool,
}

/// Synchronous reply to a submission. It only acknowledges receipt; completion
/// is reported later on the response channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmissionAck {
    pub id: String,
    /// Items the service refused up front.
    #[serde(default)]
    pub rejected: Vec<OptimisationResponseError>,
}

/// Every record exchanged with the service, discriminated by a `type` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WireMessage {
    Request(OptimisationRequest),
    Response(OptimisationResponse),
    ResponseError(OptimisationResponseError),
    Stop(StopRequest),
    Progress(ProgressSnapshot),
    Ack(SubmissionAck),
}

impl WireMessage {
    pub fn encode(&self) -> serde_json::Result<Bytes> {
        serde_json::to_vec(self).map(Bytes::from)
    }

    pub fn decode(payload: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(payload)
    }
}

/// Terminal result of a synchronous run, printed as JSON on stdout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinalReport {
    pub done: Vec<OptimisationResponse>,
    pub failed: Vec<OptimisationResponseError>,
    /// Only present when the wait gave up before every item resolved.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pending: Vec<WorkItem>,
}

impl FinalReport {
    pub fn is_complete(&self) -> bool {
        self.pending.is_empty()
    }
}
