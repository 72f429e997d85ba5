//! Local message passing with the optimisation service.
//!
//! Endpoints are Unix domain sockets named after well-known identifiers; records
//! are framed JSON (`codec`). `LocalChannel` provides fire-and-forget sends,
//! send-and-wait with a single reply, and long-running listeners.

mod channel;
pub mod codec;

pub use channel::{ListenHandle, LocalChannel, MessageHandler};

use std::io;
use std::time::Duration;

/// Endpoint the service accepts submissions and stop requests on.
pub const REQUEST_ENDPOINT: &str = "optimisation-service";
/// Endpoint the client listens on for responses, errors and progress.
pub const RESPONSE_ENDPOINT: &str = "optimisation-service-response";

#[derive(Debug, thiserror::Error)]
pub enum IpcError {
    #[error("nothing is listening on {endpoint}: {source}")]
    Unreachable {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    #[error("no reply from {endpoint} within {timeout:?}")]
    Timeout { endpoint: String, timeout: Duration },

    #[error("{endpoint} is already in use by another client")]
    Busy { endpoint: String },

    #[error("could not encode message: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("i/o error on {endpoint}: {source}")]
    Io {
        endpoint: String,
        #[source]
        source: io::Error,
    },
}
