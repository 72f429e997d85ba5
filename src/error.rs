use crate::ipc::IpcError;

/// Exit status used when the run was stopped by SIGINT/SIGTERM.
pub const EXIT_INTERRUPTED: i32 = 130;

/// Failures that abort a whole run. Per-item failures never end up here; they
/// are recorded in the session and reported alongside the successes.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Channel(#[from] IpcError),

    #[error("the optimisation service did not accept the batch")]
    Optimisation,

    #[error("{pending} of {total} items did not finish before the wait timed out")]
    Incomplete { pending: usize, total: usize },

    #[error("could not encode report: {0}")]
    Report(#[from] serde_json::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl ClientError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            ClientError::Validation(_) => 2,
            ClientError::Channel(IpcError::Unreachable { .. } | IpcError::Busy { .. }) => 3,
            ClientError::Channel(IpcError::Timeout { .. }) => 4,
            ClientError::Channel(_) | ClientError::Report(_) | ClientError::Io(_) => 1,
            ClientError::Optimisation => 5,
            ClientError::Incomplete { .. } => 6,
        }
    }
}
