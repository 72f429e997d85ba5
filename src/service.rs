//! Making sure the optimisation service is there before submitting.

use crate::ipc::{IpcError, LocalChannel};
use futures::future::BoxFuture;
use std::io;
use std::process::{Command, Stdio};
use std::time::Duration;
use tracing::{debug, info};

pub trait ServiceProbe: Send + Sync {
    /// Resolve once the service accepts connections on `endpoint`, or fail with
    /// `IpcError::Unreachable`.
    fn ensure_available<'a>(&'a self, endpoint: &'a LocalChannel) -> BoxFuture<'a, Result<(), IpcError>>;
}

/// Assumes the service is running; submission itself reports otherwise.
#[derive(Debug, Default)]
pub struct NoopProbe;

impl ServiceProbe for NoopProbe {
    fn ensure_available<'a>(&'a self, _endpoint: &'a LocalChannel) -> BoxFuture<'a, Result<(), IpcError>> {
        Box::pin(async { Ok(()) })
    }
}

/// Checks the endpoint and, when nothing answers, starts `command` once and
/// checks again after `settle`.
#[derive(Debug, Clone)]
pub struct LaunchingProbe {
    command: Option<Vec<String>>,
    settle: Duration,
}

impl LaunchingProbe {
    pub fn new(command: Option<Vec<String>>, settle: Duration) -> Self {
        Self { command, settle }
    }

    fn launch(&self, program: &str, args: &[String]) -> io::Result<()> {
        info!(%program, "starting optimisation service");
        Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map(|_| ())
    }
}

impl ServiceProbe for LaunchingProbe {
    fn ensure_available<'a>(&'a self, endpoint: &'a LocalChannel) -> BoxFuture<'a, Result<(), IpcError>> {
        Box::pin(async move {
            if endpoint.is_reachable().await {
                return Ok(());
            }
            let unreachable = |source: io::Error| IpcError::Unreachable {
                endpoint: endpoint.name().to_string(),
                source,
            };
            let Some((program, args)) = self.command.as_deref().and_then(|c| c.split_first()) else {
                return Err(unreachable(io::ErrorKind::NotFound.into()));
            };

            self.launch(program, args).map_err(unreachable)?;
            tokio::time::sleep(self.settle).await;

            if endpoint.is_reachable().await {
                debug!(endpoint = %endpoint.name(), "service came up");
                Ok(())
            } else {
                Err(unreachable(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    format!("still unreachable {:?} after starting {program}", self.settle),
                )))
            }
        })
    }
}
