//! Forwarding interrupts to the service.

use crate::aggregator::AggregatorHandle;
use crate::ipc::LocalChannel;
use crate::model::{StopRequest, WireMessage};
use std::time::Duration;
use tracing::{debug, warn};

/// Upper bound on delivering the stop request; shutdown never waits longer.
pub const STOP_SEND_TIMEOUT: Duration = Duration::from_millis(500);

/// Resolves on SIGINT, or SIGTERM where supported.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("cannot listen for ctrl-c: {e}");
            futures::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("cannot listen for SIGTERM: {e}");
                futures::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = futures::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Knows which items are in flight and how to ask the service to drop them.
pub struct CancellationController {
    requests: LocalChannel,
    ids: Vec<String>,
    aggregator: Option<AggregatorHandle>,
}

impl CancellationController {
    pub fn new(requests: LocalChannel, ids: Vec<String>) -> Self {
        Self {
            requests,
            ids,
            aggregator: None,
        }
    }

    /// Rendering is frozen through this handle before the stop goes out.
    pub fn with_aggregator(mut self, aggregator: AggregatorHandle) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Freeze the progress view and stop the aggregator, then send one
    /// best-effort stop request. Consumes the controller so the stop can only
    /// go out once.
    pub async fn trigger(self) {
        if let Some(aggregator) = &self.aggregator {
            aggregator.halt().await;
            aggregator.shutdown();
        }
        let stop = WireMessage::Stop(StopRequest {
            ids: self.ids,
            remove: false,
        });
        match tokio::time::timeout(STOP_SEND_TIMEOUT, self.requests.send_and_forget(&stop)).await {
            Ok(Ok(())) => debug!("stop request delivered"),
            Ok(Err(e)) => debug!("stop request not delivered: {e}"),
            Err(_) => debug!("stop request timed out"),
        }
    }
}
