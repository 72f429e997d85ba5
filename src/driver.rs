//! Session lifecycle: build one request, submit it, wait, report.

use crate::aggregator::ProgressAggregator;
use crate::cancel::CancellationController;
use crate::error::ClientError;
use crate::ipc::LocalChannel;
use crate::model::{FinalReport, OptimisationRequest, Size, SubmissionAck, WireMessage, WorkItem};
use crate::output::{OutputLine, OutputSender};
use crate::progress::{NullProgressSource, PublishedProgress};
use crate::service::ServiceProbe;
use crate::summary::build_summary;
use bytes::Bytes;
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Tag identifying this client to the service.
pub const REQUEST_SOURCE: &str = "cli";

/// Transformation and UI options forwarded verbatim to the service.
#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub crop: Option<Size>,
    pub downscale_factor: Option<f64>,
    pub speed_up_factor: Option<f64>,
    pub gui: bool,
    pub copy_to_clipboard: bool,
    pub aggressive: bool,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Submit and exit without waiting for any result.
    pub fire_and_forget: bool,
    pub show_progress: bool,
    pub submit_timeout: Duration,
    pub wait_timeout: Option<Duration>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Building,
    Submitting,
    AsyncAcknowledged,
    SyncWaiting,
    Reporting,
    Done,
    Failed,
}

#[derive(Debug)]
pub enum SessionOutcome {
    /// Fire-and-forget submission went out.
    Queued { count: usize },
    Completed(FinalReport),
    /// Interrupted; a stop request for `stopped` items was attempted.
    Cancelled { stopped: usize },
}

pub fn build_request(items: Vec<WorkItem>, options: &BatchOptions) -> OptimisationRequest {
    OptimisationRequest {
        id: rand::thread_rng().gen_range(1000..=100_000).to_string(),
        items,
        size: options.crop,
        downscale_factor: options.downscale_factor,
        speed_up_factor: options.speed_up_factor,
        hide_floating_result: !options.gui,
        copy_to_clipboard: options.copy_to_clipboard,
        aggressive_optimisation: options.aggressive,
        source: REQUEST_SOURCE.to_string(),
    }
}

pub struct SessionDriver {
    requests: LocalChannel,
    responses: LocalChannel,
    probe: Box<dyn ServiceProbe>,
    settings: SessionSettings,
    output: OutputSender,
    state: SessionState,
}

impl SessionDriver {
    pub fn new(
        requests: LocalChannel,
        responses: LocalChannel,
        probe: Box<dyn ServiceProbe>,
        settings: SessionSettings,
        output: OutputSender,
    ) -> Self {
        Self {
            requests,
            responses,
            probe,
            settings,
            output,
            state: SessionState::Building,
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(from = ?self.state, to = ?next, "session state");
        self.state = next;
    }

    /// Run one batch to the end. `interrupt` resolving at any point forwards a
    /// stop request for the whole batch and ends the session as `Cancelled`.
    pub async fn run<F>(
        mut self,
        items: Vec<WorkItem>,
        options: &BatchOptions,
        interrupt: F,
    ) -> Result<SessionOutcome, ClientError>
    where
        F: Future<Output = ()>,
    {
        let request = build_request(items, options);
        let ids: Vec<String> = request.items.iter().map(|i| i.to_string()).collect();
        debug!(id = %request.id, items = ids.len(), "built request");

        let aggregator = if self.settings.fire_and_forget {
            None
        } else {
            Some(self.start_aggregator(&request.items))
        };
        let mut controller = CancellationController::new(self.requests.clone(), ids);
        if let Some((agg, _)) = &aggregator {
            controller = controller.with_aggregator(agg.handle());
        }

        let result = tokio::select! {
            res = self.drive(request, aggregator) => res,
            _ = interrupt => {
                let stopped = controller.ids().len();
                controller.trigger().await;
                Ok(SessionOutcome::Cancelled { stopped })
            }
        };

        if result.is_err() {
            self.transition(SessionState::Failed);
        }
        result
    }

    fn start_aggregator(&self, items: &[WorkItem]) -> (ProgressAggregator, Option<Arc<PublishedProgress>>) {
        if self.settings.show_progress {
            let published = Arc::new(PublishedProgress::new());
            let agg = ProgressAggregator::start(
                items.to_vec(),
                published.clone(),
                Some(self.output.clone()),
            );
            (agg, Some(published))
        } else {
            let agg = ProgressAggregator::start(
                items.to_vec(),
                Arc::new(NullProgressSource::default()),
                None,
            );
            (agg, None)
        }
    }

    async fn drive(
        &mut self,
        request: OptimisationRequest,
        aggregator: Option<(ProgressAggregator, Option<Arc<PublishedProgress>>)>,
    ) -> Result<SessionOutcome, ClientError> {
        self.probe.ensure_available(&self.requests).await?;
        self.transition(SessionState::Submitting);

        let Some((aggregator, published)) = aggregator else {
            let count = request.items.len();
            self.requests
                .send_and_forget(&WireMessage::Request(request))
                .await?;
            self.transition(SessionState::AsyncAcknowledged);
            let _ = self
                .output
                .send(OutputLine::Stderr(format!("Queued {count} items for optimisation")));
            self.transition(SessionState::Done);
            return Ok(SessionOutcome::Queued { count });
        };

        // Listen before submitting so no early response is missed.
        let listener = aggregator.listen_for_responses(&self.responses, published)?;
        let request_id = request.id.clone();
        let reply = self
            .requests
            .send_and_wait(
                &WireMessage::Request(request),
                Some(self.settings.submit_timeout),
            )
            .await?;
        let ack = parse_ack(reply)?;
        if ack.id != request_id {
            warn!(expected = %request_id, got = %ack.id, "acknowledgement for a different request");
        }
        let handle = aggregator.handle();
        for rejected in ack.rejected {
            handle.record_failure(rejected);
        }
        handle.render();

        self.transition(SessionState::SyncWaiting);
        let waited = aggregator.await_completion(self.settings.wait_timeout).await;

        self.transition(SessionState::Reporting);
        let report = aggregator.finish(self.settings.show_progress).await;
        listener.stop();
        self.emit_report(&report)?;

        waited?;
        self.transition(SessionState::Done);
        Ok(SessionOutcome::Completed(report))
    }

    fn emit_report(&self, report: &FinalReport) -> Result<(), ClientError> {
        let json = serde_json::to_string_pretty(report)?;
        let _ = self.output.send(OutputLine::Stdout(json));
        if self.settings.show_progress {
            for line in build_summary(report).lines {
                let _ = self.output.send(OutputLine::Stderr(line));
            }
        }
        Ok(())
    }
}

fn parse_ack(reply: Option<Bytes>) -> Result<SubmissionAck, ClientError> {
    let Some(reply) = reply else {
        warn!("empty reply to submission");
        return Err(ClientError::Optimisation);
    };
    match WireMessage::decode(&reply) {
        Ok(WireMessage::Ack(ack)) => Ok(ack),
        Ok(other) => {
            warn!("unexpected reply to submission: {other:?}");
            Err(ClientError::Optimisation)
        }
        Err(e) => {
            warn!("undecodable reply to submission: {e}");
            Err(ClientError::Optimisation)
        }
    }
}
