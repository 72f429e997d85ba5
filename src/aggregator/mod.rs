//! Progress aggregation.
//!
//! One task owns the `JobSession`, the renderer and the progress subscriptions.
//! Everything else (the response listener, progress callbacks, the driver) talks
//! to it through an `AggregatorHandle`, so mutations and renders are processed
//! strictly one at a time without locking the session itself.

pub mod render;

use crate::error::ClientError;
use crate::ipc::{IpcError, ListenHandle, LocalChannel};
use crate::model::{
    FinalReport, OptimisationResponse, OptimisationResponseError, ProgressSnapshot, WireMessage,
    WorkItem,
};
use crate::output::{OutputLine, OutputSender};
use crate::progress::{ProgressSource, PublishedProgress, SubscriptionHandle};
use crate::session::{JobSession, SessionView};
use render::ProgressRenderer;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// How often `await_completion` checks the session.
pub const POLL_INTERVAL: Duration = Duration::from_millis(100);

enum Command {
    Success(OptimisationResponse),
    Failure(OptimisationResponseError),
    Progress(ProgressSnapshot),
    Render,
    View(oneshot::Sender<SessionView>),
    IsComplete(oneshot::Sender<bool>),
    Finish {
        final_render: bool,
        reply: oneshot::Sender<FinalReport>,
    },
    Halt(oneshot::Sender<()>),
    Shutdown,
}

/// Cheap, cloneable mailbox address of the aggregator.
#[derive(Clone)]
pub struct AggregatorHandle {
    tx: mpsc::UnboundedSender<Command>,
}

impl AggregatorHandle {
    fn send(&self, cmd: Command) {
        // The owner only goes away once the run is over; late events are moot then.
        let _ = self.tx.send(cmd);
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Option<T> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(make(reply)).ok()?;
        rx.await.ok()
    }

    pub fn record_success(&self, response: OptimisationResponse) {
        self.send(Command::Success(response));
    }

    pub fn record_failure(&self, error: OptimisationResponseError) {
        self.send(Command::Failure(error));
    }

    pub fn record_progress(&self, snapshot: ProgressSnapshot) {
        self.send(Command::Progress(snapshot));
    }

    pub fn render(&self) {
        self.send(Command::Render);
    }

    pub async fn view(&self) -> Option<SessionView> {
        self.ask(Command::View).await
    }

    pub async fn is_complete(&self) -> bool {
        self.ask(Command::IsComplete).await.unwrap_or(false)
    }

    /// Stop drawing for good. Resolves once the owner has acknowledged, so no
    /// frame can be emitted after this returns.
    pub async fn halt(&self) {
        let _ = self.ask(Command::Halt).await;
    }

    /// Stop the owner task. Messages queued behind this one are discarded.
    pub fn shutdown(&self) {
        self.send(Command::Shutdown);
    }

    /// Route one inbound frame from the response channel.
    pub fn dispatch(&self, payload: &[u8], published: Option<&PublishedProgress>) {
        match WireMessage::decode(payload) {
            Ok(WireMessage::Response(resp)) => {
                debug!(item = %resp.for_item, path = %resp.path, "optimised");
                self.record_success(resp);
            }
            Ok(WireMessage::ResponseError(err)) => {
                debug!(item = %err.for_item, error = %err.error, "optimisation failed");
                self.record_failure(err);
            }
            Ok(WireMessage::Progress(snapshot)) => {
                if let Some(published) = published {
                    published.publish(snapshot);
                }
            }
            Ok(other) => debug!("ignoring unexpected message on response channel: {other:?}"),
            Err(e) => warn!(bytes = payload.len(), "undecodable response: {e}"),
        }
    }
}

/// Dropping the aggregator stops its owner task, whichever way the run ended.
pub struct ProgressAggregator {
    handle: AggregatorHandle,
    owner: Option<JoinHandle<()>>,
}

impl ProgressAggregator {
    /// Spawn the owner task for `items` and subscribe to progress for every
    /// file-backed item. Frames go to `display` when one is given.
    pub fn start(
        items: Vec<WorkItem>,
        progress: Arc<dyn ProgressSource>,
        display: Option<OutputSender>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = AggregatorHandle { tx };

        // Callbacks live inside the progress source, which the owner holds, so
        // they must not keep the mailbox open themselves.
        let mut subscriptions = HashMap::new();
        for item in items.iter().filter(|i| i.is_file()) {
            let mailbox = handle.tx.downgrade();
            let sub = progress.subscribe(
                item,
                Arc::new(move |snapshot| {
                    if let Some(tx) = mailbox.upgrade() {
                        let _ = tx.send(Command::Progress(snapshot));
                    }
                }),
            );
            subscriptions.insert(item.clone(), sub);
        }

        let owner = Owner {
            session: JobSession::new(items),
            renderer: ProgressRenderer::new(),
            display,
            progress,
            subscriptions,
            halted: false,
        };
        let owner = tokio::spawn(owner.run(rx));
        Self {
            handle,
            owner: Some(owner),
        }
    }

    pub fn handle(&self) -> AggregatorHandle {
        self.handle.clone()
    }

    /// Listen on the response endpoint and feed everything that arrives into
    /// this aggregator. Progress records go through `published` so the regular
    /// subscription path applies; without it they are dropped.
    pub fn listen_for_responses(
        &self,
        channel: &LocalChannel,
        published: Option<Arc<PublishedProgress>>,
    ) -> Result<ListenHandle, IpcError> {
        let handle = self.handle.clone();
        channel.listen(move |payload| {
            handle.dispatch(&payload, published.as_deref());
            None
        })
    }

    /// Poll until every item has resolved, or give up after `timeout`.
    pub async fn await_completion(&self, timeout: Option<Duration>) -> Result<(), ClientError> {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut ticker = tokio::time::interval(POLL_INTERVAL);
        loop {
            ticker.tick().await;
            if self.handle.is_complete().await {
                return Ok(());
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                let (pending, total) = self
                    .handle
                    .view()
                    .await
                    .map_or((0, 0), |v| (v.pending.len(), v.total));
                return Err(ClientError::Incomplete { pending, total });
            }
        }
    }

    /// The terminal report. Does not stop the owner; see `finish`.
    pub async fn final_report(&self) -> FinalReport {
        self.handle
            .ask(|reply| Command::Finish {
                final_render: false,
                reply,
            })
            .await
            .unwrap_or_default()
    }

    /// Optionally draw one last frame, then return the report and stop the
    /// owner once it has released its subscriptions.
    pub async fn finish(mut self, final_render: bool) -> FinalReport {
        let report = self
            .handle
            .ask(|reply| Command::Finish {
                final_render,
                reply,
            })
            .await
            .unwrap_or_default();
        self.handle.shutdown();
        if let Some(owner) = self.owner.take() {
            let _ = owner.await;
        }
        report
    }
}

impl Drop for ProgressAggregator {
    fn drop(&mut self) {
        self.handle.shutdown();
    }
}

struct Owner {
    session: JobSession,
    renderer: ProgressRenderer,
    display: Option<OutputSender>,
    progress: Arc<dyn ProgressSource>,
    subscriptions: HashMap<WorkItem, SubscriptionHandle>,
    halted: bool,
}

impl Owner {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                Command::Success(resp) => {
                    let item = resp.for_item.clone();
                    if self.session.record_success(resp) {
                        self.release(&item);
                        self.draw();
                    }
                }
                Command::Failure(err) => {
                    let item = err.for_item.clone();
                    if self.session.record_failure(err) {
                        self.release(&item);
                        self.draw();
                    }
                }
                Command::Progress(snapshot) => {
                    if self.session.record_progress(snapshot) {
                        self.draw();
                    }
                }
                Command::Render => self.draw(),
                Command::View(reply) => {
                    let _ = reply.send(self.session.snapshot());
                }
                Command::IsComplete(reply) => {
                    let _ = reply.send(self.session.is_complete());
                }
                Command::Finish {
                    final_render,
                    reply,
                } => {
                    if final_render {
                        self.draw();
                    }
                    self.settle();
                    let _ = reply.send(self.session.report());
                }
                Command::Halt(reply) => {
                    self.halted = true;
                    self.settle();
                    let _ = reply.send(());
                }
                Command::Shutdown => break,
            }
        }
        self.settle();
        for (_, sub) in self.subscriptions.drain() {
            self.progress.unsubscribe(&sub);
        }
    }

    fn release(&mut self, item: &WorkItem) {
        if let Some(sub) = self.subscriptions.remove(item) {
            self.progress.unsubscribe(&sub);
        }
    }

    fn draw(&mut self) {
        if self.halted {
            return;
        }
        if let Some(display) = &self.display {
            let frame = self.renderer.render(&self.session.snapshot());
            let _ = display.send(OutputLine::Frame(frame));
        }
    }

    /// Leave the last frame on screen as ordinary output.
    fn settle(&self) {
        if let Some(display) = &self.display {
            let _ = display.send(OutputLine::Settle);
        }
    }
}
