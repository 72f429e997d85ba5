//! A fake optimisation service bound to sockets in a temporary directory, and
//! helpers shared by the integration tests.
#![allow(dead_code)]

use optimise_cli::driver::{SessionDriver, SessionSettings};
use optimise_cli::input::{resolve_items, ResolveOptions};
use optimise_cli::ipc::{ListenHandle, LocalChannel, REQUEST_ENDPOINT, RESPONSE_ENDPOINT};
use optimise_cli::model::{
    FinalReport, OptimisationRequest, OptimisationResponse, OptimisationResponseError,
    ProgressSnapshot, StopRequest, SubmissionAck, WireMessage, WorkItem,
};
use optimise_cli::output::OutputLine;
use optimise_cli::service::NoopProbe;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio::sync::mpsc;

#[derive(Clone, Copy)]
pub enum Behaviour {
    /// Acknowledge, report some progress, then optimise every item.
    Complete,
    /// Acknowledge with the first item rejected, optimise the rest.
    RejectFirst,
    /// Acknowledge and never report back.
    AckOnly,
    /// Close the connection without answering.
    Silent,
}

pub struct FakeService {
    requests: Arc<Mutex<Vec<OptimisationRequest>>>,
    stops: Arc<Mutex<Vec<StopRequest>>>,
    _listener: ListenHandle,
}

impl FakeService {
    pub fn start(socket_dir: &Path, behaviour: Behaviour) -> Self {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let stops = Arc::new(Mutex::new(Vec::new()));
        let responses = LocalChannel::new(socket_dir, RESPONSE_ENDPOINT);

        let (seen_requests, seen_stops) = (requests.clone(), stops.clone());
        let listener = LocalChannel::new(socket_dir, REQUEST_ENDPOINT)
            .listen(move |payload| match WireMessage::decode(&payload).ok()? {
                WireMessage::Request(request) => {
                    seen_requests.lock().unwrap().push(request.clone());
                    answer(&responses, request, behaviour)
                }
                WireMessage::Stop(stop) => {
                    seen_stops.lock().unwrap().push(stop);
                    None
                }
                _ => None,
            })
            .unwrap();

        Self {
            requests,
            stops,
            _listener: listener,
        }
    }

    pub fn requests(&self) -> Vec<OptimisationRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn stops(&self) -> Vec<StopRequest> {
        self.stops.lock().unwrap().clone()
    }
}

fn answer(responses: &LocalChannel, request: OptimisationRequest, behaviour: Behaviour) -> Option<bytes::Bytes> {
    let mut rejected = Vec::new();
    let mut outbound = Vec::new();
    match behaviour {
        Behaviour::Silent => return None,
        Behaviour::AckOnly => {}
        Behaviour::Complete | Behaviour::RejectFirst => {
            for (i, item) in request.items.iter().enumerate() {
                if i == 0 && matches!(behaviour, Behaviour::RejectFirst) {
                    rejected.push(OptimisationResponseError {
                        for_item: item.clone(),
                        error: "unsupported format".into(),
                    });
                    continue;
                }
                outbound.push(WireMessage::Progress(ProgressSnapshot {
                    for_item: item.clone(),
                    fraction_completed: 0.5,
                    status: Some("Optimising".into()),
                }));
                outbound.push(WireMessage::Response(optimised(item)));
            }
        }
    }

    let responses = responses.clone();
    tokio::spawn(async move {
        for message in outbound {
            let _ = responses.send_and_forget(&message).await;
        }
    });

    WireMessage::Ack(SubmissionAck {
        id: request.id,
        rejected,
    })
    .encode()
    .ok()
}

fn optimised(item: &WorkItem) -> OptimisationResponse {
    OptimisationResponse {
        for_item: item.clone(),
        path: item.to_string(),
        converted_from: None,
        old_bytes: 2_000,
        new_bytes: 1_000,
        old_size: None,
        new_size: None,
    }
}

pub fn settings(fire_and_forget: bool, wait_timeout: Duration) -> SessionSettings {
    SessionSettings {
        fire_and_forget,
        show_progress: true,
        submit_timeout: Duration::from_secs(2),
        wait_timeout: Some(wait_timeout),
    }
}

pub fn session_driver(socket_dir: &Path, settings: SessionSettings) -> (SessionDriver, mpsc::UnboundedReceiver<OutputLine>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let driver = SessionDriver::new(
        LocalChannel::new(socket_dir, REQUEST_ENDPOINT),
        LocalChannel::new(socket_dir, RESPONSE_ENDPOINT),
        Box::new(NoopProbe),
        settings,
        tx,
    );
    (driver, rx)
}

pub fn media_files(dir: &TempDir, n: usize) -> Vec<WorkItem> {
    let paths: Vec<String> = (0..n)
        .map(|i| {
            let path: PathBuf = dir.path().join(format!("photo-{i}.png"));
            std::fs::write(&path, b"png").unwrap();
            path.to_string_lossy().into_owned()
        })
        .collect();
    resolve_items(&paths, ResolveOptions::default()).unwrap()
}

pub fn printed_report(rx: &mut mpsc::UnboundedReceiver<OutputLine>) -> FinalReport {
    let mut report = None;
    while let Ok(line) = rx.try_recv() {
        if let OutputLine::Stdout(json) = line {
            report = Some(serde_json::from_str(&json).unwrap());
        }
    }
    report.expect("a JSON report on stdout")
}

pub async fn eventually(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
