use crate::output::{OutputLine, OutputSender};
use std::io::{self, IsTerminal, Write};
use tokio::sync::mpsc::WeakUnboundedSender;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber. Log lines go through the output writer so
/// they interleave cleanly with the progress block on stderr; `RUST_LOG` wins
/// over the `verbose` default.
pub fn init(verbose: bool, output: &OutputSender) {
    let default_level = if verbose { "debug" } else { "warn" };
    let sink = output.downgrade();
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(io::stderr().is_terminal())
                .with_writer(move || LogLine::new(sink.clone()))
                .compact(),
        )
        .try_init();
}

/// Buffers one formatted event and hands it to the output writer on drop.
/// Falls back to stderr once the writer has shut down.
pub struct LogLine {
    sink: WeakUnboundedSender<OutputLine>,
    buf: Vec<u8>,
}

impl LogLine {
    pub fn new(sink: WeakUnboundedSender<OutputLine>) -> Self {
        Self {
            sink,
            buf: Vec::new(),
        }
    }
}

impl Write for LogLine {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for LogLine {
    fn drop(&mut self) {
        if self.buf.is_empty() {
            return;
        }
        let text = String::from_utf8_lossy(&self.buf);
        let text = text.trim_end_matches('\n').to_string();
        let undelivered = match self.sink.upgrade() {
            Some(tx) => tx.send(OutputLine::Stderr(text)).err().map(|e| e.0),
            None => Some(OutputLine::Stderr(text)),
        };
        if let Some(OutputLine::Stderr(text)) = undelivered {
            eprintln!("{text}");
        }
    }
}
