use crate::aggregator::render::{erase_lines, Frame};
use std::io::{self, Write};
use tokio::sync::mpsc;

/// Output line routing for stdout/stderr writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputLine {
    Stdout(String),
    Stderr(String),
    /// Replaces the progress block currently on stderr.
    Frame(Frame),
    /// The current progress block stays as ordinary output and is no longer
    /// redrawn around stderr lines.
    Settle,
}

pub type OutputSender = mpsc::UnboundedSender<OutputLine>;

/// Writes routed lines and keeps stderr lines from tearing a live progress
/// block: the block is erased, the line printed, and the block drawn again
/// underneath.
pub struct Terminal<O: Write, E: Write> {
    out: O,
    err: E,
    frame: Option<Frame>,
}

impl<O: Write, E: Write> Terminal<O, E> {
    pub fn new(out: O, err: E) -> Self {
        Self {
            out,
            err,
            frame: None,
        }
    }

    pub fn write(&mut self, line: OutputLine) -> io::Result<()> {
        match line {
            OutputLine::Stdout(msg) => writeln!(self.out, "{msg}"),
            OutputLine::Stderr(msg) => {
                match &self.frame {
                    Some(frame) => {
                        self.err.write_all(erase_lines(frame.lines).as_bytes())?;
                        writeln!(self.err, "{msg}")?;
                        self.err.write_all(frame.body.as_bytes())?;
                    }
                    None => writeln!(self.err, "{msg}")?,
                }
                self.err.flush()
            }
            OutputLine::Frame(frame) => {
                self.err.write_all(frame.to_ansi().as_bytes())?;
                self.err.flush()?;
                self.frame = Some(frame);
                Ok(())
            }
            OutputLine::Settle => {
                self.frame = None;
                Ok(())
            }
        }
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.out.flush()?;
        self.err.flush()
    }
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
pub fn spawn_output_writer() -> (OutputSender, tokio::task::JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = io::stdout();
        let out = io::LineWriter::new(stdout.lock());
        // Left unlocked: panics and log lines emitted after the writer is gone
        // go to stderr directly.
        let mut terminal = Terminal::new(out, io::stderr());

        while let Some(line) = rx.blocking_recv() {
            let _ = terminal.write(line);
        }
        let _ = terminal.flush();
    });
    (tx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(erase: usize, lines: &[&str]) -> Frame {
        Frame {
            erase,
            body: lines.iter().map(|l| format!("{l}\n")).collect(),
            lines: lines.len(),
        }
    }

    fn written(lines: Vec<OutputLine>) -> (String, String) {
        let mut terminal = Terminal::new(Vec::new(), Vec::new());
        for line in lines {
            terminal.write(line).unwrap();
        }
        (
            String::from_utf8(terminal.out).unwrap(),
            String::from_utf8(terminal.err).unwrap(),
        )
    }

    #[test]
    fn stdout_and_stderr_stay_apart() {
        let (out, err) = written(vec![
            OutputLine::Stdout("{}".into()),
            OutputLine::Stderr("Queued 2 items for optimisation".into()),
        ]);
        assert_eq!(out, "{}\n");
        assert_eq!(err, "Queued 2 items for optimisation\n");
    }

    #[test]
    fn stderr_line_is_printed_above_the_live_frame() {
        let block = frame(0, &["0/1 done", "a.png [--] 0%"]);
        let (_, err) = written(vec![
            OutputLine::Frame(block.clone()),
            OutputLine::Stderr("WARN something".into()),
        ]);
        let expected = format!(
            "{}{}WARN something\n{}",
            block.body,
            erase_lines(2),
            block.body
        );
        assert_eq!(err, expected);
    }

    #[test]
    fn settled_frame_is_left_alone() {
        let block = frame(0, &["1/1 done"]);
        let (_, err) = written(vec![
            OutputLine::Frame(block.clone()),
            OutputLine::Settle,
            OutputLine::Stderr("Saved 1.0 KB".into()),
        ]);
        assert_eq!(err, format!("{}Saved 1.0 KB\n", block.body));
    }

    #[test]
    fn frame_erases_what_it_replaces() {
        let first = frame(0, &["0/1 done", "a.png"]);
        let second = frame(2, &["1/1 done"]);
        let (_, err) = written(vec![
            OutputLine::Frame(first.clone()),
            OutputLine::Frame(second.clone()),
        ]);
        assert_eq!(err, format!("{}{}", first.body, second.to_ansi()));
        assert!(second.to_ansi().starts_with(&erase_lines(2)));
    }
}
