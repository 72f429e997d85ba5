//! In-place terminal progress view.

use crate::session::SessionView;
use crossterm::cursor::MoveUp;
use crossterm::terminal::{Clear, ClearType};
use crossterm::Command;

pub const BAR_SEGMENTS: usize = 20;
pub const NAME_WIDTH: usize = 40;

/// One progress block, ready for the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Lines of the previous block to erase before drawing this one.
    pub erase: usize,
    /// Newline-terminated lines of the block.
    pub body: String,
    pub lines: usize,
}

impl Frame {
    pub fn to_ansi(&self) -> String {
        let mut out = erase_lines(self.erase);
        out.push_str(&self.body);
        out
    }
}

/// Draws frames and remembers how many lines the previous frame occupied so the
/// next one can overwrite it.
#[derive(Debug, Default)]
pub struct ProgressRenderer {
    lines_printed: usize,
}

impl ProgressRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines_printed(&self) -> usize {
        self.lines_printed
    }

    /// Build the next frame: erase the previous one, then draw the summary and
    /// one line per unresolved item.
    pub fn render(&mut self, view: &SessionView) -> Frame {
        let lines = frame_lines(view);
        let mut body = String::new();
        for line in &lines {
            body.push_str(line);
            body.push('\n');
        }
        let frame = Frame {
            erase: self.lines_printed,
            body,
            lines: lines.len(),
        };
        self.lines_printed = frame.lines;
        frame
    }
}

pub fn frame_lines(view: &SessionView) -> Vec<String> {
    let mut lines = Vec::with_capacity(view.pending.len() + 1);
    lines.push(format!(
        "processed {} of {} | success {} | failed {}",
        view.processed(),
        view.total,
        view.succeeded,
        view.failed
    ));
    for pending in &view.pending {
        let mut line = format!(
            "{:<width$} {} {:>6.2}%",
            truncate_left(&single_line(pending.item.as_str()), NAME_WIDTH),
            bar(pending.fraction),
            pending.fraction * 100.0,
            width = NAME_WIDTH
        );
        if let Some(status) = pending.status.as_deref() {
            line.push(' ');
            line.push_str(&single_line(status));
        }
        lines.push(line);
    }
    lines
}

/// Text from the service must not break the line count of a frame.
fn single_line(text: &str) -> String {
    text.chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect()
}

pub fn bar(fraction: f64) -> String {
    let filled = ((fraction.clamp(0.0, 1.0) * BAR_SEGMENTS as f64).floor() as usize).min(BAR_SEGMENTS);
    let mut s = "█".repeat(filled);
    s.push_str(&"░".repeat(BAR_SEGMENTS - filled));
    s
}

/// Keep the tail of long identifiers; the file name is the useful part.
pub fn truncate_left(name: &str, width: usize) -> String {
    let count = name.chars().count();
    if count <= width {
        return name.to_string();
    }
    let keep = width.saturating_sub(1);
    let tail: String = name.chars().skip(count - keep).collect();
    format!("…{tail}")
}

pub(crate) fn erase_lines(n: usize) -> String {
    let mut s = String::new();
    for _ in 0..n {
        let _ = MoveUp(1).write_ansi(&mut s);
        let _ = Clear(ClearType::CurrentLine).write_ansi(&mut s);
    }
    s
}
