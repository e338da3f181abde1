//! Chat transcript printed to a terminal
use crate::entry::TranscriptEntry;
use crate::sink::TranscriptSink;

use owo_colors::OwoColorize;
use std::io::{self, Write};
use std::sync::{Mutex, MutexGuard};
use unicode_width::UnicodeWidthStr;

const LOADING: &str = "● ● ●";

/// Bubbles take at most this share of the line
const BUBBLE_RATIO: f32 = 0.7;

struct TerminalState {
    out: Box<dyn Write + Send>,
    loading: bool,
}

/// Sink that prints user messages right-aligned and replies left-aligned.
///
/// Replies are printed as their raw markdown source.
pub struct TerminalTranscript {
    title: String,
    width: usize,
    color: bool,
    state: Mutex<TerminalState>,
}

impl TerminalTranscript {
    pub fn stdout(title: impl Into<String>) -> Self {
        Self::with_writer(title, Box::new(io::stdout()))
    }

    pub fn with_writer(title: impl Into<String>, out: Box<dyn Write + Send>) -> Self {
        Self {
            title: title.into(),
            width: 80,
            color: true,
            state: Mutex::new(TerminalState { out, loading: false }),
        }
    }

    pub fn with_width(mut self, width: usize) -> Self {
        self.width = width.max(20);
        self
    }

    pub fn with_color(mut self, color: bool) -> Self {
        self.color = color;
        self
    }

    fn lock(&self) -> MutexGuard<'_, TerminalState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn bubble_width(&self) -> usize {
        ((self.width as f32) * BUBBLE_RATIO) as usize
    }

    /// Lines for one entry, already padded and coloured
    fn format_entry(&self, entry: &TranscriptEntry) -> Vec<String> {
        let wrapped = textwrap::wrap(&entry.text, self.bubble_width());

        wrapped
            .iter()
            .map(|line| {
                if entry.is_user() {
                    let pad = self.width.saturating_sub(line.width());
                    let text = if self.color { line.cyan().to_string() } else { line.to_string() };
                    format!("{}{}", " ".repeat(pad), text)
                } else if self.color {
                    line.white().to_string()
                } else {
                    line.to_string()
                }
            })
            .collect()
    }

    fn erase_loading(state: &mut TerminalState) -> io::Result<()> {
        if state.loading {
            write!(state.out, "\r\x1b[2K")?;
            state.loading = false;
        }
        Ok(())
    }

    fn write_header(&self, state: &mut TerminalState) -> io::Result<()> {
        let rule = "─".repeat(self.width);
        if self.color {
            writeln!(state.out, "{}", rule.dimmed())?;
            writeln!(state.out, "{}", self.title.bold())?;
            writeln!(state.out, "{}", rule.dimmed())?;
        } else {
            writeln!(state.out, "{}\n{}\n{}", rule, self.title, rule)?;
        }
        state.out.flush()
    }

    fn write_entry(&self, state: &mut TerminalState, entry: &TranscriptEntry) -> io::Result<()> {
        Self::erase_loading(state)?;
        for line in self.format_entry(entry) {
            writeln!(state.out, "{}", line)?;
        }
        writeln!(state.out)?;
        state.out.flush()
    }

    fn write_loading(&self, state: &mut TerminalState, visible: bool) -> io::Result<()> {
        if visible && !state.loading {
            if self.color {
                write!(state.out, "{}", LOADING.dimmed())?;
            } else {
                write!(state.out, "{}", LOADING)?;
            }
            state.loading = true;
        } else if !visible {
            Self::erase_loading(state)?;
        }
        state.out.flush()
    }
}

impl TranscriptSink for TerminalTranscript {
    fn clear(&self) {
        let mut state = self.lock();
        let result = Self::erase_loading(&mut state).and_then(|_| self.write_header(&mut state));
        if let Err(e) = result {
            tracing::warn!("Failed to write transcript header: {}", e);
        }
    }

    fn append(&self, entry: TranscriptEntry) {
        let mut state = self.lock();
        if let Err(e) = self.write_entry(&mut state, &entry) {
            tracing::warn!(order = entry.order, "Failed to write transcript entry: {}", e);
        }
    }

    fn set_loading(&self, visible: bool) {
        let mut state = self.lock();
        if let Err(e) = self.write_loading(&mut state, visible) {
            tracing::warn!("Failed to write loading indicator: {}", e);
        }
    }
}
