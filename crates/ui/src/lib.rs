//! Rendering side of the chat widget.
//!
//! Stored messages become [`TranscriptEntry`] values (replies converted from markdown) and are
//! drawn onto a [`TranscriptSink`]. The [`ReplayRenderer`] rebuilds a whole transcript from
//! history with a fixed pause between messages.

pub mod entry;
pub mod html;
pub mod markdown;
pub mod recording;
pub mod replay;
pub mod sink;
pub mod terminal;

pub use entry::{Body, TranscriptEntry};
pub use html::{HtmlTranscript, escape_html};
pub use markdown::{CommonMarkRenderer, MarkdownRenderer, render_entry};
pub use recording::{RecordingTranscript, TranscriptEvent};
pub use replay::{ReplayHandle, ReplayOutcome, ReplayRenderer, ReplayReport};
pub use sink::TranscriptSink;
pub use terminal::TerminalTranscript;
