//! Markdown to HTML conversion for backend replies
use crate::entry::TranscriptEntry;

use chatbubble_core::{Message, Result};
use pulldown_cmark::{Event, Options, Parser, html};

pub trait MarkdownRenderer: Send + Sync {
    fn render(&self, markdown: &str) -> Result<String>;
}

/// CommonMark with GitHub extensions; single newlines become `<br />`
#[derive(Debug, Clone, Copy, Default)]
pub struct CommonMarkRenderer;

impl CommonMarkRenderer {
    fn options() -> Options {
        let mut options = Options::empty();
        options.insert(Options::ENABLE_STRIKETHROUGH);
        options.insert(Options::ENABLE_TABLES);
        options.insert(Options::ENABLE_TASKLISTS);
        options.insert(Options::ENABLE_FOOTNOTES);
        options
    }
}

impl MarkdownRenderer for CommonMarkRenderer {
    fn render(&self, markdown: &str) -> Result<String> {
        let parser = Parser::new_ext(markdown, Self::options()).map(|event| match event {
            Event::SoftBreak => Event::HardBreak,
            other => other,
        });

        let mut html_output = String::with_capacity(markdown.len() * 3 / 2);
        html::push_html(&mut html_output, parser);
        Ok(html_output)
    }
}

/// Build the transcript entry for a stored message.
///
/// User input is always plain. Replies go through `renderer`; when it fails the raw text is
/// shown instead.
pub fn render_entry(message: &Message, renderer: &dyn MarkdownRenderer) -> TranscriptEntry {
    if message.is_user {
        return TranscriptEntry::plain(message);
    }

    match renderer.render(&message.text) {
        Ok(html) => TranscriptEntry::markdown(message, html),
        Err(e) => {
            tracing::warn!(order = message.order, "Markdown rendering failed, showing raw text: {}", e);
            TranscriptEntry::plain(message)
        }
    }
}
