//! Standalone HTML rendering of the widget's message list
use crate::entry::{Body, TranscriptEntry};
use crate::sink::TranscriptSink;

use std::fmt::Write as _;
use std::sync::{Mutex, MutexGuard};

const LOADING_MARKUP: &str = r#"<div class="loading-spinner"><div class="dots"><div class="dot"></div><div class="dot"></div><div class="dot"></div></div></div>"#;

const STYLE: &str = r#"
body { font-family: system-ui, sans-serif; background: #f3f4f6; }
#chat-popup { width: 24rem; margin: 2rem auto; background: #fff; border-radius: 0.375rem; box-shadow: 0 4px 6px rgba(0,0,0,.1); font-size: 0.875rem; }
#chat-header { padding: 1rem; background: #1f2937; color: #fff; border-radius: 0.375rem 0.375rem 0 0; }
#chat-header h3 { margin: 0; font-size: 1.125rem; }
#chat-messages { padding: 1rem; }
.flex { display: flex; }
.justify-end { justify-content: flex-end; }
.mb-3 { margin-bottom: 0.75rem; }
.bubble { border-radius: 0.5rem; padding: 0.5rem 1rem; max-width: 70%; }
.bubble-user { background: #1f2937; color: #fff; white-space: pre-wrap; }
.bubble-bot { background: #e5e7eb; color: #000; }
.markdown-content p { margin: 0.5em 0; }
.markdown-content pre { background: #f4f4f4; padding: 0.5em; border-radius: 4px; overflow-x: auto; }
.dots { display: flex; gap: 4px; padding: 0.5rem 1rem; }
.dot { width: 8px; height: 8px; background: #6b7280; border-radius: 50%; }
"#;

/// Escape text for inclusion in HTML element content or attribute values
pub fn escape_html(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[derive(Debug, Default)]
struct HtmlState {
    messages: Vec<String>,
    loading: bool,
}

/// Sink that accumulates the widget's message markup.
///
/// User text and unrendered replies are escaped; rendered markdown is inserted as produced.
#[derive(Debug)]
pub struct HtmlTranscript {
    title: String,
    state: Mutex<HtmlState>,
}

impl HtmlTranscript {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), state: Mutex::new(HtmlState::default()) }
    }

    fn lock(&self) -> MutexGuard<'_, HtmlState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn entry_markup(entry: &TranscriptEntry) -> String {
        if entry.is_user() {
            return format!(
                r#"<div class="flex justify-end mb-3" data-order="{}"><div class="bubble bubble-user">{}</div></div>"#,
                entry.order,
                escape_html(&entry.text)
            );
        }

        let content = match &entry.body {
            Body::Markdown { html } => html.clone(),
            Body::Plain => escape_html(&entry.text),
        };
        format!(
            r#"<div class="flex mb-3" data-order="{}"><div class="bubble bubble-bot"><div class="markdown-content">{}</div></div></div>"#,
            entry.order, content
        )
    }

    /// Inner markup of `#chat-messages`
    pub fn messages_html(&self) -> String {
        let state = self.lock();
        let mut out = state.messages.join("\n");
        if state.loading {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(LOADING_MARKUP);
        }
        out
    }

    pub fn len(&self) -> usize {
        self.lock().messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Complete HTML page showing the chat popup
    pub fn document(&self) -> String {
        let mut doc = String::new();
        let _ = writeln!(doc, "<!DOCTYPE html>");
        let _ = writeln!(doc, "<html lang=\"en\">");
        let _ = writeln!(doc, "<head>");
        let _ = writeln!(doc, "<meta charset=\"utf-8\">");
        let _ = writeln!(doc, "<title>{}</title>", escape_html(&self.title));
        let _ = writeln!(doc, "<style>{}</style>", STYLE);
        let _ = writeln!(doc, "</head>");
        let _ = writeln!(doc, "<body>");
        let _ = writeln!(doc, "<div id=\"chat-popup\">");
        let _ = writeln!(doc, "<div id=\"chat-header\"><h3>{}</h3></div>", escape_html(&self.title));
        let _ = writeln!(doc, "<div id=\"chat-messages\">\n{}\n</div>", self.messages_html());
        let _ = writeln!(doc, "</div>");
        let _ = writeln!(doc, "</body>");
        let _ = writeln!(doc, "</html>");
        doc
    }
}

impl TranscriptSink for HtmlTranscript {
    fn clear(&self) {
        let mut state = self.lock();
        state.messages.clear();
        state.loading = false;
    }

    fn append(&self, entry: TranscriptEntry) {
        let markup = Self::entry_markup(&entry);
        self.lock().messages.push(markup);
    }

    fn set_loading(&self, visible: bool) {
        self.lock().loading = visible;
    }
}
