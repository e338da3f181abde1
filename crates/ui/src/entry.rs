use chatbubble_core::{Message, Sender};

/// How a message body should be displayed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Body {
    /// Show the raw text as-is
    Plain,
    /// Markdown converted to an HTML fragment
    Markdown { html: String },
}

/// One rendered message, ready for a [`TranscriptSink`](crate::TranscriptSink)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranscriptEntry {
    pub order: usize,
    pub sender: Sender,
    /// Raw message text
    pub text: String,
    pub body: Body,
}

impl TranscriptEntry {
    pub fn plain(message: &Message) -> Self {
        Self { order: message.order, sender: message.sender(), text: message.text.clone(), body: Body::Plain }
    }

    pub fn markdown(message: &Message, html: impl Into<String>) -> Self {
        Self {
            order: message.order,
            sender: message.sender(),
            text: message.text.clone(),
            body: Body::Markdown { html: html.into() },
        }
    }

    pub fn is_user(&self) -> bool {
        self.sender.is_user()
    }

    pub fn is_markdown(&self) -> bool {
        matches!(self.body, Body::Markdown { .. })
    }
}
