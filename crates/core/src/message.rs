//! The persisted chat message record.
//!
//! A [`Message`] serializes to the widget's storage shape:
//!
//! ```json
//! {"message": "Hi! How can I help you today?", "isUser": false,
//!  "timestamp": "2026-10-19T08:00:00Z", "order": 0}
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sender {
    /// The end user typing into the widget
    User,
    /// The backend, or the widget itself (welcome and error messages)
    System,
}

impl Sender {
    pub fn from_is_user(is_user: bool) -> Self {
        if is_user { Sender::User } else { Sender::System }
    }

    pub fn is_user(&self) -> bool {
        matches!(self, Sender::User)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Sender::User => "user",
            Sender::System => "system",
        }
    }
}

impl std::fmt::Display for Sender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single entry of the conversation log. Immutable once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Raw content; markdown or HTML for system replies, plain text for user input
    #[serde(rename = "message")]
    pub text: String,
    #[serde(rename = "isUser")]
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
    /// Authoritative sort key, zero-based
    pub order: usize,
}

impl Message {
    pub fn new(text: impl Into<String>, is_user: bool, order: usize) -> Self {
        Self { text: text.into(), is_user, timestamp: Utc::now(), order }
    }

    pub fn user(text: impl Into<String>, order: usize) -> Self {
        Self::new(text, true, order)
    }

    pub fn system(text: impl Into<String>, order: usize) -> Self {
        Self::new(text, false, order)
    }

    pub fn sender(&self) -> Sender {
        Sender::from_is_user(self.is_user)
    }

    /// Copy of this message at a different position in the log
    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }
}

/// Returns the index of the first pair of neighbours that share a sender, if any.
///
/// `messages` is expected to be sorted by `order`.
pub fn find_alternation_break(messages: &[Message]) -> Option<usize> {
    messages
        .windows(2)
        .position(|pair| pair[0].is_user == pair[1].is_user)
        .map(|i| i + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_serializes_to_widget_shape() {
        let msg = Message::system("Hello", 0);
        let json = serde_json::to_value(&msg).unwrap();

        assert_eq!(json["message"], "Hello");
        assert_eq!(json["isUser"], false);
        assert_eq!(json["order"], 0);
        assert!(json["timestamp"].is_string());
        assert!(json.get("text").is_none());
    }

    #[test]
    fn test_message_parses_browser_timestamp() {
        let raw = r#"{"message":"hi","isUser":true,"timestamp":"2024-05-01T12:30:00.123Z","order":3}"#;
        let msg: Message = serde_json::from_str(raw).unwrap();

        assert_eq!(msg.text, "hi");
        assert!(msg.is_user);
        assert_eq!(msg.order, 3);
        assert_eq!(msg.sender(), Sender::User);
    }

    #[test]
    fn test_with_order_keeps_content() {
        let msg = Message::user("question", 7).with_order(2);
        assert_eq!(msg.order, 2);
        assert_eq!(msg.text, "question");
        assert!(msg.is_user);
    }

    #[test]
    fn test_sender_round_trip() {
        assert_eq!(Sender::from_is_user(true), Sender::User);
        assert_eq!(Sender::from_is_user(false), Sender::System);
        assert!(Sender::User.is_user());
        assert_eq!(Sender::System.to_string(), "system");
    }

    #[test]
    fn test_find_alternation_break() {
        let ok = vec![Message::system("a", 0), Message::user("b", 1), Message::system("c", 2)];
        assert_eq!(find_alternation_break(&ok), None);

        let broken = vec![Message::system("a", 0), Message::user("b", 1), Message::user("c", 2)];
        assert_eq!(find_alternation_break(&broken), Some(2));

        assert_eq!(find_alternation_break(&[]), None);
    }
}
