use crate::entry::TranscriptEntry;

/// The visual transcript a conversation is drawn onto.
///
/// Calls arrive from tokio tasks; implementations use interior mutability.
pub trait TranscriptSink: Send + Sync {
    /// Remove every displayed message
    fn clear(&self);

    /// Display one more message below the existing ones
    fn append(&self, entry: TranscriptEntry);

    /// Show or hide the transient loading indicator
    fn set_loading(&self, visible: bool);
}
