use crate::entry::TranscriptEntry;
use crate::sink::TranscriptSink;

use std::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// A call made against a [`RecordingTranscript`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranscriptEvent {
    Clear,
    Append(TranscriptEntry),
    Loading(bool),
}

/// Sink that remembers every call and when it happened.
///
/// Timestamps come from the tokio clock, so they follow a paused test runtime.
#[derive(Debug, Default)]
pub struct RecordingTranscript {
    events: Mutex<Vec<(Instant, TranscriptEvent)>>,
}

impl RecordingTranscript {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(Instant, TranscriptEvent)>> {
        self.events.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn events(&self) -> Vec<TranscriptEvent> {
        self.lock().iter().map(|(_, event)| event.clone()).collect()
    }

    pub fn timed_events(&self) -> Vec<(Instant, TranscriptEvent)> {
        self.lock().clone()
    }

    /// Entries currently on screen: everything appended since the last clear
    pub fn visible(&self) -> Vec<TranscriptEntry> {
        let events = self.lock();
        let start = events
            .iter()
            .rposition(|(_, event)| matches!(event, TranscriptEvent::Clear))
            .map_or(0, |i| i + 1);

        events[start..]
            .iter()
            .filter_map(|(_, event)| match event {
                TranscriptEvent::Append(entry) => Some(entry.clone()),
                _ => None,
            })
            .collect()
    }

    /// Instants of every append, in call order
    pub fn append_times(&self) -> Vec<Instant> {
        self.lock()
            .iter()
            .filter(|(_, event)| matches!(event, TranscriptEvent::Append(_)))
            .map(|(at, _)| *at)
            .collect()
    }

    /// Whether the loading indicator is currently shown
    pub fn is_loading(&self) -> bool {
        self.lock()
            .iter()
            .rev()
            .find_map(|(_, event)| match event {
                TranscriptEvent::Loading(visible) => Some(*visible),
                _ => None,
            })
            .unwrap_or(false)
    }

    pub fn reset(&self) {
        self.lock().clear();
    }
}

impl TranscriptSink for RecordingTranscript {
    fn clear(&self) {
        self.lock().push((Instant::now(), TranscriptEvent::Clear));
    }

    fn append(&self, entry: TranscriptEntry) {
        self.lock().push((Instant::now(), TranscriptEvent::Append(entry)));
    }

    fn set_loading(&self, visible: bool) {
        self.lock().push((Instant::now(), TranscriptEvent::Loading(visible)));
    }
}
