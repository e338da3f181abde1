//! Timed reconstruction of the transcript from stored history.
//!
//! Each [`ReplayRenderer::render`] call clears the sink and then emits messages one at a time
//! in `order`, pausing between consecutive emissions. Starting a new replay supersedes the
//! previous one: the stale task stops before its next emission, and because emissions and the
//! supersession check share one lock it can never write after the new replay has cleared.
//!
//! Live appends ([`ReplayRenderer::append_now`]) first fast-forward the running replay, so a
//! message added while the transcript is still being rebuilt lands after everything replayed.

use crate::markdown::{CommonMarkRenderer, MarkdownRenderer, render_entry};
use crate::sink::TranscriptSink;

use chatbubble_core::Message;
use chatbubble_core::config::DEFAULT_REPLAY_DELAY_MS;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// How a replay ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplayOutcome {
    /// Every message was emitted
    Done,
    /// A newer replay (or an explicit cancel) took over
    Superseded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReplayReport {
    /// Messages appended to the sink by this replay
    pub emitted: usize,
    pub outcome: ReplayOutcome,
}

/// A running replay
pub struct ReplayHandle {
    task: JoinHandle<ReplayReport>,
    token: CancellationToken,
}

impl ReplayHandle {
    /// Wait for the replay to finish or be superseded
    pub async fn wait(self) -> ReplayReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Replay task failed: {}", e);
                ReplayReport { emitted: 0, outcome: ReplayOutcome::Superseded }
            }
        }
    }

    /// Stop before the next emission
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Signals shared with the most recent replay task
#[derive(Clone)]
struct ActiveReplay {
    /// Stop before the next emission
    cancel: CancellationToken,
    /// Skip the remaining delays
    flush: CancellationToken,
    /// Cancelled once the task has exited, however it exited
    done: CancellationToken,
}

impl ActiveReplay {
    fn new(cancel: CancellationToken) -> Self {
        Self { cancel, flush: CancellationToken::new(), done: CancellationToken::new() }
    }

    fn idle() -> Self {
        let replay = Self::new(CancellationToken::new());
        replay.done.cancel();
        replay
    }
}

/// Draws stored messages onto a [`TranscriptSink`]
pub struct ReplayRenderer {
    sink: Arc<dyn TranscriptSink>,
    markdown: Arc<dyn MarkdownRenderer>,
    delay: Duration,
    emit_lock: Arc<Mutex<()>>,
    current: std::sync::Mutex<ActiveReplay>,
}

impl ReplayRenderer {
    pub fn new(sink: Arc<dyn TranscriptSink>) -> Self {
        Self {
            sink,
            markdown: Arc::new(CommonMarkRenderer),
            delay: Duration::from_millis(DEFAULT_REPLAY_DELAY_MS),
            emit_lock: Arc::new(Mutex::new(())),
            current: std::sync::Mutex::new(ActiveReplay::idle()),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn with_markdown(mut self, markdown: Arc<dyn MarkdownRenderer>) -> Self {
        self.markdown = markdown;
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn sink(&self) -> &Arc<dyn TranscriptSink> {
        &self.sink
    }

    fn current(&self) -> std::sync::MutexGuard<'_, ActiveReplay> {
        self.current.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Cancel the running replay and install `next` as the current one
    fn supersede(&self, next: ActiveReplay) {
        let mut current = self.current();
        current.cancel.cancel();
        *current = next;
    }

    /// Stop the running replay, if any
    pub fn cancel(&self) {
        self.supersede(ActiveReplay::idle());
    }

    /// Emit whatever the running replay has left without further delay and wait for it to exit
    pub async fn catch_up(&self) {
        let replay = self.current().clone();
        replay.flush.cancel();
        replay.done.cancelled().await;
    }

    /// Clear the sink and replay `history` in `order` on a new task.
    ///
    /// Must be called from within a tokio runtime.
    #[instrument(skip(self, history), fields(messages = history.len()))]
    pub fn render(&self, mut history: Vec<Message>) -> ReplayHandle {
        let token = CancellationToken::new();
        let replay = ActiveReplay::new(token.clone());
        let flush = replay.flush.clone();
        let done = replay.done.clone();
        self.supersede(replay);

        history.sort_by_key(|msg| msg.order);

        let sink = Arc::clone(&self.sink);
        let markdown = Arc::clone(&self.markdown);
        let emit_lock = Arc::clone(&self.emit_lock);
        let delay = self.delay;
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let _done = done.drop_guard();
            let superseded = |emitted: usize| {
                tracing::debug!(emitted, "Replay superseded");
                ReplayReport { emitted, outcome: ReplayOutcome::Superseded }
            };

            {
                let _guard = emit_lock.lock().await;
                if task_token.is_cancelled() {
                    return superseded(0);
                }
                sink.clear();
            }

            let mut emitted = 0;
            for (index, message) in history.iter().enumerate() {
                if index > 0 {
                    tokio::select! {
                        _ = task_token.cancelled() => return superseded(emitted),
                        _ = flush.cancelled() => {}
                        _ = tokio::time::sleep(delay) => {}
                    }
                }

                let entry = render_entry(message, markdown.as_ref());

                let _guard = emit_lock.lock().await;
                if task_token.is_cancelled() {
                    return superseded(emitted);
                }
                sink.append(entry);
                emitted += 1;
                tracing::trace!(order = message.order, "Replayed message");
            }

            tracing::debug!(emitted, "Replay complete");
            ReplayReport { emitted, outcome: ReplayOutcome::Done }
        });

        ReplayHandle { task, token }
    }

    /// Append one message after the running replay, if any, has caught up
    pub async fn append_now(&self, message: &Message) {
        self.catch_up().await;
        let entry = render_entry(message, self.markdown.as_ref());
        let _guard = self.emit_lock.lock().await;
        self.sink.append(entry);
    }

    pub async fn set_loading(&self, visible: bool) {
        let _guard = self.emit_lock.lock().await;
        self.sink.set_loading(visible);
    }

    /// Remove everything from the sink and stop the running replay
    pub async fn clear(&self) {
        self.cancel();
        let _guard = self.emit_lock.lock().await;
        self.sink.clear();
    }
}
