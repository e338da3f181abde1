use crate::error::Result;
use crate::turn::{EngineState, FlightGuard, PendingTurn, RejectReason, SubmitOutcome, TurnOutcome, TurnReport};

use chatbubble_core::config::{DEFAULT_ERROR_MESSAGE, DEFAULT_MALFORMED_MESSAGE};
use chatbubble_core::logging::preview;
use chatbubble_core::{Config, Error as CoreError, Message};
use chatbubble_providers::{ChatBackend, ProviderFactory};
use chatbubble_store::{HistoryStore, SaveOutcome};
use chatbubble_ui::{ReplayHandle, ReplayRenderer, TranscriptSink};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;
use tracing::instrument;

/// Fixed texts stored in place of a reply
#[derive(Debug, Clone)]
struct FailureMessages {
    network: String,
    malformed: String,
}

/// Owns the conversation: turn-taking, the request lifecycle, and replays
pub struct ConversationEngine {
    store: Arc<HistoryStore>,
    backend: Arc<dyn ChatBackend>,
    renderer: Arc<ReplayRenderer>,
    failures: FailureMessages,
    in_flight: Arc<AtomicBool>,
    open: AtomicBool,
    shutdown: CancellationToken,
}

impl ConversationEngine {
    pub fn new(store: Arc<HistoryStore>, backend: Arc<dyn ChatBackend>, renderer: Arc<ReplayRenderer>) -> Self {
        Self {
            store,
            backend,
            renderer,
            failures: FailureMessages {
                network: DEFAULT_ERROR_MESSAGE.to_string(),
                malformed: DEFAULT_MALFORMED_MESSAGE.to_string(),
            },
            in_flight: Arc::new(AtomicBool::new(false)),
            open: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        }
    }

    /// Wire up store, backend and renderer from configuration, drawing onto `sink`
    pub async fn from_config(config: &Config, sink: Arc<dyn TranscriptSink>) -> Result<Self> {
        let store = HistoryStore::from_config(&config.history, &config.widget.welcome_message).await?;
        let backend = ProviderFactory::create_from_config(&config.provider)?;
        let renderer = ReplayRenderer::new(sink).with_delay(config.replay.delay());

        tracing::info!(
            storage = %config.history.storage,
            provider = backend.name(),
            max_messages = config.history.max_messages,
            "Conversation engine configured"
        );

        Ok(Self::new(Arc::new(store), backend, Arc::new(renderer))
            .with_error_message(&config.widget.error_message)
            .with_malformed_message(&config.widget.malformed_response_message))
    }

    /// Text stored when the request fails
    pub fn with_error_message(mut self, text: impl Into<String>) -> Self {
        self.failures.network = text.into();
        self
    }

    /// Text stored when a response carries no reply
    pub fn with_malformed_message(mut self, text: impl Into<String>) -> Self {
        self.failures.malformed = text.into();
        self
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.store
    }

    pub fn renderer(&self) -> &Arc<ReplayRenderer> {
        &self.renderer
    }

    /// Seed the welcome message into an empty history
    pub async fn initialize(&self) {
        self.store.initialize().await;
    }

    pub fn state(&self) -> EngineState {
        if self.in_flight.load(Ordering::Acquire) { EngineState::AwaitingReply } else { EngineState::Idle }
    }

    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Stored messages in order
    pub async fn history(&self) -> Vec<Message> {
        self.store.load().await
    }

    /// Show the widget: replay the stored history onto the sink
    #[instrument(skip(self))]
    pub async fn open(&self) -> ReplayHandle {
        self.open.store(true, Ordering::Release);
        let history = self.seeded_history().await;
        tracing::debug!(messages = history.len(), "Opening chat");
        self.renderer.render(history)
    }

    /// Hide the widget; a replay still running stops before its next message
    pub fn close(&self) {
        self.open.store(false, Ordering::Release);
        self.renderer.cancel();
    }

    async fn seeded_history(&self) -> Vec<Message> {
        let history = self.store.load().await;
        if !history.is_empty() {
            return history;
        }

        self.store.initialize().await;
        self.store.load().await
    }

    /// Wipe the history, re-seed it and redraw the transcript.
    ///
    /// Returns `false` when the stored history could not be deleted; the transcript is left
    /// alone in that case.
    #[instrument(skip(self))]
    pub async fn clear_history(&self) -> bool {
        if !self.store.clear().await {
            tracing::warn!("Clearing chat history failed");
            return false;
        }

        let history = self.store.load().await;
        let _replay = self.renderer.render(history);
        true
    }

    /// Store and show a user message, then fetch the reply on a background task.
    #[instrument(skip(self, text), fields(text_len = text.len()))]
    pub async fn submit(&self, text: &str) -> SubmitOutcome {
        let text = text.trim();
        if text.is_empty() {
            return Self::reject(RejectReason::EmptyInput);
        }

        let history = self.store.load().await;
        if history.last().is_some_and(|last| last.is_user) {
            return Self::reject(RejectReason::DuplicateSender);
        }

        let Some(guard) = FlightGuard::acquire(&self.in_flight) else {
            return Self::reject(RejectReason::AwaitingReply);
        };

        let user_message = match self.store.save(text, true).await {
            SaveOutcome::Saved(msg) => msg,
            SaveOutcome::Unpersisted(msg) => {
                tracing::warn!("User message was not persisted; continuing with the turn");
                msg
            }
            SaveOutcome::DuplicateSender => return Self::reject(RejectReason::DuplicateSender),
        };

        self.renderer.append_now(&user_message).await;
        self.renderer.set_loading(true).await;

        tracing::info!(order = user_message.order, "Dispatching: {}", preview(text, 80));

        let task = tokio::spawn(Self::run_turn(
            Arc::clone(&self.store),
            Arc::clone(&self.backend),
            Arc::clone(&self.renderer),
            self.failures.clone(),
            self.shutdown.clone(),
            user_message.clone(),
            guard,
        ));

        SubmitOutcome::Dispatched(PendingTurn::new(user_message, task))
    }

    fn reject(reason: RejectReason) -> SubmitOutcome {
        tracing::warn!(%reason, "Submission rejected");
        SubmitOutcome::Rejected(reason)
    }

    async fn run_turn(
        store: Arc<HistoryStore>, backend: Arc<dyn ChatBackend>, renderer: Arc<ReplayRenderer>,
        failures: FailureMessages, shutdown: CancellationToken, user_message: Message, guard: FlightGuard,
    ) -> TurnReport {
        let result = tokio::select! {
            _ = shutdown.cancelled() => None,
            result = backend.send(&user_message.text) => Some(result),
        };

        renderer.set_loading(false).await;

        let (text, outcome) = match result {
            Some(Ok(reply)) => (reply, TurnOutcome::Replied),
            Some(Err(CoreError::MalformedResponse(detail))) => {
                tracing::error!("Unexpected response structure: {}", detail);
                (failures.malformed.clone(), TurnOutcome::MalformedResponse)
            }
            Some(Err(e)) => {
                tracing::error!(backend = backend.name(), "Request failed: {}", e);
                (failures.network.clone(), TurnOutcome::NetworkFailure)
            }
            None => {
                tracing::info!("Request cancelled by shutdown");
                (failures.network.clone(), TurnOutcome::Cancelled)
            }
        };

        let reply = store.save(&text, false).await.message().cloned();
        let shown = reply.clone().unwrap_or_else(|| {
            tracing::warn!("Reply was not stored; showing it anyway");
            Message::system(&text, user_message.order + 1)
        });
        renderer.append_now(&shown).await;

        drop(guard);
        tracing::debug!(?outcome, "Turn complete");
        TurnReport { outcome, user_message, reply }
    }

    /// Cancel the in-flight request and any running replay
    pub fn shutdown(&self) {
        tracing::info!("Shutting down conversation engine");
        self.shutdown.cancel();
        self.renderer.cancel();
    }
}
