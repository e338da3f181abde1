//! Values describing a single user turn
use chatbubble_core::Message;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::task::JoinHandle;

/// Whether a reply is outstanding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    AwaitingReply,
}

impl EngineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            EngineState::Idle => "idle",
            EngineState::AwaitingReply => "awaiting-reply",
        }
    }
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a submission was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// Nothing left after trimming whitespace
    EmptyInput,
    /// The last stored message is already the user's
    DuplicateSender,
    /// Another request is still in flight
    AwaitingReply,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::EmptyInput => "empty input",
            RejectReason::DuplicateSender => "duplicate sender",
            RejectReason::AwaitingReply => "awaiting reply",
        }
    }
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// How the system side of a turn was resolved
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    /// The backend answered
    Replied,
    /// A response arrived without reply text
    MalformedResponse,
    /// The request failed
    NetworkFailure,
    /// The engine shut down before the reply arrived
    Cancelled,
}

impl TurnOutcome {
    pub fn is_reply(&self) -> bool {
        matches!(self, TurnOutcome::Replied)
    }
}

/// Result of a finished turn
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    pub outcome: TurnOutcome,
    pub user_message: Message,
    /// System message stored for this turn, `None` if the store refused it (it is still shown)
    pub reply: Option<Message>,
}

/// What [`ConversationEngine::submit`](crate::ConversationEngine::submit) did
#[derive(Debug)]
pub enum SubmitOutcome {
    Dispatched(PendingTurn),
    Rejected(RejectReason),
}

impl SubmitOutcome {
    pub fn is_dispatched(&self) -> bool {
        matches!(self, SubmitOutcome::Dispatched(_))
    }

    pub fn rejection(&self) -> Option<RejectReason> {
        match self {
            SubmitOutcome::Rejected(reason) => Some(*reason),
            SubmitOutcome::Dispatched(_) => None,
        }
    }

    pub fn into_pending(self) -> Option<PendingTurn> {
        match self {
            SubmitOutcome::Dispatched(pending) => Some(pending),
            SubmitOutcome::Rejected(_) => None,
        }
    }
}

/// A turn whose reply is still being fetched
#[derive(Debug)]
pub struct PendingTurn {
    user_message: Message,
    task: JoinHandle<TurnReport>,
}

impl PendingTurn {
    pub(crate) fn new(user_message: Message, task: JoinHandle<TurnReport>) -> Self {
        Self { user_message, task }
    }

    pub fn user_message(&self) -> &Message {
        &self.user_message
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the reply (or error message) to be stored and rendered
    pub async fn wait(self) -> TurnReport {
        match self.task.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!("Turn task failed: {}", e);
                TurnReport { outcome: TurnOutcome::Cancelled, user_message: self.user_message, reply: None }
            }
        }
    }
}

/// Holds the single request slot; releases it on drop
pub(crate) struct FlightGuard {
    flag: Arc<AtomicBool>,
}

impl FlightGuard {
    pub(crate) fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag: Arc::clone(flag) })
    }
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
