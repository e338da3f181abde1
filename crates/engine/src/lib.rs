//! Conversation orchestration for the chat widget.
//!
//! [`ConversationEngine`] ties a [`HistoryStore`](chatbubble_store::HistoryStore), a
//! [`ChatBackend`](chatbubble_providers::ChatBackend) and a
//! [`ReplayRenderer`](chatbubble_ui::ReplayRenderer) together. It enforces strict
//! user/system alternation and allows one outstanding request at a time.
//!
//! ```ignore
//! let engine = ConversationEngine::from_config(&config, sink).await?;
//! engine.initialize().await;
//! engine.open().await.wait().await;
//!
//! if let SubmitOutcome::Dispatched(turn) = engine.submit("hello").await {
//!     let report = turn.wait().await;
//!     println!("{:?}", report.outcome);
//! }
//! ```

mod engine;
mod error;
mod turn;

pub use engine::ConversationEngine;
pub use error::{Error, Result};
pub use turn::{EngineState, PendingTurn, RejectReason, SubmitOutcome, TurnOutcome, TurnReport};
