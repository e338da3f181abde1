//! Conversational backends for the chat widget.
//!
//! A [`ChatBackend`] turns one line of user input into one reply string. Failures are reported
//! as [`Error::Network`] when no usable response arrived and [`Error::MalformedResponse`] when
//! a response arrived but carried no reply.

pub mod backend;
pub mod langflow;
pub mod mock;

pub use backend::{ChatBackend, ProviderFactory};
pub use langflow::{LangflowBackend, LangflowRequest, extract_reply};
pub use mock::{MockBackend, MockResponse};

pub use chatbubble_core::{Error, Result};
