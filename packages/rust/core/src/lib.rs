//! Conversation layer for kbchat.
//!
//! Ties the ingested corpus and the ranker to a generation backend:
//! [`store::CorpusStore`] publishes corpus snapshots, [`context`] renders the
//! ranked documents into a system instruction, [`generation`] talks to the
//! model, and [`chat::ChatSession`] runs one turn at a time.

pub mod chat;
pub mod context;
pub mod generation;
pub mod store;

pub use chat::{ChatReply, ChatSession, EMPTY_REPLY, FALLBACK_REPLY, ReplyOutcome};
pub use context::{InstructionTemplate, NO_RECORDS_MARKER, render_context, render_document};
pub use generation::{
    GeminiClient, GenerationBackend, GenerationRequest, GenerationResponse, GroundingReference,
};
pub use store::{CorpusStore, NewDocument};
