//! Conversation session: local state, mutation strategies and the controller
//!
//! - [`store`] holds the cached view of one conversation
//! - [`mutation`] declares how each change touches that cache
//! - [`controller`] mediates between user intents and the remote service

pub mod controller;
pub mod mutation;
pub mod store;

pub use controller::{SendOutcome, SessionController};
pub use mutation::{Mutation, MutationStrategy};
pub use store::{EndDialog, Notice, NoticeLevel, SessionPhase, SessionStore};
