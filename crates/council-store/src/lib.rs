//! Persistent, crash-safe store of council polls
//!
//! The store keeps one durable record per poll, computes quorum/majority/
//! veto outcomes from the current votes, and supports a one-shot undo: an
//! actor retracts their single most recent action by correcting the chat
//! message that triggered it.
//!
//! Durability rests on [`atomic::replace_file`], a replace-on-write
//! primitive: every record update either completes fully or leaves the old
//! bytes untouched. Lifecycle moves between the active, archive, and trash
//! areas are single atomic renames.
//!
//! The chat/command layer drives the store through [`store::PollStore`]
//! and subscribes once to [`events::StoreEvent`] notifications to announce
//! concluded polls.

pub mod atomic;
pub mod config;
pub mod error;
pub mod events;
pub mod poll;
pub mod result;
pub mod store;
pub mod transaction;
pub mod types;

pub use config::{Config, ConfigError, MemberInfo};
pub use error::StoreError;
pub use events::StoreEvent;
pub use poll::{Poll, VoteRecord};
pub use store::{PollStore, VoteSummary};
pub use transaction::{MemberControl, Transaction, TransactionAction};
pub use types::{
    ConclusionReason, MemberAddress, MessageId, PollFlag, PollId, PollResult, PollState,
    TransactionId, VoteValue,
};
