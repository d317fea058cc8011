//! Error taxonomy of the poll store
//!
//! All store operations surface errors synchronously to the caller; there
//! are no internal retries. The atomic writer guarantees that a failed
//! operation leaves no partial on-disk state, so callers may retry
//! `create_poll` / `cast_vote` / `delete_poll` without manual cleanup.

use crate::types::{MemberAddress, PollId};

/// Main store error type
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A poll with the derived id already exists; vary the topic and retry.
    #[error("poll already exists: {0}")]
    AlreadyExists(PollId),

    /// No poll matched the given reference.
    #[error("no poll matching {0:?}")]
    NotFound(String),

    /// The actor is not on the council roster.
    #[error("not a council member: {0}")]
    NotAMember(MemberAddress),

    /// Attempt to conclude a poll that is still open before expiry.
    #[error("cannot conclude poll {0} with open votes before expiration")]
    InvalidTransition(PollId),

    /// The operation is declared but intentionally not implemented.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// Durable-write failure; prior state remains intact.
    #[error("I/O failure: {0}")]
    Io(#[from] std::io::Error),

    /// A record could not be decoded.
    #[error("corrupt record: {0}")]
    Corrupt(#[from] serde_json::Error),
}
