//! Transaction records for undo-by-correction
//!
//! Every mutating store operation records one transaction against the chat
//! message that triggered it. At most one transaction is pending per actor;
//! a correction of exactly that message reverts it, anything else confirms
//! it. The action kind is a closed enum carrying its own revert data, so
//! the confirm and revert paths are checked exhaustively.

use serde::{Deserialize, Serialize};

use crate::types::{MemberAddress, MessageId, PollId, TransactionId};

/// What a transaction did, plus the data needed to invert it.
///
/// Serialized as `{"action": ..., "revert_data": {...}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "revert_data", rename_all = "snake_case")]
pub enum TransactionAction {
    /// A poll was created; reverting trashes it.
    Create { id: PollId },
    /// A poll was trashed; reverting restores it, confirming erases it.
    Delete { id: PollId },
    /// A vote was appended; reverting pops the actor's latest record.
    CastVote { id: PollId },
    /// A URL was attached; reverting removes it, tolerating prior absence.
    AttachUrl { id: PollId, url: String },
}

impl TransactionAction {
    /// The poll this transaction touched.
    #[must_use]
    pub fn poll_id(&self) -> &PollId {
        match self {
            TransactionAction::Create { id }
            | TransactionAction::Delete { id }
            | TransactionAction::CastVote { id }
            | TransactionAction::AttachUrl { id, .. } => id,
        }
    }
}

/// A durable record of one store mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Who performed the action.
    pub actor: MemberAddress,
    /// Opaque token identifying the mutation, used for reply threading.
    #[serde(rename = "tid")]
    pub transaction_id: TransactionId,
    /// The action and its revert data.
    #[serde(flatten)]
    pub action: TransactionAction,
}

/// Per-actor control state: the last message seen from the actor and the
/// transaction still pending against it, if any.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberControl {
    pub last_message: LastMessage,
}

/// The one-message correction window.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastMessage {
    /// Id of the actor's most recent message, once one was seen.
    pub message_id: Option<MessageId>,
    /// The still-revertible transaction tied to that message.
    pub transaction: Option<Transaction>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transaction_wire_format() {
        let txn = Transaction {
            actor: MemberAddress::from("alice@example.test"),
            transaction_id: TransactionId::from("tdeadbeef"),
            action: TransactionAction::AttachUrl {
                id: PollId::from("2024-03-01-tdeadbeef-topic"),
                url: "https://example.test/doc".to_owned(),
            },
        };

        let value = serde_json::to_value(&txn).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "actor": "alice@example.test",
                "tid": "tdeadbeef",
                "action": "attach_url",
                "revert_data": {
                    "id": "2024-03-01-tdeadbeef-topic",
                    "url": "https://example.test/doc",
                },
            })
        );

        let back: Transaction = serde_json::from_value(value).unwrap();
        assert_eq!(back, txn);
    }

    #[test]
    fn control_record_serializes_nulls_when_empty() {
        let control = MemberControl::default();
        let value = serde_json::to_value(&control).unwrap();
        assert_eq!(
            value,
            serde_json::json!({
                "last_message": { "message_id": null, "transaction": null }
            })
        );
    }
}
