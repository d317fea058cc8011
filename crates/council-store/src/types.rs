//! Core vocabulary of the poll store
//!
//! Vote values, poll results and states, lifecycle flags, and the newtype
//! identifiers shared across the store and its collaborators.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// A single vote as cast by a council member.
///
/// The wire strings (`-1`, `-0`, `+0`, `+1`) are the canonical spelling in
/// poll records and in chat commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VoteValue {
    /// Strongest dissent; a single veto dominates the poll result.
    #[serde(rename = "-1")]
    Veto,
    /// Dissent without blocking.
    #[serde(rename = "-0")]
    MinusZero,
    /// Abstention leaning in favor.
    #[serde(rename = "+0")]
    PlusZero,
    /// Affirmative vote; counts towards the majority.
    #[serde(rename = "+1")]
    Ack,
}

impl VoteValue {
    /// Canonical wire spelling of this vote value.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            VoteValue::Veto => "-1",
            VoteValue::MinusZero => "-0",
            VoteValue::PlusZero => "+0",
            VoteValue::Ack => "+1",
        }
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a string is not a recognized vote value.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("not a vote value: {0:?}")]
pub struct InvalidVoteValue(pub String);

impl FromStr for VoteValue {
    type Err = InvalidVoteValue;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "-1" => Ok(VoteValue::Veto),
            "-0" => Ok(VoteValue::MinusZero),
            "+0" => Ok(VoteValue::PlusZero),
            "+1" => Ok(VoteValue::Ack),
            other => Err(InvalidVoteValue(other.to_owned())),
        }
    }
}

/// Outcome of a poll, derived from the current votes only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollResult {
    /// No quorum, or no majority among those voting.
    Fail,
    /// At least one current veto vote.
    Veto,
    /// Quorum reached and a strict majority of votes cast are acks.
    Pass,
}

impl PollResult {
    #[must_use]
    pub fn has_passed(self) -> bool {
        self == PollResult::Pass
    }

    #[must_use]
    pub fn has_veto(self) -> bool {
        self == PollResult::Veto
    }
}

impl fmt::Display for PollResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PollResult::Fail => "fail",
            PollResult::Veto => "veto",
            PollResult::Pass => "pass",
        })
    }
}

/// Lifecycle state of a poll at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollState {
    /// Before the end time, not all members have voted.
    Open,
    /// Before the end time, every member has at least one vote.
    Complete,
    /// Past the end time with every member having voted.
    Concluded,
    /// Past the end time with votes missing.
    Expired,
}

impl PollState {
    /// True once the poll can no longer accept votes.
    #[must_use]
    pub fn is_concluded(self) -> bool {
        matches!(self, PollState::Concluded | PollState::Expired)
    }

    #[must_use]
    pub fn is_expired(self) -> bool {
        self == PollState::Expired
    }

    /// True when every roster member has voted.
    #[must_use]
    pub fn is_complete(self) -> bool {
        matches!(self, PollState::Concluded | PollState::Complete)
    }

    #[must_use]
    pub fn is_open(self) -> bool {
        matches!(self, PollState::Open | PollState::Complete)
    }

    /// Why a poll in this state concludes, if it does.
    #[must_use]
    pub fn conclusion_reason(self) -> Option<ConclusionReason> {
        match self {
            PollState::Concluded => Some(ConclusionReason::VotesCast),
            PollState::Expired => Some(ConclusionReason::Expiration),
            PollState::Open | PollState::Complete => None,
        }
    }
}

impl fmt::Display for PollState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PollState::Open => "open",
            PollState::Complete => "complete",
            PollState::Concluded => "concluded",
            PollState::Expired => "expired",
        })
    }
}

/// Durable lifecycle markers attached to a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollFlag {
    /// Set once the poll's conclusion has been recorded and announced.
    Concluded,
}

/// Why a poll was concluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConclusionReason {
    /// Every member voted.
    VotesCast,
    /// The end time passed.
    Expiration,
}

impl fmt::Display for ConclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ConclusionReason::VotesCast => "votes cast",
            ConclusionReason::Expiration => "expiration",
        })
    }
}

macro_rules! string_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }
    };
}

string_id! {
    /// Stable identifier of a poll, derived at creation and immutable.
    PollId
}

string_id! {
    /// Opaque token identifying one store mutation.
    TransactionId
}

string_id! {
    /// Idempotent identifier of the chat message that triggered an action.
    MessageId
}

string_id! {
    /// Roster-member identity (chat address).
    MemberAddress
}

/// Reduce free text to a hyphenated slug, collapsing runs of separators.
#[must_use]
pub fn slugify(text: &str) -> String {
    let mut slug = String::with_capacity(text.len());
    let mut last_was_dash = false;
    for ch in text.to_lowercase().chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch);
            last_was_dash = false;
        } else if !last_was_dash {
            slug.push('-');
            last_was_dash = true;
        }
    }
    slug
}

/// Truncate a slug to at most `max` characters.
#[must_use]
pub(crate) fn truncate_slug(slug: &str, max: usize) -> &str {
    match slug.char_indices().nth(max) {
        Some((idx, _)) => &slug[..idx],
        None => slug,
    }
}

/// Round an instant down to the full hour.
#[must_use]
pub(crate) fn round_to_hour(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vote_value_round_trips_through_str() {
        for value in [
            VoteValue::Veto,
            VoteValue::MinusZero,
            VoteValue::PlusZero,
            VoteValue::Ack,
        ] {
            assert_eq!(value.as_str().parse::<VoteValue>(), Ok(value));
        }
        assert!("++1".parse::<VoteValue>().is_err());
    }

    #[test]
    fn slugify_collapses_separator_runs() {
        assert_eq!(slugify("Adopt XEP-9999 (v2)!"), "adopt-xep-9999-v2-");
        assert_eq!(slugify("hello"), "hello");
    }

    #[test]
    fn conclusion_reason_only_for_terminal_states() {
        assert_eq!(
            PollState::Concluded.conclusion_reason(),
            Some(ConclusionReason::VotesCast)
        );
        assert_eq!(
            PollState::Expired.conclusion_reason(),
            Some(ConclusionReason::Expiration)
        );
        assert_eq!(PollState::Open.conclusion_reason(), None);
        assert_eq!(PollState::Complete.conclusion_reason(), None);
    }

    #[test]
    fn round_to_hour_truncates() {
        let t = DateTime::parse_from_rfc3339("2024-03-01T13:45:12Z")
            .unwrap()
            .with_timezone(&Utc);
        let rounded = round_to_hour(t);
        assert_eq!(rounded.to_rfc3339(), "2024-03-01T13:00:00+00:00");
    }
}
