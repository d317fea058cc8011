//! The poll entity
//!
//! One agenda item under vote: a fixed roster captured at creation, an
//! append-only vote history per member, and the derived state and result.
//!
//! A poll serializes losslessly: absent optionals are written as explicit
//! nulls and empty vote lists are kept, so `dump` followed by `load`
//! reproduces an equal poll. `Clone` produces a structurally independent
//! copy (deep-copied vote lists, flags and URLs), which the store uses to
//! stage speculative edits before committing them.

use std::collections::{BTreeMap, BTreeSet};
use std::io::{Read, Write};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::StoreError;
use crate::result;
use crate::types::{MemberAddress, PollFlag, PollId, PollResult, PollState, VoteValue};

/// One entry in a member's vote history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoteRecord {
    /// When the vote was cast.
    pub timestamp: DateTime<Utc>,
    /// The vote itself.
    pub value: VoteValue,
    /// Free-text remark, mandatory by convention for vetoes.
    pub remark: Option<String>,
}

/// A poll over a fixed council roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    id: PollId,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    subject: String,
    flags: BTreeSet<PollFlag>,
    tag: Option<String>,
    urls: Vec<String>,
    description: Option<String>,
    votes: BTreeMap<MemberAddress, Vec<VoteRecord>>,
}

impl Poll {
    /// Create a fresh poll.
    ///
    /// The member set passed here is the full roster at this instant; it
    /// never grows or shrinks for this poll afterwards.
    pub fn new(
        id: PollId,
        start_time: DateTime<Utc>,
        lifetime: Duration,
        subject: impl Into<String>,
        members: impl IntoIterator<Item = MemberAddress>,
    ) -> Self {
        Self {
            id,
            start_time,
            end_time: start_time + lifetime,
            subject: subject.into(),
            flags: BTreeSet::new(),
            tag: None,
            urls: Vec::new(),
            description: None,
            votes: members.into_iter().map(|m| (m, Vec::new())).collect(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &PollId {
        &self.id
    }

    #[must_use]
    pub fn start_time(&self) -> DateTime<Utc> {
        self.start_time
    }

    #[must_use]
    pub fn end_time(&self) -> DateTime<Utc> {
        self.end_time
    }

    #[must_use]
    pub fn subject(&self) -> &str {
        &self.subject
    }

    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    pub fn set_tag(&mut self, tag: Option<String>) {
        self.tag = tag;
    }

    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn set_description(&mut self, description: Option<String>) {
        self.description = description;
    }

    #[must_use]
    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn attach_url(&mut self, url: impl Into<String>) {
        self.urls.push(url.into());
    }

    /// Remove one occurrence of `url`, tolerating its prior absence.
    ///
    /// Returns whether anything was removed. Used by the undo path, where
    /// the URL may legitimately have been edited away already.
    pub fn remove_url(&mut self, url: &str) -> bool {
        match self.urls.iter().position(|u| u == url) {
            Some(idx) => {
                self.urls.remove(idx);
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn flags(&self) -> &BTreeSet<PollFlag> {
        &self.flags
    }

    #[must_use]
    pub fn has_flag(&self, flag: PollFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn add_flag(&mut self, flag: PollFlag) {
        self.flags.insert(flag);
    }

    /// The roster fixed at creation.
    pub fn members(&self) -> impl Iterator<Item = &MemberAddress> {
        self.votes.keys()
    }

    #[must_use]
    pub fn roster_size(&self) -> usize {
        self.votes.len()
    }

    /// Append a vote record to `member`'s history, timestamped now.
    pub fn push_vote(
        &mut self,
        member: &MemberAddress,
        value: VoteValue,
        remark: Option<String>,
    ) -> Result<(), StoreError> {
        self.push_vote_at(member, value, remark, Utc::now())
    }

    /// Append a vote record with an explicit timestamp.
    pub fn push_vote_at(
        &mut self,
        member: &MemberAddress,
        value: VoteValue,
        remark: Option<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let records = self
            .votes
            .get_mut(member)
            .ok_or_else(|| StoreError::NotAMember(member.clone()))?;
        records.push(VoteRecord {
            timestamp,
            value,
            remark,
        });
        Ok(())
    }

    /// Remove `member`'s most recent vote record; no-op without one.
    ///
    /// Only the transaction subsystem calls this, to process message
    /// corrections.
    pub fn pop_vote(&mut self, member: &MemberAddress) {
        if let Some(records) = self.votes.get_mut(member) {
            records.pop();
        }
    }

    /// Full vote history by member, including empty histories.
    #[must_use]
    pub fn vote_history(&self) -> &BTreeMap<MemberAddress, Vec<VoteRecord>> {
        &self.votes
    }

    /// Vote history of one member.
    pub fn votes_of(&self, member: &MemberAddress) -> Result<&[VoteRecord], StoreError> {
        self.votes
            .get(member)
            .map(Vec::as_slice)
            .ok_or_else(|| StoreError::NotAMember(member.clone()))
    }

    /// The most recent vote record of every roster member, or `None`.
    #[must_use]
    pub fn current_votes(&self) -> BTreeMap<&MemberAddress, Option<&VoteRecord>> {
        self.votes
            .iter()
            .map(|(member, records)| (member, records.last()))
            .collect()
    }

    /// Timestamp of the newest current vote, if anyone voted.
    #[must_use]
    pub fn latest_vote_at(&self) -> Option<DateTime<Utc>> {
        self.votes
            .values()
            .filter_map(|records| records.last())
            .map(|record| record.timestamp)
            .max()
    }

    /// True when every roster member has at least one vote.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.votes.values().all(|records| !records.is_empty())
    }

    /// Lifecycle state as of `at_time`.
    #[must_use]
    pub fn get_state(&self, at_time: DateTime<Utc>) -> PollState {
        let complete = self.is_complete();
        if at_time >= self.end_time {
            if complete {
                PollState::Concluded
            } else {
                PollState::Expired
            }
        } else if complete {
            PollState::Complete
        } else {
            PollState::Open
        }
    }

    /// Outcome derived from the current votes only.
    #[must_use]
    pub fn result(&self) -> PollResult {
        result::evaluate(
            self.votes
                .values()
                .filter_map(|records| records.last())
                .map(|record| record.value),
            self.roster_size(),
        )
    }

    /// Serialize the poll record to a writer.
    pub fn dump(&self, out: impl Write) -> Result<(), StoreError> {
        serde_json::to_writer_pretty(out, self)?;
        Ok(())
    }

    /// Deserialize a poll record from a reader.
    pub fn load(input: impl Read) -> Result<Self, StoreError> {
        Ok(serde_json::from_reader(input)?)
    }
}
