//! The poll store
//!
//! Owns the poll collection, its directory-based lifecycle, and the
//! per-actor transaction state. Polls live in one of three on-disk areas —
//! active, archive, trash — and moving between them is always a single
//! atomic rename. Only active polls are resident in the in-memory index.
//!
//! All mutations follow the same pattern: stage a structural copy of the
//! poll, mutate the copy, commit it to disk through the atomic writer, and
//! only then swap it into the index. A concurrent reader therefore never
//! observes a half-written record, and a failed operation leaves no
//! partial state.
//!
//! The store expects a single logical mutator; interleaved writers would
//! silently lose updates between snapshot and commit.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{Duration, Utc};
use fuzzy_matcher::skim::SkimMatcherV2;
use fuzzy_matcher::FuzzyMatcher;
use rand::Rng;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::atomic::{self, Durability};
use crate::config::MemberInfo;
use crate::error::StoreError;
use crate::events::{EventBus, StoreEvent};
use crate::poll::{Poll, VoteRecord};
use crate::transaction::{MemberControl, Transaction, TransactionAction};
use crate::types::{
    round_to_hour, slugify, truncate_slug, ConclusionReason, MemberAddress, MessageId, PollFlag,
    PollId, PollResult, PollState, TransactionId, VoteValue,
};

/// Similarity floor for tag lookups.
const TAG_CONFIDENCE: f64 = 0.8;
/// Similarity floor for the subject fallback.
const SUBJECT_CONFIDENCE: f64 = 0.4;
/// Length of the slug prefix embedded in poll ids.
const SLUG_PREFIX_LEN: usize = 50;

/// Read-model of one poll's standing, for announcements and listings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VoteSummary {
    pub poll_id: PollId,
    pub subject: String,
    pub state: PollState,
    pub result: PollResult,
    /// Most recent vote record per roster member, or `None`.
    pub votes: BTreeMap<MemberAddress, Option<VoteRecord>>,
}

/// Persistent, crash-safe store of polls and per-actor transaction state.
pub struct PollStore {
    members: BTreeMap<MemberAddress, MemberInfo>,
    activedir: PathBuf,
    archivedir: PathBuf,
    trashdir: PathBuf,
    membersdir: PathBuf,
    /// Active polls only; archived and trashed polls live on disk.
    polls: BTreeMap<PollId, Poll>,
    control_cache: HashMap<MemberAddress, MemberControl>,
    events: EventBus,
}

impl PollStore {
    /// Open (or initialize) a store rooted at `state_dir`.
    ///
    /// Creates the area directories as needed and loads every active poll.
    /// Unreadable records are logged and skipped rather than aborting the
    /// whole store; concluded leftovers are archived in a second pass.
    pub fn open(
        state_dir: impl AsRef<Path>,
        roster: impl IntoIterator<Item = MemberInfo>,
    ) -> Result<Self, StoreError> {
        let state_dir = state_dir.as_ref();
        let activedir = state_dir.join("polls").join("active");
        let archivedir = state_dir.join("polls").join("archive");
        let trashdir = state_dir.join("polls").join("trash");
        let membersdir = state_dir.join("members");
        for dir in [&activedir, &archivedir, &trashdir, &membersdir] {
            fs::create_dir_all(dir)?;
        }

        let mut store = Self {
            members: roster
                .into_iter()
                .map(|info| (info.address.clone(), info))
                .collect(),
            activedir,
            archivedir,
            trashdir,
            membersdir,
            polls: BTreeMap::new(),
            control_cache: HashMap::new(),
            events: EventBus::default(),
        };
        store.reload_polls()?;
        Ok(store)
    }

    /// Subscribe to store notifications. Intended to be called once by the
    /// chat layer at startup.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }

    // ---- roster ----

    #[must_use]
    pub fn is_council_member(&self, actor: &MemberAddress) -> bool {
        self.members.contains_key(actor)
    }

    #[must_use]
    pub fn get_member_info(&self, actor: &MemberAddress) -> Option<&MemberInfo> {
        self.members.get(actor)
    }

    pub fn members(&self) -> impl Iterator<Item = &MemberAddress> {
        self.members.keys()
    }

    // ---- poll lifecycle ----

    /// Create a new poll and record a revertible `create` transaction.
    ///
    /// The id is derived from the hour-rounded start time, the transaction
    /// token, and a slug of the topic. Creation is an exclusive file
    /// operation: a colliding id fails with [`StoreError::AlreadyExists`]
    /// and the caller should vary the topic. Any failure after the file
    /// exists removes it again, so no partial state survives.
    #[allow(clippy::too_many_arguments)]
    pub fn create_poll(
        &mut self,
        actor: &MemberAddress,
        message_id: &MessageId,
        topic: &str,
        lifetime: Duration,
        tag: Option<String>,
        urls: Vec<String>,
        description: Option<String>,
    ) -> Result<(TransactionId, PollId), StoreError> {
        self.create_poll_with_tid(
            make_transaction_id(),
            actor,
            message_id,
            topic,
            lifetime,
            tag,
            urls,
            description,
        )
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn create_poll_with_tid(
        &mut self,
        tid: TransactionId,
        actor: &MemberAddress,
        message_id: &MessageId,
        topic: &str,
        lifetime: Duration,
        tag: Option<String>,
        urls: Vec<String>,
        description: Option<String>,
    ) -> Result<(TransactionId, PollId), StoreError> {
        let start_time = round_to_hour(Utc::now()) + Duration::hours(1);
        let slug = slugify(topic);
        let id = PollId(format!(
            "{}-{}-{}",
            start_time.format("%Y-%m-%d"),
            tid,
            truncate_slug(&slug, SLUG_PREFIX_LEN),
        ));

        let mut poll = Poll::new(
            id.clone(),
            start_time,
            lifetime,
            topic,
            self.members.keys().cloned(),
        );
        poll.set_tag(tag);
        poll.set_description(description);
        for url in urls {
            poll.attach_url(url);
        }

        let path = self.active_path(&id);
        let mut file = match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::AlreadyExists => {
                return Err(StoreError::AlreadyExists(id));
            }
            Err(err) => return Err(err.into()),
        };

        let written = (|| -> Result<(), StoreError> {
            poll.dump(&mut file)?;
            file.sync_all()?;
            self.write_last_transaction(
                actor,
                message_id,
                tid.clone(),
                TransactionAction::Create { id: id.clone() },
            )
        })();
        if let Err(err) = written {
            // Roll the exclusive creation back; the id must stay free.
            if let Err(unlink_err) = fs::remove_file(&path) {
                if unlink_err.kind() != io::ErrorKind::NotFound {
                    warn!(poll_id = %id, error = %unlink_err, "failed to remove partial poll file");
                }
            }
            return Err(err);
        }

        debug!(poll_id = %id, actor = %actor, "created poll");
        self.polls.insert(id.clone(), poll);
        Ok((tid, id))
    }

    /// Append a vote and record a revertible `cast_vote` transaction.
    pub fn cast_vote(
        &mut self,
        actor: &MemberAddress,
        message_id: &MessageId,
        poll_id: &PollId,
        value: VoteValue,
        remark: Option<String>,
    ) -> Result<TransactionId, StoreError> {
        self.expire_polls()?;

        let tid = make_transaction_id();
        let mut staged = self.staged_copy(poll_id)?;
        staged.push_vote(actor, value, remark)?;
        self.commit_poll(staged)?;

        self.write_last_transaction(
            actor,
            message_id,
            tid.clone(),
            TransactionAction::CastVote { id: poll_id.clone() },
        )?;
        debug!(poll_id = %poll_id, actor = %actor, value = %value, "vote cast");
        Ok(tid)
    }

    /// Attach a reference URL and record a revertible `attach_url`
    /// transaction.
    pub fn attach_url(
        &mut self,
        actor: &MemberAddress,
        message_id: &MessageId,
        poll_id: &PollId,
        url: &str,
    ) -> Result<TransactionId, StoreError> {
        let tid = make_transaction_id();
        let mut staged = self.staged_copy(poll_id)?;
        staged.attach_url(url);
        self.commit_poll(staged)?;

        self.write_last_transaction(
            actor,
            message_id,
            tid.clone(),
            TransactionAction::AttachUrl {
                id: poll_id.clone(),
                url: url.to_owned(),
            },
        )?;
        debug!(poll_id = %poll_id, url, "url attached");
        Ok(tid)
    }

    /// Move a poll to the trash and record a revertible `delete`
    /// transaction. The file is only erased for good once the transaction
    /// is confirmed.
    pub fn delete_poll(
        &mut self,
        actor: &MemberAddress,
        message_id: &MessageId,
        poll_id: &PollId,
    ) -> Result<TransactionId, StoreError> {
        let tid = make_transaction_id();
        self.trash_poll(poll_id)?;
        self.write_last_transaction(
            actor,
            message_id,
            tid.clone(),
            TransactionAction::Delete { id: poll_id.clone() },
        )?;
        Ok(tid)
    }

    /// Renaming is declared in the command surface but has no safe undo
    /// shape; it is intentionally unsupported.
    pub fn rename_poll(
        &mut self,
        _actor: &MemberAddress,
        _message_id: &MessageId,
        _poll_id: &PollId,
        _new_topic: &str,
    ) -> Result<TransactionId, StoreError> {
        Err(StoreError::Unsupported("rename_poll"))
    }

    /// Conclude every active poll that is past its end time.
    ///
    /// Runs against the hour-rounded current time. For each poll whose
    /// state is concluded or expired: the concluded flag is set durably,
    /// the record moves active → archive, and a [`StoreEvent::PollConcluded`]
    /// is emitted with the reason.
    pub fn expire_polls(&mut self) -> Result<(), StoreError> {
        let cutoff = round_to_hour(Utc::now());
        let due: Vec<PollId> = self
            .polls
            .iter()
            .filter(|(_, poll)| poll.get_state(cutoff).is_concluded())
            .map(|(id, _)| id.clone())
            .collect();
        for id in due {
            self.conclude_poll(&id)?;
        }
        Ok(())
    }

    /// Conclude vote-complete polls whose most recent vote is older than
    /// the quiet-time `cutoff`, leaving voters a correction window.
    ///
    /// Returns whether any poll was concluded.
    pub fn autoconclude_polls(&mut self, cutoff: Duration) -> Result<bool, StoreError> {
        let quiet_before = Utc::now() - cutoff;
        debug!(%quiet_before, "autoconclude requested");

        let due: Vec<PollId> = self
            .polls
            .iter()
            .filter(|(id, poll)| {
                if !poll.is_complete() {
                    debug!(poll_id = %id, "does not qualify: not all members voted yet");
                    return false;
                }
                match poll.latest_vote_at() {
                    Some(at) if at < quiet_before => true,
                    _ => {
                        debug!(poll_id = %id, "does not qualify: newest vote is not old enough");
                        false
                    }
                }
            })
            .map(|(id, _)| id.clone())
            .collect();

        let any = !due.is_empty();
        for id in due {
            debug!(poll_id = %id, "auto-concluding");
            self.conclude_poll(&id)?;
        }
        Ok(any)
    }

    /// Default quiet period for [`Self::autoconclude_polls`].
    #[must_use]
    pub fn default_autoconclude_cutoff() -> Duration {
        Duration::hours(1)
    }

    /// Fuzzy-match a free-text poll reference against active polls.
    ///
    /// Tags are tried first at high confidence, then subjects at a lower
    /// one. The best candidate clearing the active threshold wins.
    pub fn find_poll(&self, text: &str) -> Result<PollId, StoreError> {
        let needle = text.to_lowercase();

        let tagged: Vec<(String, PollId)> = self
            .polls
            .values()
            .filter_map(|poll| {
                poll.tag()
                    .map(|tag| (tag.to_lowercase(), poll.id().clone()))
            })
            .collect();
        if let Some(id) = best_match(&needle, &tagged, TAG_CONFIDENCE) {
            return Ok(id);
        }

        let subjects: Vec<(String, PollId)> = self
            .polls
            .values()
            .map(|poll| (poll.subject().to_lowercase(), poll.id().clone()))
            .collect();
        best_match(&needle, &subjects, SUBJECT_CONFIDENCE)
            .ok_or_else(|| StoreError::NotFound(text.to_owned()))
    }

    /// Look up an active poll by id, sweeping expirations first.
    pub fn get_poll(&mut self, poll_id: &PollId) -> Result<&Poll, StoreError> {
        self.expire_polls()?;
        self.polls
            .get(poll_id)
            .ok_or_else(|| StoreError::NotFound(poll_id.to_string()))
    }

    /// Current standing of a poll, active or archived.
    pub fn get_vote_summary(&mut self, poll_id: &PollId) -> Result<VoteSummary, StoreError> {
        self.expire_polls()?;
        let poll = match self.polls.get(poll_id) {
            Some(poll) => poll.clone(),
            // Concluded polls have just moved to the archive but still get
            // announced; read them from there.
            None => match load_poll_file(&self.archivedir.join(poll_filename(poll_id))) {
                Ok(poll) => poll,
                Err(StoreError::Io(err)) if err.kind() == io::ErrorKind::NotFound => {
                    return Err(StoreError::NotFound(poll_id.to_string()));
                }
                Err(err) => return Err(err),
            },
        };
        Ok(VoteSummary {
            poll_id: poll.id().clone(),
            subject: poll.subject().to_owned(),
            state: poll.get_state(round_to_hour(Utc::now())),
            result: poll.result(),
            votes: poll
                .current_votes()
                .into_iter()
                .map(|(member, record)| (member.clone(), record.cloned()))
                .collect(),
        })
    }

    /// Ids of all active polls, sweeping expirations first.
    pub fn active_polls(&mut self) -> Result<Vec<PollId>, StoreError> {
        self.expire_polls()?;
        Ok(self.polls.keys().cloned().collect())
    }

    // ---- transaction / undo subsystem ----

    /// Record the actor's newest message id with no pending transaction.
    ///
    /// A transaction still pending from the previous message is confirmed
    /// first: the correction window has moved past it.
    pub fn write_last_message_id(
        &mut self,
        actor: &MemberAddress,
        message_id: &MessageId,
    ) -> Result<(), StoreError> {
        self.rewrite_last_message(actor, message_id, None)
    }

    /// Record a new pending transaction against the actor's newest message,
    /// confirming whatever was pending before.
    pub fn write_last_transaction(
        &mut self,
        actor: &MemberAddress,
        message_id: &MessageId,
        transaction_id: TransactionId,
        action: TransactionAction,
    ) -> Result<(), StoreError> {
        let transaction = Transaction {
            actor: actor.clone(),
            transaction_id,
            action,
        };
        self.rewrite_last_message(actor, message_id, Some(transaction))
    }

    /// Revert the actor's pending transaction, triggered by a correction of
    /// `message_id`.
    ///
    /// Succeeds only when `message_id` is exactly the actor's stored last
    /// message id and a transaction is pending; everything else is a silent
    /// no-op returning `None`, which bounds the undo depth to one step.
    /// Returns the reverted transaction id for reply threading.
    pub fn revert_last_transaction(
        &mut self,
        actor: &MemberAddress,
        message_id: &MessageId,
    ) -> Result<Option<TransactionId>, StoreError> {
        debug!(actor = %actor, message_id = %message_id, "revert requested");
        let mut control = self.read_member_control(actor)?;

        if control.last_message.message_id.as_ref() != Some(message_id) {
            debug!(
                actor = %actor,
                message_id = %message_id,
                "not the last message id seen from actor, ignoring"
            );
            return Ok(None);
        }
        let Some(transaction) = control.last_message.transaction.take() else {
            debug!(message_id = %message_id, "no transaction associated, ignoring");
            return Ok(None);
        };

        // Clear the pending slot durably before touching poll state.
        self.write_member_control(actor, control)?;
        self.revert_transaction(&transaction)?;
        Ok(Some(transaction.transaction_id))
    }

    // ---- internals ----

    fn rewrite_last_message(
        &mut self,
        actor: &MemberAddress,
        message_id: &MessageId,
        transaction: Option<Transaction>,
    ) -> Result<(), StoreError> {
        let mut control = self.read_member_control(actor)?;
        if let Some(previous) = control.last_message.transaction.take() {
            self.confirm_transaction(&previous)?;
        }
        control.last_message.message_id = Some(message_id.clone());
        control.last_message.transaction = transaction;
        self.write_member_control(actor, control)
    }

    /// Make a pending transaction permanent. For a delete this is the
    /// point of no return: the trashed file is erased.
    fn confirm_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        debug!(tid = %transaction.transaction_id, "confirming transaction");
        match &transaction.action {
            TransactionAction::Delete { id } => {
                match fs::remove_file(self.trash_path(id)) {
                    Ok(()) => {}
                    // Already erased; the confirmation is idempotent.
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                    Err(err) => return Err(err.into()),
                }
                debug!(poll_id = %id, "trashed poll erased permanently");
                Ok(())
            }
            TransactionAction::Create { .. }
            | TransactionAction::CastVote { .. }
            | TransactionAction::AttachUrl { .. } => Ok(()),
        }
    }

    /// Invert one transaction. One arm per action kind.
    fn revert_transaction(&mut self, transaction: &Transaction) -> Result<(), StoreError> {
        debug!(tid = %transaction.transaction_id, "reverting transaction");
        match &transaction.action {
            TransactionAction::Create { id } => {
                debug!(poll_id = %id, "trashing created poll");
                self.trash_poll(id)
            }
            TransactionAction::Delete { id } => {
                debug!(poll_id = %id, "restoring poll from trash");
                self.untrash_poll(id)
            }
            TransactionAction::CastVote { id } => {
                let mut staged = self.staged_copy(id)?;
                staged.pop_vote(&transaction.actor);
                self.commit_poll(staged)
            }
            TransactionAction::AttachUrl { id, url } => {
                let mut staged = self.staged_copy(id)?;
                if !staged.remove_url(url) {
                    // Maybe edited away already; nothing to undo.
                    debug!(poll_id = %id, url, "url absent on revert, ignoring");
                }
                self.commit_poll(staged)
            }
        }
    }

    /// Set the concluded flag, archive the record, and announce.
    ///
    /// Concluding a poll that is merely open and not yet past its end time
    /// is a programming error, surfaced as
    /// [`StoreError::InvalidTransition`].
    fn conclude_poll(&mut self, poll_id: &PollId) -> Result<(), StoreError> {
        let now = round_to_hour(Utc::now());
        let poll = self
            .polls
            .get(poll_id)
            .ok_or_else(|| StoreError::NotFound(poll_id.to_string()))?;

        let reason = if poll.is_complete() {
            ConclusionReason::VotesCast
        } else if now >= poll.end_time() {
            ConclusionReason::Expiration
        } else {
            return Err(StoreError::InvalidTransition(poll_id.clone()));
        };

        let mut staged = poll.clone();
        staged.add_flag(PollFlag::Concluded);
        self.commit_poll(staged)?;
        self.archive_poll(poll_id)?;

        debug!(poll_id = %poll_id, %reason, "poll concluded");
        self.events.emit(StoreEvent::PollConcluded {
            poll_id: poll_id.clone(),
            reason,
        });
        Ok(())
    }

    /// Reload the active index from disk.
    ///
    /// Unreadable records are logged and skipped so one corrupt file does
    /// not take the store down. Polls already flagged concluded are moved
    /// to the archive in a second pass.
    fn reload_polls(&mut self) -> Result<(), StoreError> {
        debug!("reloading all polls");
        self.polls.clear();

        let mut to_archive = Vec::new();
        for entry in fs::read_dir(&self.activedir)? {
            let path = entry?.path();
            if !path.is_file() {
                continue;
            }
            let poll = match load_poll_file(&path) {
                Ok(poll) => poll,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "skipping unreadable poll record");
                    continue;
                }
            };
            if poll.has_flag(PollFlag::Concluded) {
                debug!(poll_id = %poll.id(), "poll is concluded, archiving");
                to_archive.push(poll.id().clone());
                continue;
            }
            debug!(poll_id = %poll.id(), "loaded poll");
            self.polls.insert(poll.id().clone(), poll);
        }

        for id in to_archive {
            self.archive_poll(&id)?;
        }
        Ok(())
    }

    /// Snapshot an active poll for staging edits.
    fn staged_copy(&self, poll_id: &PollId) -> Result<Poll, StoreError> {
        self.polls
            .get(poll_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(poll_id.to_string()))
    }

    /// Durably write a staged poll, then swap it into the index.
    ///
    /// The index is only updated after the file replace succeeded, so the
    /// live object never reflects an uncommitted edit.
    fn commit_poll(&mut self, poll: Poll) -> Result<(), StoreError> {
        let path = self.active_path(poll.id());
        atomic::replace_file(&path, Durability::File, |file| {
            serde_json::to_writer_pretty(file, &poll).map_err(io::Error::from)
        })?;
        self.polls.insert(poll.id().clone(), poll);
        Ok(())
    }

    fn archive_poll(&mut self, poll_id: &PollId) -> Result<(), StoreError> {
        debug!(poll_id = %poll_id, "archiving poll");
        let filename = poll_filename(poll_id);
        fs::rename(self.activedir.join(&filename), self.archivedir.join(&filename))?;
        self.polls.remove(poll_id);
        Ok(())
    }

    fn trash_poll(&mut self, poll_id: &PollId) -> Result<(), StoreError> {
        if !self.polls.contains_key(poll_id) {
            return Err(StoreError::NotFound(poll_id.to_string()));
        }
        debug!(poll_id = %poll_id, "trashing poll");
        let filename = poll_filename(poll_id);
        fs::rename(self.activedir.join(&filename), self.trashdir.join(&filename))?;
        self.polls.remove(poll_id);
        Ok(())
    }

    fn untrash_poll(&mut self, poll_id: &PollId) -> Result<(), StoreError> {
        debug!(poll_id = %poll_id, "restoring poll from trash");
        let filename = poll_filename(poll_id);
        let active_path = self.activedir.join(&filename);
        fs::rename(self.trashdir.join(&filename), &active_path)?;
        let poll = load_poll_file(&active_path)?;
        self.polls.insert(poll.id().clone(), poll);
        Ok(())
    }

    fn active_path(&self, poll_id: &PollId) -> PathBuf {
        self.activedir.join(poll_filename(poll_id))
    }

    fn trash_path(&self, poll_id: &PollId) -> PathBuf {
        self.trashdir.join(poll_filename(poll_id))
    }

    fn member_file(&self, actor: &MemberAddress) -> Result<PathBuf, StoreError> {
        let info = self
            .members
            .get(actor)
            .ok_or_else(|| StoreError::NotAMember(actor.clone()))?;
        Ok(self.membersdir.join(format!("{}.json", info.nick)))
    }

    fn read_member_control(&self, actor: &MemberAddress) -> Result<MemberControl, StoreError> {
        if let Some(control) = self.control_cache.get(actor) {
            return Ok(control.clone());
        }
        let path = self.member_file(actor)?;
        match fs::File::open(&path) {
            Ok(file) => Ok(serde_json::from_reader(io::BufReader::new(file))?),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(MemberControl::default()),
            Err(err) => Err(err.into()),
        }
    }

    fn write_member_control(
        &mut self,
        actor: &MemberAddress,
        control: MemberControl,
    ) -> Result<(), StoreError> {
        let path = self.member_file(actor)?;
        atomic::replace_file(&path, Durability::File, |file| {
            serde_json::to_writer_pretty(file, &control).map_err(io::Error::from)
        })?;
        self.control_cache.insert(actor.clone(), control);
        Ok(())
    }
}

fn poll_filename(poll_id: &PollId) -> String {
    format!("{poll_id}.json")
}

fn load_poll_file(path: &Path) -> Result<Poll, StoreError> {
    let file = fs::File::open(path)?;
    Poll::load(io::BufReader::new(file))
}

/// Fresh opaque transaction token.
fn make_transaction_id() -> TransactionId {
    let mut bytes = [0u8; 15];
    rand::thread_rng().fill(&mut bytes[..]);
    TransactionId(format!("t{}", hex::encode(bytes)))
}

/// Nearest-neighbor similarity search over `(label, id)` candidates.
///
/// Scores are normalized against each label's self-match so the confidence
/// floors behave like string-closeness ratios in `0..=1`.
fn best_match(needle: &str, candidates: &[(String, PollId)], confidence: f64) -> Option<PollId> {
    let matcher = SkimMatcherV2::default();
    let mut best: Option<(f64, &PollId)> = None;

    for (label, id) in candidates {
        let Some(ceiling) = matcher.fuzzy_match(label, label) else {
            continue;
        };
        if ceiling == 0 {
            continue;
        }
        let Some(score) = matcher.fuzzy_match(label, needle) else {
            continue;
        };
        let ratio = score as f64 / ceiling as f64;
        if ratio < confidence {
            continue;
        }
        if best.map_or(true, |(best_ratio, _)| ratio > best_ratio) {
            best = Some((ratio, id));
        }
    }

    best.map(|(_, id)| id.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roster() -> Vec<MemberInfo> {
        ["alice", "bob"]
            .into_iter()
            .map(|nick| MemberInfo {
                address: MemberAddress(format!("{nick}@example.test")),
                nick: nick.to_owned(),
                display_name: None,
            })
            .collect()
    }

    #[test]
    fn colliding_poll_id_fails_and_leaves_original_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = PollStore::open(dir.path(), roster()).unwrap();
        let alice = MemberAddress::from("alice@example.test");

        let (_, id) = store
            .create_poll_with_tid(
                TransactionId::from("tfixed"),
                &alice,
                &MessageId::from("m1"),
                "Same topic",
                Duration::days(14),
                None,
                Vec::new(),
                None,
            )
            .unwrap();

        // Same token and topic within the same rounded hour derives the
        // same id.
        let err = store
            .create_poll_with_tid(
                TransactionId::from("tfixed"),
                &alice,
                &MessageId::from("m2"),
                "Same topic",
                Duration::days(14),
                None,
                Vec::new(),
                None,
            )
            .unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(ref dup) if *dup == id));

        // The original record survives and nothing extra appeared.
        let active: Vec<_> = fs::read_dir(dir.path().join("polls").join("active"))
            .unwrap()
            .collect();
        assert_eq!(active.len(), 1);
        assert!(store.get_poll(&id).is_ok());
    }

    #[test]
    fn transaction_ids_are_prefixed_and_unique() {
        let a = make_transaction_id();
        let b = make_transaction_id();
        assert!(a.0.starts_with('t'));
        assert_eq!(a.0.len(), 31);
        assert_ne!(a, b);
    }

    #[test]
    fn best_match_picks_nearest_candidate() {
        let candidates = vec![
            ("activitypub".to_owned(), PollId::from("p1")),
            ("message styling".to_owned(), PollId::from("p2")),
        ];
        assert_eq!(
            best_match("activitypub", &candidates, 0.8),
            Some(PollId::from("p1"))
        );
        assert_eq!(best_match("zzzz", &candidates, 0.4), None);
    }
}
