//! Chat-command execution against the poll store.
//!
//! [`handle_message`] is the entry point a chat transport calls for every
//! message seen in the council room; [`handle_correction`] is its
//! counterpart for message corrections, which drive the one-step undo.
//! Replies come back as plain text ready to send to the room.

use chrono::{Duration, Utc};
use council_command::{parse_command, Action, Command};
use council_store::{
    MemberAddress, MessageId, PollStore, StoreError, TransactionId, VoteValue,
};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

/// Vetoes without a substantial reason are rejected.
const VETO_REMARK_MIN: usize = 10;
/// How long a freshly created poll stays open.
const POLL_LIFETIME_DAYS: i64 = 14;
/// Quiet period required before an on-demand conclusion sweep acts.
const ON_DEMAND_CUTOFF_MINUTES: i64 = 5;

/// `[tag]` marker embedded in a poll topic.
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]+)\]").unwrap());

/// What to send back to the room, and the transaction the reply confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Reply {
    /// Set when the command changed durable state; quoting the reply's
    /// message id later corrects exactly this transaction.
    pub(crate) transaction_id: Option<TransactionId>,
    pub(crate) text: Option<String>,
}

impl Reply {
    fn text_only(text: impl Into<String>) -> Self {
        Reply {
            transaction_id: None,
            text: Some(text.into()),
        }
    }

    fn silent() -> Self {
        Reply {
            transaction_id: None,
            text: None,
        }
    }
}

/// Handle one fresh message from the council room.
///
/// Messages from non-members and messages the grammar does not recognise
/// produce no reply. Either way the actor's correction window advances, so
/// the previously pending transaction (if any) is confirmed.
pub(crate) fn handle_message(
    store: &mut PollStore,
    actor: &MemberAddress,
    message_id: &MessageId,
    text: &str,
) -> Result<Option<Reply>, StoreError> {
    if !store.is_council_member(actor) {
        return Ok(None);
    }

    let Some(command) = parse_command(text) else {
        store.write_last_message_id(actor, message_id)?;
        return Ok(None);
    };

    let reply = execute(store, actor, message_id, &command)?;
    if reply.transaction_id.is_none() {
        // Non-transactional commands still move the window forward.
        store.write_last_message_id(actor, message_id)?;
    }
    Ok(Some(reply))
}

/// Handle a correction replacing `replaces` with `text`.
///
/// The pending transaction tied to the replaced message is reverted first
/// (a silent no-op unless `replaces` is exactly the actor's newest message),
/// then the corrected body runs as a fresh command.
pub(crate) fn handle_correction(
    store: &mut PollStore,
    actor: &MemberAddress,
    message_id: &MessageId,
    replaces: &MessageId,
    text: &str,
) -> Result<Option<Reply>, StoreError> {
    if !store.is_council_member(actor) {
        return Ok(None);
    }
    if let Some(tid) = store.revert_last_transaction(actor, replaces)? {
        warn!(actor = %actor, transaction_id = %tid, "transaction reverted by correction");
    }
    handle_message(store, actor, message_id, text)
}

fn execute(
    store: &mut PollStore,
    actor: &MemberAddress,
    message_id: &MessageId,
    command: &Command,
) -> Result<Reply, StoreError> {
    match command.action {
        Action::CreatePoll => create_poll(store, actor, message_id, command),
        Action::CastVote => cast_vote(store, actor, message_id, command),
        Action::DeletePoll => delete_poll(store, actor, message_id, command),
        Action::ConcludePoll => Ok(Reply::text_only(
            "I cannot conclude a single poll on demand; polls conclude on \
             their own once every member has voted or the deadline passes.",
        )),
        Action::AutoConcludeOpenPolls => autoconclude(store, command),
        Action::ListPolls | Action::ListGeneric => list_polls(store, command),
        Action::ListVotes => list_votes(store, command),
        Action::Help => Ok(Reply::text_only(
            "https://github.com/example/councilbot/blob/master/docs/manual.rst",
        )),
        Action::Thank => Ok(Reply::text_only("you\u{2019}re welcome!")),
        Action::Null => Ok(Reply::text_only("as if it never happened")),
    }
}

fn create_poll(
    store: &mut PollStore,
    actor: &MemberAddress,
    message_id: &MessageId,
    command: &Command,
) -> Result<Reply, StoreError> {
    let mut topic = command
        .reference()
        .trim_end_matches(['?', ' ', '\t', '\n'])
        .to_owned();

    // A bracketed `[tag]` anywhere in the topic names the poll's tag; the
    // brackets are stripped from the stored subject.
    let tag = TAG_RE.captures(&topic).map(|caps| caps[1].to_owned());
    if let Some(tag) = &tag {
        topic = TAG_RE.replace(&topic, tag.as_str()).into_owned();
    }

    let created = store.create_poll(
        actor,
        message_id,
        &topic,
        Duration::days(POLL_LIFETIME_DAYS),
        tag,
        Vec::new(),
        None,
    );
    let (tid, poll_id) = match created {
        Ok(created) => created,
        Err(StoreError::AlreadyExists(_)) => {
            return Ok(Reply::text_only(
                "sorry, this is too close to the topic of another open poll. \
                 Please choose a new topic description.",
            ));
        }
        Err(err) => return Err(err),
    };

    let poll = store.get_poll(&poll_id)?;
    let mut lines = vec![
        format!("created poll on {}", poll.subject()),
        format!("Expires: {}", poll.end_time().format("%Y-%m-%d")),
    ];
    if let Some(tag) = poll.tag() {
        lines.push(format!("Tag: {tag}"));
    }
    Ok(Reply {
        transaction_id: Some(tid),
        text: Some(lines.join("\n")),
    })
}

fn cast_vote(
    store: &mut PollStore,
    actor: &MemberAddress,
    message_id: &MessageId,
    command: &Command,
) -> Result<Reply, StoreError> {
    let Some(value) = command.vote else {
        return Ok(Reply::text_only("I did not catch your vote value."));
    };
    let (reference, remark) = command.poll_reference_and_remark();

    if reference.is_empty() {
        return Ok(Reply::text_only(
            "I am uncertain which poll you are referring to, because you \
             did not give me any text to go by.",
        ));
    }
    let poll_id = match store.find_poll(&reference) {
        Ok(poll_id) => poll_id,
        Err(StoreError::NotFound(_)) => {
            return Ok(Reply::text_only("sorry, I do not know which poll you mean."));
        }
        Err(err) => return Err(err),
    };

    if value == VoteValue::Veto && remark.as_deref().map_or(0, str::len) < VETO_REMARK_MIN {
        return Ok(Reply::text_only(
            "you have to give a reason when you veto. Tell me like this: \
             \u{2018}I vote -1 on xyz: because it has ugly ears\u{2019} (the \
             colon separates the poll topic and your reason).",
        ));
    }

    let subject = store.get_poll(&poll_id)?.subject().to_owned();
    let tid = store.cast_vote(actor, message_id, &poll_id, value, remark.clone())?;
    Ok(Reply {
        transaction_id: Some(tid),
        text: Some(format!(
            "I recorded your vote of {} on {}: {}",
            value,
            subject,
            remark.as_deref().unwrap_or("(no comment)"),
        )),
    })
}

fn delete_poll(
    store: &mut PollStore,
    actor: &MemberAddress,
    message_id: &MessageId,
    command: &Command,
) -> Result<Reply, StoreError> {
    let poll_id = match store.find_poll(&command.reference()) {
        Ok(poll_id) => poll_id,
        Err(StoreError::NotFound(_)) => {
            return Ok(Reply::text_only(
                "sorry, I do not know which poll you\u{2019}re referring to",
            ));
        }
        Err(err) => return Err(err),
    };
    let subject = store.get_poll(&poll_id)?.subject().to_owned();
    let tid = store.delete_poll(actor, message_id, &poll_id)?;
    Ok(Reply {
        transaction_id: Some(tid),
        text: Some(format!("deleted poll on {subject}")),
    })
}

fn autoconclude(store: &mut PollStore, command: &Command) -> Result<Reply, StoreError> {
    if !command.rest.is_empty() {
        return Ok(confused(command));
    }
    if store.autoconclude_polls(Duration::minutes(ON_DEMAND_CUTOFF_MINUTES))? {
        // The conclusion announcements speak for themselves.
        Ok(Reply::silent())
    } else {
        Ok(Reply::text_only(
            "there are no open polls which qualify for conclusion at the moment",
        ))
    }
}

fn list_polls(store: &mut PollStore, command: &Command) -> Result<Reply, StoreError> {
    if !command.rest.is_empty() {
        return Ok(confused(command));
    }

    let mut polls = Vec::new();
    for poll_id in store.active_polls()? {
        let poll = store.get_poll(&poll_id)?;
        polls.push((poll.end_time(), poll.subject().to_owned()));
    }
    polls.sort_by(|a, b| b.0.cmp(&a.0));

    if polls.is_empty() {
        return Ok(Reply::text_only("there are currently no open polls"));
    }

    let now = Utc::now();
    let mut lines = vec![format!(
        "there {} {} open poll{}",
        if polls.len() == 1 { "is" } else { "are" },
        polls.len(),
        if polls.len() == 1 { "" } else { "s" },
    )];
    for (end_time, subject) in polls {
        let days_left = (end_time - now).num_days().max(0);
        lines.push(format!(
            "{} (due in {} day{}, on {})",
            subject,
            days_left,
            if days_left == 1 { "" } else { "s" },
            end_time.format("%Y-%m-%d"),
        ));
    }
    Ok(Reply::text_only(lines.join("\n")))
}

fn list_votes(store: &mut PollStore, command: &Command) -> Result<Reply, StoreError> {
    let poll_id = match store.find_poll(&command.reference()) {
        Ok(poll_id) => poll_id,
        Err(StoreError::NotFound(_)) => {
            return Ok(Reply::text_only(
                "sorry, I do not know which poll you\u{2019}re referring to",
            ));
        }
        Err(err) => return Err(err),
    };
    let summary = store.get_vote_summary(&poll_id)?;

    let open = summary.state.is_open();
    let mut lines = vec![format!(
        "poll on {} is {}. The poll {} {}{}{}.",
        summary.subject,
        summary.state,
        if open { "is" } else { "has" },
        if summary.result.has_passed() { "pass" } else { "fail" },
        if open { "ing" } else { "ed" },
        if summary.result.has_veto() { " (with veto)" } else { "" },
    )];
    lines.extend(format_vote_summary(store, &summary, !open));
    Ok(Reply::text_only(lines.join("\n")))
}

/// One line per roster member with their current vote, bot.py announcement
/// style. `final_` drops the "(yet)" suffix once the poll is over.
pub(crate) fn format_vote_summary(
    store: &PollStore,
    summary: &council_store::VoteSummary,
    final_: bool,
) -> Vec<String> {
    let yet = if final_ { "" } else { " (yet)" };
    summary
        .votes
        .iter()
        .map(|(member, record)| {
            let nick = store
                .get_member_info(member)
                .map_or_else(|| member.to_string(), |info| info.nick.clone());
            match record {
                None => format!("{nick} has not voted{yet}"),
                Some(record) => format!(
                    "{} has voted {}{}",
                    nick,
                    record.value,
                    record
                        .remark
                        .as_deref()
                        .map_or_else(|| " without further comment".to_owned(), |r| format!(": {r}")),
                ),
            }
        })
        .collect()
}

fn confused(command: &Command) -> Reply {
    Reply::text_only(format!(
        "I am not sure what you want (what is {:?} supposed to mean?).",
        command.reference(),
    ))
}
