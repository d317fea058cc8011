//! Word-tree command grammar
//!
//! Maps whitespace-tokenized free text to an action plus parameters. The
//! grammar is a tree of matcher nodes: each node may skip filler words
//! ("i want to please…"), match the next word against a pattern, capture a
//! parameter (a vote value or a listing selector), and descend into its
//! children. Walking off the tree without reaching an action node means
//! the text is not a command.
//!
//! The `!±[01]` bang form carries an optional `:remark` suffix which is
//! pushed back into the remaining-word stream, so `!+1:lgtm foo` leaves
//! `[":lgtm", "foo"]` for the caller to split.

use once_cell::sync::Lazy;
use regex::Regex;

use council_store::VoteValue;

/// What the speaker asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreatePoll,
    ConcludePoll,
    AutoConcludeOpenPolls,
    DeletePoll,
    CastVote,
    Help,
    ListPolls,
    ListVotes,
    ListGeneric,
    Thank,
    /// Explicitly asked to do nothing ("disregard", "nevermind").
    Null,
}

/// Which polls a listing request is about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollSelector {
    Open,
    Concluded,
    Expired,
}

/// A successfully parsed command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub action: Action,
    /// Words left over after the grammar consumed its part; typically a
    /// free-text poll reference, optionally followed by a `:remark`.
    pub rest: Vec<String>,
    /// Captured vote value, for [`Action::CastVote`].
    pub vote: Option<VoteValue>,
    /// Captured listing selector, for [`Action::ListPolls`].
    pub selector: Option<PollSelector>,
}

impl Command {
    /// Split the remaining words into a poll reference and a remark at the
    /// first colon, both trimmed.
    #[must_use]
    pub fn poll_reference_and_remark(&self) -> (String, Option<String>) {
        let text = self.rest.join(" ");
        match text.split_once(':') {
            Some((reference, remark)) => {
                let remark = remark.trim();
                (
                    reference.trim().to_owned(),
                    (!remark.is_empty()).then(|| remark.to_owned()),
                )
            }
            None => (text.trim().to_owned(), None),
        }
    }

    /// The remaining words joined into a free-text reference.
    #[must_use]
    pub fn reference(&self) -> String {
        self.rest.join(" ")
    }
}

enum SaveKind {
    /// Save the `save` capture (or the whole word) as the vote value.
    Vote,
    /// Save a fixed selector.
    Selector(PollSelector),
}

struct Node {
    pattern: Option<Regex>,
    skip: &'static [&'static str],
    action: Option<Action>,
    save: Option<SaveKind>,
    children: Vec<Node>,
}

impl Node {
    fn root(skip: &'static [&'static str], children: Vec<Node>) -> Self {
        Self {
            pattern: None,
            skip,
            action: None,
            save: None,
            children,
        }
    }

    fn new(pattern: &str) -> Self {
        Self {
            // Patterns anchor at the word start, like the original prefix
            // matching; "polls" still matches "poll".
            pattern: Some(Regex::new(pattern).expect("static grammar pattern")),
            skip: &[],
            action: None,
            save: None,
            children: Vec::new(),
        }
    }

    fn skip(mut self, words: &'static [&'static str]) -> Self {
        self.skip = words;
        self
    }

    fn action(mut self, action: Action) -> Self {
        self.action = Some(action);
        self
    }

    fn save(mut self, save: SaveKind) -> Self {
        self.save = Some(save);
        self
    }

    fn children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }
}

#[derive(Debug, Default, Clone)]
struct Params {
    vote: Option<String>,
    selector: Option<PollSelector>,
}

const FILLER: &[&str] = &["i", "want", "to", "please", "do", "can", "you"];
const VOTE_FILLER: &[&str] = &["on", "the"];

fn poll_list_node() -> Node {
    Node::new(r"^(?i)(vote|poll|ballot)s?").action(Action::ListPolls)
}

fn build_tree() -> Node {
    Node::root(
        FILLER,
        vec![
            Node::new(r"^(?i)(create|add|start)")
                .skip(&["a", "new"])
                .children(vec![Node::new(r"^(?i)(vote|ballot|poll)")
                    .skip(VOTE_FILLER)
                    .action(Action::CreatePoll)]),
            Node::new(r"^(?i)(delete|remove|cancel)")
                .skip(&["the"])
                .children(vec![Node::new(r"^(?i)(vote|ballot|poll)")
                    .skip(VOTE_FILLER)
                    .action(Action::DeletePoll)]),
            Node::new(r"^(?i)(conclude|close)")
                .skip(&["the"])
                .children(vec![
                    Node::new(r"^(?i)all")
                        .skip(&["the", "pending", "open", "outstanding"])
                        .children(vec![Node::new(r"^(?i)votes?")
                            .action(Action::AutoConcludeOpenPolls)]),
                    Node::new(r"^(?i)(vote|ballot|poll)")
                        .skip(VOTE_FILLER)
                        .action(Action::ConcludePoll),
                ]),
            Node::new(r"^!(?P<save>[+-][01])(?P<push>:.+)?")
                .save(SaveKind::Vote)
                .skip(VOTE_FILLER)
                .action(Action::CastVote),
            Node::new(r"^(?i)vote").children(vec![Node::new(r"^(?P<save>[+-][01])")
                .save(SaveKind::Vote)
                .skip(VOTE_FILLER)
                .action(Action::CastVote)]),
            Node::new(r"^(?i)!?help").action(Action::Help),
            Node::new(r"^(?i)(disregard|nevermind)").action(Action::Null),
            Node::new(r"^(?i)thanks?").action(Action::Thank),
            Node::new(r"^(?i)!list").action(Action::ListGeneric),
            Node::new(r"^(?i)(show|list)")
                .skip(&["the", "all", "me"])
                .children(vec![
                    Node::new(r"^(?i)(outstanding|pending|open)")
                        .save(SaveKind::Selector(PollSelector::Open))
                        .children(vec![poll_list_node()]),
                    Node::new(r"^(?i)(closed|concluded)")
                        .save(SaveKind::Selector(PollSelector::Concluded))
                        .children(vec![poll_list_node()]),
                    Node::new(r"^(?i)expired")
                        .save(SaveKind::Selector(PollSelector::Expired))
                        .children(vec![poll_list_node()]),
                    Node::new(r"^(?i)votes?")
                        .skip(VOTE_FILLER)
                        .action(Action::ListVotes),
                    poll_list_node(),
                ]),
        ],
    )
}

static PARSE_TREE: Lazy<Node> = Lazy::new(build_tree);

fn descend<'n>(
    node: &'n Node,
    mut words: Vec<String>,
    mut params: Params,
) -> Option<(&'n Node, Vec<String>, Params)> {
    while let Some(first) = words.first() {
        if node.skip.contains(&first.to_lowercase().as_str()) {
            words.remove(0);
        } else {
            break;
        }
    }

    let Some(first) = words.first() else {
        return Some((node, words, params));
    };

    for child in &node.children {
        let Some(pattern) = child.pattern.as_ref() else {
            continue;
        };
        let Some(caps) = pattern.captures(first) else {
            continue;
        };

        match &child.save {
            Some(SaveKind::Vote) => {
                params.vote = Some(
                    caps.name("save")
                        .map_or_else(|| first.clone(), |m| m.as_str().to_owned()),
                );
            }
            Some(SaveKind::Selector(selector)) => params.selector = Some(*selector),
            None => {}
        }

        let push = caps
            .name("push")
            .map(|m| m.as_str().to_owned())
            .filter(|p| !p.is_empty());

        let mut rest: Vec<String> = words[1..].to_vec();
        if let Some(pushed) = push {
            rest.insert(0, pushed);
        }
        return descend(child, rest, params);
    }

    if node.action.is_some() {
        return Some((node, words, params));
    }
    None
}

/// Parse free text into a [`Command`].
///
/// Returns `None` when the text does not resolve to an action, including
/// requests that trail off before naming one ("please create a…").
#[must_use]
pub fn parse_command(text: &str) -> Option<Command> {
    let words: Vec<String> = text.split_whitespace().map(str::to_owned).collect();
    let (node, rest, params) = descend(&PARSE_TREE, words, Params::default())?;
    let action = node.action?;
    let vote = match params.vote {
        Some(raw) => Some(raw.parse::<VoteValue>().ok()?),
        None => None,
    };
    Some(Command {
        action,
        rest,
        vote,
        selector: params.selector,
    })
}
