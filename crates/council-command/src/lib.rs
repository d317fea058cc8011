//! Free-text command grammar for the council poll store
//!
//! Turns chat messages ("please create a new poll on …", "!+1:lgtm …")
//! into a typed [`Action`] with captured parameters. Producing actor
//! identities, message ids, and permission checks is the chat layer's
//! job; this crate only understands the words.

pub mod parser;

pub use parser::{parse_command, Action, Command, PollSelector};
