//! Result engine
//!
//! Pure evaluation of a poll's outcome from its current votes. History
//! before each member's most recent record is irrelevant.
//!
//! The rules, in order:
//!
//! 1. any current veto vote forces [`PollResult::Veto`] unconditionally;
//! 2. turnout must be a strict majority of the roster (quorum), otherwise
//!    [`PollResult::Fail`];
//! 3. acks must be a strict majority of the votes cast, otherwise
//!    [`PollResult::Fail`];
//! 4. everything held, so [`PollResult::Pass`].

use crate::types::{PollResult, VoteValue};

/// Evaluate the outcome from the current vote of every member who has one.
///
/// `current` yields one value per member with at least one vote;
/// `roster_size` is the full member count fixed at poll creation.
#[must_use]
pub fn evaluate(current: impl IntoIterator<Item = VoteValue>, roster_size: usize) -> PollResult {
    let mut votes_cast = 0usize;
    let mut acks = 0usize;

    for value in current {
        if value == VoteValue::Veto {
            return PollResult::Veto;
        }
        votes_cast += 1;
        if value == VoteValue::Ack {
            acks += 1;
        }
    }

    // Strict majorities on both thresholds; integer comparison avoids the
    // halved denominators: n > d/2  <=>  2n > d.
    if 2 * votes_cast <= roster_size {
        return PollResult::Fail;
    }
    if 2 * acks <= votes_cast {
        return PollResult::Fail;
    }

    PollResult::Pass
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn three_acks_of_five_pass() {
        let result = evaluate(
            [VoteValue::Ack, VoteValue::Ack, VoteValue::Ack],
            5,
        );
        assert_eq!(result, PollResult::Pass);
    }

    #[test]
    fn two_acks_of_five_fail_for_lack_of_quorum() {
        let result = evaluate([VoteValue::Ack, VoteValue::Ack], 5);
        assert_eq!(result, PollResult::Fail);
    }

    #[test]
    fn veto_dominates_any_turnout() {
        let result = evaluate(
            [
                VoteValue::Ack,
                VoteValue::Ack,
                VoteValue::Ack,
                VoteValue::Ack,
                VoteValue::Veto,
            ],
            5,
        );
        assert_eq!(result, PollResult::Veto);
    }

    #[test]
    fn quorum_without_ack_majority_fails() {
        // 3 of 5 voting is quorum, but only 1 ack of 3 votes is no majority.
        let result = evaluate(
            [VoteValue::Ack, VoteValue::MinusZero, VoteValue::PlusZero],
            5,
        );
        assert_eq!(result, PollResult::Fail);
    }

    #[test]
    fn exact_half_turnout_is_not_quorum() {
        // 2 of 4 is not a strict majority.
        let result = evaluate([VoteValue::Ack, VoteValue::Ack], 4);
        assert_eq!(result, PollResult::Fail);
    }

    #[test]
    fn exact_half_acks_is_not_majority() {
        // 4 of 6 voting is quorum; 2 acks of 4 votes is not a strict majority.
        let result = evaluate(
            [
                VoteValue::Ack,
                VoteValue::Ack,
                VoteValue::MinusZero,
                VoteValue::PlusZero,
            ],
            6,
        );
        assert_eq!(result, PollResult::Fail);
    }

    #[test]
    fn empty_poll_fails() {
        assert_eq!(evaluate([], 5), PollResult::Fail);
    }
}
