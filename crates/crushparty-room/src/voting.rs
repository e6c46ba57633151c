//! Crush voting.
//!
//! A ballot resolves once every seated player has a vote on record. Votes
//! are either for a crush or "no preference" (synthesized when a player
//! drops out mid-vote): both count toward the quorum, only the former
//! count toward a crush.

use crushparty_protocol::{CrushId, UserId};

/// Result of recording a vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    StillWaiting { voted: usize, total: usize },
    Winner { crush_id: CrushId, final_voter: UserId },
}

/// Votes of the current game, in the order they were first cast.
#[derive(Debug, Default, Clone)]
pub struct Ballot {
    votes: Vec<(UserId, Option<CrushId>)>,
    last_voter: Option<UserId>,
}

impl Ballot {
    /// Records or overwrites `user_id`'s vote.
    pub fn cast(&mut self, user_id: UserId, choice: Option<CrushId>) {
        match self.votes.iter_mut().find(|(voter, _)| *voter == user_id) {
            Some(slot) => slot.1 = choice,
            None => self.votes.push((user_id, choice)),
        }
        self.last_voter = Some(user_id);
    }

    /// Drops a vote as if it was never cast. Returns whether one existed.
    pub fn retract(&mut self, user_id: UserId) -> bool {
        let before = self.votes.len();
        self.votes.retain(|(voter, _)| *voter != user_id);
        if self.last_voter == Some(user_id) {
            self.last_voter = self.votes.last().map(|(voter, _)| *voter);
        }
        before != self.votes.len()
    }

    pub fn has_voted(&self, user_id: UserId) -> bool {
        self.votes.iter().any(|(voter, _)| *voter == user_id)
    }

    pub fn choice_of(&self, user_id: UserId) -> Option<Option<CrushId>> {
        self.votes
            .iter()
            .find(|(voter, _)| *voter == user_id)
            .map(|(_, choice)| *choice)
    }

    pub fn len(&self) -> usize {
        self.votes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }

    pub fn clear(&mut self) {
        self.votes.clear();
        self.last_voter = None;
    }

    /// The crush with the most votes. Ties go to the candidate listed
    /// first; with no crush votes at all the first candidate wins.
    pub fn tally(&self, candidates: &[CrushId]) -> Option<CrushId> {
        let mut best: Option<(CrushId, usize)> = None;
        for &candidate in candidates {
            let count = self
                .votes
                .iter()
                .filter(|(_, choice)| *choice == Some(candidate))
                .count();
            if best.is_none_or(|(_, top)| count > top) {
                best = Some((candidate, count));
            }
        }
        best.map(|(crush_id, _)| crush_id)
    }

    /// Winner once `voter_count` votes are on record, otherwise progress.
    pub fn resolve(&self, voter_count: usize, candidates: &[CrushId]) -> VoteOutcome {
        if self.votes.len() >= voter_count {
            if let (Some(crush_id), Some(final_voter)) = (self.tally(candidates), self.last_voter) {
                return VoteOutcome::Winner { crush_id, final_voter };
            }
        }
        VoteOutcome::StillWaiting {
            voted: self.votes.len(),
            total: voter_count,
        }
    }

    /// [`cast`](Self::cast) followed by [`resolve`](Self::resolve).
    pub fn cast_vote(
        &mut self,
        user_id: UserId,
        choice: Option<CrushId>,
        voter_count: usize,
        candidates: &[CrushId],
    ) -> VoteOutcome {
        self.cast(user_id, choice);
        self.resolve(voter_count, candidates)
    }
}
