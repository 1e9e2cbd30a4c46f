//! Votes per pull request update and the quorum math built on top of them.
//!
//! Quorum is always computed against the *current* membership of a team. A member who left
//! no longer counts in the numerator or the denominator, so a tally can change without any
//! new vote being cast; results must never be cached across membership changes.

use std::collections::BTreeMap;

use crate::model::{ActorId, PullRequest, Team, UpdateId};

/// The result of a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum VoteResult {
    Approve,
    Disapprove,
}

/// All votes cast on the updates of one pull request, at most one per `(update, voter)`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoteLedger {
    votes: BTreeMap<UpdateId, BTreeMap<ActorId, VoteResult>>,
}

impl VoteLedger {
    /// Record `result` for `voter` on `update`, replacing and returning an earlier vote.
    pub fn cast(&mut self, update: UpdateId, voter: ActorId, result: VoteResult) -> Option<VoteResult> {
        self.votes.entry(update).or_default().insert(voter, result)
    }

    /// Remove the vote of `voter` on `update`.
    pub fn withdraw(&mut self, update: UpdateId, voter: &ActorId) -> Option<VoteResult> {
        let votes = self.votes.get_mut(&update)?;
        let previous = votes.remove(voter);
        if votes.is_empty() {
            self.votes.remove(&update);
        }
        previous
    }

    /// The vote of `voter` on `update`, if any.
    pub fn vote_of(&self, update: UpdateId, voter: &ActorId) -> Option<VoteResult> {
        self.votes.get(&update).and_then(|votes| votes.get(voter)).copied()
    }

    /// All votes on `update`, ordered by voter.
    pub fn votes_on(&self, update: UpdateId) -> impl Iterator<Item = (&ActorId, VoteResult)> + '_ {
        self.votes
            .get(&update)
            .into_iter()
            .flat_map(|votes| votes.iter().map(|(voter, result)| (voter, *result)))
    }

    /// Return true if no vote was cast on any update.
    pub fn is_empty(&self) -> bool {
        self.votes.is_empty()
    }
}

/// Approvals required from a team of `team_size` members: more than half of them.
///
/// An empty team still requires one approval and thus can never approve anything.
pub fn required_approvals(team_size: usize) -> usize {
    team_size / 2 + 1
}

/// The outcome of counting the latest votes of a team's current members.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tally {
    /// Approvals needed for quorum.
    pub required: usize,
    /// Approvals by current members, including an implied submitter approval.
    pub approvals: usize,
    /// Disapprovals by current members.
    pub disapprovals: usize,
    /// Members who still have to vote, in membership order.
    pub invitations: Vec<ActorId>,
}

impl Tally {
    /// Count the votes of `request`'s latest update that were cast by current members of `team`.
    ///
    /// With `count_submitter`, a submitter who is a member counts as an approval and is not
    /// invited, even if they never voted explicitly.
    pub fn count(request: &PullRequest, team: &Team, count_submitter: bool) -> Self {
        let latest: BTreeMap<&ActorId, VoteResult> = request.latest_votes().collect();
        let implied_submitter = count_submitter && team.contains(&request.submitter);

        let mut approvals = 0;
        let mut disapprovals = 0;
        for member in team.members() {
            match latest.get(member) {
                Some(VoteResult::Approve) => approvals += 1,
                Some(VoteResult::Disapprove) => disapprovals += 1,
                None if implied_submitter && *member == request.submitter => approvals += 1,
                None => {}
            }
        }

        Tally {
            required: required_approvals(team.len()),
            approvals,
            disapprovals,
            invitations: compute_invitations(request, team, count_submitter),
        }
    }

    /// Return true if enough members approved.
    pub fn is_approved(&self) -> bool {
        self.approvals >= self.required
    }

    /// Return true if enough members disapproved to veto.
    pub fn is_vetoed(&self) -> bool {
        self.disapprovals >= self.required
    }

    /// Approvals still missing for quorum.
    pub fn missing(&self) -> usize {
        self.required.saturating_sub(self.approvals)
    }
}

/// The members of `team` expected to vote on the latest update of `request`, in membership order.
///
/// This is a pure projection: the same request, votes and membership always produce the same
/// invitations. Callers re-run it after a vote or membership change.
pub fn compute_invitations(request: &PullRequest, team: &Team, count_submitter: bool) -> Vec<ActorId> {
    let latest = request.latest_update().map(|update| update.id);
    team.members()
        .iter()
        .filter(|member| !latest.is_some_and(|update| request.votes().vote_of(update, member).is_some()))
        .filter(|member| !(count_submitter && **member == request.submitter))
        .cloned()
        .collect()
}
