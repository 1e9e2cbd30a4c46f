use crate::check::CheckResult;
use crate::gatekeeper::{Context, Subject};
use crate::model::{ActorId, Team, TeamId};
use crate::vote::{compute_invitations, Tally};
use crate::Error;

/// How disapprovals of a quorum gate are treated.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum DisapprovalPolicy {
    /// Disapprovals only withhold approval, the request stays pending.
    #[default]
    RequestChanges,
    /// A quorum of disapprovals denies the request.
    Veto,
}

/// Approval by more than half of a team's current members.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VoteQuorum {
    pub team: TeamId,
    pub disapprovals: DisapprovalPolicy,
    /// Count a submitter who is a member as approving.
    pub count_submitter: bool,
}

impl VoteQuorum {
    pub fn new(team: impl Into<TeamId>) -> Self {
        Self {
            team: team.into(),
            disapprovals: DisapprovalPolicy::default(),
            count_submitter: false,
        }
    }

    pub fn with_veto(mut self) -> Self {
        self.disapprovals = DisapprovalPolicy::Veto;
        self
    }

    pub fn counting_submitter(mut self) -> Self {
        self.count_submitter = true;
        self
    }

    pub(crate) fn evaluate(&self, ctx: &Context<'_>, subject: &Subject<'_>) -> Result<CheckResult, Error> {
        let team = match ctx.teams.resolve(&self.team) {
            Ok(Some(team)) => team,
            Ok(None) => return Ok(inert(Error::TeamNotFound { team: self.team.clone() })),
            Err(err @ Error::TeamNotFound { .. }) => return Ok(inert(err)),
            Err(err) => return Err(err),
        };

        let Subject::Request(request) = subject else {
            return Ok(CheckResult::pending(
                format!("approval of team '{}' is required, please submit a pull request", team.name),
                team.members().iter().cloned(),
            ));
        };

        if request.latest_update().is_none() {
            return Ok(CheckResult::pending(
                format!("waiting for the first update to be reviewed by team '{}'", team.name),
                compute_invitations(request, &team, self.count_submitter),
            ));
        }

        let tally = Tally::count(request, &team, self.count_submitter);
        if tally.is_approved() {
            return Ok(CheckResult::Approved);
        }
        if self.disapprovals == DisapprovalPolicy::Veto && tally.is_vetoed() {
            return Ok(CheckResult::disapproved(format!(
                "rejected by {} of {} members of team '{}'",
                tally.disapprovals,
                team.len(),
                team.name
            )));
        }
        if team.is_empty() {
            return Ok(CheckResult::pending(
                format!("team '{}' has no members to approve", team.name),
                None,
            ));
        }

        let involved = if tally.invitations.is_empty() {
            not_approving(request, &team)
        } else {
            tally.invitations.clone()
        };
        Ok(CheckResult::pending(
            format!(
                "waiting for {} more approval(s) from team '{}' ({} of {} required)",
                tally.missing(),
                team.name,
                tally.approvals,
                tally.required
            ),
            involved,
        ))
    }
}

/// A quorum over a team that does not exist never approves, but must not fail the check either.
fn inert(err: Error) -> CheckResult {
    gix_trace::warn!("quorum gate is inert: {}", err);
    CheckResult::pending(format!("{err}, an administrator has to fix the protection rule"), None)
}

/// Members who voted but did not approve; they are the only ones left to change the outcome.
fn not_approving(request: &crate::model::PullRequest, team: &Team) -> Vec<ActorId> {
    let approving: Vec<&ActorId> = request
        .latest_votes()
        .filter(|(_, result)| *result == crate::vote::VoteResult::Approve)
        .map(|(voter, _)| voter)
        .collect();
    team.members()
        .iter()
        .filter(|member| !approving.contains(member))
        .cloned()
        .collect()
}
