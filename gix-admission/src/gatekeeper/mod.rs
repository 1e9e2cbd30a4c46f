//! Composable policy gates.
//!
//! A [`GateKeeper`] answers whether an action is approved, pending on somebody, or denied. Gates
//! compose through [`GateKeeper::All`] and [`GateKeeper::Any`], and can be switched off with
//! [`GateKeeper::Disabled`] without losing their configuration.
//!
//! The same gate is asked different questions depending on the action, see [`Subject`]. Pull
//! requests carry votes, so only they can satisfy a vote quorum. Direct pushes and web edits
//! of protected content stay pending on the team instead.

use gix_hash::ObjectId;

use crate::check::CheckResult;
use crate::facts::{ActorDirectory, TeamDirectory};
use crate::model::{Actor, PullRequest, RefName};
use crate::pattern::PatternSet;
use crate::principal::PrincipalMatcher;
use crate::vote::VoteResult;
use crate::Error;

mod parse;
mod quorum;

pub use quorum::{DisapprovalPolicy, VoteQuorum};

/// A single policy rule or a composition of them.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum GateKeeper {
    /// More than half of a team has to approve the latest update of a pull request.
    VoteQuorum(VoteQuorum),
    /// One of the matching actors has to approve the latest update.
    SpecificApprover { approver: PrincipalMatcher },
    /// Paths matching `paths` may only be changed by `exempt` actors.
    FileRestriction { paths: PatternSet, exempt: PrincipalMatcher },
    /// Every enabled child has to approve.
    All(Vec<GateKeeper>),
    /// One enabled child approving suffices.
    Any(Vec<GateKeeper>),
    /// A switched off gate which never blocks.
    Disabled(Box<GateKeeper>),
}

/// What a gatekeeper is asked about.
#[derive(Debug, Clone, Copy)]
pub enum Subject<'a> {
    /// Merging a pull request, judged by the votes on its latest update.
    Request(&'a PullRequest),
    /// Changing a single file on a branch, e.g. through a web editor.
    File { branch: &'a str, path: &'a str },
    /// Changing a branch as a whole, e.g. deleting it.
    Branch { branch: &'a str },
    /// Pushing commits to a branch.
    Commit {
        branch: &'a str,
        old: ObjectId,
        new: ObjectId,
        changed_files: &'a [String],
    },
    /// Pushing any other ref, e.g. a tag.
    Ref { name: &'a RefName },
}

/// The acting user and the directories needed to evaluate gates.
///
/// For pull requests the acting user is the submitter.
#[derive(Clone, Copy)]
pub struct Context<'a> {
    pub actor: &'a Actor,
    pub teams: &'a dyn TeamDirectory,
    pub actors: &'a dyn ActorDirectory,
}

impl std::fmt::Debug for Context<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context").field("actor", &self.actor).finish_non_exhaustive()
    }
}

impl GateKeeper {
    /// A quorum of `team` with request-changes semantics.
    pub fn quorum(team: impl Into<crate::model::TeamId>) -> Self {
        GateKeeper::VoteQuorum(VoteQuorum::new(team))
    }

    /// Return false if the gate is switched off and must not be evaluated.
    pub fn is_enabled(&self) -> bool {
        !matches!(self, GateKeeper::Disabled(_))
    }

    /// Evaluate this gate for `subject`.
    ///
    /// Disabled gates approve. Children of composites that are disabled are skipped, so a
    /// composite without enabled children approves as well.
    pub fn evaluate(&self, ctx: &Context<'_>, subject: &Subject<'_>) -> Result<CheckResult, Error> {
        match self {
            GateKeeper::Disabled(_) => Ok(CheckResult::Approved),
            GateKeeper::VoteQuorum(quorum) => quorum.evaluate(ctx, subject),
            GateKeeper::SpecificApprover { approver } => specific_approver(approver, ctx, subject),
            GateKeeper::FileRestriction { paths, exempt } => file_restriction(paths, exempt, ctx, subject),
            GateKeeper::All(children) => Ok(CheckResult::all(evaluate_enabled(children, ctx, subject)?)),
            GateKeeper::Any(children) => Ok(CheckResult::any(evaluate_enabled(children, ctx, subject)?)),
        }
    }

    /// Can `request` be merged as far as this gate is concerned?
    pub fn check_request(&self, ctx: &Context<'_>, request: &PullRequest) -> Result<CheckResult, Error> {
        self.evaluate(ctx, &Subject::Request(request))
    }

    /// Can the acting user change `path` on `branch` directly?
    pub fn check_file(&self, ctx: &Context<'_>, branch: &str, path: &str) -> Result<CheckResult, Error> {
        self.evaluate(ctx, &Subject::File { branch, path })
    }

    /// Can the acting user modify or delete `branch`?
    pub fn check_branch(&self, ctx: &Context<'_>, branch: &str) -> Result<CheckResult, Error> {
        self.evaluate(ctx, &Subject::Branch { branch })
    }

    /// Can the acting user push commits moving `branch` from `old` to `new`?
    pub fn check_commit(
        &self,
        ctx: &Context<'_>,
        branch: &str,
        old: ObjectId,
        new: ObjectId,
        changed_files: &[String],
    ) -> Result<CheckResult, Error> {
        self.evaluate(
            ctx,
            &Subject::Commit {
                branch,
                old,
                new,
                changed_files,
            },
        )
    }

    /// Can the acting user push `name`?
    pub fn check_ref(&self, ctx: &Context<'_>, name: &RefName) -> Result<CheckResult, Error> {
        self.evaluate(ctx, &Subject::Ref { name })
    }
}

fn evaluate_enabled(children: &[GateKeeper], ctx: &Context<'_>, subject: &Subject<'_>) -> Result<Vec<CheckResult>, Error> {
    children
        .iter()
        .filter(|child| child.is_enabled())
        .map(|child| child.evaluate(ctx, subject))
        .collect()
}

fn specific_approver(approver: &PrincipalMatcher, ctx: &Context<'_>, subject: &Subject<'_>) -> Result<CheckResult, Error> {
    match subject {
        Subject::Request(request) => {
            if approved_by(request, approver, ctx)? {
                return Ok(CheckResult::Approved);
            }
            let candidates = approver
                .candidates(ctx.teams)?
                .into_iter()
                .filter(|candidate| *candidate != request.submitter);
            Ok(CheckResult::pending(format!("waiting for approval from {approver}"), candidates))
        }
        _ if approver.matches(ctx.actor) => Ok(CheckResult::Approved),
        _ => Ok(CheckResult::pending(
            format!("approval from {approver} is required, please submit a pull request"),
            approver.candidates(ctx.teams)?,
        )),
    }
}

/// Return true if an actor matching `approver` approved the latest update of `request`.
fn approved_by(request: &PullRequest, approver: &PrincipalMatcher, ctx: &Context<'_>) -> Result<bool, Error> {
    for (voter, result) in request.latest_votes() {
        if result != VoteResult::Approve {
            continue;
        }
        let voter = if *voter == ctx.actor.id {
            ctx.actor.clone()
        } else {
            ctx.actors.actor(voter)?
        };
        if approver.matches(&voter) {
            return Ok(true);
        }
    }
    Ok(false)
}

fn file_restriction(
    paths: &PatternSet,
    exempt: &PrincipalMatcher,
    ctx: &Context<'_>,
    subject: &Subject<'_>,
) -> Result<CheckResult, Error> {
    let touched: Vec<&str> = match subject {
        Subject::File { path, .. } => vec![*path],
        Subject::Commit { changed_files, .. } => changed_files.iter().map(String::as_str).collect(),
        Subject::Request(request) => request
            .latest_update()
            .map(|update| update.changed_files.iter().map(String::as_str).collect())
            .unwrap_or_default(),
        Subject::Branch { .. } | Subject::Ref { .. } => Vec::new(),
    };
    let Some(restricted) = touched.into_iter().find(|path| paths.matches(path)) else {
        return Ok(CheckResult::Approved);
    };
    if exempt.matches(ctx.actor) {
        return Ok(CheckResult::Approved);
    }

    match subject {
        Subject::Request(request) => {
            if approved_by(request, exempt, ctx)? {
                return Ok(CheckResult::Approved);
            }
            let candidates = exempt.candidates(ctx.teams)?;
            if candidates.is_empty() {
                Ok(CheckResult::disapproved(format!("'{restricted}' may only be changed by {exempt}")))
            } else {
                Ok(CheckResult::pending(
                    format!("'{restricted}' is restricted, waiting for approval from {exempt}"),
                    candidates,
                ))
            }
        }
        _ => Ok(CheckResult::disapproved(format!(
            "'{restricted}' may only be changed by {exempt}"
        ))),
    }
}
