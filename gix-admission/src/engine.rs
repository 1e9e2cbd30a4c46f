//! The entry points used by push-receive hooks and merge handlers.

use std::collections::BTreeSet;

use gix_hash::ObjectId;

use crate::build::{BuildRequirementEvaluator, RequiredBuild, DEFAULT_CI_SPEC_PATH};
use crate::check::CheckResult;
use crate::facts::Facts;
use crate::model::{Actor, ActorId, PullRequest, PullRequestStatus, RefKind, RefName};
use crate::pattern::PatternSet;
use crate::policy::{ProtectionRuleSet, RefUpdate};
use crate::{Error, ErrorKind};

/// Options of the [`AdmissionEngine`] that are not part of any protection rule.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Options {
    /// Path of the CI specification inside the repository. Changes to it never require builds.
    pub ci_spec_path: String,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            ci_spec_path: DEFAULT_CI_SPEC_PATH.into(),
        }
    }
}

/// Decides whether pushes, direct edits and merges are admitted.
///
/// The engine holds no mutable state. Every call reads the current facts, so results must not
/// be cached across vote casts or membership changes.
#[derive(Debug, Clone)]
pub struct AdmissionEngine<'a> {
    rules: ProtectionRuleSet,
    options: Options,
    facts: Facts<'a>,
}

impl<'a> AdmissionEngine<'a> {
    /// Create an engine judging by `rules` and reading everything else from `facts`.
    pub fn new(rules: ProtectionRuleSet, facts: Facts<'a>) -> Self {
        AdmissionEngine {
            rules,
            options: Options::default(),
            facts,
        }
    }

    /// Use `options` instead of the defaults.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    pub fn rules(&self) -> &ProtectionRuleSet {
        &self.rules
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn facts(&self) -> &Facts<'a> {
        &self.facts
    }

    /// Can `actor` move `ref_name` from `old` to `new`?
    ///
    /// Null ids denote creation and deletion respectively. Besides the protection rules, a
    /// branch may not be moved to a commit lacking successful builds its CI specification
    /// requires.
    pub fn check_ref(&self, actor: &Actor, ref_name: &str, old: ObjectId, new: ObjectId) -> Result<CheckResult, Error> {
        let Some(update) = RefUpdate::from_oids(RefName::parse(ref_name), old, new) else {
            return Ok(CheckResult::Approved);
        };
        let is_branch_move = update.name().kind() == Some(RefKind::Branch) && !new.is_null();
        let changed_files = if is_branch_move {
            self.facts.changes.changed_files(&old, &new)?
        } else {
            Vec::new()
        };

        let ctx = self.facts.context(actor);
        let protection = self.rules.check_push(&ctx, self.facts.ancestry, &update, &changed_files)?;
        if protection.is_disapproved() || !is_branch_move {
            gix_trace::debug!("{} by {}: {}", update.name(), actor.id, protection);
            return Ok(protection);
        }

        let branch = update.name().short_name();
        let missing = self.build_evaluator().missing_builds(branch, old, new, &changed_files)?;
        let builds = if missing.is_empty() {
            CheckResult::Approved
        } else {
            CheckResult::disapproved(format!(
                "branch '{branch}' requires successful builds of {}",
                list_builds(&missing)
            ))
        };
        let result = CheckResult::all([protection, builds]);
        gix_trace::debug!("{} by {}: {}", update.name(), actor.id, result);
        Ok(result)
    }

    /// Can `actor` edit `path` directly on `branch`, e.g. through a web editor?
    ///
    /// Direct edits produce commits that were never built, so they are refused if the branch
    /// requires builds.
    pub fn check_file(&self, actor: &Actor, branch: &str, path: &str) -> Result<CheckResult, Error> {
        let ctx = self.facts.context(actor);
        let protection = self.rules.check_modification(&ctx, branch, path)?;
        if protection.is_disapproved() {
            return Ok(protection);
        }

        let builds = match self.facts.refs.branch_head(branch)? {
            Some(head) if self.build_evaluator().is_build_required_for_modification(branch, head, path)? => {
                CheckResult::disapproved(format!(
                    "branch '{branch}' requires successful builds, please submit a pull request to change '{path}'"
                ))
            }
            _ => CheckResult::Approved,
        };
        Ok(CheckResult::all([protection, builds]))
    }

    /// Can `request` be merged into its target branch now?
    ///
    /// The submitter is the acting user. The latest update has to satisfy the rules of the
    /// target branch and carry every build the CI specification of the target requires.
    pub fn check_pull_request_mergeable(&self, request: &PullRequest) -> Result<CheckResult, Error> {
        match request.status {
            PullRequestStatus::Merged => {
                return Ok(CheckResult::disapproved(format!(
                    "pull request {} is already merged",
                    request.id
                )))
            }
            PullRequestStatus::Discarded => {
                return Ok(CheckResult::disapproved(format!("pull request {} is discarded", request.id)))
            }
            PullRequestStatus::Open => {}
        }
        let Some(latest) = request.latest_update() else {
            return Ok(CheckResult::pending(
                format!("pull request {} has no changes yet", request.id),
                [request.submitter.clone()],
            ));
        };

        let submitter = self.facts.actors.actor(&request.submitter)?;
        let ctx = self.facts.context(&submitter);
        let review = self.rules.check_request(&ctx, request)?;

        let branch = request.target_branch();
        let missing = self
            .build_evaluator()
            .missing_builds(branch, request.target.commit, latest.head, &latest.changed_files)?;
        let builds = if missing.is_empty() {
            CheckResult::Approved
        } else {
            CheckResult::pending(
                format!("waiting for successful builds of {}", list_builds(&missing)),
                [request.submitter.clone()],
            )
        };

        let result = CheckResult::all([review, builds]);
        gix_trace::debug!("pull request {} into '{}': {}", request.id, branch, result);
        Ok(result)
    }

    /// Actors who can move `request` forward, usually by voting on its latest update.
    ///
    /// Closed requests and requests without updates have no pending invitations.
    pub fn list_pending_invitations(&self, request: &PullRequest) -> Result<BTreeSet<ActorId>, Error> {
        if request.status != PullRequestStatus::Open || request.latest_update().is_none() {
            return Ok(BTreeSet::new());
        }
        let submitter = self.facts.actors.actor(&request.submitter)?;
        let ctx = self.facts.context(&submitter);
        Ok(match self.rules.check_request(&ctx, request)? {
            CheckResult::Pending { involved, .. } => involved.into_iter().collect(),
            _ => BTreeSet::new(),
        })
    }

    /// Return true if a branch matching `branches` points at `commit` or at one of its
    /// descendants.
    ///
    /// `None` is returned if the commit graph can not answer, which callers should treat like
    /// [`CheckResult::Unknown`].
    pub fn is_commit_on_branches(&self, commit: ObjectId, branches: &PatternSet) -> Result<Option<bool>, Error> {
        let heads: Vec<ObjectId> = self
            .facts
            .refs
            .branches()?
            .into_iter()
            .filter_map(|(name, head)| branches.matches(&name).then_some(head))
            .collect();
        if heads.is_empty() {
            return Ok(Some(false));
        }
        if heads.contains(&commit) {
            return Ok(Some(true));
        }
        match self.facts.ancestry.descendants_of(&[commit]) {
            Ok(descendants) => Ok(Some(heads.iter().any(|head| descendants.contains(head)))),
            Err(err) if err.kind() == ErrorKind::Ancestry => {
                gix_trace::warn!("can not tell which branches contain {}: {}", commit, err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    fn build_evaluator(&self) -> BuildRequirementEvaluator<'_> {
        BuildRequirementEvaluator::new(self.facts.ci_specs, self.facts.builds, self.facts.project)
            .with_ci_spec_path(&self.options.ci_spec_path)
    }
}

fn list_builds(builds: &[RequiredBuild]) -> String {
    builds.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
}
