//! Ordered protection rules and their evaluation.

use gix_hash::ObjectId;

use super::ff::is_fast_forward;
use super::{ProtectionRule, RefUpdate};
use crate::check::CheckResult;
use crate::facts::DescendantQuery;
use crate::gatekeeper::Context;
use crate::model::{Actor, PullRequest, RefKind};
use crate::Error;

/// Branch and tag protection rules, each list in order of precedence.
///
/// The first enabled rule matching both the actor and the name governs exclusively, later
/// rules are not consulted. Names without a matching rule are unprotected.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtectionRuleSet {
    branches: Vec<ProtectionRule>,
    tags: Vec<ProtectionRule>,
}

impl ProtectionRuleSet {
    /// Create an empty rule set, which protects nothing.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a branch rule with the lowest precedence so far.
    pub fn with_branch_rule(mut self, rule: ProtectionRule) -> Self {
        self.branches.push(rule);
        self
    }

    /// Append a tag rule with the lowest precedence so far.
    pub fn with_tag_rule(mut self, rule: ProtectionRule) -> Self {
        self.tags.push(rule);
        self
    }

    /// All rules for refs of `kind`, in order of precedence.
    pub fn rules(&self, kind: RefKind) -> &[ProtectionRule] {
        match kind {
            RefKind::Branch => &self.branches,
            RefKind::Tag => &self.tags,
        }
    }

    /// Return true if there are no rules at all.
    pub fn is_empty(&self) -> bool {
        self.branches.is_empty() && self.tags.is_empty()
    }

    /// Rules of `kind` that match `actor` and `name`, in order of precedence.
    pub fn matching_rules<'s: 'q, 'q>(
        &'s self,
        actor: &'q Actor,
        kind: RefKind,
        name: &'q str,
    ) -> impl Iterator<Item = &'s ProtectionRule> + 'q {
        self.rules(kind).iter().filter(move |rule| rule.matches(actor, name))
    }

    /// The rule governing `name` for `actor`, if any.
    pub fn rule_for(&self, actor: &Actor, kind: RefKind, name: &str) -> Option<&ProtectionRule> {
        let rule = self.rules(kind).iter().find(|rule| rule.matches(actor, name));
        gix_trace::debug!(
            "{} '{}' for {} is governed by rule {:?}",
            noun(kind),
            name,
            actor.id,
            rule.map(|rule| rule.name.as_str())
        );
        rule
    }

    /// Can the acting user of `ctx` change `path` directly on `branch`?
    pub fn check_modification(&self, ctx: &Context<'_>, branch: &str, path: &str) -> Result<CheckResult, Error> {
        let Some(rule) = self.rule_for(ctx.actor, RefKind::Branch, branch) else {
            return Ok(CheckResult::Approved);
        };
        let results = rule
            .enabled_file_restrictions()
            .chain(rule.enabled_gatekeeper())
            .map(|gate| gate.check_file(ctx, branch, path))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CheckResult::all(results))
    }

    /// Do the rules of the target branch allow merging `request`?
    ///
    /// The acting user of `ctx` is expected to be the submitter.
    pub fn check_request(&self, ctx: &Context<'_>, request: &PullRequest) -> Result<CheckResult, Error> {
        let Some(rule) = self.rule_for(ctx.actor, RefKind::Branch, request.target_branch()) else {
            return Ok(CheckResult::Approved);
        };
        let results = rule
            .enabled_file_restrictions()
            .chain(rule.enabled_gatekeeper())
            .map(|gate| gate.check_request(ctx, request))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(CheckResult::all(results))
    }

    /// Can the acting user of `ctx` perform `update`, which changes `changed_files`?
    ///
    /// Refs other than branches and tags are never protected. If the commit graph can not tell
    /// whether a branch update is a fast-forward while a rule depends on it, the result is
    /// [`CheckResult::Unknown`].
    pub fn check_push(
        &self,
        ctx: &Context<'_>,
        ancestry: &dyn DescendantQuery,
        update: &RefUpdate,
        changed_files: &[String],
    ) -> Result<CheckResult, Error> {
        let name = update.name();
        let Some(kind) = name.kind() else {
            return Ok(CheckResult::Approved);
        };
        let short_name = name.short_name();
        let Some(rule) = self.rule_for(ctx.actor, kind, short_name) else {
            return Ok(CheckResult::Approved);
        };
        let prohibited = |action: &str| {
            CheckResult::disapproved(format!(
                "{action} {} '{short_name}' is prohibited by protection rule '{}'",
                noun(kind),
                rule.name
            ))
        };

        match (kind, update) {
            (_, RefUpdate::Delete { .. }) => Ok(if rule.prevent_deletion {
                prohibited("deleting")
            } else {
                CheckResult::Approved
            }),
            (_, RefUpdate::Create { .. }) if rule.prevent_creation => Ok(prohibited("creating")),
            (RefKind::Tag, RefUpdate::Update { .. }) if rule.prevent_forced_update => Ok(prohibited("updating")),
            (RefKind::Tag, _) => match rule.enabled_gatekeeper() {
                Some(gate) => gate.check_ref(ctx, name),
                None => Ok(CheckResult::Approved),
            },
            (RefKind::Branch, _) => check_branch_push(
                rule,
                ctx,
                ancestry,
                short_name,
                update.old(),
                update.new(),
                changed_files,
            ),
        }
    }
}

fn check_branch_push(
    rule: &ProtectionRule,
    ctx: &Context<'_>,
    ancestry: &dyn DescendantQuery,
    branch: &str,
    old: ObjectId,
    new: ObjectId,
    changed_files: &[String],
) -> Result<CheckResult, Error> {
    let gatekeeper = rule.enabled_gatekeeper();
    let needs_ancestry = rule.prevent_forced_update || (gatekeeper.is_some() && !rule.review_fast_forwards);
    let fast_forward = if needs_ancestry {
        match is_fast_forward(old, new, ancestry) {
            Ok(fast_forward) => fast_forward,
            Err(err @ Error::AncestryUnavailable { .. }) => {
                gix_trace::warn!("push to '{}' can not be judged: {}", branch, err);
                return Ok(CheckResult::unknown(format!(
                    "can not tell whether the push to branch '{branch}' is a fast-forward: {err}"
                )));
            }
            Err(err) => return Err(err),
        }
    } else {
        true
    };

    if !fast_forward && rule.prevent_forced_update {
        return Ok(CheckResult::disapproved(format!(
            "force-pushing to branch '{branch}' is prohibited by protection rule '{}'",
            rule.name
        )));
    }

    let skip_review = fast_forward && needs_ancestry && !rule.review_fast_forwards;
    let results = rule
        .enabled_file_restrictions()
        .chain(gatekeeper.filter(|_| !skip_review))
        .map(|gate| gate.check_commit(ctx, branch, old, new, changed_files))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(CheckResult::all(results))
}

fn noun(kind: RefKind) -> &'static str {
    match kind {
        RefKind::Branch => "branch",
        RefKind::Tag => "tag",
    }
}
