//! End-to-end admission scenarios through the public API.
//!
//! These tests verify the complete decision path including:
//! - Vote quorum on pull requests against current team membership
//! - First-match-wins protection rules and file restrictions
//! - Build gating with parameter matrices and secret parameters
//! - Lenient and strict handling of collaborator failures
//! - The receive hook adapter and configuration loading

use gix_admission::build::{BuildRecord, BuildStatus, CiSpec, Job, JobParam, JobTrigger};
use gix_admission::facts::memory::InMemoryFacts;
use gix_admission::hooks::{AdmissionHook, Hooks};
use gix_admission::model::{PullRequestId, Ref, RefName};
use gix_admission::{
    Actor, ActorId, AdmissionConfig, AdmissionEngine, CheckResult, ErrorKind, Facts, GateKeeper, PatternSet,
    ProtectionRule, ProtectionRuleSet, PullRequest, RefUpdate, Team, TeamId, VoteQuorum, VoteResult,
};
use gix_hash::ObjectId;

fn oid(suffix: u8) -> ObjectId {
    let mut bytes = [0u8; 20];
    bytes[19] = suffix;
    ObjectId::from_bytes_or_panic(&bytes)
}

fn null() -> ObjectId {
    ObjectId::null(gix_hash::Kind::Sha1)
}

fn ids(names: &[&str]) -> Vec<ActorId> {
    names.iter().map(|name| ActorId::new(*name)).collect()
}

fn patterns(text: &str) -> PatternSet {
    PatternSet::parse(text).expect("valid pattern set")
}

// 1 - 2 - 3
//  \
//   4
fn repository() -> InMemoryFacts {
    InMemoryFacts::default()
        .with_team(Team::new("core").with_members(["u1", "u2", "u3"]))
        .with_team(Team::new("writers").with_members(["w1"]))
        .with_commit(oid(1), [])
        .with_commit(oid(2), [oid(1)])
        .with_commit(oid(3), [oid(2)])
        .with_commit(oid(4), [oid(1)])
        .with_changes(oid(1), oid(2), ["src/lib.rs"])
        .with_changes(oid(2), oid(3), ["docs/guide.md"])
        .with_changes(oid(2), oid(4), ["src/main.rs"])
        .with_branch("main", oid(2))
        .with_branch("release/1.0", oid(3))
}

fn quorum_on_main() -> ProtectionRuleSet {
    ProtectionRuleSet::new()
        .with_branch_rule(ProtectionRule::new("main", patterns("main")).with_gatekeeper(GateKeeper::quorum("core")))
}

fn pull_request(submitter: &str) -> PullRequest {
    let mut request = PullRequest::new(
        PullRequestId(7),
        Ref::branch("main", oid(1)),
        Ref::branch("topic", oid(2)),
        oid(1),
        submitter,
    );
    request.add_update(oid(2), ["src/lib.rs"]);
    request
}

mod quorum {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn core_team_needs_two_of_three() -> anyhow::Result<()> {
        let facts = repository();
        let engine = AdmissionEngine::new(quorum_on_main(), Facts::from_source("project", &facts));
        let mut request = pull_request("s1");
        let update = request.latest_update().map(|u| u.id).expect("one update");

        let result = engine.check_pull_request_mergeable(&request)?;
        assert!(result.is_pending(), "{result}");
        assert_eq!(result.involved(), ids(&["u1", "u2", "u3"]).as_slice());

        request.cast_vote(update, "u1", VoteResult::Approve)?;
        let result = engine.check_pull_request_mergeable(&request)?;
        assert_eq!(
            result,
            CheckResult::pending(
                "waiting for 1 more approval(s) from team 'core' (1 of 2 required)",
                ids(&["u2", "u3"])
            )
        );

        request.cast_vote(update, "u2", VoteResult::Approve)?;
        assert_eq!(engine.check_pull_request_mergeable(&request)?, CheckResult::Approved);
        assert!(engine.list_pending_invitations(&request)?.is_empty());
        Ok(())
    }

    #[test]
    fn votes_on_older_updates_do_not_count() -> anyhow::Result<()> {
        let facts = repository();
        let engine = AdmissionEngine::new(quorum_on_main(), Facts::from_source("project", &facts));
        let mut request = pull_request("s1");
        let first = request.latest_update().map(|u| u.id).expect("one update");
        request.cast_vote(first, "u1", VoteResult::Approve)?;
        request.cast_vote(first, "u2", VoteResult::Approve)?;
        assert_eq!(engine.check_pull_request_mergeable(&request)?, CheckResult::Approved);

        request.add_update(oid(3), ["src/lib.rs", "docs/guide.md"]);
        let result = engine.check_pull_request_mergeable(&request)?;
        assert!(result.is_pending(), "{result}");
        assert_eq!(
            engine.list_pending_invitations(&request)?.into_iter().collect::<Vec<_>>(),
            ids(&["u1", "u2", "u3"])
        );
        Ok(())
    }

    #[test]
    fn quorum_follows_current_membership() -> anyhow::Result<()> {
        let mut facts = repository();
        let mut request = pull_request("s1");
        let update = request.latest_update().map(|u| u.id).expect("one update");
        request.cast_vote(update, "u1", VoteResult::Approve)?;

        let check = |facts: &InMemoryFacts| {
            AdmissionEngine::new(quorum_on_main(), Facts::from_source("project", facts))
                .check_pull_request_mergeable(&request)
        };
        assert!(check(&facts)?.is_pending());

        let core = TeamId::new("core");
        let team = facts.team_mut(&core).expect("core exists");
        team.remove_member(&ActorId::new("u2"));
        team.remove_member(&ActorId::new("u3"));
        assert_eq!(check(&facts)?, CheckResult::Approved, "1 of 1 remaining members approved");

        facts.remove_team(&core);
        let result = check(&facts)?;
        assert!(result.is_pending(), "a missing team never approves");
        assert!(result.involved().is_empty());
        assert!(result.reason().is_some_and(|reason| reason.contains("administrator")));
        Ok(())
    }

    #[test]
    fn veto_denies_while_request_changes_stays_pending() -> anyhow::Result<()> {
        let facts = repository();
        let mut request = pull_request("s1");
        let update = request.latest_update().map(|u| u.id).expect("one update");
        request.cast_vote(update, "u1", VoteResult::Disapprove)?;
        request.cast_vote(update, "u2", VoteResult::Disapprove)?;

        let engine = AdmissionEngine::new(quorum_on_main(), Facts::from_source("project", &facts));
        assert!(engine.check_pull_request_mergeable(&request)?.is_pending());

        let veto = ProtectionRuleSet::new().with_branch_rule(
            ProtectionRule::new("main", patterns("main"))
                .with_gatekeeper(GateKeeper::VoteQuorum(VoteQuorum::new("core").with_veto())),
        );
        let engine = AdmissionEngine::new(veto, Facts::from_source("project", &facts));
        assert_eq!(
            engine.check_pull_request_mergeable(&request)?,
            CheckResult::disapproved("rejected by 2 of 3 members of team 'core'")
        );
        Ok(())
    }
}

mod protection {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn first_matching_rule_governs_exclusively() -> anyhow::Result<()> {
        let facts = repository();
        let rules = ProtectionRuleSet::new()
            .with_branch_rule(ProtectionRule::new("releases", patterns("release/*")))
            .with_branch_rule(ProtectionRule::new("all", patterns("*")).with_prevent_deletion(true));
        let engine = AdmissionEngine::new(rules, Facts::from_source("project", &facts));
        let actor = Actor::new("u1");

        assert_eq!(
            engine.check_ref(&actor, "refs/heads/release/1.0", oid(3), null())?,
            CheckResult::Approved
        );
        assert_eq!(
            engine.check_ref(&actor, "refs/heads/main", oid(2), null())?,
            CheckResult::disapproved("deleting branch 'main' is prohibited by protection rule 'all'")
        );
        Ok(())
    }

    #[test]
    fn file_restrictions_exempt_matching_actors() -> anyhow::Result<()> {
        let facts = repository();
        let rules = ProtectionRuleSet::new().with_branch_rule(
            ProtectionRule::new("main", patterns("main"))
                .with_file_restriction(GateKeeper::parse("files(docs/**, team:writers)")?),
        );
        let engine = AdmissionEngine::new(rules, Facts::from_source("project", &facts));
        let writer = Actor::new("w1").with_teams(["writers"]);
        let developer = Actor::new("u1").with_teams(["core"]);

        assert_eq!(engine.check_file(&writer, "main", "docs/guide.md")?, CheckResult::Approved);
        assert_eq!(
            engine.check_file(&developer, "main", "docs/guide.md")?,
            CheckResult::disapproved("'docs/guide.md' may only be changed by team:writers")
        );
        assert_eq!(engine.check_file(&developer, "main", "src/lib.rs")?, CheckResult::Approved);
        Ok(())
    }

    #[test]
    fn force_pushes_are_prevented_and_unknown_without_ancestry() -> anyhow::Result<()> {
        let rules = ProtectionRuleSet::new()
            .with_branch_rule(ProtectionRule::new("main", patterns("main")).with_prevent_forced_update(true));
        let actor = Actor::new("u1");

        let facts = repository();
        let engine = AdmissionEngine::new(rules.clone(), Facts::from_source("project", &facts));
        assert_eq!(engine.check_ref(&actor, "refs/heads/main", oid(2), oid(3))?, CheckResult::Approved);
        assert!(engine.check_ref(&actor, "refs/heads/main", oid(2), oid(4))?.is_disapproved());

        let facts = repository().with_ancestry_unavailable();
        let engine = AdmissionEngine::new(rules, Facts::from_source("project", &facts));
        let result = engine.check_ref(&actor, "refs/heads/main", oid(2), oid(3))?;
        assert!(result.is_unknown(), "{result}");
        Ok(())
    }

    #[test]
    fn unexpected_collaborator_failures_fail_the_check() {
        let facts = repository().with_failing("teams");
        let engine = AdmissionEngine::new(quorum_on_main(), Facts::from_source("project", &facts));
        let err = engine
            .check_ref(&Actor::new("u1"), "refs/heads/main", oid(2), oid(3))
            .expect_err("team lookup fails");
        assert_eq!(err.kind(), ErrorKind::Collaborator);
        assert!(!err.kind().is_tolerated());
    }
}

mod builds {
    use super::*;
    use pretty_assertions::assert_eq;

    fn matrix_spec() -> CiSpec {
        CiSpec {
            jobs: vec![Job::new("test").with_trigger(
                JobTrigger::branch_update(Some(patterns("main")), true)
                    .with_param(JobParam::new("os", ["linux", "mac"]))
                    .with_param(JobParam::new("rust", ["stable", "beta", "nightly"]))
                    .with_param(JobParam::new("token", ["current"]).secret()),
            )],
        }
    }

    fn all_cells_except(skip: Option<(&str, &str)>) -> Vec<BuildRecord> {
        let mut records = Vec::new();
        for os in ["linux", "mac"] {
            for rust in ["stable", "beta", "nightly"] {
                if skip == Some((os, rust)) {
                    continue;
                }
                records.push(
                    BuildRecord::new("test", BuildStatus::Successful)
                        .with_param("os", os)
                        .with_param("rust", rust)
                        .with_param("token", "rotated-since"),
                );
            }
        }
        records
    }

    #[test]
    fn every_matrix_cell_must_have_succeeded() -> anyhow::Result<()> {
        let actor = Actor::new("u1");
        let facts = repository()
            .with_ci_spec(oid(2), matrix_spec())
            .with_builds("project", oid(3), all_cells_except(Some(("mac", "beta"))));
        let engine = AdmissionEngine::new(ProtectionRuleSet::new(), Facts::from_source("project", &facts));
        assert_eq!(
            engine.check_ref(&actor, "refs/heads/main", oid(2), oid(3))?,
            CheckResult::disapproved("branch 'main' requires successful builds of test[os=mac, rust=beta]")
        );

        let facts = repository()
            .with_ci_spec(oid(2), matrix_spec())
            .with_builds("project", oid(3), all_cells_except(None));
        let engine = AdmissionEngine::new(ProtectionRuleSet::new(), Facts::from_source("project", &facts));
        assert_eq!(
            engine.check_ref(&actor, "refs/heads/main", oid(2), oid(3))?,
            CheckResult::Approved,
            "secret parameter values are ignored when matching builds"
        );
        Ok(())
    }

    #[test]
    fn the_ci_specification_itself_is_exempt() -> anyhow::Result<()> {
        let facts = repository()
            .with_ci_spec(oid(2), matrix_spec())
            .with_changes(oid(2), oid(4), [".gix-ci.yml"]);
        let engine = AdmissionEngine::new(ProtectionRuleSet::new(), Facts::from_source("project", &facts));
        let actor = Actor::new("u1");

        assert!(engine.check_file(&actor, "main", "src/lib.rs")?.is_disapproved());
        assert_eq!(engine.check_file(&actor, "main", ".gix-ci.yml")?, CheckResult::Approved);
        assert_eq!(
            engine.check_ref(&actor, "refs/heads/main", oid(2), oid(4))?,
            CheckResult::Approved,
            "changing the specification requires no builds"
        );
        Ok(())
    }

    #[test]
    fn malformed_specifications_require_nothing() -> anyhow::Result<()> {
        let facts = repository().with_malformed_ci_spec(oid(2), "unexpected end of input");
        let engine = AdmissionEngine::new(ProtectionRuleSet::new(), Facts::from_source("project", &facts));
        assert_eq!(
            engine.check_ref(&Actor::new("u1"), "refs/heads/main", oid(2), oid(3))?,
            CheckResult::Approved
        );
        Ok(())
    }

    #[test]
    fn pull_requests_wait_for_builds_of_the_latest_update() -> anyhow::Result<()> {
        let spec = CiSpec {
            jobs: vec![Job::new("lint").with_trigger(JobTrigger::branch_update(None, true))],
        };
        let request = pull_request("s1");

        let unbuilt = repository().with_ci_spec(oid(1), spec.clone());
        let engine = AdmissionEngine::new(ProtectionRuleSet::new(), Facts::from_source("project", &unbuilt));
        assert_eq!(
            engine.check_pull_request_mergeable(&request)?,
            CheckResult::pending("waiting for successful builds of lint", ids(&["s1"]))
        );

        let built = repository()
            .with_ci_spec(oid(1), spec)
            .with_builds("project", oid(2), [BuildRecord::new("lint", BuildStatus::Successful)]);
        let engine = AdmissionEngine::new(ProtectionRuleSet::new(), Facts::from_source("project", &built));
        assert_eq!(engine.check_pull_request_mergeable(&request)?, CheckResult::Approved);
        Ok(())
    }
}

mod hook {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn pushes_are_admitted_per_ref() -> anyhow::Result<()> {
        let facts = repository().with_ancestry_unavailable();
        let rules = ProtectionRuleSet::new()
            .with_branch_rule(ProtectionRule::new("main", patterns("main")).with_prevent_forced_update(true));
        let engine = AdmissionEngine::new(rules, Facts::from_source("project", &facts));
        let mut hook = AdmissionHook::new(&engine, Actor::new("u1"));

        let topic = RefUpdate::Create {
            new: oid(4),
            name: RefName::parse("refs/heads/topic"),
        };
        let main = RefUpdate::Update {
            old: oid(2),
            new: oid(3),
            name: RefName::parse("refs/heads/main"),
        };
        assert!(hook.update(&topic)?.allowed);
        let decision = hook.update(&main)?;
        assert!(!decision.allowed, "undecidable pushes are not admitted");

        let batch = hook.pre_receive(&[topic, main])?;
        assert!(!batch.allowed);
        assert!(batch.message.starts_with("refs/heads/main: "), "{}", batch.message);
        Ok(())
    }
}

mod config {
    use super::*;
    use pretty_assertions::assert_eq;

    const CONFIG: &str = r#"
[admission]
    ciSpecPath = ci/spec.yml
[branchProtection "releases"]
    branches = release/*
    gatekeeper = quorum(core)
    preventForcedPush = true
    reviewFastForwards = false
[branchProtection "main"]
    branches = main
    gatekeeper = any(approver(user:lead), quorum(core))
    fileRestriction = files(docs/**, team:writers)
    preventDeletion = true
"#;

    #[test]
    fn configured_engine_enforces_rules() -> anyhow::Result<()> {
        let config = AdmissionConfig::from_config(&gix_config::File::try_from(CONFIG)?)?;
        assert_eq!(config.options.ci_spec_path, "ci/spec.yml");

        let facts = repository();
        let engine = config.into_engine(Facts::from_source("project", &facts));
        let developer = Actor::new("u1").with_teams(["core"]);

        assert_eq!(
            engine.check_ref(&developer, "refs/heads/release/1.0", oid(2), oid(3))?,
            CheckResult::Approved,
            "fast-forwards skip the review"
        );
        assert!(engine
            .check_ref(&developer, "refs/heads/release/1.0", oid(3), oid(4))?
            .is_disapproved());
        assert!(engine.check_ref(&developer, "refs/heads/main", oid(2), null())?.is_disapproved());
        assert!(engine.check_file(&developer, "main", "src/lib.rs")?.is_pending());
        assert_eq!(
            engine.check_file(&Actor::new("lead"), "main", "src/lib.rs")?,
            CheckResult::Approved
        );
        assert!(engine.check_file(&Actor::new("lead"), "main", "docs/guide.md")?.is_disapproved());
        Ok(())
    }

    #[test]
    fn commits_on_release_branches() -> anyhow::Result<()> {
        let facts = repository();
        let engine = AdmissionEngine::new(ProtectionRuleSet::new(), Facts::from_source("project", &facts));
        assert_eq!(engine.is_commit_on_branches(oid(2), &patterns("release/*"))?, Some(true));
        assert_eq!(engine.is_commit_on_branches(oid(4), &patterns("release/* main"))?, Some(false));

        let facts = repository().with_ancestry_unavailable();
        let engine = AdmissionEngine::new(ProtectionRuleSet::new(), Facts::from_source("project", &facts));
        assert_eq!(engine.is_commit_on_branches(oid(2), &patterns("release/*"))?, None);
        Ok(())
    }
}
