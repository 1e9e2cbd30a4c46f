//! CI build gating.
//!
//! A job trigger marked `reject_if_not_successful` turns every cell of its parameter matrix into a
//! build that must have succeeded at the new commit before a branch may move there. The CI
//! specification is read at the commit the branch is moving away from, so a push can not lift its
//! own requirement.

use std::collections::BTreeMap;
use std::fmt;

use gix_hash::ObjectId;

use crate::facts::{BuildHistory, CiSpecResolver};
use crate::pattern::PatternSet;
use crate::Error;

/// The path of the CI specification unless configured otherwise.
pub const DEFAULT_CI_SPEC_PATH: &str = ".gix-ci.yml";

/// A parsed CI specification.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CiSpec {
    pub jobs: Vec<Job>,
}

/// A named job and the events triggering it.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Job {
    pub name: String,
    pub triggers: Vec<JobTrigger>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            triggers: Vec::new(),
        }
    }

    pub fn with_trigger(mut self, trigger: JobTrigger) -> Self {
        self.triggers.push(trigger);
        self
    }
}

/// An event that runs a job.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum JobTrigger {
    /// A branch moved. Only this trigger can require builds.
    BranchUpdate {
        /// Branches to react to, all of them if unset.
        branches: Option<PatternSet>,
        /// Block branch updates until every matrix cell built successfully.
        reject_if_not_successful: bool,
        params: Vec<JobParam>,
    },
    /// A tag was created.
    TagCreate {
        tags: Option<PatternSet>,
        params: Vec<JobParam>,
    },
}

impl JobTrigger {
    /// A branch update trigger without parameters, firing for `branches` or all branches.
    pub fn branch_update(branches: Option<PatternSet>, reject_if_not_successful: bool) -> Self {
        JobTrigger::BranchUpdate {
            branches,
            reject_if_not_successful,
            params: Vec::new(),
        }
    }

    /// Add a parameter to the matrix.
    pub fn with_param(mut self, param: JobParam) -> Self {
        match &mut self {
            JobTrigger::BranchUpdate { params, .. } | JobTrigger::TagCreate { params, .. } => params.push(param),
        }
        self
    }

    /// The parameters of this trigger if it blocks updates of `branch` until builds succeeded.
    fn rejecting_params(&self, branch: &str) -> Option<&[JobParam]> {
        match self {
            JobTrigger::BranchUpdate {
                branches,
                reject_if_not_successful: true,
                params,
            } if branches.as_ref().map_or(true, |patterns| patterns.matches(branch)) => Some(params.as_slice()),
            _ => None,
        }
    }
}

/// A job parameter and the values the matrix iterates over.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JobParam {
    pub name: String,
    /// Secret values differ between runs of the same configuration and are never compared.
    pub secret: bool,
    pub values: Vec<String>,
}

impl JobParam {
    pub fn new(name: impl Into<String>, values: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            secret: false,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    pub fn secret(mut self) -> Self {
        self.secret = true;
        self
    }
}

/// The state of a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BuildStatus {
    Successful,
    Failed,
    Error,
    Cancelled,
    TimedOut,
    Running,
    Waiting,
    Queued,
}

impl BuildStatus {
    pub fn is_successful(self) -> bool {
        self == BuildStatus::Successful
    }

    /// Return true if the build will not change its status anymore.
    pub fn is_finished(self) -> bool {
        !matches!(self, BuildStatus::Running | BuildStatus::Waiting | BuildStatus::Queued)
    }
}

/// A build that ran, or is running, against a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BuildRecord {
    pub job_name: String,
    pub params: BTreeMap<String, String>,
    pub status: BuildStatus,
}

impl BuildRecord {
    pub fn new(job_name: impl Into<String>, status: BuildStatus) -> Self {
        Self {
            job_name: job_name.into(),
            params: BTreeMap::new(),
            status,
        }
    }

    pub fn with_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }
}

/// One cell of a job's parameter matrix that has to build successfully.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct RequiredBuild {
    pub job_name: String,
    /// Non-secret parameter values of the cell.
    pub params: BTreeMap<String, String>,
}

impl RequiredBuild {
    fn is_satisfied_by(&self, record: &BuildRecord, secrets: &[&str]) -> bool {
        record.status.is_successful()
            && record.job_name == self.job_name
            && record
                .params
                .iter()
                .filter(|(name, _)| !secrets.contains(&name.as_str()))
                .map(|(name, value)| (name.as_str(), value.as_str()))
                .eq(self.params.iter().map(|(name, value)| (name.as_str(), value.as_str())))
    }
}

impl fmt::Display for RequiredBuild {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.job_name)?;
        if !self.params.is_empty() {
            let params = self
                .params
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>();
            write!(f, "[{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// Expand `params` into the Cartesian product of their values.
///
/// Without parameters there is exactly one empty assignment. A parameter without any value
/// yields no assignment at all. Cells are ordered with the last parameter varying fastest.
pub fn expand_matrix(params: &[JobParam]) -> Vec<BTreeMap<String, String>> {
    let mut cells = vec![BTreeMap::new()];
    for param in params {
        cells = cells
            .into_iter()
            .flat_map(|cell| {
                param.values.iter().map(move |value| {
                    let mut cell = cell.clone();
                    cell.insert(param.name.clone(), value.clone());
                    cell
                })
            })
            .collect();
    }
    cells
}

/// Decides whether branch updates are blocked by missing successful builds.
#[derive(Clone, Copy)]
pub struct BuildRequirementEvaluator<'a> {
    specs: &'a dyn CiSpecResolver,
    builds: &'a dyn BuildHistory,
    project: &'a str,
    ci_spec_path: &'a str,
}

impl<'a> BuildRequirementEvaluator<'a> {
    /// Create an evaluator reading specifications from `specs` and builds of `project` from `builds`.
    pub fn new(specs: &'a dyn CiSpecResolver, builds: &'a dyn BuildHistory, project: &'a str) -> Self {
        Self {
            specs,
            builds,
            project,
            ci_spec_path: DEFAULT_CI_SPEC_PATH,
        }
    }

    /// Use `path` as location of the CI specification, which is exempt from any requirement.
    pub fn with_ci_spec_path(mut self, path: &'a str) -> Self {
        self.ci_spec_path = path;
        self
    }

    /// Builds that must have succeeded at `new` before `branch` may move from `old` to `new`,
    /// but did not.
    ///
    /// Nothing is required if `changed_files` touch the CI specification itself, if there is no
    /// specification, or if it can not be parsed.
    pub fn missing_builds(
        &self,
        branch: &str,
        old: ObjectId,
        new: ObjectId,
        changed_files: &[String],
    ) -> Result<Vec<RequiredBuild>, Error> {
        if changed_files.iter().any(|path| path == self.ci_spec_path) {
            gix_trace::debug!("'{}' changes the CI specification, no builds required", branch);
            return Ok(Vec::new());
        }
        let spec_commit = if old.is_null() { new } else { old };
        let Some(spec) = self.spec_at(spec_commit)? else {
            return Ok(Vec::new());
        };

        let mut required = Vec::new();
        for job in &spec.jobs {
            for params in job.triggers.iter().filter_map(|trigger| trigger.rejecting_params(branch)) {
                let secrets: Vec<&str> = params.iter().filter(|p| p.secret).map(|p| p.name.as_str()).collect();
                let cells = expand_matrix(params);
                if cells.is_empty() {
                    gix_trace::warn!("job '{}' has a parameter without values and requires no build", job.name);
                }
                for cell in cells {
                    let cell = RequiredBuild {
                        job_name: job.name.clone(),
                        params: cell
                            .into_iter()
                            .filter(|(name, _)| !secrets.contains(&name.as_str()))
                            .collect(),
                    };
                    required.push((cell, secrets.clone()));
                }
            }
        }
        if required.is_empty() {
            return Ok(Vec::new());
        }

        let records = self.builds.query(self.project, &new)?;
        let mut missing: Vec<RequiredBuild> = Vec::new();
        for (cell, secrets) in required {
            if !missing.contains(&cell) && !records.iter().any(|record| cell.is_satisfied_by(record, &secrets)) {
                missing.push(cell);
            }
        }
        Ok(missing)
    }

    /// Return true if moving `branch` from `old` to `new` must wait for successful builds.
    pub fn is_build_required(
        &self,
        branch: &str,
        old: ObjectId,
        new: ObjectId,
        changed_files: &[String],
    ) -> Result<bool, Error> {
        Ok(!self.missing_builds(branch, old, new, changed_files)?.is_empty())
    }

    /// Return true if editing `file` directly on `branch`, whose head is `head`, would bypass a
    /// build requirement.
    ///
    /// Such edits create a commit that was never built, so any rejecting trigger for the branch
    /// requires the change to go through a pull request. The CI specification itself is exempt.
    pub fn is_build_required_for_modification(&self, branch: &str, head: ObjectId, file: &str) -> Result<bool, Error> {
        if file == self.ci_spec_path {
            return Ok(false);
        }
        let Some(spec) = self.spec_at(head)? else {
            return Ok(false);
        };
        Ok(spec
            .jobs
            .iter()
            .flat_map(|job| &job.triggers)
            .any(|trigger| trigger.rejecting_params(branch).is_some()))
    }

    fn spec_at(&self, commit: ObjectId) -> Result<Option<CiSpec>, Error> {
        match self.specs.resolve(&commit) {
            Ok(spec) => Ok(spec),
            Err(err) if matches!(err, Error::SpecParse { .. }) => {
                gix_trace::warn!("ignoring build requirements: {}", err);
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }
}

impl fmt::Debug for BuildRequirementEvaluator<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildRequirementEvaluator")
            .field("project", &self.project)
            .field("ci_spec_path", &self.ci_spec_path)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::memory::InMemoryFacts;
    use pretty_assertions::assert_eq;

    fn oid(suffix: u8) -> ObjectId {
        let mut bytes = [0u8; 20];
        bytes[19] = suffix;
        ObjectId::from_bytes_or_panic(&bytes)
    }

    fn matrix_spec() -> CiSpec {
        CiSpec {
            jobs: vec![Job::new("ci").with_trigger(
                JobTrigger::branch_update(None, true)
                    .with_param(JobParam::new("os", ["linux", "macos"]))
                    .with_param(JobParam::new("toolchain", ["stable", "beta", "nightly"])),
            )],
        }
    }

    fn all_cells_successful(mut facts: InMemoryFacts, commit: ObjectId) -> InMemoryFacts {
        for os in ["linux", "macos"] {
            for toolchain in ["stable", "beta", "nightly"] {
                facts = facts.with_builds(
                    "p",
                    commit,
                    [BuildRecord::new("ci", BuildStatus::Successful)
                        .with_param("os", os)
                        .with_param("toolchain", toolchain)],
                );
            }
        }
        facts
    }

    #[test]
    fn matrix_is_the_cartesian_product() {
        let cells = expand_matrix(&[JobParam::new("a", ["1", "2"]), JobParam::new("b", ["x", "y", "z"])]);
        assert_eq!(cells.len(), 6);
        assert_eq!(cells[0], BTreeMap::from([("a".into(), "1".into()), ("b".into(), "x".into())]));
        assert_eq!(cells[5], BTreeMap::from([("a".into(), "2".into()), ("b".into(), "z".into())]));

        assert_eq!(expand_matrix(&[]), vec![BTreeMap::new()]);
        assert!(expand_matrix(&[JobParam::new("a", Vec::<String>::new())]).is_empty());
    }

    #[test]
    fn every_cell_needs_a_successful_build() {
        let facts = InMemoryFacts::default().with_ci_spec(oid(1), matrix_spec());
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        assert_eq!(evaluator.missing_builds("main", oid(1), oid(2), &[]).unwrap().len(), 6);

        let facts = all_cells_successful(facts, oid(2));
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        assert!(!evaluator.is_build_required("main", oid(1), oid(2), &[]).unwrap());
    }

    #[test]
    fn one_failed_cell_blocks() {
        let facts = InMemoryFacts::default()
            .with_ci_spec(oid(1), matrix_spec())
            .with_builds(
                "p",
                oid(2),
                [BuildRecord::new("ci", BuildStatus::Failed)
                    .with_param("os", "macos")
                    .with_param("toolchain", "nightly")],
            );
        let mut facts = all_cells_successful(facts, oid(9));
        facts = facts.with_builds(
            "p",
            oid(2),
            [BuildRecord::new("ci", BuildStatus::Successful)
                .with_param("os", "linux")
                .with_param("toolchain", "stable")],
        );
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        let missing = evaluator.missing_builds("main", oid(1), oid(2), &[]).unwrap();
        assert_eq!(missing.len(), 5);
        assert_eq!(missing[4].to_string(), "ci[os=macos, toolchain=nightly]");
    }

    #[test]
    fn cells_required_by_several_triggers_are_listed_once() {
        let os = || JobParam::new("os", ["linux", "mac"]);
        let spec = CiSpec {
            jobs: vec![Job::new("ci")
                .with_trigger(JobTrigger::branch_update(None, true).with_param(os()))
                .with_trigger(
                    JobTrigger::branch_update(Some(PatternSet::parse("main").unwrap()), true).with_param(os()),
                )],
        };
        let facts = InMemoryFacts::default().with_ci_spec(oid(1), spec);
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        let missing: Vec<_> = evaluator
            .missing_builds("main", oid(1), oid(2), &[])
            .unwrap()
            .iter()
            .map(ToString::to_string)
            .collect();
        assert_eq!(missing, ["ci[os=linux]", "ci[os=mac]"]);
    }

    #[test]
    fn only_settled_builds_are_finished() {
        for status in [BuildStatus::Running, BuildStatus::Waiting, BuildStatus::Queued] {
            assert!(!status.is_finished(), "{status:?}");
        }
        for status in [
            BuildStatus::Successful,
            BuildStatus::Failed,
            BuildStatus::Error,
            BuildStatus::Cancelled,
            BuildStatus::TimedOut,
        ] {
            assert!(status.is_finished(), "{status:?}");
        }
        assert!(!BuildStatus::Running.is_successful());
    }

    #[test]
    fn secret_params_are_ignored_when_matching() {
        let spec = CiSpec {
            jobs: vec![Job::new("deploy").with_trigger(
                JobTrigger::branch_update(None, true)
                    .with_param(JobParam::new("target", ["prod"]))
                    .with_param(JobParam::new("token", ["current-token"]).secret()),
            )],
        };
        let facts = InMemoryFacts::default().with_ci_spec(oid(1), spec).with_builds(
            "p",
            oid(2),
            [BuildRecord::new("deploy", BuildStatus::Successful)
                .with_param("target", "prod")
                .with_param("token", "token-of-last-week")],
        );
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        assert!(!evaluator.is_build_required("main", oid(1), oid(2), &[]).unwrap());
    }

    #[test]
    fn non_rejecting_or_unmatched_triggers_require_nothing() {
        let spec = CiSpec {
            jobs: vec![
                Job::new("lint").with_trigger(JobTrigger::branch_update(None, false)),
                Job::new("release").with_trigger(JobTrigger::branch_update(Some(PatternSet::parse("release/*").unwrap()), true)),
                Job::new("tags").with_trigger(JobTrigger::TagCreate {
                    tags: None,
                    params: Vec::new(),
                }),
            ],
        };
        let facts = InMemoryFacts::default().with_ci_spec(oid(1), spec);
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        assert!(!evaluator.is_build_required("main", oid(1), oid(2), &[]).unwrap());
        assert_eq!(
            evaluator.missing_builds("release/1.0", oid(1), oid(2), &[]).unwrap(),
            vec![RequiredBuild {
                job_name: "release".into(),
                params: BTreeMap::new(),
            }]
        );
    }

    #[test]
    fn changing_the_ci_spec_is_exempt() {
        let facts = InMemoryFacts::default().with_ci_spec(oid(1), matrix_spec());
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        let files = vec!["src/lib.rs".to_owned(), DEFAULT_CI_SPEC_PATH.to_owned()];
        assert!(!evaluator.is_build_required("main", oid(1), oid(2), &files).unwrap());

        assert!(evaluator.is_build_required_for_modification("main", oid(1), "src/lib.rs").unwrap());
        assert!(!evaluator
            .is_build_required_for_modification("main", oid(1), DEFAULT_CI_SPEC_PATH)
            .unwrap());

        let evaluator = evaluator.with_ci_spec_path("ci/spec.yml");
        assert!(!evaluator.is_build_required_for_modification("main", oid(1), "ci/spec.yml").unwrap());
        assert!(evaluator.is_build_required("main", oid(1), oid(2), &files).unwrap());
    }

    #[test]
    fn spec_is_read_at_the_old_commit_or_new_one_on_creation() {
        let facts = InMemoryFacts::default().with_ci_spec(oid(2), matrix_spec());
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        assert!(!evaluator.is_build_required("main", oid(1), oid(2), &[]).unwrap());
        let null = ObjectId::null(gix_hash::Kind::Sha1);
        assert!(evaluator.is_build_required("main", null, oid(2), &[]).unwrap());
    }

    #[test]
    fn malformed_spec_fails_open_but_collaborator_errors_do_not() {
        let facts = InMemoryFacts::default().with_malformed_ci_spec(oid(1), "unexpected key 'jbos'");
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        assert!(!evaluator.is_build_required("main", oid(1), oid(2), &[]).unwrap());
        assert!(!evaluator.is_build_required_for_modification("main", oid(1), "a").unwrap());

        let facts = InMemoryFacts::default()
            .with_ci_spec(oid(1), matrix_spec())
            .with_failing("builds");
        let evaluator = BuildRequirementEvaluator::new(&facts, &facts, "p");
        assert!(evaluator.is_build_required("main", oid(1), oid(2), &[]).is_err());
    }
}
