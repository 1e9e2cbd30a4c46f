//! An in-memory implementation of every collaborator, for tests and small embeddings.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};

use gix_hash::ObjectId;

use super::{ActorDirectory, BuildHistory, ChangeQuery, CiSpecResolver, DescendantQuery, RefDirectory, TeamDirectory};
use crate::build::{BuildRecord, CiSpec};
use crate::model::{ActorId, Team, TeamId};
use crate::Error;

/// Facts held in plain collections.
///
/// Commits without recorded parents are roots. Collaborators can be switched into failure modes
/// to exercise the engine's error handling.
#[derive(Debug, Clone, Default)]
pub struct InMemoryFacts {
    teams: BTreeMap<TeamId, Team>,
    parents: HashMap<ObjectId, Vec<ObjectId>>,
    ci_specs: HashMap<ObjectId, Result<CiSpec, String>>,
    builds: HashMap<(String, ObjectId), Vec<BuildRecord>>,
    changes: HashMap<(ObjectId, ObjectId), Vec<String>>,
    branches: BTreeMap<String, ObjectId>,
    ancestry_unavailable: bool,
    failing: BTreeSet<&'static str>,
}

impl InMemoryFacts {
    /// Add or replace `team`.
    pub fn with_team(mut self, team: Team) -> Self {
        self.teams.insert(team.id.clone(), team);
        self
    }

    /// Mutable access to a team, e.g. to change its membership.
    pub fn team_mut(&mut self, team: &TeamId) -> Option<&mut Team> {
        self.teams.get_mut(team)
    }

    /// Remove a team entirely.
    pub fn remove_team(&mut self, team: &TeamId) -> Option<Team> {
        self.teams.remove(team)
    }

    /// Record `commit` with its `parents`.
    pub fn with_commit(mut self, commit: ObjectId, parents: impl IntoIterator<Item = ObjectId>) -> Self {
        self.parents.insert(commit, parents.into_iter().collect());
        self
    }

    /// Store `spec` as CI specification at `commit`.
    pub fn with_ci_spec(mut self, commit: ObjectId, spec: CiSpec) -> Self {
        self.ci_specs.insert(commit, Ok(spec));
        self
    }

    /// Make the CI specification at `commit` fail to parse with `message`.
    pub fn with_malformed_ci_spec(mut self, commit: ObjectId, message: impl Into<String>) -> Self {
        self.ci_specs.insert(commit, Err(message.into()));
        self
    }

    /// Record builds of `project` against `commit`.
    pub fn with_builds(
        mut self,
        project: impl Into<String>,
        commit: ObjectId,
        records: impl IntoIterator<Item = BuildRecord>,
    ) -> Self {
        self.builds.entry((project.into(), commit)).or_default().extend(records);
        self
    }

    /// Record the files changed from `old` to `new`.
    pub fn with_changes(mut self, old: ObjectId, new: ObjectId, files: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.changes.insert((old, new), files.into_iter().map(Into::into).collect());
        self
    }

    /// Point `branch` at `head`.
    pub fn with_branch(mut self, branch: impl Into<String>, head: ObjectId) -> Self {
        self.branches.insert(branch.into(), head);
        self
    }

    /// Make every ancestry query fail with [`Error::AncestryUnavailable`].
    pub fn with_ancestry_unavailable(mut self) -> Self {
        self.ancestry_unavailable = true;
        self
    }

    /// Make the collaborator called `name` fail unexpectedly.
    ///
    /// Names are `teams`, `actors`, `ancestry`, `ci specs`, `builds`, `changes` and `refs`.
    pub fn with_failing(mut self, name: &'static str) -> Self {
        self.failing.insert(name);
        self
    }

    fn check(&self, name: &'static str) -> Result<(), Error> {
        if self.failing.contains(name) {
            Err(Error::collaborator(name, "injected failure"))
        } else {
            Ok(())
        }
    }

    fn children(&self) -> HashMap<ObjectId, Vec<ObjectId>> {
        let mut children: HashMap<ObjectId, Vec<ObjectId>> = HashMap::new();
        for (commit, parents) in &self.parents {
            for parent in parents {
                children.entry(*parent).or_default().push(*commit);
            }
        }
        children
    }
}

impl TeamDirectory for InMemoryFacts {
    fn resolve(&self, team: &TeamId) -> Result<Option<Team>, Error> {
        self.check("teams")?;
        Ok(self.teams.get(team).cloned())
    }
}

impl ActorDirectory for InMemoryFacts {
    fn membership_of(&self, actor: &ActorId) -> Result<BTreeSet<TeamId>, Error> {
        self.check("actors")?;
        Ok(self
            .teams
            .values()
            .filter(|team| team.contains(actor))
            .map(|team| team.id.clone())
            .collect())
    }
}

impl DescendantQuery for InMemoryFacts {
    fn is_descendant(&self, commit: &ObjectId, ancestor: &ObjectId) -> Result<bool, Error> {
        self.check("ancestry")?;
        if self.ancestry_unavailable {
            return Err(Error::AncestryUnavailable {
                commit: *commit,
                ancestor: *ancestor,
                message: "commit graph is not available".into(),
            });
        }
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([*commit]);
        while let Some(current) = queue.pop_front() {
            if current == *ancestor {
                return Ok(true);
            }
            if seen.insert(current) {
                queue.extend(self.parents.get(&current).into_iter().flatten().copied());
            }
        }
        Ok(false)
    }

    fn descendants_of(&self, commits: &[ObjectId]) -> Result<BTreeSet<ObjectId>, Error> {
        self.check("ancestry")?;
        if self.ancestry_unavailable {
            let commit = commits.first().copied().unwrap_or_else(|| ObjectId::null(gix_hash::Kind::Sha1));
            return Err(Error::AncestryUnavailable {
                commit,
                ancestor: commit,
                message: "commit graph is not available".into(),
            });
        }
        let children = self.children();
        let mut out = BTreeSet::new();
        let mut queue: VecDeque<ObjectId> = commits.iter().copied().collect();
        while let Some(current) = queue.pop_front() {
            for child in children.get(&current).into_iter().flatten() {
                if out.insert(*child) {
                    queue.push_back(*child);
                }
            }
        }
        for commit in commits {
            out.remove(commit);
        }
        Ok(out)
    }
}

impl CiSpecResolver for InMemoryFacts {
    fn resolve(&self, commit: &ObjectId) -> Result<Option<CiSpec>, Error> {
        self.check("ci specs")?;
        match self.ci_specs.get(commit) {
            None => Ok(None),
            Some(Ok(spec)) => Ok(Some(spec.clone())),
            Some(Err(message)) => Err(Error::SpecParse {
                commit: *commit,
                message: message.clone(),
            }),
        }
    }
}

impl BuildHistory for InMemoryFacts {
    fn query(&self, project: &str, commit: &ObjectId) -> Result<Vec<BuildRecord>, Error> {
        self.check("builds")?;
        Ok(self
            .builds
            .get(&(project.to_owned(), *commit))
            .cloned()
            .unwrap_or_default())
    }
}

impl ChangeQuery for InMemoryFacts {
    fn changed_files(&self, old: &ObjectId, new: &ObjectId) -> Result<Vec<String>, Error> {
        self.check("changes")?;
        Ok(self.changes.get(&(*old, *new)).cloned().unwrap_or_default())
    }
}

impl RefDirectory for InMemoryFacts {
    fn branches(&self) -> Result<Vec<(String, ObjectId)>, Error> {
        self.check("refs")?;
        Ok(self.branches.iter().map(|(name, head)| (name.clone(), *head)).collect())
    }
}
