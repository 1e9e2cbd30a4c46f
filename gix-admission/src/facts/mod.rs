//! Facts the engine consumes but does not own.
//!
//! Every collaborator is a synchronous, read-only view that the engine treats as a pure function
//! of its inputs at call time. Caching and staleness are the implementor's concern.
//!
//! Implementations report their own failures through [`Error::collaborator()`]. The dedicated
//! variants [`Error::TeamNotFound`], [`Error::SpecParse`] and [`Error::AncestryUnavailable`] are
//! handled leniently by the engine, everything else fails the whole check.

use std::collections::BTreeSet;

use gix_hash::ObjectId;

use crate::build::{BuildRecord, CiSpec};
use crate::gatekeeper::Context;
use crate::model::{Actor, ActorId, Team, TeamId};
use crate::Error;

pub mod memory;

/// Resolves teams by id.
pub trait TeamDirectory {
    /// The current membership of `team`, or `None` if it does not exist.
    ///
    /// Directories that report absence as [`Error::TeamNotFound`] are treated the same.
    fn resolve(&self, team: &TeamId) -> Result<Option<Team>, Error>;
}

/// Resolves the team memberships of actors.
pub trait ActorDirectory {
    /// Teams `actor` currently belongs to.
    fn membership_of(&self, actor: &ActorId) -> Result<BTreeSet<TeamId>, Error>;

    /// A snapshot of `actor` with its current memberships.
    fn actor(&self, actor: &ActorId) -> Result<Actor, Error> {
        Ok(Actor::new(actor.clone()).with_teams(self.membership_of(actor)?))
    }
}

/// Answers containment questions on the commit graph.
pub trait DescendantQuery {
    /// Return true if `commit` is `ancestor` or one of its descendants.
    fn is_descendant(&self, commit: &ObjectId, ancestor: &ObjectId) -> Result<bool, Error>;

    /// All commits that descend from any of `commits`, not including `commits` themselves.
    fn descendants_of(&self, commits: &[ObjectId]) -> Result<BTreeSet<ObjectId>, Error>;
}

/// Locates and parses the CI specification stored at a commit.
pub trait CiSpecResolver {
    /// The specification at `commit`, `None` if there is none, or [`Error::SpecParse`] if it
    /// is malformed.
    fn resolve(&self, commit: &ObjectId) -> Result<Option<CiSpec>, Error>;
}

/// Past and running builds.
pub trait BuildHistory {
    /// All builds of `project` that ran against `commit`.
    fn query(&self, project: &str, commit: &ObjectId) -> Result<Vec<BuildRecord>, Error>;
}

/// Computes changed paths between two commits.
pub trait ChangeQuery {
    /// Paths changed from `old` to `new`. A null `old` compares against the empty tree.
    fn changed_files(&self, old: &ObjectId, new: &ObjectId) -> Result<Vec<String>, Error>;
}

/// Lists the branches of the repository.
pub trait RefDirectory {
    /// All branches by short name, together with their head commit.
    fn branches(&self) -> Result<Vec<(String, ObjectId)>, Error>;

    /// The head commit of `branch`, if it exists.
    fn branch_head(&self, branch: &str) -> Result<Option<ObjectId>, Error> {
        Ok(self
            .branches()?
            .into_iter()
            .find_map(|(name, head)| (name == branch).then_some(head)))
    }
}

/// All collaborators needed by the engine, borrowed for the duration of an evaluation.
#[derive(Clone, Copy)]
pub struct Facts<'a> {
    /// The project whose builds are queried.
    pub project: &'a str,
    pub teams: &'a dyn TeamDirectory,
    pub actors: &'a dyn ActorDirectory,
    pub ancestry: &'a dyn DescendantQuery,
    pub ci_specs: &'a dyn CiSpecResolver,
    pub builds: &'a dyn BuildHistory,
    pub changes: &'a dyn ChangeQuery,
    pub refs: &'a dyn RefDirectory,
}

impl<'a> Facts<'a> {
    /// Use `source` for every collaborator.
    pub fn from_source<S>(project: &'a str, source: &'a S) -> Self
    where
        S: TeamDirectory + ActorDirectory + DescendantQuery + CiSpecResolver + BuildHistory + ChangeQuery + RefDirectory,
    {
        Facts {
            project,
            teams: source,
            actors: source,
            ancestry: source,
            ci_specs: source,
            builds: source,
            changes: source,
            refs: source,
        }
    }

    /// The gatekeeper context for `actor`.
    pub fn context<'b>(&'b self, actor: &'b Actor) -> Context<'b> {
        Context {
            actor,
            teams: self.teams,
            actors: self.actors,
        }
    }
}

impl std::fmt::Debug for Facts<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Facts").field("project", &self.project).finish_non_exhaustive()
    }
}
