//! Identities, refs and pull requests as seen by the admission engine.
//!
//! All of these are immutable snapshots supplied by the caller per evaluation, except for
//! [`PullRequest`] which also owns its [`VoteLedger`].

use std::collections::BTreeSet;
use std::fmt;

use gix_hash::ObjectId;

use crate::vote::{VoteLedger, VoteResult};
use crate::Error;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        pub struct $name(String);

        impl $name {
            /// Create a new identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// The identifier as string.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self::new(id)
            }
        }
    };
}

string_id!(
    /// Stable identity of a user.
    ActorId
);
string_id!(
    /// Stable identity of a team.
    TeamId
);

/// Identifies a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PullRequestId(pub u64);

impl fmt::Display for PullRequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Identifies an update of a pull request. Ids grow in creation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct UpdateId(pub u64);

impl fmt::Display for UpdateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A user performing an action, with the team memberships known at call time.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Actor {
    pub id: ActorId,
    pub name: String,
    pub teams: BTreeSet<TeamId>,
}

impl Actor {
    /// Create an actor without team memberships, named after its id.
    pub fn new(id: impl Into<ActorId>) -> Self {
        let id = id.into();
        Self {
            name: id.as_str().to_owned(),
            id,
            teams: BTreeSet::new(),
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add team memberships.
    pub fn with_teams<I, T>(mut self, teams: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<TeamId>,
    {
        self.teams.extend(teams.into_iter().map(Into::into));
        self
    }

    /// Return true if this actor is a member of `team`.
    pub fn is_member_of(&self, team: &TeamId) -> bool {
        self.teams.contains(team)
    }
}

/// A named group of actors. Membership keeps first-seen order and contains no duplicates.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Team {
    pub id: TeamId,
    pub name: String,
    members: Vec<ActorId>,
}

impl Team {
    /// Create an empty team named after its id.
    pub fn new(id: impl Into<TeamId>) -> Self {
        let id = id.into();
        Self {
            name: id.as_str().to_owned(),
            id,
            members: Vec::new(),
        }
    }

    /// Add members, ignoring those that are already present.
    pub fn with_members<I, A>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActorId>,
    {
        for member in members {
            self.add_member(member.into());
        }
        self
    }

    /// Add `member` unless it is already part of the team.
    pub fn add_member(&mut self, member: ActorId) {
        if !self.members.contains(&member) {
            self.members.push(member);
        }
    }

    /// Remove `member`, returning true if it was present.
    pub fn remove_member(&mut self, member: &ActorId) -> bool {
        let before = self.members.len();
        self.members.retain(|m| m != member);
        before != self.members.len()
    }

    /// Members in membership order.
    pub fn members(&self) -> &[ActorId] {
        &self.members
    }

    /// Return true if `actor` is currently a member.
    pub fn contains(&self, actor: &ActorId) -> bool {
        self.members.contains(actor)
    }

    /// Amount of current members.
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Return true if the team has no members.
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

/// The kind of a ref as far as protection rules are concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RefKind {
    Branch,
    Tag,
}

/// A parsed reference name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RefName {
    /// `refs/heads/<name>` or `branch:<name>`.
    Branch(String),
    /// `refs/tags/<name>` or `tag:<name>`.
    Tag(String),
    /// Any other ref, e.g. `refs/notes/commits`. Never protected.
    Other(String),
}

impl RefName {
    /// Parse a full ref name (`refs/heads/main`) or the short `branch:main` / `tag:v1` forms.
    pub fn parse(name: &str) -> Self {
        if let Some(branch) = name.strip_prefix("refs/heads/").or_else(|| name.strip_prefix("branch:")) {
            RefName::Branch(branch.to_owned())
        } else if let Some(tag) = name.strip_prefix("refs/tags/").or_else(|| name.strip_prefix("tag:")) {
            RefName::Tag(tag.to_owned())
        } else {
            RefName::Other(name.to_owned())
        }
    }

    /// The kind of ref, or `None` for refs that are never protected.
    pub fn kind(&self) -> Option<RefKind> {
        match self {
            RefName::Branch(_) => Some(RefKind::Branch),
            RefName::Tag(_) => Some(RefKind::Tag),
            RefName::Other(_) => None,
        }
    }

    /// The name without its namespace, e.g. `main` for `refs/heads/main`.
    pub fn short_name(&self) -> &str {
        match self {
            RefName::Branch(name) | RefName::Tag(name) | RefName::Other(name) => name,
        }
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefName::Branch(name) => write!(f, "refs/heads/{name}"),
            RefName::Tag(name) => write!(f, "refs/tags/{name}"),
            RefName::Other(name) => f.write_str(name),
        }
    }
}

/// A named pointer together with the commit it currently points to.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Ref {
    pub name: RefName,
    pub commit: ObjectId,
}

impl Ref {
    /// A branch ref pointing at `commit`.
    pub fn branch(name: impl Into<String>, commit: ObjectId) -> Self {
        Self {
            name: RefName::Branch(name.into()),
            commit,
        }
    }
}

/// Lifecycle state of a pull request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PullRequestStatus {
    Open,
    Merged,
    Discarded,
}

/// An immutable snapshot of the source branch pushed to a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Update {
    pub id: UpdateId,
    pub head: ObjectId,
    /// Files changed between the merge base and `head`.
    pub changed_files: Vec<String>,
}

/// A request to merge `source` into `target`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PullRequest {
    pub id: PullRequestId,
    pub target: Ref,
    pub source: Ref,
    /// The merge base of source and target.
    pub base: ObjectId,
    pub submitter: ActorId,
    pub status: PullRequestStatus,
    updates: Vec<Update>,
    votes: VoteLedger,
}

impl PullRequest {
    /// Create an open pull request without updates.
    pub fn new(id: PullRequestId, target: Ref, source: Ref, base: ObjectId, submitter: impl Into<ActorId>) -> Self {
        Self {
            id,
            target,
            source,
            base,
            submitter: submitter.into(),
            status: PullRequestStatus::Open,
            updates: Vec::new(),
            votes: VoteLedger::default(),
        }
    }

    /// Record a new update with `head` and the files it changes, returning its id.
    pub fn add_update(&mut self, head: ObjectId, changed_files: impl IntoIterator<Item = impl Into<String>>) -> UpdateId {
        let id = UpdateId(self.updates.last().map_or(1, |u| u.id.0 + 1));
        self.updates.push(Update {
            id,
            head,
            changed_files: changed_files.into_iter().map(Into::into).collect(),
        });
        id
    }

    /// All updates in creation order.
    pub fn updates(&self) -> &[Update] {
        &self.updates
    }

    /// The most recent update, whose votes are the only ones that count.
    pub fn latest_update(&self) -> Option<&Update> {
        self.updates.last()
    }

    /// The name of the target branch.
    pub fn target_branch(&self) -> &str {
        self.target.name.short_name()
    }

    /// Cast or overwrite the vote of `voter` on `update`, returning the previous result.
    pub fn cast_vote(&mut self, update: UpdateId, voter: impl Into<ActorId>, result: VoteResult) -> Result<Option<VoteResult>, Error> {
        self.ensure_update(update)?;
        Ok(self.votes.cast(update, voter.into(), result))
    }

    /// Withdraw the vote of `voter` on `update`, returning it if there was one.
    pub fn withdraw_vote(&mut self, update: UpdateId, voter: &ActorId) -> Result<Option<VoteResult>, Error> {
        self.ensure_update(update)?;
        Ok(self.votes.withdraw(update, voter))
    }

    /// The vote ledger of all updates.
    pub fn votes(&self) -> &VoteLedger {
        &self.votes
    }

    /// Votes cast on the latest update, ordered by voter.
    pub fn latest_votes(&self) -> impl Iterator<Item = (&ActorId, VoteResult)> + '_ {
        self.latest_update()
            .into_iter()
            .flat_map(move |update| self.votes.votes_on(update.id))
    }

    fn ensure_update(&self, update: UpdateId) -> Result<(), Error> {
        if self.updates.iter().any(|u| u.id == update) {
            Ok(())
        } else {
            Err(Error::UnknownUpdate {
                request: self.id,
                update,
            })
        }
    }
}
