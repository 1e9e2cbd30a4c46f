//! Error taxonomy for admission checks.
//!
//! Only two conditions are tolerated leniently by the engine itself: a team that no longer
//! exists (the quorum gate stays pending) and an unparsable CI specification (the build
//! requirement is considered satisfied). Ancestry failures become an `Unknown` check result.
//! Everything else is handed back to the caller as a hard failure of the whole check.

use gix_hash::ObjectId;

use crate::model::{PullRequestId, TeamId, UpdateId};

/// Boxed error produced by a collaborator implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Stable high-level error classification for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A referenced team or rule no longer exists.
    Configuration,
    /// A CI specification could not be parsed.
    SpecParse,
    /// Commit ancestry could not be determined.
    Ancestry,
    /// Caller-supplied input violates a data-model invariant or cannot be parsed.
    Validation,
    /// A collaborator failed unexpectedly.
    Collaborator,
}

impl ErrorKind {
    /// Returns true if the engine absorbs this kind of error instead of failing the check.
    pub fn is_tolerated(self) -> bool {
        match self {
            ErrorKind::Configuration | ErrorKind::SpecParse | ErrorKind::Ancestry => true,
            ErrorKind::Validation | ErrorKind::Collaborator => false,
        }
    }
}

/// Error type for operations provided by this crate.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A gatekeeper refers to a team that can not be resolved.
    #[error("team '{team}' does not exist")]
    TeamNotFound { team: TeamId },

    /// The CI specification at a commit is malformed.
    #[error("CI specification at {commit} is invalid: {message}")]
    SpecParse { commit: ObjectId, message: String },

    /// The commit graph can not answer a containment query.
    #[error("ancestry between {commit} and {ancestor} is unavailable: {message}")]
    AncestryUnavailable {
        commit: ObjectId,
        ancestor: ObjectId,
        message: String,
    },

    /// A vote was cast against an update that does not belong to the pull request.
    #[error("update {update} does not belong to pull request {request}")]
    UnknownUpdate { request: PullRequestId, update: UpdateId },

    /// A configuration value could not be interpreted.
    #[error("invalid value for '{key}': {message}")]
    InvalidConfig { key: String, message: String },

    /// A gatekeeper, principal or pattern expression is malformed.
    #[error("syntax error at offset {offset} in '{input}': {message}")]
    Syntax {
        input: String,
        offset: usize,
        message: String,
    },

    /// A collaborator failed in a way the engine does not know how to tolerate.
    #[error("{collaborator} failed")]
    Collaborator {
        collaborator: &'static str,
        #[source]
        source: BoxError,
    },
}

impl Error {
    /// Fast classification helper returning a stable error kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::TeamNotFound { .. } => ErrorKind::Configuration,
            Error::SpecParse { .. } => ErrorKind::SpecParse,
            Error::AncestryUnavailable { .. } => ErrorKind::Ancestry,
            Error::UnknownUpdate { .. } | Error::InvalidConfig { .. } | Error::Syntax { .. } => {
                ErrorKind::Validation
            }
            Error::Collaborator { .. } => ErrorKind::Collaborator,
        }
    }

    /// Wrap an arbitrary collaborator failure.
    pub fn collaborator(collaborator: &'static str, source: impl Into<BoxError>) -> Self {
        Error::Collaborator {
            collaborator,
            source: source.into(),
        }
    }

    pub(crate) fn invalid_config(key: impl Into<String>, message: impl Into<String>) -> Self {
        Error::InvalidConfig {
            key: key.into(),
            message: message.into(),
        }
    }

    pub(crate) fn syntax(input: &str, offset: usize, message: impl Into<String>) -> Self {
        Error::Syntax {
            input: input.to_owned(),
            offset,
            message: message.into(),
        }
    }
}

/// Result type alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
