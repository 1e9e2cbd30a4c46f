/*!
Admission control for pushes and merges into a git repository.

An [`AdmissionEngine`] decides whether a ref update, a direct file edit or the merge of a pull
request may happen, by consulting
- ordered branch and tag [protection rules](ProtectionRuleSet), where the first rule matching
  the acting user and the name governs exclusively,
- composable [gatekeepers](GateKeeper) such as a vote quorum of a team, a specific approver or
  restrictions on the files that change,
- and the builds a CI specification requires to have succeeded before a branch may move.

Each check yields a [`CheckResult`], which is approved, pending on named actors, disapproved, or
unknown if the commit graph could not answer. Facts like team membership, commit ancestry and
build history are read through the collaborator traits in [`facts`] at call time, the engine
itself keeps no state.

Design principles
- No I/O of its own, every external fact comes through a synchronous collaborator.
- Explicit actors on every call, no ambient current user.
- Lenient only where designed to be: missing teams stay pending, unparsable CI specifications
  require no builds, everything else unexpected fails the check.

## Feature Flags
- `tracing`: emit diagnostics through `tracing` instead of compiling them away.
- `serde`: derive `serde` traits on configuration and data-model types.
*/

#![forbid(unsafe_code)]

pub mod build;
pub mod check;
pub mod config;
pub mod engine;
mod error;
pub mod facts;
pub mod gatekeeper;
pub mod hooks;
pub mod model;
pub mod pattern;
pub mod policy;
pub mod principal;
pub mod vote;

pub use build::{BuildRequirementEvaluator, CiSpec, RequiredBuild};
pub use check::CheckResult;
pub use config::AdmissionConfig;
pub use engine::{AdmissionEngine, Options};
pub use error::{BoxError, Error, ErrorKind, Result};
pub use facts::Facts;
pub use gatekeeper::{DisapprovalPolicy, GateKeeper, VoteQuorum};
pub use model::{Actor, ActorId, PullRequest, Team, TeamId};
pub use pattern::PatternSet;
pub use policy::{ProtectionRule, ProtectionRuleSet, RefUpdate};
pub use principal::PrincipalMatcher;
pub use vote::VoteResult;
