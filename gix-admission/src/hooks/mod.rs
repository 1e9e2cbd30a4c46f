//! Receive hooks backed by the admission engine.
//!
//! The hook model follows Git's receive-pack:
//! - `pre_receive`: runs once with all ref updates, and rejects the whole push if any is denied
//! - `update`: runs per ref update
//! - `post_receive`: runs once after the refs were updated, and can not affect the outcome
//!
//! Only [`CheckResult::Approved`] admits a ref update. A push can not wait for votes, so
//! pending and unknown results deny it as well, carrying their reason as message.
//!
//! # Examples
//!
//! ```rust
//! use gix_admission::facts::{memory::InMemoryFacts, Facts};
//! use gix_admission::hooks::{AdmissionHook, Hooks};
//! use gix_admission::model::{Actor, RefName};
//! use gix_admission::{AdmissionEngine, ProtectionRule, ProtectionRuleSet, PatternSet, RefUpdate};
//! use gix_hash::ObjectId;
//!
//! let facts = InMemoryFacts::default();
//! let rules = ProtectionRuleSet::new()
//!     .with_branch_rule(ProtectionRule::new("main", PatternSet::parse("main")?).with_prevent_deletion(true));
//! let engine = AdmissionEngine::new(rules, Facts::from_source("project", &facts));
//! let mut hook = AdmissionHook::new(&engine, Actor::new("alice"));
//!
//! let delete = RefUpdate::Delete {
//!     old: ObjectId::from_hex(b"0000000000000000000000000000000000000001")?,
//!     name: RefName::parse("refs/heads/main"),
//! };
//! let decision = hook.update(&delete)?;
//! assert!(!decision.allowed);
//! assert_eq!(decision.message, "deleting branch 'main' is prohibited by protection rule 'main'");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use crate::check::CheckResult;
use crate::engine::AdmissionEngine;
use crate::model::Actor;
use crate::policy::RefUpdate;
use crate::Error;

/// Result of a hook indicating whether to allow or deny the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HookDecision {
    /// Whether the hook allows the operation to proceed.
    pub allowed: bool,
    /// Human-readable message explaining a denial, empty if allowed.
    pub message: String,
}

impl HookDecision {
    /// Create a decision that allows the operation.
    pub fn allow() -> Self {
        Self {
            allowed: true,
            message: String::new(),
        }
    }

    /// Create a decision that denies the operation.
    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: message.into(),
        }
    }
}

impl From<CheckResult> for HookDecision {
    fn from(result: CheckResult) -> Self {
        match result {
            CheckResult::Approved => HookDecision::allow(),
            CheckResult::Pending { reason, .. }
            | CheckResult::Disapproved { reason }
            | CheckResult::Unknown { reason } => HookDecision::deny(reason),
        }
    }
}

/// Hooks invoked while receiving a push.
pub trait Hooks {
    /// Decide on a single ref update before it is applied.
    fn update(&mut self, update: &RefUpdate) -> Result<HookDecision, Error>;

    /// Decide on the whole batch of `updates` before any of them is applied.
    fn pre_receive(&mut self, updates: &[RefUpdate]) -> Result<HookDecision, Error>;

    /// Observe `updates` after they were applied. Does nothing by default.
    fn post_receive(&mut self, _updates: &[RefUpdate]) -> Result<(), Error> {
        Ok(())
    }
}

/// Admits ref updates pushed by `actor` through an [`AdmissionEngine`].
#[derive(Debug, Clone)]
pub struct AdmissionHook<'e, 'a> {
    engine: &'e AdmissionEngine<'a>,
    actor: Actor,
}

impl<'e, 'a> AdmissionHook<'e, 'a> {
    /// Judge pushes of `actor` with `engine`.
    pub fn new(engine: &'e AdmissionEngine<'a>, actor: Actor) -> Self {
        Self { engine, actor }
    }

    /// The pushing actor.
    pub fn actor(&self) -> &Actor {
        &self.actor
    }

    fn check(&self, update: &RefUpdate) -> Result<CheckResult, Error> {
        self.engine
            .check_ref(&self.actor, &update.name().to_string(), update.old(), update.new())
    }
}

impl Hooks for AdmissionHook<'_, '_> {
    fn update(&mut self, update: &RefUpdate) -> Result<HookDecision, Error> {
        Ok(self.check(update)?.into())
    }

    fn pre_receive(&mut self, updates: &[RefUpdate]) -> Result<HookDecision, Error> {
        let mut denials = Vec::new();
        for update in updates {
            let decision = HookDecision::from(self.check(update)?);
            if !decision.allowed {
                denials.push(format!("{}: {}", update.name(), decision.message));
            }
        }
        Ok(if denials.is_empty() {
            HookDecision::allow()
        } else {
            HookDecision::deny(denials.join("\n"))
        })
    }
}
