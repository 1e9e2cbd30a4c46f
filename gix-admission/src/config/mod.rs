//! Configuration parsing for protection rules and engine options.
//!
//! This module parses Git configuration into the structured types used by the
//! [`AdmissionEngine`](crate::AdmissionEngine).
//!
//! # Configuration Keys
//!
//! ## Engine Options
//! - `admission.ciSpecPath`: Path of the CI specification, `.gix-ci.yml` by default
//!
//! ## Protection Rules
//! Each `[branchProtection "<name>"]` and `[tagProtection "<name>"]` section is one rule. Rules
//! take precedence in the order they appear in the file.
//! - `enabled`: Boolean, `true` by default
//! - `branches` / `tags`: Pattern set of the protected names, required
//! - `principal`: Whom the rule applies to, `anyone` by default
//! - `gatekeeper`: Gatekeeper expression reviewing pull requests and pushes
//! - `fileRestriction`: Gatekeeper expression judging changed files, may be repeated
//! - `preventCreation`, `preventDeletion`: Booleans
//! - `preventForcedPush` (branches) / `preventUpdate` (tags): Booleans
//! - `reviewFastForwards`: Boolean, `true` by default
//!
//! ```text
//! [admission]
//!     ciSpecPath = .ci/spec.yml
//! [branchProtection "release"]
//!     branches = release/*
//!     principal = team:devs
//!     gatekeeper = quorum(core, veto)
//!     fileRestriction = files(docs/**, team:writers)
//!     preventForcedPush = true
//! ```

mod policy;

use gix_config::File;

use crate::engine::{AdmissionEngine, Options};
use crate::facts::Facts;
use crate::policy::ProtectionRuleSet;
use crate::Error;

/// Everything the engine needs that is not a fact.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AdmissionConfig {
    pub rules: ProtectionRuleSet,
    pub options: Options,
}

impl AdmissionConfig {
    /// Load rules and options from a Git configuration file.
    ///
    /// Missing keys fall back to their defaults, while malformed values fail the whole load.
    pub fn from_config(config: &File<'_>) -> Result<Self, Error> {
        let mut options = Options::default();
        if let Some(value) = config.string("admission.ciSpecPath") {
            let path = policy::to_str(&value, "admission.ciSpecPath")?;
            if path.is_empty() {
                return Err(Error::invalid_config("admission.ciSpecPath", "path must not be empty"));
            }
            options.ci_spec_path = path.to_owned();
        }
        Ok(Self {
            rules: policy::rules_from_config(config)?,
            options,
        })
    }

    /// Create an engine applying this configuration to `facts`.
    pub fn into_engine<'a>(self, facts: Facts<'a>) -> AdmissionEngine<'a> {
        AdmissionEngine::new(self.rules, facts).with_options(self.options)
    }
}
