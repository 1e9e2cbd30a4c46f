use crate::gatekeeper::GateKeeper;
use crate::model::Actor;
use crate::pattern::PatternSet;
use crate::principal::PrincipalMatcher;

/// Protection of branches or tags matching `pattern`, for actors matching `principal`.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ProtectionRule {
    /// Used in messages.
    pub name: String,
    pub enabled: bool,
    /// Whom the rule applies to.
    pub principal: PrincipalMatcher,
    /// Which branches or tags the rule applies to.
    pub pattern: PatternSet,
    /// Review required for pull requests and for pushes that are not exempt.
    pub gatekeeper: Option<GateKeeper>,
    /// Gates judging the files that are changed, usually [`GateKeeper::FileRestriction`].
    pub file_restrictions: Vec<GateKeeper>,
    pub prevent_creation: bool,
    pub prevent_deletion: bool,
    /// Prevent non-fast-forward pushes to branches, or any update of tags.
    pub prevent_forced_update: bool,
    /// If false, fast-forward pushes skip the gatekeeper.
    pub review_fast_forwards: bool,
}

impl ProtectionRule {
    /// An enabled rule for everybody without any restriction yet.
    pub fn new(name: impl Into<String>, pattern: PatternSet) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            principal: PrincipalMatcher::Anyone,
            pattern,
            gatekeeper: None,
            file_restrictions: Vec::new(),
            prevent_creation: false,
            prevent_deletion: false,
            prevent_forced_update: false,
            review_fast_forwards: true,
        }
    }

    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn with_principal(mut self, principal: PrincipalMatcher) -> Self {
        self.principal = principal;
        self
    }

    pub fn with_gatekeeper(mut self, gatekeeper: GateKeeper) -> Self {
        self.gatekeeper = Some(gatekeeper);
        self
    }

    pub fn with_file_restriction(mut self, restriction: GateKeeper) -> Self {
        self.file_restrictions.push(restriction);
        self
    }

    pub fn with_prevent_creation(mut self, prevent: bool) -> Self {
        self.prevent_creation = prevent;
        self
    }

    pub fn with_prevent_deletion(mut self, prevent: bool) -> Self {
        self.prevent_deletion = prevent;
        self
    }

    pub fn with_prevent_forced_update(mut self, prevent: bool) -> Self {
        self.prevent_forced_update = prevent;
        self
    }

    pub fn with_review_fast_forwards(mut self, review: bool) -> Self {
        self.review_fast_forwards = review;
        self
    }

    /// Return true if this rule governs `name` when `actor` acts on it.
    pub fn matches(&self, actor: &Actor, name: &str) -> bool {
        self.enabled && self.principal.matches(actor) && self.pattern.matches(name)
    }

    /// The enabled gatekeeper, if any.
    pub(crate) fn enabled_gatekeeper(&self) -> Option<&GateKeeper> {
        self.gatekeeper.as_ref().filter(|gk| gk.is_enabled())
    }

    /// The enabled file restrictions.
    pub(crate) fn enabled_file_restrictions(&self) -> impl Iterator<Item = &GateKeeper> {
        self.file_restrictions.iter().filter(|gk| gk.is_enabled())
    }
}
