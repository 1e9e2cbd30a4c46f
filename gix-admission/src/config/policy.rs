//! Protection rule parsing from Git config.

use bstr::{BStr, ByteSlice};
use gix_config::{file::Section, File};
use gix_config_value::Boolean;

use crate::gatekeeper::GateKeeper;
use crate::model::RefKind;
use crate::pattern::PatternSet;
use crate::policy::{ProtectionRule, ProtectionRuleSet};
use crate::principal::PrincipalMatcher;
use crate::Error;

/// Section name and the keys that differ between branch and tag rules.
struct Layout {
    section: &'static str,
    patterns: &'static str,
    prevent_update: &'static str,
}

fn layout(kind: RefKind) -> Layout {
    match kind {
        RefKind::Branch => Layout {
            section: "branchProtection",
            patterns: "branches",
            prevent_update: "preventForcedPush",
        },
        RefKind::Tag => Layout {
            section: "tagProtection",
            patterns: "tags",
            prevent_update: "preventUpdate",
        },
    }
}

/// Parse all branch and tag protection sections of `config`, keeping their order.
pub(super) fn rules_from_config(config: &File<'_>) -> Result<ProtectionRuleSet, Error> {
    let mut rules = ProtectionRuleSet::new();
    for kind in [RefKind::Branch, RefKind::Tag] {
        let layout = layout(kind);
        let Some(sections) = config.sections_by_name(layout.section) else {
            continue;
        };
        for section in sections {
            let rule = rule_from_section(section, &layout)?;
            gix_trace::debug!("loaded {} rule '{}' for '{}'", layout.section, rule.name, rule.pattern);
            rules = match kind {
                RefKind::Branch => rules.with_branch_rule(rule),
                RefKind::Tag => rules.with_tag_rule(rule),
            };
        }
    }
    Ok(rules)
}

fn rule_from_section(section: &Section<'_>, layout: &Layout) -> Result<ProtectionRule, Error> {
    let name = match section.header().subsection_name() {
        Some(name) if !name.is_empty() => to_str(name, layout.section)?.to_owned(),
        _ => return Err(Error::invalid_config(layout.section, "protection rules need a name")),
    };
    let key = |value_name: &str| format!("{}.{name}.{value_name}", layout.section);

    let patterns = section
        .value(layout.patterns)
        .ok_or_else(|| Error::invalid_config(key(layout.patterns), "missing, the rule would protect nothing"))?;
    let patterns = PatternSet::parse(to_str(&patterns, &key(layout.patterns))?)
        .map_err(|err| Error::invalid_config(key(layout.patterns), err.to_string()))?;

    let mut rule = ProtectionRule::new(name.clone(), patterns);
    if let Some(enabled) = boolean(section, "enabled", &key("enabled"))? {
        rule = rule.with_enabled(enabled);
    }
    if let Some(value) = section.value("principal") {
        let principal = PrincipalMatcher::parse(to_str(&value, &key("principal"))?)
            .map_err(|err| Error::invalid_config(key("principal"), err.to_string()))?;
        rule = rule.with_principal(principal);
    }
    if let Some(value) = section.value("gatekeeper") {
        rule = rule.with_gatekeeper(gatekeeper(&value, &key("gatekeeper"))?);
    }
    for value in section.values("fileRestriction") {
        rule = rule.with_file_restriction(gatekeeper(&value, &key("fileRestriction"))?);
    }
    if let Some(prevent) = boolean(section, "preventCreation", &key("preventCreation"))? {
        rule = rule.with_prevent_creation(prevent);
    }
    if let Some(prevent) = boolean(section, "preventDeletion", &key("preventDeletion"))? {
        rule = rule.with_prevent_deletion(prevent);
    }
    if let Some(prevent) = boolean(section, layout.prevent_update, &key(layout.prevent_update))? {
        rule = rule.with_prevent_forced_update(prevent);
    }
    if let Some(review) = boolean(section, "reviewFastForwards", &key("reviewFastForwards"))? {
        rule = rule.with_review_fast_forwards(review);
    }
    Ok(rule)
}

/// Read a boolean, where a key without value is true as in Git.
fn boolean(section: &Section<'_>, value_name: &str, key: &str) -> Result<Option<bool>, Error> {
    match section.value_implicit(value_name) {
        None => Ok(None),
        Some(None) => Ok(Some(true)),
        Some(Some(value)) => Boolean::try_from(value.as_ref())
            .map(|boolean| Some(boolean.0))
            .map_err(|err| Error::invalid_config(key, format!("invalid boolean value: {err}"))),
    }
}

fn gatekeeper(value: &BStr, key: &str) -> Result<GateKeeper, Error> {
    GateKeeper::parse(to_str(value, key)?).map_err(|err| Error::invalid_config(key, err.to_string()))
}

pub(super) fn to_str<'v>(value: &'v BStr, key: &str) -> Result<&'v str, Error> {
    value
        .to_str()
        .map(str::trim)
        .map_err(|err| Error::invalid_config(key, format!("invalid UTF-8: {err}")))
}
