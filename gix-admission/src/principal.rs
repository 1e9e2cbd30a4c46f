//! Who a rule or gatekeeper applies to.
//!
//! Expressions are whitespace separated alternatives: `anyone`, `nobody`, `user:<id>` and
//! `team:<id>`, e.g. `user:alice team:release-managers`.

use std::fmt;
use std::str::FromStr;

use crate::facts::TeamDirectory;
use crate::model::{Actor, ActorId, TeamId};
use crate::Error;

/// Matches actors by identity or team membership.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrincipalMatcher {
    Anyone,
    Nobody,
    User(ActorId),
    TeamMember(TeamId),
    AnyOf(Vec<PrincipalMatcher>),
}

impl PrincipalMatcher {
    /// Return true if `actor` is matched.
    pub fn matches(&self, actor: &Actor) -> bool {
        match self {
            PrincipalMatcher::Anyone => true,
            PrincipalMatcher::Nobody => false,
            PrincipalMatcher::User(id) => actor.id == *id,
            PrincipalMatcher::TeamMember(team) => actor.is_member_of(team),
            PrincipalMatcher::AnyOf(matchers) => matchers.iter().any(|m| m.matches(actor)),
        }
    }

    /// The actors this matcher can name explicitly, in declaration and membership order.
    ///
    /// `anyone` can not be enumerated and contributes nobody. Teams that no longer exist are
    /// skipped.
    pub fn candidates(&self, teams: &dyn TeamDirectory) -> Result<Vec<ActorId>, Error> {
        let mut out = Vec::new();
        self.collect_candidates(teams, &mut out)?;
        Ok(out)
    }

    fn collect_candidates(&self, teams: &dyn TeamDirectory, out: &mut Vec<ActorId>) -> Result<(), Error> {
        match self {
            PrincipalMatcher::Anyone | PrincipalMatcher::Nobody => {}
            PrincipalMatcher::User(id) => push_unique(out, id.clone()),
            PrincipalMatcher::TeamMember(team) => match teams.resolve(team) {
                Ok(Some(team)) => {
                    for member in team.members() {
                        push_unique(out, member.clone());
                    }
                }
                Ok(None) | Err(Error::TeamNotFound { .. }) => {
                    gix_trace::warn!("principal refers to missing team '{}'", team);
                }
                Err(err) => return Err(err),
            },
            PrincipalMatcher::AnyOf(matchers) => {
                for matcher in matchers {
                    matcher.collect_candidates(teams, out)?;
                }
            }
        }
        Ok(())
    }

    /// Parse a principal expression.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut alternatives = Vec::new();
        let mut offset = 0;
        for word in input.split_whitespace() {
            let start = input[offset..].find(word).map_or(offset, |pos| offset + pos);
            offset = start + word.len();
            alternatives.push(parse_one(input, start, word)?);
        }
        match alternatives.len() {
            0 => Err(Error::syntax(input, 0, "expected a principal")),
            1 => Ok(alternatives.remove(0)),
            _ => Ok(PrincipalMatcher::AnyOf(alternatives)),
        }
    }
}

fn push_unique(out: &mut Vec<ActorId>, actor: ActorId) {
    if !out.contains(&actor) {
        out.push(actor);
    }
}

fn parse_one(input: &str, offset: usize, word: &str) -> Result<PrincipalMatcher, Error> {
    let lower = word.to_ascii_lowercase();
    match lower.as_str() {
        "anyone" => return Ok(PrincipalMatcher::Anyone),
        "nobody" => return Ok(PrincipalMatcher::Nobody),
        _ => {}
    }
    let (kind, id) = word
        .split_once(':')
        .ok_or_else(|| Error::syntax(input, offset, format!("unknown principal '{word}'")))?;
    if id.is_empty() {
        return Err(Error::syntax(input, offset + kind.len() + 1, "missing identifier"));
    }
    match kind.to_ascii_lowercase().as_str() {
        "user" => Ok(PrincipalMatcher::User(ActorId::new(id))),
        "team" => Ok(PrincipalMatcher::TeamMember(TeamId::new(id))),
        _ => Err(Error::syntax(input, offset, format!("unknown principal kind '{kind}'"))),
    }
}

impl FromStr for PrincipalMatcher {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PrincipalMatcher::parse(s)
    }
}

impl fmt::Display for PrincipalMatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrincipalMatcher::Anyone => f.write_str("anyone"),
            PrincipalMatcher::Nobody => f.write_str("nobody"),
            PrincipalMatcher::User(id) => write!(f, "user:{id}"),
            PrincipalMatcher::TeamMember(team) => write!(f, "team:{team}"),
            PrincipalMatcher::AnyOf(matchers) => {
                for (idx, matcher) in matchers.iter().enumerate() {
                    if idx > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{matcher}")?;
                }
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::memory::InMemoryFacts;
    use crate::model::Team;
    use pretty_assertions::assert_eq;

    #[test]
    fn parse_and_display_round_trip() {
        let matcher = PrincipalMatcher::parse("user:alice  team:core").unwrap();
        assert_eq!(
            matcher,
            PrincipalMatcher::AnyOf(vec![
                PrincipalMatcher::User(ActorId::new("alice")),
                PrincipalMatcher::TeamMember(TeamId::new("core")),
            ])
        );
        assert_eq!(matcher.to_string(), "user:alice team:core");
        assert_eq!(PrincipalMatcher::parse("Anyone").unwrap(), PrincipalMatcher::Anyone);
    }

    #[test]
    fn parse_errors_point_at_the_offending_word() {
        let err = PrincipalMatcher::parse("anyone group:x").unwrap_err();
        assert!(matches!(err, Error::Syntax { offset: 7, .. }), "{err}");
        let err = PrincipalMatcher::parse("user:").unwrap_err();
        assert!(matches!(err, Error::Syntax { offset: 5, .. }), "{err}");
        assert!(PrincipalMatcher::parse("  ").is_err());
    }

    #[test]
    fn matching_uses_identity_and_membership() {
        let alice = Actor::new("alice").with_teams(["core"]);
        let bob = Actor::new("bob");
        assert!(PrincipalMatcher::Anyone.matches(&bob));
        assert!(!PrincipalMatcher::Nobody.matches(&alice));
        assert!(PrincipalMatcher::parse("team:core").unwrap().matches(&alice));
        assert!(!PrincipalMatcher::parse("team:core").unwrap().matches(&bob));
        assert!(PrincipalMatcher::parse("team:core user:bob").unwrap().matches(&bob));
    }

    #[test]
    fn candidates_expand_teams_and_skip_missing_ones() {
        let facts = InMemoryFacts::default().with_team(Team::new("core").with_members(["u1", "u2"]));
        let matcher = PrincipalMatcher::parse("user:u2 team:core team:gone user:u3").unwrap();
        assert_eq!(
            matcher.candidates(&facts).unwrap(),
            vec![ActorId::new("u2"), ActorId::new("u1"), ActorId::new("u3")]
        );
        assert!(PrincipalMatcher::Anyone.candidates(&facts).unwrap().is_empty());
    }

    struct StrictTeams(InMemoryFacts);

    impl TeamDirectory for StrictTeams {
        fn resolve(&self, team: &TeamId) -> Result<Option<Team>, Error> {
            TeamDirectory::resolve(&self.0, team)?
                .map(Some)
                .ok_or_else(|| Error::TeamNotFound { team: team.clone() })
        }
    }

    #[test]
    fn teams_reported_missing_as_errors_are_skipped() {
        let strict = StrictTeams(InMemoryFacts::default().with_team(Team::new("core").with_members(["u1"])));
        let matcher = PrincipalMatcher::parse("team:gone team:core").unwrap();
        assert_eq!(matcher.candidates(&strict).unwrap(), vec![ActorId::new("u1")]);

        let failing = StrictTeams(InMemoryFacts::default().with_failing("teams"));
        assert!(matcher.candidates(&failing).is_err());
    }
}
