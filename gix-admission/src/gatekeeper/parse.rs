//! The textual form of gatekeepers as found in configuration files.
//!
//! ```text
//! gatekeeper := name '(' [arg (',' arg)*] ')'
//! arg        := gatekeeper | '"' text '"' | text
//! ```
//!
//! Known gatekeepers are `quorum(<team>[, veto][, submitter])`, `approver(<principal>)`,
//! `files(<patterns>, <exempt principal>)`, `all(...)`, `any(...)` and `disabled(<gatekeeper>)`.

use std::fmt;
use std::str::FromStr;

use super::{DisapprovalPolicy, GateKeeper, VoteQuorum};
use crate::model::TeamId;
use crate::pattern::PatternSet;
use crate::principal::PrincipalMatcher;
use crate::Error;

enum Arg {
    Call { name: String, args: Vec<(usize, Arg)> },
    Text(String),
}

struct Parser<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    fn rest(&self) -> &'a str {
        &self.input[self.pos..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn skip_whitespace(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    fn error(&self, offset: usize, message: impl Into<String>) -> Error {
        Error::syntax(self.input, offset, message)
    }

    fn expect(&mut self, c: char) -> Result<(), Error> {
        self.skip_whitespace();
        if self.peek() == Some(c) {
            self.pos += c.len_utf8();
            Ok(())
        } else {
            Err(self.error(self.pos, format!("expected '{c}'")))
        }
    }

    fn identifier(&self) -> &'a str {
        let rest = self.rest();
        let end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_' || c == '-'))
            .unwrap_or(rest.len());
        &rest[..end]
    }

    fn call(&mut self) -> Result<Arg, Error> {
        self.skip_whitespace();
        let start = self.pos;
        let name = self.identifier();
        if name.is_empty() {
            return Err(self.error(start, "expected a gatekeeper name"));
        }
        self.pos += name.len();
        self.expect('(')?;

        let mut args = Vec::new();
        self.skip_whitespace();
        if self.peek() == Some(')') {
            self.pos += 1;
            return Ok(Arg::Call {
                name: name.to_owned(),
                args,
            });
        }
        loop {
            self.skip_whitespace();
            args.push(self.arg()?);
            self.skip_whitespace();
            match self.peek() {
                Some(',') => self.pos += 1,
                Some(')') => {
                    self.pos += 1;
                    break;
                }
                _ => return Err(self.error(self.pos, "expected ',' or ')'")),
            }
        }
        Ok(Arg::Call {
            name: name.to_owned(),
            args,
        })
    }

    /// Parse an argument and return it along with the offset of its content.
    fn arg(&mut self) -> Result<(usize, Arg), Error> {
        let start = self.pos;
        if self.peek() == Some('"') {
            let rest = &self.rest()[1..];
            let len = rest
                .find('"')
                .ok_or_else(|| self.error(start, "unterminated quote"))?;
            self.pos += len + 2;
            return Ok((start + 1, Arg::Text(rest[..len].to_owned())));
        }

        let name = self.identifier();
        if !name.is_empty() && self.rest()[name.len()..].trim_start().starts_with('(') {
            return Ok((start, self.call()?));
        }
        let rest = self.rest();
        let end = rest.find([',', ')']).unwrap_or(rest.len());
        let text = rest[..end].trim_end();
        if text.is_empty() {
            return Err(self.error(start, "expected an argument"));
        }
        self.pos += end;
        Ok((start, Arg::Text(text.to_owned())))
    }
}

pub(super) fn parse(input: &str) -> Result<GateKeeper, Error> {
    let mut parser = Parser { input, pos: 0 };
    let call = parser.call()?;
    parser.skip_whitespace();
    if !parser.rest().is_empty() {
        return Err(parser.error(parser.pos, "unexpected trailing input"));
    }
    build(input, 0, call)
}

fn build(input: &str, offset: usize, arg: Arg) -> Result<GateKeeper, Error> {
    let Arg::Call { name, args } = arg else {
        return Err(Error::syntax(input, offset, "expected a gatekeeper"));
    };
    let text = |idx: usize| match args.get(idx) {
        Some((_, Arg::Text(text))) => Ok(text.as_str()),
        Some((at, Arg::Call { .. })) => Err(Error::syntax(input, *at, "expected a plain argument")),
        None => Err(Error::syntax(input, offset, format!("'{name}' expects more arguments"))),
    };
    let arity = |min: usize, max: usize| -> Result<(), Error> {
        if (min..=max).contains(&args.len()) {
            Ok(())
        } else {
            Err(Error::syntax(
                input,
                offset,
                format!("'{name}' takes {min} to {max} arguments, got {}", args.len()),
            ))
        }
    };

    match name.to_ascii_lowercase().as_str() {
        "quorum" => {
            arity(1, 3)?;
            let mut quorum = VoteQuorum::new(TeamId::new(text(0)?));
            for idx in 1..args.len() {
                match text(idx)?.to_ascii_lowercase().as_str() {
                    "veto" => quorum.disapprovals = DisapprovalPolicy::Veto,
                    "submitter" => quorum.count_submitter = true,
                    other => {
                        return Err(Error::syntax(input, args[idx].0, format!("unknown quorum option '{other}'")));
                    }
                }
            }
            Ok(GateKeeper::VoteQuorum(quorum))
        }
        "approver" => {
            arity(1, 1)?;
            Ok(GateKeeper::SpecificApprover {
                approver: nested(input, args[0].0, PrincipalMatcher::parse(text(0)?))?,
            })
        }
        "files" => {
            arity(2, 2)?;
            Ok(GateKeeper::FileRestriction {
                paths: nested(input, args[0].0, PatternSet::parse(text(0)?))?,
                exempt: nested(input, args[1].0, PrincipalMatcher::parse(text(1)?))?,
            })
        }
        "all" | "any" => {
            let children = args
                .into_iter()
                .map(|(at, arg)| build(input, at, arg))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(if name.eq_ignore_ascii_case("all") {
                GateKeeper::All(children)
            } else {
                GateKeeper::Any(children)
            })
        }
        "disabled" => {
            arity(1, 1)?;
            let (at, arg) = args.into_iter().next().ok_or_else(|| Error::syntax(input, offset, "missing argument"))?;
            Ok(GateKeeper::Disabled(Box::new(build(input, at, arg)?)))
        }
        _ => Err(Error::syntax(input, offset, format!("unknown gatekeeper '{name}'"))),
    }
}

/// Re-anchor a syntax error of a nested expression to the full input.
fn nested<T>(input: &str, at: usize, result: Result<T, Error>) -> Result<T, Error> {
    result.map_err(|err| match err {
        Error::Syntax { offset, message, .. } => Error::syntax(input, at + offset, message),
        other => other,
    })
}

impl FromStr for GateKeeper {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse(s)
    }
}

impl GateKeeper {
    /// Parse a gatekeeper expression like `all(quorum(core), files("docs/**", team:writers))`.
    pub fn parse(input: &str) -> Result<Self, Error> {
        parse(input)
    }
}

fn quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    if text.contains(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')' | '"')) {
        write!(f, "\"{text}\"")
    } else {
        f.write_str(text)
    }
}

fn list(f: &mut fmt::Formatter<'_>, name: &str, children: &[GateKeeper]) -> fmt::Result {
    write!(f, "{name}(")?;
    for (idx, child) in children.iter().enumerate() {
        if idx > 0 {
            f.write_str(", ")?;
        }
        write!(f, "{child}")?;
    }
    f.write_str(")")
}

impl fmt::Display for GateKeeper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateKeeper::VoteQuorum(quorum) => {
                f.write_str("quorum(")?;
                quoted(f, quorum.team.as_str())?;
                if quorum.disapprovals == DisapprovalPolicy::Veto {
                    f.write_str(", veto")?;
                }
                if quorum.count_submitter {
                    f.write_str(", submitter")?;
                }
                f.write_str(")")
            }
            GateKeeper::SpecificApprover { approver } => {
                f.write_str("approver(")?;
                quoted(f, &approver.to_string())?;
                f.write_str(")")
            }
            GateKeeper::FileRestriction { paths, exempt } => {
                f.write_str("files(")?;
                quoted(f, &paths.to_string())?;
                f.write_str(", ")?;
                quoted(f, &exempt.to_string())?;
                f.write_str(")")
            }
            GateKeeper::All(children) => list(f, "all", children),
            GateKeeper::Any(children) => list(f, "any", children),
            GateKeeper::Disabled(inner) => write!(f, "disabled({inner})"),
        }
    }
}
