//! Name patterns for branches, tags and file paths.
//!
//! A pattern set is written as whitespace separated wildcard patterns, for example
//! `main "release/*" -release/old`:
//! - patterns follow git's wildmatch rules, `*` stops at `/` while `**` crosses it,
//! - a leading `-` turns a pattern into an exclusion,
//! - double quotes keep whitespace inside a pattern,
//! - a trailing `$` anchors a pattern so it does not match children (see below).
//!
//! Matching is child-aware: a pattern matching `release/1.0` also matches `release/1.0/hotfix`,
//! as anything below a protected name is protected as well.

use std::fmt;
use std::str::FromStr;

use bstr::BStr;
use gix_glob::wildmatch;

use crate::Error;

/// A single wildcard pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Pattern {
    text: String,
    anchored: bool,
}

impl Pattern {
    /// Create a child-aware pattern.
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            anchored: false,
        }
    }

    /// Create a pattern that matches whole names only.
    pub fn anchored(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            anchored: true,
        }
    }

    /// Return true if `name` or one of its parents matches.
    pub fn matches(&self, name: &str) -> bool {
        if glob(&self.text, name) {
            return true;
        }
        !self.anchored
            && name
                .match_indices('/')
                .any(|(slash, _)| slash > 0 && glob(&self.text, &name[..slash]))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let needs_quotes = self.text.chars().any(char::is_whitespace) || self.text.starts_with('-');
        if needs_quotes {
            write!(f, "\"{}\"", self.text)?;
        } else {
            f.write_str(&self.text)?;
        }
        if self.anchored {
            f.write_str("$")?;
        }
        Ok(())
    }
}

fn glob(pattern: &str, name: &str) -> bool {
    wildmatch(BStr::new(pattern), BStr::new(name), wildmatch::Mode::NO_MATCH_SLASH_LITERAL)
}

/// A set of included and excluded patterns.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PatternSet {
    includes: Vec<Pattern>,
    excludes: Vec<Pattern>,
}

impl PatternSet {
    /// A set matching every name.
    pub fn any() -> Self {
        Self {
            includes: vec![Pattern::new("**")],
            excludes: Vec::new(),
        }
    }

    /// Parse a pattern set expression.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let mut set = PatternSet::default();
        for token in tokenize(input)? {
            let Token { mut text, exclude } = token;
            let anchored = text.len() > 1 && text.ends_with('$');
            if anchored {
                text.pop();
            }
            let pattern = Pattern { text, anchored };
            if exclude {
                set.excludes.push(pattern);
            } else {
                set.includes.push(pattern);
            }
        }
        Ok(set)
    }

    /// Add an included pattern.
    pub fn include(mut self, pattern: Pattern) -> Self {
        self.includes.push(pattern);
        self
    }

    /// Add an excluded pattern.
    pub fn exclude(mut self, pattern: Pattern) -> Self {
        self.excludes.push(pattern);
        self
    }

    /// Return true if the set contains no pattern at all, and thus matches nothing.
    pub fn is_empty(&self) -> bool {
        self.includes.is_empty() && self.excludes.is_empty()
    }

    /// Return true if `name` is included and not excluded.
    ///
    /// A set of exclusions only includes everything that is not excluded.
    pub fn matches(&self, name: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        let included = self.includes.is_empty() || self.includes.iter().any(|p| p.matches(name));
        included && !self.excludes.iter().any(|p| p.matches(name))
    }
}

impl FromStr for PatternSet {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PatternSet::parse(s)
    }
}

impl fmt::Display for PatternSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered = self
            .includes
            .iter()
            .map(ToString::to_string)
            .chain(self.excludes.iter().map(|p| format!("-{p}")))
            .collect::<Vec<_>>();
        f.write_str(&rendered.join(" "))
    }
}

struct Token {
    text: String,
    exclude: bool,
}

fn tokenize(input: &str) -> Result<Vec<Token>, Error> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();
    while let Some(&(start, c)) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        let mut token = Token {
            text: String::new(),
            exclude: false,
        };
        if c == '-' {
            token.exclude = true;
            chars.next();
        }
        let mut quote_start = None;
        while let Some(&(offset, c)) = chars.peek() {
            match (c, quote_start) {
                ('"', None) => quote_start = Some(offset),
                ('"', Some(_)) => quote_start = None,
                (c, None) if c.is_whitespace() => break,
                (c, _) => token.text.push(c),
            }
            chars.next();
        }
        if let Some(offset) = quote_start {
            return Err(Error::syntax(input, offset, "unterminated quote"));
        }
        if token.text.is_empty() {
            return Err(Error::syntax(input, start, "empty pattern"));
        }
        tokens.push(token);
    }
    Ok(tokens)
}
