//! The outcome of evaluating a gatekeeper, a protection rule or a whole admission check.

use std::fmt;

use crate::model::ActorId;

/// Result of a check.
///
/// Every non-approved outcome carries a non-empty, human-readable reason which is shown to
/// users verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CheckResult {
    /// Nothing blocks the action.
    Approved,
    /// The action is blocked until one of `involved` acts, e.g. by voting.
    Pending { reason: String, involved: Vec<ActorId> },
    /// The action is denied.
    Disapproved { reason: String },
    /// A fact needed to decide could not be determined, e.g. commit ancestry.
    Unknown { reason: String },
}

const FALLBACK_REASON: &str = "no reason given";

fn non_empty(reason: String) -> String {
    if reason.trim().is_empty() {
        FALLBACK_REASON.into()
    } else {
        reason
    }
}

impl CheckResult {
    /// A pending result waiting for `involved`.
    pub fn pending(reason: impl Into<String>, involved: impl IntoIterator<Item = ActorId>) -> Self {
        let mut actors = Vec::new();
        for actor in involved {
            if !actors.contains(&actor) {
                actors.push(actor);
            }
        }
        CheckResult::Pending {
            reason: non_empty(reason.into()),
            involved: actors,
        }
    }

    /// A disapproval with `reason`.
    pub fn disapproved(reason: impl Into<String>) -> Self {
        CheckResult::Disapproved {
            reason: non_empty(reason.into()),
        }
    }

    /// An undecidable result with `reason`.
    pub fn unknown(reason: impl Into<String>) -> Self {
        CheckResult::Unknown {
            reason: non_empty(reason.into()),
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, CheckResult::Approved)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, CheckResult::Pending { .. })
    }

    pub fn is_disapproved(&self) -> bool {
        matches!(self, CheckResult::Disapproved { .. })
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, CheckResult::Unknown { .. })
    }

    /// The reason of a non-approved result.
    pub fn reason(&self) -> Option<&str> {
        match self {
            CheckResult::Approved => None,
            CheckResult::Pending { reason, .. }
            | CheckResult::Disapproved { reason }
            | CheckResult::Unknown { reason } => Some(reason),
        }
    }

    /// Actors who can resolve a pending result; empty for all other results.
    pub fn involved(&self) -> &[ActorId] {
        match self {
            CheckResult::Pending { involved, .. } => involved,
            _ => &[],
        }
    }

    /// Combine results that must all pass.
    ///
    /// Any disapproval wins, then any unknown, then pending results are merged into one
    /// with all reasons and the union of involved actors. Nothing at all is an approval.
    pub fn all(results: impl IntoIterator<Item = CheckResult>) -> Self {
        let mut folded = Folded::default();
        for result in results {
            if let CheckResult::Disapproved { .. } = result {
                return result;
            }
            folded.push(result);
        }
        folded
            .unknown()
            .or_else(|| folded.pending())
            .unwrap_or(CheckResult::Approved)
    }

    /// Combine results of which one passing suffices.
    ///
    /// Any approval wins. Only if every result is a disapproval, the reasons are merged into
    /// one disapproval. Otherwise unknown results take precedence over pending ones.
    /// Nothing at all is an approval.
    pub fn any(results: impl IntoIterator<Item = CheckResult>) -> Self {
        let mut folded = Folded::default();
        for result in results {
            if result.is_approved() {
                return result;
            }
            folded.push(result);
        }
        if folded.count == 0 {
            return CheckResult::Approved;
        }
        if folded.disapprovals == folded.count {
            return CheckResult::disapproved(folded.disapproved.join("; "));
        }
        folded
            .unknown()
            .or_else(|| folded.pending())
            .unwrap_or(CheckResult::Approved)
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CheckResult::Approved => f.write_str("approved"),
            CheckResult::Pending { reason, .. } => write!(f, "pending: {reason}"),
            CheckResult::Disapproved { reason } => write!(f, "disapproved: {reason}"),
            CheckResult::Unknown { reason } => write!(f, "unknown: {reason}"),
        }
    }
}

#[derive(Default)]
struct Folded {
    count: usize,
    disapprovals: usize,
    pending_reasons: Vec<String>,
    involved: Vec<ActorId>,
    unknown: Vec<String>,
    disapproved: Vec<String>,
}

impl Folded {
    fn push(&mut self, result: CheckResult) {
        self.count += 1;
        match result {
            CheckResult::Approved => {}
            CheckResult::Pending { reason, involved } => {
                push_unique(&mut self.pending_reasons, reason);
                self.involved.extend(involved);
            }
            CheckResult::Unknown { reason } => push_unique(&mut self.unknown, reason),
            CheckResult::Disapproved { reason } => {
                self.disapprovals += 1;
                push_unique(&mut self.disapproved, reason);
            }
        }
    }

    fn unknown(&self) -> Option<CheckResult> {
        (!self.unknown.is_empty()).then(|| CheckResult::unknown(self.unknown.join("; ")))
    }

    fn pending(&mut self) -> Option<CheckResult> {
        (!self.pending_reasons.is_empty()).then(|| {
            CheckResult::pending(self.pending_reasons.join("; "), std::mem::take(&mut self.involved))
        })
    }
}

fn push_unique(reasons: &mut Vec<String>, reason: String) {
    if !reasons.contains(&reason) {
        reasons.push(reason);
    }
}
