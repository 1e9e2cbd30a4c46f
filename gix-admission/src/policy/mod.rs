//! Branch and tag protection.
//!
//! A push is judged by the first rule matching the pushing actor and the ref, in this order:
//! 1. deletion, if the rule prevents deletion
//! 2. creation, if the rule prevents creation
//! 3. non-fast-forward branch updates or any tag update, if the rule prevents forced updates
//! 4. file restrictions and the rule's gatekeeper, combined with [`CheckResult::all()`]. A
//!    fast-forward skips the gatekeeper if the rule does not review fast-forwards.
//!
//! [`CheckResult::all()`]: crate::CheckResult::all()

mod ff;
mod rule;
mod set;
mod update;

pub use ff::is_fast_forward;
pub use rule::ProtectionRule;
pub use set::ProtectionRuleSet;
pub use update::RefUpdate;
