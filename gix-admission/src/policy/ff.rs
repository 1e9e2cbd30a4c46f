//! Fast-forward detection.

use gix_hash::ObjectId;

use crate::facts::DescendantQuery;
use crate::Error;

/// Check if `new` is a fast-forward of `old`.
///
/// # Fast-forward rules
/// * If `old == new` → true (no change)
/// * If `old` is null → true (creation)
/// * If `new` is null → true (deletion, judged by deletion rules instead)
/// * Otherwise `new` has to descend from `old`.
///
/// Ancestry failures are passed on, callers decide how to treat [`Error::AncestryUnavailable`].
pub fn is_fast_forward(old: ObjectId, new: ObjectId, ancestry: &dyn DescendantQuery) -> Result<bool, Error> {
    if old == new || old.is_null() || new.is_null() {
        return Ok(true);
    }
    ancestry.is_descendant(&new, &old)
}
