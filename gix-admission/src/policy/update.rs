use gix_hash::ObjectId;

use crate::model::RefName;

/// A single ref update as requested by a push.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RefUpdate {
    /// Create a new reference pointing at `new`.
    Create { new: ObjectId, name: RefName },
    /// Move an existing reference from `old` to `new`.
    Update { old: ObjectId, new: ObjectId, name: RefName },
    /// Delete an existing reference which pointed at `old`.
    Delete { old: ObjectId, name: RefName },
}

impl RefUpdate {
    /// Classify the move of `name` from `old` to `new`, where a null id means the ref does not
    /// exist on that side.
    ///
    /// Returns `None` if nothing changes.
    pub fn from_oids(name: RefName, old: ObjectId, new: ObjectId) -> Option<Self> {
        match (old.is_null(), new.is_null()) {
            _ if old == new => None,
            (true, true) => None,
            (true, false) => Some(RefUpdate::Create { new, name }),
            (false, true) => Some(RefUpdate::Delete { old, name }),
            (false, false) => Some(RefUpdate::Update { old, new, name }),
        }
    }

    /// The reference targeted by this update.
    pub fn name(&self) -> &RefName {
        match self {
            RefUpdate::Create { name, .. } | RefUpdate::Update { name, .. } | RefUpdate::Delete { name, .. } => name,
        }
    }

    /// The previous target, null for creations.
    pub fn old(&self) -> ObjectId {
        match self {
            RefUpdate::Create { new, .. } => ObjectId::null(new.kind()),
            RefUpdate::Update { old, .. } | RefUpdate::Delete { old, .. } => *old,
        }
    }

    /// The new target, null for deletions.
    pub fn new(&self) -> ObjectId {
        match self {
            RefUpdate::Delete { old, .. } => ObjectId::null(old.kind()),
            RefUpdate::Create { new, .. } | RefUpdate::Update { new, .. } => *new,
        }
    }
}
