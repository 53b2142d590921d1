//! Row-level change events.

use serde::{Deserialize, Serialize};

use crate::Error;

/// A loosely typed row snapshot.
///
/// Rows cross the subscription boundary as JSON objects; typed
/// consumers deserialize them into their own record structs.
pub type Record = serde_json::Map<String, serde_json::Value>;

/// The kind of change a row underwent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// A new row was created.
    Created,
    /// An existing row was updated.
    Updated,
    /// A row was deleted.
    Deleted,
}

/// One row-level change on a named resource.
///
/// The before/after snapshots follow the change kind: `Created` carries
/// only `after`, `Updated` carries both, `Deleted` carries only
/// `before`. Use the constructors to build well-formed events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// The resource (collection/table) the row belongs to.
    pub resource: String,
    /// The kind of change.
    pub kind: ChangeKind,
    /// Row state before the change, if any.
    pub before: Option<Record>,
    /// Row state after the change, if any.
    pub after: Option<Record>,
}

impl ChangeEvent {
    /// Create an event for a newly created row.
    pub fn created(resource: impl Into<String>, after: Record) -> Self {
        Self {
            resource: resource.into(),
            kind: ChangeKind::Created,
            before: None,
            after: Some(after),
        }
    }

    /// Create an event for an updated row.
    pub fn updated(resource: impl Into<String>, before: Record, after: Record) -> Self {
        Self {
            resource: resource.into(),
            kind: ChangeKind::Updated,
            before: Some(before),
            after: Some(after),
        }
    }

    /// Create an event for a deleted row.
    pub fn deleted(resource: impl Into<String>, before: Record) -> Self {
        Self {
            resource: resource.into(),
            kind: ChangeKind::Deleted,
            before: Some(before),
            after: None,
        }
    }

    /// The row snapshot that identifies this change: the after-state
    /// for created/updated rows, the before-state for deleted rows.
    pub fn row(&self) -> Option<&Record> {
        match self.kind {
            ChangeKind::Created | ChangeKind::Updated => self.after.as_ref(),
            ChangeKind::Deleted => self.before.as_ref(),
        }
    }

    /// Check that the before/after snapshots match the change kind.
    pub fn validate(&self) -> Result<(), Error> {
        let ok = match self.kind {
            ChangeKind::Created => self.before.is_none() && self.after.is_some(),
            ChangeKind::Updated => self.before.is_some() && self.after.is_some(),
            ChangeKind::Deleted => self.before.is_some() && self.after.is_none(),
        };
        if ok {
            Ok(())
        } else {
            Err(Error::InvalidPayload(format!(
                "{:?} event with before={} after={}",
                self.kind,
                self.before.is_some(),
                self.after.is_some()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u64) -> Record {
        let mut record = Record::new();
        record.insert("id".to_string(), serde_json::json!(id));
        record
    }

    #[test]
    fn test_created_shape() {
        let event = ChangeEvent::created("topics", row(1));
        assert_eq!(event.kind, ChangeKind::Created);
        assert!(event.before.is_none());
        assert!(event.after.is_some());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_updated_shape() {
        let event = ChangeEvent::updated("topics", row(1), row(2));
        assert_eq!(event.kind, ChangeKind::Updated);
        assert!(event.before.is_some());
        assert!(event.after.is_some());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_deleted_shape() {
        let event = ChangeEvent::deleted("topics", row(1));
        assert_eq!(event.kind, ChangeKind::Deleted);
        assert!(event.before.is_some());
        assert!(event.after.is_none());
        assert!(event.validate().is_ok());
    }

    #[test]
    fn test_row_selects_identifying_snapshot() {
        let created = ChangeEvent::created("topics", row(1));
        assert_eq!(created.row(), created.after.as_ref());

        let updated = ChangeEvent::updated("topics", row(1), row(2));
        assert_eq!(updated.row(), updated.after.as_ref());

        let deleted = ChangeEvent::deleted("topics", row(3));
        assert_eq!(deleted.row(), deleted.before.as_ref());
    }

    #[test]
    fn test_validate_rejects_mismatched_payload() {
        let mut event = ChangeEvent::created("topics", row(1));
        event.before = Some(row(0));
        assert!(event.validate().is_err());
    }
}
