//! Subscription specs and channel naming.

use serde::{Deserialize, Serialize};

use crate::Error;

/// Suffix used for channel names when no predicate is given.
pub const UNFILTERED_CHANNEL_SUFFIX: &str = "all";

/// Identifies one change subscription: a resource plus an optional
/// row predicate.
///
/// The predicate is an opaque backend filter expression (e.g.
/// `"meeting_id=eq.42"`); it is carried verbatim and never parsed on
/// the requesting side.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubscriptionSpec {
    /// The resource (collection/table) to watch.
    pub resource: String,
    /// Optional filter restricting which rows' changes are delivered.
    pub predicate: Option<String>,
}

impl SubscriptionSpec {
    /// Create a spec watching every row of a resource.
    pub fn new(resource: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            predicate: None,
        }
    }

    /// Restrict the subscription with a predicate, passed through
    /// verbatim to the backend.
    pub fn with_predicate(mut self, predicate: impl Into<String>) -> Self {
        self.predicate = Some(predicate.into());
        self
    }

    /// Validate the spec. The resource name must be non-empty; the
    /// predicate is opaque and not checked.
    pub fn validate(&self) -> Result<(), Error> {
        if self.resource.is_empty() {
            return Err(Error::EmptyResource);
        }
        Ok(())
    }

    /// Derive the deterministic channel name for this spec.
    ///
    /// Concurrent subscriptions to the same resource with different
    /// predicates must remain distinguishable at the transport layer,
    /// so the predicate (with non-alphanumeric bytes replaced by `-`)
    /// is folded into the name. Specs without a predicate share a
    /// fixed `all` suffix.
    pub fn channel_name(&self) -> String {
        let suffix = match &self.predicate {
            Some(predicate) => predicate
                .chars()
                .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
                .collect(),
            None => UNFILTERED_CHANNEL_SUFFIX.to_string(),
        };
        format!("{}-changes-{}", self.resource, suffix)
    }
}
