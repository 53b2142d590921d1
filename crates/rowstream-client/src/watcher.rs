//! Resource watchers: change notifications as invalidation signals.

use std::sync::Arc;

use rowstream_proto::{ChangeKind, Record, SubscriptionSpec};

use crate::config::SubscribeOptions;
use crate::handlers::ChangeHandlers;
use crate::subscription::{ChangeSubscription, SubscriptionHandle, SubscriptionState};
use crate::transport::ChannelTransport;

/// Watches one resource and funnels every change, regardless of kind,
/// into a single callback.
///
/// This is the composition layer for callers that treat change events
/// purely as "something changed, go refetch" signals and never as a
/// source of truth: deletes, updates and creates all trigger the same
/// cache invalidation. Events lost while the stream recovers are
/// covered by the caller's own refetch.
pub struct ResourceWatcher {
    handle: SubscriptionHandle,
}

impl ResourceWatcher {
    /// Start watching a resource. `on_change` is invoked with the
    /// change kind for every delivered event.
    pub fn start(
        transport: Arc<dyn ChannelTransport>,
        spec: SubscriptionSpec,
        options: SubscribeOptions,
        on_change: impl Fn(ChangeKind) + Send + Sync + 'static,
    ) -> Self {
        let on_change = Arc::new(on_change);

        let on_created = {
            let on_change = on_change.clone();
            move |_row: Record| on_change(ChangeKind::Created)
        };
        let on_updated = {
            let on_change = on_change.clone();
            move |_before: Record, _after: Record| on_change(ChangeKind::Updated)
        };
        let on_deleted = move |_row: Record| on_change(ChangeKind::Deleted);

        let handle = ChangeSubscription::new(transport, spec)
            .handlers(
                ChangeHandlers::new()
                    .on_created(on_created)
                    .on_updated(on_updated)
                    .on_deleted(on_deleted),
            )
            .options(options)
            .open();

        Self { handle }
    }

    /// Current subscription state.
    pub fn state(&self) -> SubscriptionState {
        self.handle.state()
    }

    /// The underlying subscription handle.
    pub fn handle(&self) -> &SubscriptionHandle {
        &self.handle
    }

    /// Stop watching. Idempotent.
    pub fn stop(&self) {
        self.handle.close();
    }
}

impl std::fmt::Debug for ResourceWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceWatcher")
            .field("state", &self.state())
            .finish()
    }
}
