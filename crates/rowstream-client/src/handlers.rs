//! Typed change handlers.

/// Handler for created rows.
pub type CreatedHandler<T> = Box<dyn Fn(T) + Send + Sync>;
/// Handler for updated rows, called with (before, after).
pub type UpdatedHandler<T> = Box<dyn Fn(T, T) + Send + Sync>;
/// Handler for deleted rows, called with the before-state.
pub type DeletedHandler<T> = Box<dyn Fn(T) + Send + Sync>;

/// The set of handlers a subscription dispatches into, one per change
/// kind. Any of the three may be absent; events of a kind with no
/// handler are silently dropped.
pub struct ChangeHandlers<T> {
    pub(crate) on_created: Option<CreatedHandler<T>>,
    pub(crate) on_updated: Option<UpdatedHandler<T>>,
    pub(crate) on_deleted: Option<DeletedHandler<T>>,
}

impl<T> ChangeHandlers<T> {
    /// Create an empty handler set.
    pub fn new() -> Self {
        Self {
            on_created: None,
            on_updated: None,
            on_deleted: None,
        }
    }

    /// Set the handler for created rows.
    pub fn on_created(mut self, handler: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.on_created = Some(Box::new(handler));
        self
    }

    /// Set the handler for updated rows. It receives the before and
    /// after snapshots in that order.
    pub fn on_updated(mut self, handler: impl Fn(T, T) + Send + Sync + 'static) -> Self {
        self.on_updated = Some(Box::new(handler));
        self
    }

    /// Set the handler for deleted rows.
    pub fn on_deleted(mut self, handler: impl Fn(T) + Send + Sync + 'static) -> Self {
        self.on_deleted = Some(Box::new(handler));
        self
    }

    /// Whether any handler is registered.
    pub fn is_empty(&self) -> bool {
        self.on_created.is_none() && self.on_updated.is_none() && self.on_deleted.is_none()
    }
}

impl<T> Default for ChangeHandlers<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::fmt::Debug for ChangeHandlers<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeHandlers")
            .field("on_created", &self.on_created.is_some())
            .field("on_updated", &self.on_updated.is_some())
            .field("on_deleted", &self.on_deleted.is_some())
            .finish()
    }
}
