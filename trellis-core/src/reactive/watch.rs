//! Watch: eager side effects.
//!
//! A watch runs its tracking function once, at construction, to learn which
//! values it depends on. From then on its callback runs synchronously after
//! every write that changes one of those values, once per write.
//!
//! The callback is never re-entered: a callback whose own writes reach the
//! same watch does not trigger a nested run.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::context::Frame;
use super::Runtime;
use crate::graph::{Callback, SubscriberId, SubscriberNode};

/// Options for [`Runtime::make_watch_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WatchOptions {
    /// Label used in diagnostics and logs.
    pub name: Option<String>,
}

impl WatchOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// Disposer for a running watch.
///
/// The watch stays subscribed for as long as this handle lives.
#[must_use = "dropping a Watch unsubscribes it immediately"]
pub struct Watch {
    runtime: Runtime,
    subscriber: SubscriberId,
    name: Option<Rc<str>>,
    disposed: Cell<bool>,
}

impl Watch {
    pub(crate) fn new<R>(
        runtime: &Runtime,
        tracking: impl FnOnce() -> R,
        callback: Callback,
        options: WatchOptions,
    ) -> Self {
        let name: Option<Rc<str>> = options.name.map(Rc::from);
        let subscriber = runtime
            .inner
            .graph
            .borrow_mut()
            .insert_subscriber(SubscriberNode::watch(name.clone(), callback));

        // Built before tracking runs so a panicking tracking function still
        // unsubscribes.
        let watch = Self {
            runtime: runtime.clone(),
            subscriber,
            name,
            disposed: Cell::new(false),
        };

        {
            let _frame = runtime.inner.context.enter(Frame::Tracking(subscriber));
            let _ = tracking();
        }
        debug!(
            subscriber = ?subscriber,
            name = ?watch.name,
            dependencies = watch.dependency_count(),
            "watch subscribed"
        );
        watch
    }

    /// Unsubscribe from every dependency and release the callback.
    ///
    /// Calling this from inside the watch's own callback is allowed; the
    /// callback is released once it returns. Disposing twice is a no-op.
    pub fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let removed = self
            .runtime
            .inner
            .graph
            .borrow_mut()
            .remove_subscriber(self.subscriber);
        drop(removed);
        debug!(subscriber = ?self.subscriber, name = ?self.name, "watch disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.get()
    }

    /// Run the callback now, as if a dependency had changed.
    ///
    /// Does nothing while the callback is already running or after disposal.
    pub fn trigger(&self) {
        if self.is_disposed() {
            trace!(subscriber = ?self.subscriber, "trigger on disposed watch ignored");
            return;
        }
        self.runtime.run_watch(self.subscriber);
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Number of values the tracking function read.
    pub fn dependency_count(&self) -> usize {
        self.runtime
            .inner
            .graph
            .borrow()
            .dependency_count_of(self.subscriber)
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.subscriber
    }
}

impl Drop for Watch {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Watch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Watch")
            .field("subscriber", &self.subscriber)
            .field("name", &self.name)
            .field("disposed", &self.disposed.get())
            .finish()
    }
}

// ---- Tests ----
