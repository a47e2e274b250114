//! Reactive Runtime
//!
//! The runtime is the central coordinator that connects refs, computeds and
//! watches. It owns the dependency graph, the context stack and the
//! diagnostic log, and every handle it creates keeps it alive.
//!
//! # How It Works
//!
//! 1. Reading a ref or computed calls `Runtime::track`, which links the
//!    innermost tracking frame to the value's dependency node.
//!
//! 2. Writing a ref calls `Runtime::trigger`, which:
//!    a. marks every downstream computed dirty (they recompute lazily, on
//!       their next read),
//!    b. then runs every downstream watch once.
//!
//!    A computed whose re-evaluation produces a new value propagates the same
//!    way. While a write is being delivered, watches it already reached are
//!    not run a second time on its behalf.
//!
//! 3. Graph borrows never outlive a single bookkeeping step. Getters,
//!    tracking functions and callbacks always run with the graph unborrowed,
//!    so they are free to read, write, create and dispose cells.
//!
//! # Threading
//!
//! Handles are `!Send` and `!Sync`. Independent runtimes share nothing, so a
//! program may keep one per thread, or several on the same thread.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, trace};

use super::context::{ContextStack, Frame};
use super::{Computed, ComputedOptions, Ref, Watch, WatchOptions};
use crate::config::{RuntimeBuilder, RuntimeConfig};
use crate::diagnostics::{Diagnostics, EventKind};
use crate::error::Result;
use crate::graph::{Callback, Graph, Invalidated, NodeId, SubscriberId};
use crate::hash::FastHashBuilder;

/// Watches already reached by the write being delivered.
type NotifiedSet = HashSet<SubscriberId, FastHashBuilder>;

/// Owner of one reactive graph.
///
/// Cloning a `Runtime` is cheap and yields another handle to the same graph.
#[derive(Clone)]
pub struct Runtime {
    pub(crate) inner: Rc<RuntimeInner>,
}

pub(crate) struct RuntimeInner {
    pub(crate) graph: RefCell<Graph>,
    pub(crate) context: ContextStack,
    pub(crate) diagnostics: Diagnostics,
    /// One entry per write currently delivering its notify pass, innermost
    /// last.
    notified: RefCell<Vec<NotifiedSet>>,
    config: RuntimeConfig,
}

impl Runtime {
    /// Create a runtime with the default configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default())
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        debug!(diagnostics = config.diagnostics, "creating runtime");
        Self {
            inner: Rc::new(RuntimeInner {
                graph: RefCell::new(Graph::new()),
                context: ContextStack::new(),
                diagnostics: Diagnostics::new(config.diagnostics, config.diagnostics_capacity),
                notified: RefCell::new(Vec::new()),
                config,
            }),
        }
    }

    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// The configuration this runtime was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.inner.diagnostics
    }

    /// Create a mutable cell.
    ///
    /// ```
    /// use trellis_core::Runtime;
    ///
    /// let rt = Runtime::new();
    /// let count = rt.make_ref(1);
    /// count.set(2);
    /// assert_eq!(count.get(), 2);
    /// ```
    pub fn make_ref<T: 'static>(&self, initial: T) -> Ref<T> {
        Ref::new(self, initial)
    }

    /// Create a lazily evaluated derived value.
    ///
    /// The getter receives the previously cached value, if there is one.
    ///
    /// ```
    /// use trellis_core::Runtime;
    ///
    /// let rt = Runtime::new();
    /// let count = rt.make_ref(2);
    /// let doubled = rt.make_computed({
    ///     let count = count.clone();
    ///     move |_| count.get() * 2
    /// });
    /// assert_eq!(doubled.get(), 4);
    /// ```
    pub fn make_computed<T, F>(&self, getter: F) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: FnMut(Option<&T>) -> T + 'static,
    {
        self.make_computed_with(getter, ComputedOptions::default())
    }

    pub fn make_computed_with<T, F>(&self, mut getter: F, options: ComputedOptions) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: FnMut(Option<&T>) -> T + 'static,
    {
        Computed::new(
            self,
            Box::new(move |previous: Option<&T>| Ok(getter(previous))),
            options,
        )
    }

    /// Create a derived value whose getter may fail.
    ///
    /// Failures surface from [`Computed::try_get`]; the computed stays dirty
    /// and retries on the next read.
    pub fn make_fallible_computed<T, F>(&self, getter: F, options: ComputedOptions) -> Computed<T>
    where
        T: Clone + PartialEq + 'static,
        F: FnMut(Option<&T>) -> Result<T> + 'static,
    {
        Computed::new(self, Box::new(getter), options)
    }

    /// Run `tracking` once to collect dependencies, then call `callback`
    /// whenever one of them changes.
    ///
    /// The returned [`Watch`] unsubscribes when disposed or dropped.
    pub fn make_watch<R, F, C>(&self, tracking: F, callback: C) -> Watch
    where
        F: FnOnce() -> R,
        C: FnMut() + 'static,
    {
        self.make_watch_with(tracking, callback, WatchOptions::default())
    }

    pub fn make_watch_with<R, F, C>(&self, tracking: F, callback: C, options: WatchOptions) -> Watch
    where
        F: FnOnce() -> R,
        C: FnMut() + 'static,
    {
        Watch::new(self, tracking, Box::new(callback), options)
    }

    /// Run `f` without registering any dependency, even inside a getter or a
    /// watch's tracking function.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        let _frame = self.inner.context.enter(Frame::Untracked);
        f()
    }

    /// Whether a read right now would register a dependency.
    pub fn is_tracking(&self) -> bool {
        self.inner.context.current().is_some()
    }

    /// Number of live dependency nodes (one per ref and computed).
    pub fn node_count(&self) -> usize {
        self.inner.graph.borrow().node_count()
    }

    /// Number of live subscriber entries (one per computed and watch).
    pub fn subscriber_count(&self) -> usize {
        self.inner.graph.borrow().subscriber_count()
    }

    /// Whether two handles refer to the same runtime.
    pub fn ptr_eq(&self, other: &Runtime) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    // ---- Propagation ----

    /// Register the active subscriber as a reader of `node`.
    pub(crate) fn track(&self, node: NodeId) {
        if let Some(subscriber) = self.inner.context.current() {
            self.inner.graph.borrow_mut().add_edge(node, subscriber);
        }
    }

    /// Propagate a write to `node`: dirty pass, then notify pass.
    pub(crate) fn trigger(&self, node: NodeId) {
        let invalidated = self.inner.graph.borrow_mut().mark_dirty(node);
        self.record_invalidations(&invalidated);

        let watches = self.inner.graph.borrow().collect_watches(node);
        trace!(node = ?node, invalidated = invalidated.len(), watches = watches.len(), "write propagated");
        let _write = WriteScope::enter(self, &watches);
        for watch in watches {
            self.run_watch(watch);
        }
    }

    /// Propagate a computed's new value below its node.
    ///
    /// Inside a write that is still delivering, watches that write already
    /// reached are skipped.
    pub(crate) fn propagate_change(&self, node: NodeId) {
        let invalidated = self.inner.graph.borrow_mut().mark_dirty(node);
        self.record_invalidations(&invalidated);

        let mut watches = self.inner.graph.borrow().collect_watches(node);
        let nested = self
            .inner
            .notified
            .borrow_mut()
            .last_mut()
            .map(|notified| watches.retain(|id| notified.insert(*id)))
            .is_some();
        trace!(node = ?node, invalidated = invalidated.len(), watches = watches.len(), nested, "value change propagated");
        let _write = (!nested).then(|| WriteScope::enter(self, &watches));
        for watch in watches {
            self.run_watch(watch);
        }
    }

    /// Invalidate one computed by hand and notify the watches behind it.
    ///
    /// Does nothing when the computed is already dirty.
    pub(crate) fn invalidate_subscriber(&self, subscriber: SubscriberId, own_node: NodeId) {
        let invalidated = self.inner.graph.borrow_mut().mark_subscriber_dirty(subscriber);
        if invalidated.is_empty() {
            trace!(subscriber = ?subscriber, "already dirty, nothing to notify");
            return;
        }
        self.record_invalidations(&invalidated);

        let watches = self.inner.graph.borrow().collect_watches(own_node);
        let _write = WriteScope::enter(self, &watches);
        for watch in watches {
            self.run_watch(watch);
        }
    }

    pub(crate) fn record_invalidations(&self, invalidated: &[Invalidated]) {
        for entry in invalidated {
            trace!(subscriber = ?entry.subscriber, name = ?entry.name, "invalidated");
            self.inner
                .diagnostics
                .record(EventKind::Invalidate, entry.name.as_deref());
        }
    }

    /// Run a watch's callback unless it is already running.
    pub(crate) fn run_watch(&self, subscriber: SubscriberId) {
        let Some((callback, name)) = self.inner.graph.borrow_mut().begin_callback(subscriber) else {
            return;
        };
        self.inner.diagnostics.record(EventKind::Callback, name.as_deref());
        debug!(subscriber = ?subscriber, name = ?name, "running watch callback");

        let mut guard = CallbackGuard {
            runtime: self,
            subscriber,
            callback: Some(callback),
        };
        // Reads inside a callback belong to nobody, even when the write that
        // triggered it happened inside a getter.
        let _frame = self.inner.context.enter(Frame::Untracked);
        guard.run();
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let graph = self.inner.graph.try_borrow();
        f.debug_struct("Runtime")
            .field("nodes", &graph.as_ref().map(|g| g.node_count()).ok())
            .field("subscribers", &graph.as_ref().map(|g| g.subscriber_count()).ok())
            .field("depth", &self.inner.context.depth())
            .field("config", &self.inner.config)
            .finish()
    }
}

/// Marks the watches one write reaches for as long as it is being delivered.
struct WriteScope<'a> {
    runtime: &'a Runtime,
}

impl<'a> WriteScope<'a> {
    fn enter(runtime: &'a Runtime, watches: &[SubscriberId]) -> Self {
        runtime
            .inner
            .notified
            .borrow_mut()
            .push(watches.iter().copied().collect());
        Self { runtime }
    }
}

impl Drop for WriteScope<'_> {
    fn drop(&mut self) {
        self.runtime.inner.notified.borrow_mut().pop();
    }
}

/// Holds a watch callback while it runs and hands it back to the graph on
/// drop, including when the callback panics.
struct CallbackGuard<'a> {
    runtime: &'a Runtime,
    subscriber: SubscriberId,
    callback: Option<Callback>,
}

impl CallbackGuard<'_> {
    fn run(&mut self) {
        if let Some(callback) = self.callback.as_mut() {
            callback();
        }
    }
}

impl Drop for CallbackGuard<'_> {
    fn drop(&mut self) {
        let Some(callback) = self.callback.take() else {
            return;
        };
        let orphaned = self
            .runtime
            .inner
            .graph
            .borrow_mut()
            .restore_callback(self.subscriber, callback);
        if orphaned.is_some() {
            debug!(subscriber = ?self.subscriber, "watch disposed by its own callback");
        }
        drop(orphaned);
    }
}
