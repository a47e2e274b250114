//! Propagation Passes
//!
//! A write is propagated in two passes over the graph:
//!
//! 1. **Dirty pass** ([`Graph::mark_dirty`]): every computed reachable from the
//!    written node flips `Clean → Dirty`, depth-first in subscriber
//!    registration order. A computed that is already dirty stops the descent,
//!    since everything below it was invalidated when it went dirty. The
//!    exception is a computed whose last evaluation failed: its readers may
//!    have handled the error, so the pass continues below it. A computed whose
//!    getter is running is flagged instead, and that run fails.
//!    Nothing is recomputed.
//! 2. **Notify pass** ([`Graph::collect_watches`]): every watch reachable from
//!    the written node is collected once, walking through computeds whatever
//!    their state.
//!
//! The runtime finishes the first pass before it runs any callback from the
//! second.

use std::collections::HashSet;
use std::rc::Rc;

use smallvec::SmallVec;
use tracing::trace;

use super::{Callback, CellState, Graph, NodeId, SubscriberId, SubscriberKind};
use crate::hash::FastHashBuilder;

/// A computed that went `Clean → Dirty` during a dirty pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Invalidated {
    pub(crate) subscriber: SubscriberId,
    pub(crate) name: Option<Rc<str>>,
}

pub(crate) type Invalidations = SmallVec<[Invalidated; 8]>;
pub(crate) type WatchList = SmallVec<[SubscriberId; 8]>;

impl Graph {
    /// Run the dirty pass below `root`.
    ///
    /// Returns the computeds that actually changed state, in visit order.
    pub(crate) fn mark_dirty(&mut self, root: NodeId) -> Invalidations {
        let mut pending: SmallVec<[SubscriberId; 16]> = SmallVec::new();
        self.push_subscribers_of(root, &mut pending);
        self.drain_dirty(pending)
    }

    /// Run the dirty pass starting at a single computed.
    pub(crate) fn mark_subscriber_dirty(&mut self, subscriber: SubscriberId) -> Invalidations {
        let mut pending: SmallVec<[SubscriberId; 16]> = SmallVec::new();
        pending.push(subscriber);
        self.drain_dirty(pending)
    }

    fn drain_dirty(&mut self, mut pending: SmallVec<[SubscriberId; 16]>) -> Invalidations {
        let mut invalidated = Invalidations::new();
        let mut forwarded: HashSet<SubscriberId, FastHashBuilder> = HashSet::default();

        // Popping from the back with children pushed in reverse yields the
        // same preorder as recursing over each subscriber set.
        while let Some(id) = pending.pop() {
            let Some(entry) = self.subscribers.get_mut(id.0) else {
                continue;
            };
            if !entry.is_computed() {
                continue;
            }
            if entry.evaluating {
                cov_mark::hit!(input_written_while_evaluating);
                trace!(subscriber = ?id, name = ?entry.name, "input written while evaluating");
                entry.input_written = true;
                continue;
            }
            if entry.state == CellState::Dirty {
                // Readers of a failed computed saw an error, not a value, and
                // are not dirty yet.
                if !entry.failed || !forwarded.insert(id) {
                    cov_mark::hit!(already_dirty_stops_descent);
                    trace!(subscriber = ?id, name = ?entry.name, "already dirty");
                    continue;
                }
                cov_mark::hit!(failed_computed_forwards);
                trace!(subscriber = ?id, name = ?entry.name, "forwarding past failed computed");
            } else {
                entry.state = CellState::Dirty;
                trace!(subscriber = ?id, name = ?entry.name, "marked dirty");
                invalidated.push(Invalidated {
                    subscriber: id,
                    name: entry.name.clone(),
                });
            }

            let own_node = entry.own_node;
            if let Some(own) = own_node {
                self.push_subscribers_of(own, &mut pending);
            }
        }

        invalidated
    }

    /// Collect the watches reachable from `root`, each once, in first-visit
    /// order.
    pub(crate) fn collect_watches(&self, root: NodeId) -> WatchList {
        let mut watches = WatchList::new();
        let mut visited: HashSet<SubscriberId, FastHashBuilder> = HashSet::default();
        let mut pending: SmallVec<[SubscriberId; 16]> = SmallVec::new();
        self.push_subscribers_of(root, &mut pending);

        while let Some(id) = pending.pop() {
            if !visited.insert(id) {
                cov_mark::hit!(watch_reached_twice);
                continue;
            }
            let Some(entry) = self.subscriber(id) else {
                continue;
            };
            match entry.kind {
                SubscriberKind::Watch => watches.push(id),
                SubscriberKind::Computed => {
                    if let Some(own) = entry.own_node {
                        self.push_subscribers_of(own, &mut pending);
                    }
                }
            }
        }

        watches
    }

    fn push_subscribers_of(&self, node: NodeId, pending: &mut SmallVec<[SubscriberId; 16]>) {
        if let Some(dependency) = self.node(node) {
            pending.extend(dependency.subscribers.iter().rev().copied());
        }
    }

    /// Take a watch's callback out of the graph so it can run unborrowed.
    ///
    /// Returns `None` when the watch is gone or already running. The second
    /// case is a re-entrant trigger and is dropped.
    pub(crate) fn begin_callback(
        &mut self,
        id: SubscriberId,
    ) -> Option<(Callback, Option<Rc<str>>)> {
        let entry = self.subscriber_mut(id)?;
        if entry.running {
            cov_mark::hit!(reentrant_notify_dropped);
            trace!(subscriber = ?id, name = ?entry.name, "re-entrant notify dropped");
            return None;
        }
        let callback = entry.callback.take()?;
        entry.running = true;
        Some((callback, entry.name.clone()))
    }

    /// Put a callback back after it ran.
    ///
    /// If the watch was disposed in the meantime the callback is returned so
    /// the caller can drop it outside the borrow.
    pub(crate) fn restore_callback(
        &mut self,
        id: SubscriberId,
        callback: Callback,
    ) -> Option<Callback> {
        match self.subscriber_mut(id) {
            Some(entry) => {
                entry.running = false;
                entry.callback = Some(callback);
                None
            }
            None => Some(callback),
        }
    }
}
