//! Graph Nodes
//!
//! This module defines the entries that live in the dependency graph: the
//! dependency node owned by every ref and computed, and the subscriber entry
//! owned by every computed and watch.

use std::fmt;
use std::rc::Rc;

use super::arena::Key;
use crate::hash::EdgeSet;

/// Handle to a dependency node in a runtime's graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) Key);

/// Handle to a subscriber entry in a runtime's graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(pub(crate) Key);

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({}v{})", self.0.index(), self.0.generation())
    }
}

impl fmt::Debug for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriberId({}v{})", self.0.index(), self.0.generation())
    }
}

/// What a subscriber entry stands for.
///
/// Propagation dispatches on this tag instead of calling back into the typed
/// handles, which the graph cannot name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    /// A derived value. Forwards invalidation to its own dependency node.
    Computed,

    /// A terminal side effect. Receives the notify pass.
    Watch,
}

/// Freshness of a computed's cached value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CellState {
    /// The cached value is valid as of the most recent evaluation.
    Clean,

    /// An input changed, or the computed has never been evaluated.
    #[default]
    Dirty,
}

/// Notification callback stored for a watch.
pub(crate) type Callback = Box<dyn FnMut()>;

/// The value side of an edge: who must hear about a change.
#[derive(Debug, Default)]
pub(crate) struct DependencyNode {
    pub(crate) subscribers: EdgeSet<SubscriberId>,
}

/// The consumer side of an edge.
pub(crate) struct SubscriberNode {
    pub(crate) kind: SubscriberKind,
    pub(crate) name: Option<Rc<str>>,
    pub(crate) dependencies: EdgeSet<NodeId>,
    pub(crate) state: CellState,

    /// Set while a computed's getter is on the stack.
    pub(crate) evaluating: bool,

    /// Set when a dirty pass reached this computed while its getter was on the
    /// stack. The run that is in progress fails instead of caching.
    pub(crate) input_written: bool,

    /// The last evaluation failed. The computed is dirty but may already hold
    /// readers, so the dirty pass has to look past it.
    pub(crate) failed: bool,

    /// Set while a watch's callback is on the stack.
    pub(crate) running: bool,

    /// The dependency node a computed exposes to its readers.
    pub(crate) own_node: Option<NodeId>,

    /// `None` for computeds, and for a watch whose callback is currently running.
    pub(crate) callback: Option<Callback>,
}

impl SubscriberNode {
    pub(crate) fn computed(name: Option<Rc<str>>, own_node: NodeId) -> Self {
        Self {
            kind: SubscriberKind::Computed,
            name,
            dependencies: EdgeSet::default(),
            state: CellState::Dirty,
            evaluating: false,
            input_written: false,
            failed: false,
            running: false,
            own_node: Some(own_node),
            callback: None,
        }
    }

    pub(crate) fn watch(name: Option<Rc<str>>, callback: Callback) -> Self {
        Self {
            kind: SubscriberKind::Watch,
            name,
            dependencies: EdgeSet::default(),
            state: CellState::Clean,
            evaluating: false,
            input_written: false,
            failed: false,
            running: false,
            own_node: None,
            callback: Some(callback),
        }
    }

    pub(crate) fn is_computed(&self) -> bool {
        self.kind == SubscriberKind::Computed
    }
}

impl fmt::Debug for SubscriberNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberNode")
            .field("kind", &self.kind)
            .field("name", &self.name)
            .field("dependencies", &self.dependencies.len())
            .field("state", &self.state)
            .field("evaluating", &self.evaluating)
            .field("failed", &self.failed)
            .field("running", &self.running)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::arena::Arena;

    #[test]
    fn computed_entry_starts_dirty() {
        let mut nodes = Arena::new();
        let own = NodeId(nodes.insert(()));
        let entry = SubscriberNode::computed(Some("total".into()), own);

        assert!(entry.is_computed());
        assert_eq!(entry.state, CellState::Dirty);
        assert_eq!(entry.own_node, Some(own));
        assert!(entry.callback.is_none());
        assert!(!entry.failed);
    }

    #[test]
    fn watch_entry_holds_callback() {
        let entry = SubscriberNode::watch(None, Box::new(|| {}));

        assert_eq!(entry.kind, SubscriberKind::Watch);
        assert!(entry.callback.is_some());
        assert!(entry.own_node.is_none());
    }

    #[test]
    fn ids_debug_with_generation() {
        let mut arena = Arena::new();
        let id = NodeId(arena.insert(()));
        assert_eq!(format!("{id:?}"), "NodeId(0v1)");
    }
}
