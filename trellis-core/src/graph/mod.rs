//! Dependency Graph
//!
//! The graph records which subscribers read which dependency nodes.
//!
//! # Overview
//!
//! - A *dependency node* belongs to a ref or a computed and lists the
//!   subscribers that must hear about a change, in registration order.
//! - A *subscriber entry* belongs to a computed or a watch and lists the nodes
//!   it read during its last run.
//!
//! Both directions of every edge are kept in sync and an edge exists at most
//! once. Entries live in generational arenas owned by the runtime and are
//! addressed by `Copy` handles, so the graph can be cyclic in shape without
//! any reference counting between entries.
//!
//! Propagation over the graph lives in the `scheduler` submodule.

mod arena;
mod node;
mod scheduler;

use tracing::trace;

use arena::Arena;
pub(crate) use node::{Callback, DependencyNode, SubscriberNode};
pub use node::{CellState, NodeId, SubscriberId, SubscriberKind};
pub(crate) use scheduler::Invalidated;

/// Both arenas plus the edge bookkeeping between them.
#[derive(Default)]
pub(crate) struct Graph {
    nodes: Arena<DependencyNode>,
    subscribers: Arena<SubscriberNode>,
}

impl Graph {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert_node(&mut self) -> NodeId {
        NodeId(self.nodes.insert(DependencyNode::default()))
    }

    pub(crate) fn insert_subscriber(&mut self, entry: SubscriberNode) -> SubscriberId {
        SubscriberId(self.subscribers.insert(entry))
    }

    pub(crate) fn node(&self, id: NodeId) -> Option<&DependencyNode> {
        self.nodes.get(id.0)
    }

    pub(crate) fn subscriber(&self, id: SubscriberId) -> Option<&SubscriberNode> {
        self.subscribers.get(id.0)
    }

    pub(crate) fn subscriber_mut(&mut self, id: SubscriberId) -> Option<&mut SubscriberNode> {
        self.subscribers.get_mut(id.0)
    }

    /// Link `subscriber` as a reader of `node`.
    ///
    /// Returns `false` when the edge already existed, either end is gone, or
    /// `node` is the subscriber's own node.
    pub(crate) fn add_edge(&mut self, node: NodeId, subscriber: SubscriberId) -> bool {
        let (Some(dependency), Some(entry)) = (
            self.nodes.get_mut(node.0),
            self.subscribers.get_mut(subscriber.0),
        ) else {
            return false;
        };
        if entry.own_node == Some(node) {
            trace!(node = ?node, "self edge skipped");
            return false;
        }

        if !dependency.subscribers.insert(subscriber) {
            cov_mark::hit!(duplicate_edge_skipped);
            return false;
        }
        entry.dependencies.insert(node);
        trace!(node = ?node, subscriber = ?subscriber, "edge registered");
        true
    }

    pub(crate) fn remove_edge(&mut self, node: NodeId, subscriber: SubscriberId) {
        if let Some(dependency) = self.nodes.get_mut(node.0) {
            dependency.subscribers.shift_remove(&subscriber);
        }
        if let Some(entry) = self.subscribers.get_mut(subscriber.0) {
            entry.dependencies.shift_remove(&node);
        }
    }

    /// Drop every edge the subscriber holds, ahead of a fresh tracking run.
    pub(crate) fn clear_dependencies(&mut self, subscriber: SubscriberId) {
        let Some(entry) = self.subscribers.get_mut(subscriber.0) else {
            return;
        };
        for node in std::mem::take(&mut entry.dependencies) {
            self.remove_edge(node, subscriber);
        }
    }

    /// Remove a dependency node and every edge pointing at it.
    pub(crate) fn remove_node(&mut self, id: NodeId) {
        let Some(dependency) = self.nodes.remove(id.0) else {
            return;
        };
        for subscriber in &dependency.subscribers {
            if let Some(entry) = self.subscribers.get_mut(subscriber.0) {
                entry.dependencies.shift_remove(&id);
            }
        }
    }

    /// Remove a subscriber entry and unlink it from every node it reads.
    ///
    /// The entry is handed back so that its callback is dropped by the caller
    /// once the graph is no longer borrowed.
    pub(crate) fn remove_subscriber(&mut self, id: SubscriberId) -> Option<SubscriberNode> {
        let entry = self.subscribers.remove(id.0)?;
        for node in &entry.dependencies {
            if let Some(dependency) = self.nodes.get_mut(node.0) {
                dependency.subscribers.shift_remove(&id);
            }
        }
        Some(entry)
    }

    pub(crate) fn subscriber_count_of(&self, node: NodeId) -> usize {
        self.node(node).map_or(0, |dependency| dependency.subscribers.len())
    }

    pub(crate) fn dependency_count_of(&self, subscriber: SubscriberId) -> usize {
        self.subscriber(subscriber)
            .map_or(0, |entry| entry.dependencies.len())
    }

    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub(crate) fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn computed(graph: &mut Graph) -> (SubscriberId, NodeId) {
        let own = graph.insert_node();
        let id = graph.insert_subscriber(SubscriberNode::computed(None, own));
        (id, own)
    }

    #[test]
    fn edges_are_recorded_in_both_directions() {
        let mut graph = Graph::new();
        let source = graph.insert_node();
        let (reader, _) = computed(&mut graph);

        assert!(graph.add_edge(source, reader));
        assert!(graph.node(source).unwrap().subscribers.contains(&reader));
        assert!(graph.subscriber(reader).unwrap().dependencies.contains(&source));

        graph.remove_edge(source, reader);
        assert_eq!(graph.subscriber_count_of(source), 0);
        assert_eq!(graph.dependency_count_of(reader), 0);
    }

    #[test]
    fn duplicate_edges_are_skipped() {
        cov_mark::check!(duplicate_edge_skipped);
        let mut graph = Graph::new();
        let source = graph.insert_node();
        let (reader, _) = computed(&mut graph);

        assert!(graph.add_edge(source, reader));
        assert!(!graph.add_edge(source, reader));
        assert_eq!(graph.subscriber_count_of(source), 1);
        assert_eq!(graph.dependency_count_of(reader), 1);
    }

    #[test]
    fn subscribers_keep_registration_order() {
        let mut graph = Graph::new();
        let source = graph.insert_node();
        let readers: Vec<_> = (0..4).map(|_| computed(&mut graph).0).collect();
        for reader in readers.iter().rev() {
            graph.add_edge(source, *reader);
        }

        graph.remove_edge(source, readers[2]);
        let order: Vec<_> = graph.node(source).unwrap().subscribers.iter().copied().collect();
        assert_eq!(order, vec![readers[3], readers[1], readers[0]]);
    }

    #[test]
    fn clear_dependencies_unlinks_every_source() {
        let mut graph = Graph::new();
        let a = graph.insert_node();
        let b = graph.insert_node();
        let (reader, _) = computed(&mut graph);
        graph.add_edge(a, reader);
        graph.add_edge(b, reader);

        graph.clear_dependencies(reader);
        assert_eq!(graph.dependency_count_of(reader), 0);
        assert_eq!(graph.subscriber_count_of(a), 0);
        assert_eq!(graph.subscriber_count_of(b), 0);
    }

    #[test]
    fn removing_a_node_unlinks_its_readers() {
        let mut graph = Graph::new();
        let source = graph.insert_node();
        let (reader, _) = computed(&mut graph);
        graph.add_edge(source, reader);

        graph.remove_node(source);
        assert!(graph.node(source).is_none());
        assert_eq!(graph.dependency_count_of(reader), 0);
        assert!(!graph.add_edge(source, reader));
    }

    #[test]
    fn removing_a_subscriber_returns_its_entry() {
        let mut graph = Graph::new();
        let source = graph.insert_node();
        let watch = graph.insert_subscriber(SubscriberNode::watch(None, Box::new(|| {})));
        graph.add_edge(source, watch);

        let entry = graph.remove_subscriber(watch).unwrap();
        assert!(entry.callback.is_some());
        assert_eq!(graph.subscriber_count_of(source), 0);
        assert!(graph.remove_subscriber(watch).is_none());
        assert_eq!(graph.subscriber_count(), 0);
    }

    #[test]
    fn computed_never_reads_itself() {
        let mut graph = Graph::new();
        let (reader, own) = computed(&mut graph);

        assert!(!graph.add_edge(own, reader));
        assert_eq!(graph.subscriber_count_of(own), 0);
        assert_eq!(graph.dependency_count_of(reader), 0);
    }
}
