//! Subscriber capability.
//!
//! A subscriber is anything that reads reactive values and must hear about
//! changes to them. Computeds and watches both qualify; the graph itself only
//! sees their [`SubscriberKind`] tag, while this trait gives user code a
//! uniform handle over either.

use super::{Computed, Watch};
use crate::graph::{SubscriberId, SubscriberKind};

/// Common interface of [`Computed`] and [`Watch`].
pub trait Subscriber {
    /// Arena handle of this subscriber's graph entry.
    fn subscriber_id(&self) -> SubscriberId;

    fn kind(&self) -> SubscriberKind;

    /// Number of dependency nodes this subscriber currently reads.
    fn dependency_count(&self) -> usize;

    /// React as if a dependency had changed.
    ///
    /// A computed goes dirty (once) and the watches behind it run; a watch
    /// runs its callback unless it is already running.
    fn notify(&self);
}

impl<T> Subscriber for Computed<T> {
    fn subscriber_id(&self) -> SubscriberId {
        Computed::subscriber_id(self)
    }

    fn kind(&self) -> SubscriberKind {
        SubscriberKind::Computed
    }

    fn dependency_count(&self) -> usize {
        Computed::dependency_count(self)
    }

    fn notify(&self) {
        self.invalidate();
    }
}

impl Subscriber for Watch {
    fn subscriber_id(&self) -> SubscriberId {
        Watch::subscriber_id(self)
    }

    fn kind(&self) -> SubscriberKind {
        SubscriberKind::Watch
    }

    fn dependency_count(&self) -> usize {
        Watch::dependency_count(self)
    }

    fn notify(&self) {
        self.trigger();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::Runtime;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn notify_dispatches_by_kind() {
        let rt = Runtime::new();
        let a = rt.make_ref(1);
        let doubled = rt.make_computed({
            let a = a.clone();
            move |_| a.get() * 2
        });
        let seen = Rc::new(Cell::new(0));
        let watch = rt.make_watch(|| doubled.get(), {
            let seen = seen.clone();
            move || seen.set(seen.get() + 1)
        });

        let subscribers: [&dyn Subscriber; 2] = [&doubled, &watch];
        assert_eq!(subscribers[0].kind(), SubscriberKind::Computed);
        assert_eq!(subscribers[1].kind(), SubscriberKind::Watch);
        assert_eq!(subscribers[0].dependency_count(), 1);
        assert_eq!(subscribers[1].dependency_count(), 1);
        assert_ne!(subscribers[0].subscriber_id(), subscribers[1].subscriber_id());

        // Invalidating the computed reaches the watch behind it.
        subscribers[0].notify();
        assert_eq!(seen.get(), 1);
        assert_eq!(doubled.state(), crate::graph::CellState::Dirty);

        subscribers[1].notify();
        assert_eq!(seen.get(), 2);
    }
}
