//! Ref: the mutable source cell.
//!
//! A `Ref<T>` holds a value and owns one dependency node. Reads inside a
//! tracking frame subscribe the running computation; writes that change the
//! value propagate through the runtime.
//!
//! # Example
//!
//! ```
//! use trellis_core::Runtime;
//!
//! let rt = Runtime::new();
//! let name = rt.make_ref(String::from("Ada"));
//! name.update(|current| format!("{current} Lovelace"));
//! assert_eq!(name.with(|value| value.len()), 12);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::trace;

use super::Runtime;
use crate::graph::NodeId;

/// A mutable reactive value.
///
/// Cloning a `Ref` yields another handle to the same cell. The cell, and its
/// dependency node, are released when the last handle is dropped.
pub struct Ref<T> {
    inner: Rc<RefInner<T>>,
}

struct RefInner<T> {
    runtime: Runtime,
    node: NodeId,
    value: RefCell<T>,
}

impl<T> Ref<T> {
    pub(crate) fn new(runtime: &Runtime, initial: T) -> Self {
        let node = runtime.inner.graph.borrow_mut().insert_node();
        trace!(node = ?node, "ref created");
        Self {
            inner: Rc::new(RefInner {
                runtime: runtime.clone(),
                node,
                value: RefCell::new(initial),
            }),
        }
    }

    /// Borrow the value, registering a dependency.
    ///
    /// Writing to this ref from inside `f` panics.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.runtime.track(self.inner.node);
        f(&self.inner.value.borrow())
    }

    /// Borrow the value without registering a dependency.
    pub fn with_untracked<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.inner.value.borrow())
    }

    /// Number of computeds and watches currently reading this ref.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .runtime
            .inner
            .graph
            .borrow()
            .subscriber_count_of(self.inner.node)
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node
    }

    pub fn runtime(&self) -> &Runtime {
        &self.inner.runtime
    }
}

impl<T: Clone> Ref<T> {
    /// Read the value, registering a dependency.
    pub fn get(&self) -> T {
        self.with(T::clone)
    }

    pub fn get_untracked(&self) -> T {
        self.with_untracked(T::clone)
    }
}

impl<T: PartialEq> Ref<T> {
    /// Store `value` and propagate, unless it equals the current value.
    pub fn set(&self, value: T) {
        {
            let mut current = self.inner.value.borrow_mut();
            if *current == value {
                cov_mark::hit!(ref_write_unchanged);
                trace!(node = ?self.inner.node, "write skipped, value unchanged");
                return;
            }
            *current = value;
        }
        self.inner.runtime.trigger(self.inner.node);
    }

    /// Replace the value with `f(&current)`.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        let next = f(&self.inner.value.borrow());
        self.set(next);
    }
}

impl<T> Clone for Ref<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Drop for RefInner<T> {
    fn drop(&mut self) {
        self.runtime.inner.graph.borrow_mut().remove_node(self.node);
        trace!(node = ?self.node, "ref released");
    }
}

impl<T: fmt::Debug> fmt::Debug for Ref<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Ref");
        out.field("node", &self.inner.node);
        match self.inner.value.try_borrow() {
            Ok(value) => out.field("value", &*value),
            Err(_) => out.field("value", &"<borrowed>"),
        };
        out.finish()
    }
}

// ---- Tests ----
