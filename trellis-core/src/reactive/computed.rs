//! Computed: cached derived values.
//!
//! A `Computed<T>` is both a subscriber (toward the values its getter reads)
//! and a dependency (toward whoever reads it).
//!
//! # Evaluation
//!
//! A computed starts dirty and evaluates on its first read. Later reads reuse
//! the cached value until a write upstream marks it dirty again; the write
//! itself never recomputes anything.
//!
//! Evaluating drops every edge the computed holds, runs the getter inside a
//! tracking frame so that exactly the values it reads now become its
//! dependencies, and marks it clean. If the new value equals the cached one
//! nothing downstream is touched. Otherwise the change propagates exactly like
//! a ref write: readers go dirty, then the watches behind it run.
//!
//! # Errors
//!
//! A getter built with [`Runtime::make_fallible_computed`] may fail. The error
//! reaches the caller of [`Computed::try_get`] and the computed stays dirty,
//! so the next read retries. Reading a computed from inside its own getter is
//! a cycle and fails with [`ReactiveError::Cycle`]. A getter that writes to a
//! value it has already read fails with [`ReactiveError::InputWritten`].

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, error, trace, warn};

use super::context::{ContextGuard, Frame};
use super::Runtime;
use crate::diagnostics::EventKind;
use crate::error::{ReactiveError, Result};
use crate::graph::{CellState, NodeId, SubscriberId, SubscriberNode};

type Getter<T> = Box<dyn FnMut(Option<&T>) -> Result<T>>;

/// Options for [`Runtime::make_computed_with`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComputedOptions {
    /// Label used in diagnostics, logs and errors.
    pub name: Option<String>,
}

impl ComputedOptions {
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
        }
    }
}

/// A lazily evaluated, cached derived value.
pub struct Computed<T> {
    inner: Rc<ComputedInner<T>>,
}

struct ComputedInner<T> {
    runtime: Runtime,
    subscriber: SubscriberId,
    node: NodeId,
    name: Option<Rc<str>>,
    value: RefCell<Option<T>>,
    getter: RefCell<Getter<T>>,
}

impl<T: Clone + PartialEq + 'static> Computed<T> {
    pub(crate) fn new(runtime: &Runtime, getter: Getter<T>, options: ComputedOptions) -> Self {
        let name: Option<Rc<str>> = options.name.map(Rc::from);
        let (node, subscriber) = {
            let mut graph = runtime.inner.graph.borrow_mut();
            let node = graph.insert_node();
            let subscriber = graph.insert_subscriber(SubscriberNode::computed(name.clone(), node));
            (node, subscriber)
        };
        trace!(subscriber = ?subscriber, name = ?name, "computed created");

        Self {
            inner: Rc::new(ComputedInner {
                runtime: runtime.clone(),
                subscriber,
                node,
                name,
                value: RefCell::new(None),
                getter: RefCell::new(getter),
            }),
        }
    }

    /// Read the value, evaluating first if it is dirty, and register a
    /// dependency for the running computation.
    ///
    /// # Panics
    ///
    /// Panics if the getter fails or the read closes a cycle. Use
    /// [`Computed::try_get`] to handle those cases.
    pub fn get(&self) -> T {
        self.try_get().unwrap_or_else(|err| panic!("{err}"))
    }

    /// Fallible form of [`Computed::get`].
    ///
    /// The dependency is registered even when the read fails, so a reader
    /// that recovers from the error still hears about the next change.
    pub fn try_get(&self) -> Result<T> {
        let value = self.current();
        self.inner.runtime.track(self.inner.node);
        value
    }

    /// Read the value without registering a dependency.
    ///
    /// # Panics
    ///
    /// Panics under the same conditions as [`Computed::get`].
    pub fn get_untracked(&self) -> T {
        self.current().unwrap_or_else(|err| panic!("{err}"))
    }

    pub fn try_get_untracked(&self) -> Result<T> {
        self.current()
    }

    fn current(&self) -> Result<T> {
        if self.state() == CellState::Clean {
            if let Some(value) = self.inner.value.borrow().as_ref() {
                trace!(name = ?self.inner.name, "cache hit");
                return Ok(value.clone());
            }
        }
        self.evaluate()
    }

    fn evaluate(&self) -> Result<T> {
        let inner = &*self.inner;
        let runtime = &inner.runtime.inner;

        {
            let mut graph = runtime.graph.borrow_mut();
            if let Some(entry) = graph.subscriber_mut(inner.subscriber) {
                if entry.evaluating {
                    error!(name = ?inner.name, subscriber = ?inner.subscriber, "cycle detected");
                    return Err(ReactiveError::Cycle {
                        name: inner.name.as_deref().map(str::to_owned),
                    });
                }
                entry.evaluating = true;
                entry.input_written = false;
            }
            graph.clear_dependencies(inner.subscriber);
        }

        runtime.diagnostics.record(EventKind::Evaluate, inner.name.as_deref());
        debug!(name = ?inner.name, subscriber = ?inner.subscriber, "evaluating computed");

        let previous = inner.value.borrow().clone();
        let result = {
            let _guard = EvaluationGuard::enter(&inner.runtime, inner.subscriber);
            let mut getter = inner.getter.borrow_mut();
            getter(previous.as_ref())
        };

        let (input_written, was_failed) = {
            let mut graph = runtime.graph.borrow_mut();
            match graph.subscriber_mut(inner.subscriber) {
                Some(entry) => {
                    let input_written = std::mem::take(&mut entry.input_written);
                    let was_failed = entry.failed;
                    entry.failed = input_written || result.is_err();
                    if !entry.failed {
                        entry.state = CellState::Clean;
                    }
                    (input_written, was_failed)
                }
                None => (false, false),
            }
        };

        let value = match result {
            Ok(_) if input_written => {
                warn!(name = ?inner.name, "getter wrote to a value it had already read");
                return Err(ReactiveError::InputWritten {
                    name: inner.name.as_deref().map(str::to_owned),
                });
            }
            Ok(value) => value,
            Err(err) => {
                let err = err.attributed_to(inner.name.as_deref());
                debug!(name = ?inner.name, error = %err, "getter failed, staying dirty");
                return Err(err);
            }
        };

        // Readers that saw the failure hold no value from this computed, so a
        // recovery always counts as a change.
        if !was_failed && previous.as_ref() == Some(&value) {
            cov_mark::hit!(computed_value_unchanged);
            trace!(name = ?inner.name, "value unchanged, not propagating");
        } else {
            *inner.value.borrow_mut() = Some(value.clone());
            debug!(name = ?inner.name, "value changed");
            inner.runtime.propagate_change(inner.node);
        }

        Ok(value)
    }
}

impl<T> Computed<T> {
    pub fn state(&self) -> CellState {
        self.inner
            .runtime
            .inner
            .graph
            .borrow()
            .subscriber(self.inner.subscriber)
            .map_or(CellState::Dirty, |entry| entry.state)
    }

    pub fn name(&self) -> Option<&str> {
        self.inner.name.as_deref()
    }

    /// Number of computeds and watches currently reading this computed.
    pub fn subscriber_count(&self) -> usize {
        self.inner
            .runtime
            .inner
            .graph
            .borrow()
            .subscriber_count_of(self.inner.node)
    }

    /// Number of values read during the last evaluation.
    pub fn dependency_count(&self) -> usize {
        self.inner
            .runtime
            .inner
            .graph
            .borrow()
            .dependency_count_of(self.inner.subscriber)
    }

    pub fn node_id(&self) -> NodeId {
        self.inner.node
    }

    pub fn subscriber_id(&self) -> SubscriberId {
        self.inner.subscriber
    }

    /// Mark this computed dirty by hand and run the watches behind it.
    pub fn invalidate(&self) {
        self.inner
            .runtime
            .invalidate_subscriber(self.inner.subscriber, self.inner.node);
    }
}

impl<T> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<T> Drop for ComputedInner<T> {
    fn drop(&mut self) {
        let removed = {
            let mut graph = self.runtime.inner.graph.borrow_mut();
            graph.remove_node(self.node);
            graph.remove_subscriber(self.subscriber)
        };
        drop(removed);
        trace!(subscriber = ?self.subscriber, name = ?self.name, "computed released");
    }
}

impl<T: fmt::Debug> fmt::Debug for Computed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = f.debug_struct("Computed");
        out.field("name", &self.inner.name);
        if let Ok(graph) = self.inner.runtime.inner.graph.try_borrow() {
            if let Some(entry) = graph.subscriber(self.inner.subscriber) {
                out.field("state", &entry.state);
            }
        }
        match self.inner.value.try_borrow() {
            Ok(value) => out.field("value", &*value),
            Err(_) => out.field("value", &"<evaluating>"),
        };
        out.finish()
    }
}

/// Tracking frame for one getter run. Clears the `evaluating` flag on drop.
struct EvaluationGuard<'a> {
    runtime: &'a Runtime,
    subscriber: SubscriberId,
    _frame: ContextGuard<'a>,
}

impl<'a> EvaluationGuard<'a> {
    fn enter(runtime: &'a Runtime, subscriber: SubscriberId) -> Self {
        Self {
            runtime,
            subscriber,
            _frame: runtime.inner.context.enter(Frame::Tracking(subscriber)),
        }
    }
}

impl Drop for EvaluationGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self
            .runtime
            .inner
            .graph
            .borrow_mut()
            .subscriber_mut(self.subscriber)
        {
            entry.evaluating = false;
        }
    }
}

// ---- Tests ----

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::DiagnosticEvent;
    use std::cell::Cell;

    fn counting_runtime() -> Runtime {
        Runtime::builder().diagnostics(true).build()
    }

    #[test]
    fn computed_caches_until_invalidated() {
        let rt = Runtime::new();
        let runs = Rc::new(Cell::new(0));
        let a = rt.make_ref(2);
        let squared = rt.make_computed({
            let a = a.clone();
            let runs = runs.clone();
            move |_| {
                runs.set(runs.get() + 1);
                a.get() * a.get()
            }
        });

        assert_eq!(squared.state(), CellState::Dirty);
        assert_eq!(squared.get(), 4);
        assert_eq!(squared.get(), 4);
        assert_eq!(runs.get(), 1);
        assert_eq!(squared.state(), CellState::Clean);

        a.set(3);
        assert_eq!(squared.state(), CellState::Dirty);
        assert_eq!(runs.get(), 1);
        assert_eq!(squared.get(), 9);
        assert_eq!(runs.get(), 2);
    }

    #[test]
    fn getter_receives_previous_value() {
        let rt = Runtime::new();
        let step = rt.make_ref(1);
        let total = rt.make_computed({
            let step = step.clone();
            move |previous: Option<&i32>| previous.copied().unwrap_or(0) + step.get()
        });

        assert_eq!(total.get(), 1);
        step.set(5);
        assert_eq!(total.get(), 6);
        step.set(2);
        assert_eq!(total.get(), 8);
    }

    #[test]
    fn unchanged_value_does_not_cascade() {
        cov_mark::check!(computed_value_unchanged);
        let rt = counting_runtime();
        let n = rt.make_ref(4);
        let parity = rt.make_computed_with(
            {
                let n = n.clone();
                move |_| n.get() % 2
            },
            ComputedOptions::named("parity"),
        );
        let label = rt.make_computed_with(
            {
                let parity = parity.clone();
                move |_| if parity.get() == 0 { "even" } else { "odd" }
            },
            ComputedOptions::named("label"),
        );
        assert_eq!(label.get(), "even");
        rt.diagnostics().clear();

        n.set(6);
        assert_eq!(parity.get(), 0);
        assert_eq!(
            rt.diagnostics().take(),
            vec![
                DiagnosticEvent::named(EventKind::Invalidate, "parity"),
                DiagnosticEvent::named(EventKind::Invalidate, "label"),
                DiagnosticEvent::named(EventKind::Evaluate, "parity"),
            ]
        );
    }

    #[test]
    fn dependencies_follow_the_last_run() {
        let rt = Runtime::new();
        let use_left = rt.make_ref(true);
        let left = rt.make_ref(1);
        let right = rt.make_ref(2);
        let pick = rt.make_computed({
            let (use_left, left, right) = (use_left.clone(), left.clone(), right.clone());
            move |_| if use_left.get() { left.get() } else { right.get() }
        });

        assert_eq!(pick.get(), 1);
        assert_eq!(pick.dependency_count(), 2);
        assert_eq!(right.subscriber_count(), 0);

        use_left.set(false);
        assert_eq!(pick.get(), 2);
        assert_eq!(left.subscriber_count(), 0);
        assert_eq!(right.subscriber_count(), 1);

        left.set(10);
        assert_eq!(pick.state(), CellState::Clean);
    }

    #[test]
    fn self_read_is_a_cycle() {
        let rt = Runtime::new();
        let slot: Rc<RefCell<Option<Computed<i32>>>> = Rc::new(RefCell::new(None));
        let looping = rt.make_fallible_computed(
            {
                let slot = slot.clone();
                move |_| match slot.borrow().as_ref() {
                    Some(me) => me.try_get().map(|v| v + 1),
                    None => Ok(0),
                }
            },
            ComputedOptions::named("looping"),
        );
        *slot.borrow_mut() = Some(looping.clone());

        let err = looping.try_get().unwrap_err();
        assert!(err.is_cycle());
        assert_eq!(err.computed_name(), Some("looping"));
        assert_eq!(looping.state(), CellState::Dirty);
        assert!(!rt.is_tracking());

        slot.borrow_mut().take();
    }

    #[test]
    fn failing_getter_stays_dirty_and_retries() {
        let rt = counting_runtime();
        let divisor = rt.make_ref(0);
        let quotient = rt.make_fallible_computed(
            {
                let divisor = divisor.clone();
                move |_| match divisor.get() {
                    0 => Err(ReactiveError::getter("division by zero")),
                    d => Ok(100 / d),
                }
            },
            ComputedOptions::named("quotient"),
        );

        let err = quotient.try_get().unwrap_err();
        assert_eq!(err.computed_name(), Some("quotient"));
        assert_eq!(quotient.state(), CellState::Dirty);
        assert!(!rt.is_tracking());

        divisor.set(4);
        assert_eq!(quotient.try_get().unwrap(), 25);
        assert_eq!(rt.diagnostics().count(EventKind::Evaluate), 2);
    }

    #[test]
    #[should_panic(expected = "division by zero")]
    fn get_panics_on_getter_error() {
        let rt = Runtime::new();
        let broken: Computed<i32> = rt.make_fallible_computed(
            |_| Err(ReactiveError::getter("division by zero")),
            ComputedOptions::default(),
        );
        broken.get();
    }

    #[test]
    fn manual_invalidate_marks_dirty_once() {
        let rt = counting_runtime();
        let c = rt.make_computed_with(|_| 1, ComputedOptions::named("one"));
        let calls = Rc::new(Cell::new(0));
        let _watch = rt.make_watch(|| c.get(), {
            let calls = calls.clone();
            move || calls.set(calls.get() + 1)
        });
        rt.diagnostics().clear();

        c.invalidate();
        c.invalidate();
        assert_eq!(rt.diagnostics().count(EventKind::Invalidate), 1);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn reader_that_handles_an_error_hears_about_the_fix() {
        let rt = Runtime::new();
        let raw = rt.make_ref(0);
        let checked = rt.make_fallible_computed(
            {
                let raw = raw.clone();
                move |_| match raw.get() {
                    0 => Err(ReactiveError::getter("zero")),
                    v => Ok(v),
                }
            },
            ComputedOptions::named("checked"),
        );
        let shown = rt.make_computed({
            let checked = checked.clone();
            move |_| checked.try_get().unwrap_or(-1)
        });

        assert_eq!(shown.get(), -1);
        assert_eq!(checked.subscriber_count(), 1);

        raw.set(5);
        assert_eq!(shown.state(), CellState::Dirty);
        assert_eq!(shown.get(), 5);

        raw.set(0);
        assert_eq!(shown.get(), -1);
        raw.set(5);
        assert_eq!(shown.get(), 5);
    }

    #[test]
    fn getter_writing_its_own_input_fails() {
        cov_mark::check!(input_written_while_evaluating);
        let rt = Runtime::new();
        let r = rt.make_ref(1);
        let bump = rt.make_computed_with(
            {
                let r = r.clone();
                move |_| {
                    let v = r.get();
                    r.set(v + 1);
                    v
                }
            },
            ComputedOptions::named("bump"),
        );

        let err = bump.try_get().unwrap_err();
        assert!(matches!(err, ReactiveError::InputWritten { .. }));
        assert_eq!(err.computed_name(), Some("bump"));
        assert_eq!(bump.state(), CellState::Dirty);
        assert_eq!(r.get_untracked(), 2);

        assert!(bump.try_get().is_err());
        assert_eq!(r.get_untracked(), 3);
    }

    #[test]
    fn writing_before_reading_is_allowed() {
        let rt = Runtime::new();
        let r = rt.make_ref(0);
        let reset = rt.make_computed({
            let r = r.clone();
            move |_| {
                r.set(10);
                r.get()
            }
        });

        assert_eq!(reset.get(), 10);
        assert_eq!(reset.state(), CellState::Clean);
    }
}
