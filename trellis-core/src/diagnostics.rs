//! Diagnostic Event Log
//!
//! An append-only record of what the engine did, in order. It is an observer
//! only: enabling or clearing it never changes propagation.
//!
//! # Contract
//!
//! - one [`EventKind::Evaluate`] per getter invocation, recorded just before
//!   the getter runs;
//! - one [`EventKind::Invalidate`] per real `Clean → Dirty` transition;
//! - one [`EventKind::Callback`] per watch callback that actually runs.
//!
//! For a fixed sequence of operations the log is identical from run to run.

use std::cell::{Cell, RefCell};

use serde::{Deserialize, Serialize};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A computed's getter is about to run.
    Evaluate,
    /// A computed went from clean to dirty.
    Invalidate,
    /// A watch callback is about to run.
    Callback,
}

/// A single log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    pub kind: EventKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl DiagnosticEvent {
    pub fn new(kind: EventKind, name: Option<&str>) -> Self {
        Self {
            kind,
            name: name.map(str::to_owned),
        }
    }

    /// Shorthand for a named event, mostly for assertions.
    pub fn named(kind: EventKind, name: &str) -> Self {
        Self::new(kind, Some(name))
    }
}

/// The log owned by a runtime.
#[derive(Debug, Default)]
pub struct Diagnostics {
    enabled: Cell<bool>,
    events: RefCell<Vec<DiagnosticEvent>>,
}

impl Diagnostics {
    pub(crate) fn new(enabled: bool, capacity: usize) -> Self {
        Self {
            enabled: Cell::new(enabled),
            events: RefCell::new(Vec::with_capacity(if enabled { capacity } else { 0 })),
        }
    }

    pub(crate) fn record(&self, kind: EventKind, name: Option<&str>) {
        if self.enabled.get() {
            self.events.borrow_mut().push(DiagnosticEvent::new(kind, name));
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.get()
    }

    /// Start or stop recording. Already recorded events are kept.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.set(enabled);
    }

    /// Snapshot of the log.
    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.borrow().clone()
    }

    /// Drain the log, returning everything recorded so far.
    pub fn take(&self) -> Vec<DiagnosticEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }

    pub fn clear(&self) {
        self.events.borrow_mut().clear();
    }

    pub fn len(&self) -> usize {
        self.events.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.borrow().is_empty()
    }

    /// Number of recorded events of one kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.kind == kind)
            .count()
    }

    /// Serialize the log as a JSON array, in recording order.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(&*self.events.borrow())
    }
}
