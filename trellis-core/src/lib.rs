//! Trellis Core
//!
//! A synchronous, fine-grained reactive dependency-tracking engine. It
//! provides:
//!
//! - mutable source cells ([`Ref`]),
//! - lazily cached derived values ([`Computed`]),
//! - eager side-effect subscriptions ([`Watch`]),
//!
//! wired together by a dependency graph that is built automatically from the
//! reads each computation performs.
//!
//! # Architecture
//!
//! - `reactive`: the user-facing primitives and the [`Runtime`] that owns them
//! - `graph`: the dependency graph and its propagation passes
//! - `diagnostics`: an optional ordered log of evaluations, invalidations and
//!   callbacks
//! - `config`: runtime configuration
//!
//! # Example
//!
//! ```rust
//! use std::cell::Cell;
//! use std::rc::Rc;
//! use trellis_core::Runtime;
//!
//! let rt = Runtime::new();
//!
//! // Create a ref
//! let count = rt.make_ref(1);
//!
//! // Create a derived value
//! let doubled = rt.make_computed({
//!     let count = count.clone();
//!     move |_| count.get() * 2
//! });
//!
//! // Create a watch
//! let seen = Rc::new(Cell::new(0));
//! let _watch = rt.make_watch(|| doubled.get(), {
//!     let (doubled, seen) = (doubled.clone(), seen.clone());
//!     move || seen.set(doubled.get())
//! });
//!
//! // Update the ref: the watch runs and reads the fresh value
//! count.set(5);
//! assert_eq!(seen.get(), 10);
//! ```

pub mod config;
pub mod diagnostics;
pub mod error;
pub mod graph;
pub mod reactive;

mod hash;

pub use config::{RuntimeBuilder, RuntimeConfig};
pub use diagnostics::{DiagnosticEvent, Diagnostics, EventKind};
pub use error::{ReactiveError, Result};
pub use graph::{CellState, NodeId, SubscriberId, SubscriberKind};
pub use reactive::{Computed, ComputedOptions, Ref, Runtime, Subscriber, Watch, WatchOptions};
