//! Reactive Primitives
//!
//! This module implements the reactive engine: refs, computeds and watches,
//! all created through a [`Runtime`].
//!
//! # Concepts
//!
//! ## Refs
//!
//! A [`Ref`] is a container for mutable state. Reading it inside a tracking
//! frame (a computed's getter or a watch's tracking function) subscribes that
//! computation. Writing a different value propagates to every subscriber.
//!
//! ## Computeds
//!
//! A [`Computed`] is a derived value that caches its result. A write upstream
//! only marks it dirty; it re-evaluates on its next read, at most once between
//! two reads, and stops propagation when the recomputed value is unchanged.
//!
//! ## Watches
//!
//! A [`Watch`] runs a callback synchronously whenever a value it tracked
//! changes, once per write even when several paths lead to it.
//!
//! # Propagation
//!
//! A write first marks every downstream computed dirty, and only then runs the
//! downstream watches. A callback therefore always observes consistent
//! computeds, and reading one from a callback recomputes it on demand.

mod cell;
mod computed;
mod context;
mod runtime;
mod subscriber;
mod watch;

pub use cell::Ref;
pub use computed::{Computed, ComputedOptions};
pub use runtime::Runtime;
pub use subscriber::Subscriber;
pub use watch::{Watch, WatchOptions};
