//! Reactive Primitives
//!
//! This module implements the base of the engine: containers and effects.
//!
//! # Concepts
//!
//! ## Containers
//!
//! A [`Container`] holds a value and a list of subscribers. Writing a value
//! that differs from the current one notifies every subscriber, synchronously
//! and in registration order. `map` derives a new container that follows its
//! source.
//!
//! ## Effects
//!
//! An [`Effect`] is a container with `bind`, which sequences a computation
//! that itself produces a reactive value. Only the most recently produced
//! inner effect stays connected.
//!
//! # Implementation Notes
//!
//! There is no scheduler and no dependency graph. Propagation is plain
//! subscriber calls, so a diamond-shaped derivation recomputes its bottom
//! node once per path. Every derived node owns the subscriptions it created
//! and gives them back on `dispose`.

mod container;
mod effect;
mod subscriber;

pub use container::{Container, DisposeGuard, Trigger, Value};
pub use effect::{apply, flatten, sequence, Effect, Func};
pub use subscriber::{SubscriberId, Subscription, SubscriptionGuard};
