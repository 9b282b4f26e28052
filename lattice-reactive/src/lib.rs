//! Lattice Reactive
//!
//! This crate provides the reactive value engine behind Lattice. It
//! implements:
//!
//! - Reactive containers with change-suppressing, synchronous notification
//! - Effects with monadic `bind` and switch semantics
//! - Temporal operators (delay, timeout, interval, debounce, throttle)
//! - State wrappers, reducer machines and table-driven FSMs
//! - Asynchronous fetches as tri-state reactive values, with retry and caching
//! - Composable plugins over containers
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - `reactive`: containers, effects and subscriptions
//! - `time`: timers on the tokio runtime and the operators built on them
//! - `state`: the State wrapper, `Machine` and `Fsm`
//! - `net`: `Fetch` and the key-value store interface
//! - `plugin`: the plugin arrow, composition and built-in plugins
//!
//! Everything propagates synchronously. Timers and network work re-enter
//! through a container's setter when they complete, and every derived value
//! can be disposed to release what it holds.
//!
//! # Example
//!
//! ```rust
//! use lattice_reactive::reactive::{Container, Effect};
//! use lattice_reactive::state::machine;
//!
//! let count = Container::new(5);
//! let doubled = count.map(|x| x * 2);
//! count.set(10);
//! assert_eq!(doubled.value(), 20);
//!
//! let page = Effect::new(1);
//! let label = page.bind(|p| Effect::pure(format!("page {p}")));
//! page.set(2);
//! assert_eq!(label.value(), "page 2");
//!
//! let status = machine("idle", |s: &&'static str, a: &&'static str| match (*s, *a) {
//!     ("idle", "start") => "loading",
//!     _ => *s,
//! });
//! status.send("start");
//! assert_eq!(status.state(), "loading");
//! ```

pub mod config;
pub mod error;
pub mod net;
pub mod plugin;
pub mod reactive;
pub mod state;
pub mod time;

pub use config::EngineConfig;
pub use error::{ReactiveError, Result};
pub use net::{AsyncState, Fetch};
pub use plugin::{compose, Pipeline, Plugin};
pub use reactive::{Container, Effect, Subscription};
pub use state::{Fsm, Machine, State};
pub use time::Time;
