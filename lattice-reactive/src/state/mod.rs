//! State Layer
//!
//! Three independent ways to model state on top of the reactive core:
//!
//! - [`State`]: a State-monad style wrapper with explicit threading.
//! - [`Machine`]: a free-form reducer over actions, with [`combine`] for
//!   running two machines as one.
//! - [`Fsm`]: a finite state machine restricted to an explicit transition
//!   table with optional guards.

mod fsm;
mod machine;
mod monad;

pub use fsm::{fsm, Fsm, Transition};
pub use machine::{combine, machine, Machine, Routed};
pub use monad::State;
