//! Network Layer
//!
//! Asynchronous requests as reactive values, plus the storage interface the
//! cache and persistence features write through.

mod fetch;
mod store;

pub use fetch::{fetch, AsyncState, Fetch};
pub use store::{FileStore, KeyValueStore, MemoryStore, Stamped};
pub(crate) use store::{load, load_fresh, save, save_stamped};
