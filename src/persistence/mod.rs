//! Durable storage for the session registry.
//!
//! - `store`: the load/save contract and the JSON file implementation
//! - `queue`: ordered background writer the registry feeds after each commit
//!
//! Absence of a prior snapshot is not an error: `load` returns `Ok(None)`
//! and the registry starts empty.

mod queue;
mod store;

pub use queue::PersistQueue;
pub use store::{JsonFileStore, MemoryStore, RegistrySnapshot, SessionStore};
