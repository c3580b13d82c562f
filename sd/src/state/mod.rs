//! Durable state with a single-consumer mailbox
//!
//! StateManager owns the statestore on a dedicated worker thread and serves
//! get/set commands from one FIFO mailbox, so every mutation is totally
//! ordered and async callers never block on disk I/O.

pub mod keys;
mod manager;
mod messages;

pub use manager::StateManager;
pub use messages::{StateCommand, StateError, StateResponse};
