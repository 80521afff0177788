//! Spawner Core Domain Types
//!
//! This crate contains the backend-independent pieces of Spawner:
//! - `World`, the caller-facing handle to a remotely running unit
//! - `Context`, the cancellation/deadline signal every operation honors
//! - `Spawner`, the lifecycle contract (`spawn`, `kill`, `ps`) each
//!   backend adapter implements
//!
//! Nothing here talks to the network.

pub mod context;
pub mod error;
pub mod spawner;
pub mod status;
pub mod world;

// Re-export commonly used types
pub use context::Context;
pub use error::{ContextError, SpawnError};
pub use spawner::Spawner;
pub use status::UnitStatus;
pub use world::{decode_worlds, encode_worlds, Details, World};
