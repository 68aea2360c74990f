//! Connection registry: the single shared mutable resource of the core.
//!
//! Maps a user identity to its set of live connection handles and reports the
//! offline→online / online→offline transition edges that drive presence
//! broadcasts.

#[allow(clippy::module_inception)]
mod registry;
mod types;

pub use registry::{CleanupOutcome, ConnectionRegistry, Deregistration, Registration, RegistryStats};
pub use types::{ConnectionError, ConnectionHandle, ConnectionLimits};
