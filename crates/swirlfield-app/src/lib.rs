//! Shared application plumbing for the swirlfield server.

use std::sync::{Arc, RwLock};

use swirlfield_core::FieldState;

/// The single authoritative field, written by the simulation loop once per
/// tick and read by the broadcaster and query handlers. Writers publish a
/// fully-built snapshot under a short write lock; readers clone under a read
/// lock and never observe a partially-updated generation.
pub type SharedField = Arc<RwLock<FieldState>>;

pub mod broadcast;
pub mod servers;

pub use broadcast::{Broadcaster, ViewerKey};
pub use servers::{AppState, router};
