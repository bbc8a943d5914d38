//! Docker contexts: the registry of known targets and the per-context lock.

mod lock;
mod registry;

pub use lock::{ContextGuard, ContextLocks};
pub use registry::{parse_context_listing, Context, ContextRegistry};
