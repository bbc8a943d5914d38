//! Per-context mutual exclusion.
//!
//! The table holds an entry only while a context is held; absence means
//! free. Acquisition is a single insert under one mutex, so two callers
//! can never both observe a context as free.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

/// Table of held contexts.
///
/// Cloning shares the same table.
#[derive(Debug, Clone, Default)]
pub struct ContextLocks {
    held: Arc<Mutex<HashSet<String>>>,
}

impl ContextLocks {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `context` as held. Returns false immediately if it already is.
    #[must_use]
    pub fn try_acquire(&self, context: &str) -> bool {
        let acquired = self.held.lock().insert(context.to_string());
        debug!(context = %context, acquired, "Context lock acquire");
        acquired
    }

    /// Frees `context`. Safe to call when it is not held.
    pub fn release(&self, context: &str) {
        if self.held.lock().remove(context) {
            debug!(context = %context, "Context lock released");
        }
    }

    /// Acquires `context` for the lifetime of the returned guard.
    #[must_use]
    pub fn try_guard(&self, context: &str) -> Option<ContextGuard> {
        self.try_acquire(context).then(|| ContextGuard {
            locks: self.clone(),
            context: context.to_string(),
        })
    }

    /// Returns true if `context` is held.
    #[must_use]
    pub fn is_held(&self, context: &str) -> bool {
        self.held.lock().contains(context)
    }

    /// Number of contexts currently held.
    #[must_use]
    pub fn held_count(&self) -> usize {
        self.held.lock().len()
    }
}

/// Holds a context until dropped.
///
/// Dropping releases on every exit path, including `?` returns and a
/// caller abandoning the future mid-run.
#[derive(Debug)]
pub struct ContextGuard {
    locks: ContextLocks,
    context: String,
}

impl ContextGuard {
    /// The held context.
    #[must_use]
    pub fn context(&self) -> &str {
        &self.context
    }
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        self.locks.release(&self.context);
    }
}
