//! Write side effects and the scoped guard that suppresses them.

use super::DestinationStore;

/// Side effects the destination performs on every write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WritePolicy {
    pub index_on_write: bool,
    pub send_notifications: bool,
    pub check_permissions: bool,
}

impl WritePolicy {
    /// Regular interactive writes.
    pub const NORMAL: Self = Self {
        index_on_write: true,
        send_notifications: true,
        check_permissions: true,
    };

    /// Trusted bulk writes followed by a single reindex.
    pub const BULK_IMPORT: Self = Self {
        index_on_write: false,
        send_notifications: false,
        check_permissions: false,
    };
}

impl Default for WritePolicy {
    fn default() -> Self {
        Self::NORMAL
    }
}

/// Holds the bulk import policy for as long as it lives.
///
/// The previous policy is restored on drop, including during unwinding.
pub struct WritePolicyGuard<'a> {
    store: &'a dyn DestinationStore,
    previous: WritePolicy,
}

impl<'a> WritePolicyGuard<'a> {
    #[must_use]
    pub fn acquire(store: &'a dyn DestinationStore, policy: WritePolicy) -> Self {
        let previous = store.write_policy();
        store.set_write_policy(policy);
        tracing::debug!(?previous, ?policy, "Write policy acquired");
        Self { store, previous }
    }

    #[must_use]
    pub const fn previous(&self) -> WritePolicy {
        self.previous
    }
}

impl Drop for WritePolicyGuard<'_> {
    fn drop(&mut self) {
        self.store.set_write_policy(self.previous);
        tracing::debug!(policy = ?self.previous, "Write policy restored");
    }
}

impl std::fmt::Debug for WritePolicyGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WritePolicyGuard")
            .field("previous", &self.previous)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::SqliteDestination;
    use std::panic::{AssertUnwindSafe, catch_unwind};

    #[test]
    fn restores_previous_policy_on_drop() {
        let store = SqliteDestination::open_memory().unwrap();
        {
            let _guard = WritePolicyGuard::acquire(&store, WritePolicy::BULK_IMPORT);
            assert_eq!(store.write_policy(), WritePolicy::BULK_IMPORT);
        }
        assert_eq!(store.write_policy(), WritePolicy::NORMAL);
    }

    #[test]
    fn restores_policy_when_unwinding() {
        let store = SqliteDestination::open_memory().unwrap();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _guard = WritePolicyGuard::acquire(&store, WritePolicy::BULK_IMPORT);
            panic!("phase blew up");
        }));
        assert!(outcome.is_err());
        assert_eq!(store.write_policy(), WritePolicy::NORMAL);
    }
}
