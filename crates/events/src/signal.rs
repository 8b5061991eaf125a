//! Signals emitted by the backing store.

/// Emitted exactly once per successful store save.
///
/// Carries no description of what changed: consumers always re-query.
/// `generation` is the store's running count of successful saves, which lets a
/// writer wait until a consumer has caught up with its own save.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StoreSaved {
    pub generation: u64,
}

impl StoreSaved {
    pub fn new(generation: u64) -> Self {
        Self { generation }
    }
}
