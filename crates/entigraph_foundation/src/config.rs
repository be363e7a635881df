//! Commit and indexing policy for a store.

/// What a commit does when some entities fail finalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum CommitStrictness {
    /// Fail the whole commit with the first violation. The builder is left
    /// untouched so the caller can repair it and retry.
    #[default]
    RejectSession,
    /// Leave violating entities (and whatever their removal cascades to) out
    /// of the new snapshot and report them in the change set.
    DropViolating,
}

/// Configuration shared by a store, its snapshots, and their builders.
#[derive(Clone, Debug)]
pub struct StoreConfig {
    /// Commit behaviour on finalization failures.
    pub strictness: CommitStrictness,

    /// Reject commits in which two live entities share a symbolic id.
    pub unique_symbolic_ids: bool,

    /// Reject links that would make an entity its own ancestor.
    pub detect_cycles: bool,

    /// Removing a parent also removes children held through non-nullable
    /// connections. When disabled, such children are only unlinked and the
    /// commit reports them as missing a parent.
    pub cascade_removal: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            strictness: CommitStrictness::RejectSession,
            unique_symbolic_ids: true,
            detect_cycles: true,
            cascade_removal: true,
        }
    }
}

impl StoreConfig {
    /// The default configuration: every check on, whole-session rejection.
    #[must_use]
    pub fn strict() -> Self {
        Self::default()
    }

    /// Drops violating entities instead of rejecting the commit.
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            strictness: CommitStrictness::DropViolating,
            ..Self::default()
        }
    }

    /// Builder method to set the commit strictness.
    #[must_use]
    pub fn with_strictness(mut self, strictness: CommitStrictness) -> Self {
        self.strictness = strictness;
        self
    }

    /// Builder method to toggle symbolic id uniqueness.
    #[must_use]
    pub fn with_unique_symbolic_ids(mut self, unique: bool) -> Self {
        self.unique_symbolic_ids = unique;
        self
    }

    /// Builder method to toggle cycle detection.
    #[must_use]
    pub fn with_detect_cycles(mut self, detect: bool) -> Self {
        self.detect_cycles = detect;
        self
    }

    /// Builder method to toggle cascade removal.
    #[must_use]
    pub fn with_cascade_removal(mut self, cascade: bool) -> Self {
        self.cascade_removal = cascade;
        self
    }
}
