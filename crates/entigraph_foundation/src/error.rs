//! Error types for the entigraph store.
//!
//! Uses `thiserror` for ergonomic error definition with rich context.
//!
//! Structural and ownership errors ([`ErrorKind::AlreadyAttached`],
//! [`ErrorKind::DuplicateCommit`], [`ErrorKind::TypeMismatch`]) are raised
//! eagerly by the offending call. Completeness errors
//! ([`ErrorKind::UninitializedField`], [`ErrorKind::Consistency`]) are raised
//! when a builder is committed.

use std::fmt;

use thiserror::Error;

use crate::entity::EntityId;

/// Convenience alias used throughout the workspace.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for store operations.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct Error {
    /// The kind of error that occurred.
    pub kind: ErrorKind,
    /// Optional context about where the error occurred.
    pub context: Option<ErrorContext>,
}

impl Error {
    /// Creates a new error with the given kind.
    #[must_use]
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: None,
        }
    }

    /// Adds context to this error.
    #[must_use]
    pub fn with_context(mut self, context: ErrorContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Pushes a frame onto this error's context, creating it if needed.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        let context = self.context.take().unwrap_or_default();
        self.context = Some(context.with_frame(frame));
        self
    }

    /// Creates an entity not found error.
    #[must_use]
    pub fn not_found(id: EntityId) -> Self {
        Self::new(ErrorKind::NotFound(id))
    }

    /// Creates an uninitialized field error.
    #[must_use]
    pub fn uninitialized_field(entity_type: impl Into<String>, field: impl Into<String>) -> Self {
        Self::new(ErrorKind::UninitializedField {
            entity_type: entity_type.into(),
            field: field.into(),
        })
    }

    /// Creates a consistency error.
    #[must_use]
    pub fn consistency(
        entity_type: impl Into<String>,
        relation: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::new(ErrorKind::Consistency {
            entity_type: entity_type.into(),
            relation: relation.into(),
            message: message.into(),
        })
    }

    /// Creates a type mismatch error.
    #[must_use]
    pub fn type_mismatch(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::new(ErrorKind::TypeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        })
    }

    /// Creates a schema error.
    #[must_use]
    pub fn schema(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Schema(message.into()))
    }

    /// Returns true if this error must abort a whole commit rather than the
    /// single call that raised it.
    #[must_use]
    pub fn is_deferred(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::UninitializedField { .. } | ErrorKind::Consistency { .. }
        )
    }
}

/// Categorized error kinds for pattern matching.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ErrorKind {
    /// Entity id is unknown, freed, or from a stale generation.
    #[error("entity not found: {0:?}")]
    NotFound(EntityId),

    /// A required field was not set when the entity was finalized.
    #[error("uninitialized field `{field}` on {entity_type}")]
    UninitializedField {
        /// Name of the owning entity type.
        entity_type: String,
        /// Name of the missing field.
        field: String,
    },

    /// A relation or uniqueness constraint does not hold.
    #[error("consistency violation on {entity_type}.{relation}: {message}")]
    Consistency {
        /// Name of the entity type that violates the constraint.
        entity_type: String,
        /// Relation (or field) the constraint is about.
        relation: String,
        /// Human-readable description.
        message: String,
    },

    /// An entity or value does not have the type a role or field demands.
    #[error("type mismatch: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Description of the expected type or capability.
        expected: String,
        /// Description of what was supplied.
        actual: String,
    },

    /// A detached entity is already bound to another live builder.
    #[error("entity is already attached to builder session {session}")]
    AlreadyAttached {
        /// Session the entity is currently bound to.
        session: u64,
    },

    /// The builder was already committed.
    #[error("builder was already committed")]
    DuplicateCommit,

    /// A write was attempted on a committed builder.
    #[error("builder is closed")]
    BuilderClosed,

    /// The builder was derived from a snapshot that is no longer current.
    #[error("builder base (version {base}) is not the current snapshot (version {current})")]
    StaleBuilder {
        /// Version of the snapshot the builder was derived from.
        base: u64,
        /// Version of the store's current snapshot.
        current: u64,
    },

    /// Unknown type, field, or connection, or an accessor used against a
    /// connection of the wrong cardinality.
    #[error("schema error: {0}")]
    Schema(String),
}

/// Context about where an error occurred.
#[derive(Debug, Clone, Default)]
pub struct ErrorContext {
    /// Operation that was running.
    pub operation: Option<String>,
    /// Stack of entities and relations being processed, outermost first.
    pub stack: Vec<String>,
}

impl ErrorContext {
    /// Creates a new empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Adds a stack frame.
    #[must_use]
    pub fn with_frame(mut self, frame: impl Into<String>) -> Self {
        self.stack.push(frame.into());
        self
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(operation) = &self.operation {
            write!(f, "during {operation}")?;
        }
        if !self.stack.is_empty() {
            writeln!(f)?;
            for frame in &self.stack {
                writeln!(f, "  in {frame}")?;
            }
        }
        Ok(())
    }
}
