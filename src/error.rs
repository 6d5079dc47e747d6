//! The error type shared by every fallible operation in the crate.

use thiserror::Error;

/// Every error a [`crate::waterwork::Waterwork`] or [`crate::transforms::Transform`]
/// can raise, per §7 of the design.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum WaterworksError {
    /// A second [`crate::waterwork::Waterwork`] tried to enter scope while one was
    /// already active.
    #[error("scope conflict: waterwork '{active}' is already active, cannot enter '{attempted}'")]
    ScopeConflict { active: String, attempted: String },

    /// A part was created whose full name collides with one already registered.
    #[error("name collision: '{name}' is already defined in waterwork '{waterwork}'")]
    NameCollision { waterwork: String, name: String },

    /// A slot's descriptor disagreed with the tube it was linked to.
    #[error(
        "type mismatch linking slot '{slot}' ({slot_descriptor}) to tube '{tube}' ({tube_descriptor})"
    )]
    TypeMismatch {
        slot: String,
        tube: String,
        slot_descriptor: String,
        tube_descriptor: String,
    },

    /// A key passed to `pour` did not resolve to a funnel (slot or placeholder).
    #[error("unknown funnel key: '{0}'")]
    UnknownFunnel(String),

    /// A key passed to `pump` did not resolve to a tap (tube).
    #[error("unknown tap key: '{0}'")]
    UnknownTap(String),

    /// A funnel (pour) or tap (pump) had no value at execution time.
    #[error("missing input: '{0}' has no value")]
    MissingInput(String),

    /// The dependency graph among tanks is not acyclic.
    #[error("cycle detected involving tank '{0}'")]
    CycleDetected(String),

    /// `key_mode` was outside `{str, tuple, obj}`.
    #[error("bad key mode: '{0}'")]
    BadKeyMode(String),

    /// A [`crate::transforms::Transform`] was asked to fit statistics over an empty dataset.
    #[error("empty fit: '{0}' was given zero examples")]
    EmptyFit(String),

    /// A tank's `pump` result failed the debug-mode reversal self-check.
    #[error("reversal violation in tank '{tank}' at slot '{slot}': expected {expected}, got {actual}")]
    ReversalViolation {
        tank: String,
        slot: String,
        expected: String,
        actual: String,
    },

    /// A tank received a slot value it cannot operate on (wrong shape, dtype, etc).
    #[error("invalid value for tank '{tank}' slot '{slot}': {reason}")]
    InvalidValue {
        tank: String,
        slot: String,
        reason: String,
    },
}

/// Convenience alias used throughout the crate.
pub type WwResult<T> = Result<T, WaterworksError>;
