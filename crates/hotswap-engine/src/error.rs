//! Engine error types
//!
//! Structural problems with supplied units are reported as a
//! [`RejectReason`]. The registration path wraps it in [`RegistryError`],
//! the reload path in [`ReloadRejected`]; neither changes any state.
//! Invocation-time failures are [`LookupError`]s.

use hotswap_unit::{TypeDesc, UnitError, VerifyError};
use thiserror::Error;

/// Why a unit was refused
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Bytes do not form a valid type unit
    #[error("malformed unit: {0}")]
    MalformedUnit(String),

    /// A field kept its name but changed its declared type
    #[error("field {field} retyped from {from} to {to}")]
    IncompatibleFieldRetype {
        /// Field name
        field: String,
        /// Previously declared type
        from: TypeDesc,
        /// Newly declared type
        to: TypeDesc,
    },

    /// The supertype changed
    #[error("supertype changed from {expected:?} to {found:?}")]
    IncompatibleSupertype {
        /// Supertype of the initial version
        expected: Option<String>,
        /// Supertype of the candidate
        found: Option<String>,
    },

    /// A method switched between static and instance
    #[error("method {0} switched between static and instance")]
    IncompatibleMethodKind(String),

    /// The bytes define a different type
    #[error("unit defines {found}, expected {expected}")]
    NameMismatch {
        /// Name of the reloaded type
        expected: String,
        /// Name found in the bytes
        found: String,
    },

    /// The label is already used by an earlier version
    #[error("version label {0:?} already used")]
    DuplicateVersionLabel(String),

    /// A generated cross-type reference names an unregistered type
    #[error("{from} references unregistered type {missing}")]
    UnresolvedSibling {
        /// Type holding the reference
        from: String,
        /// Referenced type
        missing: String,
    },

    /// A closure site's capture shape cannot be remapped
    #[error("capture site {site} cannot be rebound: {detail}")]
    ClosureShapeMismatch {
        /// Site key
        site: String,
        /// What differs
        detail: String,
    },

    /// The owning registry no longer exists
    #[error("registry has been dropped")]
    Detached,
}

impl From<UnitError> for RejectReason {
    fn from(e: UnitError) -> Self {
        RejectReason::MalformedUnit(e.to_string())
    }
}

impl From<VerifyError> for RejectReason {
    fn from(e: VerifyError) -> Self {
        RejectReason::MalformedUnit(e.to_string())
    }
}

/// A refused reload; the type is left exactly as it was
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("reload of {type_name} as {label:?} rejected: {reason}")]
pub struct ReloadRejected {
    /// Reloaded type
    pub type_name: String,
    /// Requested version label
    pub label: String,
    /// Why
    pub reason: RejectReason,
}

/// Registry operation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Bytes do not form a valid type unit
    #[error("malformed unit for {name}: {detail}")]
    MalformedUnit {
        /// Name passed to the registry
        name: String,
        /// Decoder or verifier message
        detail: String,
    },

    /// A generated cross-type reference names an unregistered type
    #[error("{from} references unregistered type {missing}; register it first")]
    UnresolvedSibling {
        /// Type holding the reference
        from: String,
        /// Referenced type
        missing: String,
    },

    /// The name is already registered
    #[error("{0} is already registered; reload it instead")]
    DuplicateRegistration(String),

    /// The name is not matched by the include patterns
    #[error("{0} is not included by the registry configuration")]
    NotIncluded(String),

    /// The name lies outside the scope it was passed to
    #[error("{name} is outside scope {pattern}")]
    OutOfScope {
        /// Scope pattern
        pattern: String,
        /// Offending name
        name: String,
    },

    /// No type with this name is registered
    #[error("unknown type {0}")]
    UnknownType(String),

    /// A scope pattern did not parse
    #[error("invalid name pattern {0:?}")]
    InvalidPattern(String),

    /// Registration failed for another structural reason
    #[error("registration of {name} rejected: {reason}")]
    Rejected {
        /// Name passed to the registry
        name: String,
        /// Why
        reason: RejectReason,
    },

    /// A reload inside a scope operation failed
    #[error(transparent)]
    Reload(#[from] ReloadRejected),
}

impl RegistryError {
    pub(crate) fn from_reason(name: &str, reason: RejectReason) -> Self {
        match reason {
            RejectReason::MalformedUnit(detail) => RegistryError::MalformedUnit {
                name: name.to_string(),
                detail,
            },
            RejectReason::UnresolvedSibling { from, missing } => {
                RegistryError::UnresolvedSibling { from, missing }
            }
            reason => RegistryError::Rejected {
                name: name.to_string(),
                reason,
            },
        }
    }
}

/// Method lookup failures at invocation time
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The signature existed in an earlier version but not the current one
    #[error("{type_name}.{signature} was removed by a reload")]
    RemovedMemberInvoked {
        /// Type name
        type_name: String,
        /// Signature key
        signature: String,
    },

    /// The signature was never declared by any version
    #[error("{type_name} has no member {signature}")]
    NoSuchMember {
        /// Type name
        type_name: String,
        /// Signature key
        signature: String,
    },
}
