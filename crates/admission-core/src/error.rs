//! Error taxonomy for the admission gate.
//!
//! Every failure carries a fieldless [`ErrorKind`] tag so callers branch on
//! structure, never on message text. Kinds split into policy denials (the
//! request is rejected with a reason) and system faults (the request is
//! rejected with an internal error).

use admission_state::StorageError;
use serde::{Deserialize, Serialize};

use crate::upgrade::UpgradeReason;

/// Distinguishable error categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Caller supplied an empty or malformed key. Never retried.
    InvalidRequest,
    /// A requested release, SKU or record does not exist.
    NotFound,
    /// A collaborator returned a value that violates its contract.
    UpstreamInvalidResponse,
    /// A collaborator could not be reached.
    UpstreamUnavailable,
    /// The caller cancelled the call or its deadline passed.
    Cancelled,
    /// Upgrade target is not in the catalog.
    ReleaseNotFound,
    /// Upgrade target is older than the current release.
    Downgrade,
    /// Upgrade mixes an alpha and a non-alpha release.
    AlphaBoundary,
    /// Upgrade skips an intermediate minor or major release.
    ReleaseSkipped,
    /// A node-pool or metadata rule rejected the object.
    PolicyViolation,
}

/// Admission gate errors.
#[derive(Debug, thiserror::Error)]
pub enum AdmissionError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("SKU {instance_type} not found in region {region}")]
    SkuNotFound {
        region: String,
        instance_type: String,
    },

    #[error("release {0} not found")]
    ReleaseNotFound(String),

    #[error("{kind} {name} not found")]
    RecordNotFound { kind: String, name: String },

    #[error("invalid upstream response: capability {capability} of {instance_type} is {}", .value.as_deref().unwrap_or("missing"))]
    UpstreamInvalidResponse {
        instance_type: String,
        capability: String,
        value: Option<String>,
    },

    #[error("release {name} is not a semantic version: {reason}")]
    InvalidRelease { name: String, reason: String },

    #[error("malformed record: {0}")]
    MalformedRecord(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(#[source] StorageError),

    #[error("{op} cancelled")]
    Cancelled { op: &'static str },

    #[error("{op} deadline exceeded")]
    DeadlineExceeded { op: &'static str },

    #[error("{message}")]
    UpgradeDenied {
        reason: UpgradeReason,
        message: String,
    },

    #[error("policy violation: {0}")]
    PolicyViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl AdmissionError {
    /// The category tag of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AdmissionError::InvalidRequest(_) | AdmissionError::Serialization(_) => {
                ErrorKind::InvalidRequest
            }
            AdmissionError::SkuNotFound { .. }
            | AdmissionError::ReleaseNotFound(_)
            | AdmissionError::RecordNotFound { .. } => ErrorKind::NotFound,
            AdmissionError::UpstreamInvalidResponse { .. }
            | AdmissionError::InvalidRelease { .. }
            | AdmissionError::MalformedRecord(_) => ErrorKind::UpstreamInvalidResponse,
            AdmissionError::UpstreamUnavailable(_) => ErrorKind::UpstreamUnavailable,
            AdmissionError::Cancelled { .. } | AdmissionError::DeadlineExceeded { .. } => {
                ErrorKind::Cancelled
            }
            AdmissionError::UpgradeDenied { reason, .. } => reason.error_kind(),
            AdmissionError::PolicyViolation(_) => ErrorKind::PolicyViolation,
        }
    }

    pub fn is_invalid_request(&self) -> bool {
        self.kind() == ErrorKind::InvalidRequest
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_upstream_invalid_response(&self) -> bool {
        self.kind() == ErrorKind::UpstreamInvalidResponse
    }

    pub fn is_upstream_unavailable(&self) -> bool {
        self.kind() == ErrorKind::UpstreamUnavailable
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }

    /// Expected outcome that becomes a rejected-with-reason response.
    pub fn is_policy_denial(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::NotFound
                | ErrorKind::ReleaseNotFound
                | ErrorKind::Downgrade
                | ErrorKind::AlphaBoundary
                | ErrorKind::ReleaseSkipped
                | ErrorKind::PolicyViolation
        )
    }

    /// Fault that becomes a rejected-with-internal-error response.
    pub fn is_system_fault(&self) -> bool {
        !self.is_policy_denial()
    }
}

impl From<StorageError> for AdmissionError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { kind, name } => AdmissionError::RecordNotFound { kind, name },
            StorageError::Decode(message) => AdmissionError::MalformedRecord(message),
            other => AdmissionError::UpstreamUnavailable(other),
        }
    }
}

/// Result type for admission gate operations.
pub type Result<T> = std::result::Result<T, AdmissionError>;
