//! # Sync Error Types
//!
//! Error types for sync operations.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Configuration ── InvalidConfig, InvalidUrl, ConfigLoad/SaveFailed      │
//! │  Authentication ─ AuthFailed (handshake), Unauthorized (after retry)   │
//! │  Transport ────── Http, Timeout, ServiceStatus, ServiceRejected         │
//! │  Protocol ─────── Serialization / DeserializationFailed                │
//! │  Reconciliation ─ Domain(CoreError), PartnerCreationFailed             │
//! │  Database ─────── Database(DbError)                                    │
//! │  Run control ──── NoWatermark, AlreadyRunning, ShuttingDown, Channel   │
//! │                                                                         │
//! │  Where they land:                                                      │
//! │  • Raised while reconciling one invoice → recorded, run continues      │
//! │  • Raised while counting / paging      → run aborts, state untouched   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use ledger_core::CoreError;
use ledger_db::DbError;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible sync failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid service URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Authentication Errors
    // =========================================================================
    /// The login handshake was rejected or returned no token.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// A call was rejected again after re-authenticating once.
    #[error("Request to {path} unauthorized (HTTP {status}) after re-authentication")]
    Unauthorized { path: String, status: u16 },

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Network-level failure (connect, reset, TLS).
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The service answered with a non-success status.
    #[error("Tax service returned HTTP {status} for {path}: {body}")]
    ServiceStatus {
        path: String,
        status: u16,
        body: String,
    },

    /// The service answered `ok: false`.
    #[error("Tax service rejected the request: {0}")]
    ServiceRejected(String),

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    #[error("Deserialization failed: {0}")]
    DeserializationFailed(String),

    // =========================================================================
    // Reconciliation Errors
    // =========================================================================
    /// Business rule violation in an external record.
    #[error(transparent)]
    Domain(#[from] CoreError),

    /// Supplier partner could not be created; the invoice was skipped.
    #[error("Could not create partner {tin}: {reason}")]
    PartnerCreationFailed { tin: String, reason: String },

    /// No free item code was found for a prefix.
    #[error("Item codes exhausted for prefix {0}")]
    CodesExhausted(String),

    // =========================================================================
    // Database Errors
    // =========================================================================
    #[error("Database error: {0}")]
    Database(#[source] DbError),

    // =========================================================================
    // Run Control
    // =========================================================================
    /// Neither a persisted watermark nor a configured initial watermark.
    #[error("No watermark for tenant {tenant_id}; seed one or set schedule.initial_watermark")]
    NoWatermark { tenant_id: String },

    #[error("A sync run is already in progress")]
    AlreadyRunning,

    #[error("Sync scheduler is shutting down")]
    ShuttingDown,

    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<DbError> for SyncError {
    fn from(err: DbError) -> Self {
        SyncError::Database(err)
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        SyncError::Database(DbError::from(err))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::DeserializationFailed(err.to_string())
        } else if err.is_builder() {
            SyncError::InvalidUrl(err.to_string())
        } else {
            SyncError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            SyncError::DeserializationFailed(err.to_string())
        } else {
            SyncError::SerializationFailed(err.to_string())
        }
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later run may succeed without operator action.
    ///
    /// Nothing inside a run retries on these; the next scheduled run does.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(_) | SyncError::Timeout(_) => true,
            SyncError::ServiceStatus { status, .. } => *status >= 500 || *status == 429,
            SyncError::Database(DbError::PoolExhausted) => true,
            _ => false,
        }
    }

    /// Returns true if the service refused our credentials.
    pub fn is_auth_error(&self) -> bool {
        matches!(
            self,
            SyncError::AuthFailed(_) | SyncError::Unauthorized { .. }
        )
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
                | SyncError::NoWatermark { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_core::ValidationError;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Http("connection reset".into()).is_retryable());
        assert!(SyncError::Timeout("30s".into()).is_retryable());
        assert!(SyncError::ServiceStatus {
            path: "/invoices/count".into(),
            status: 503,
            body: String::new(),
        }
        .is_retryable());

        assert!(!SyncError::ServiceStatus {
            path: "/invoices/count".into(),
            status: 400,
            body: String::new(),
        }
        .is_retryable());
        assert!(!SyncError::AuthFailed("bad password".into()).is_retryable());
        assert!(!SyncError::InvalidConfig("page_size".into()).is_retryable());
    }

    #[test]
    fn test_categories() {
        assert!(SyncError::Unauthorized {
            path: "/invoices/list".into(),
            status: 401,
        }
        .is_auth_error());
        assert!(SyncError::NoWatermark {
            tenant_id: "999".into(),
        }
        .is_config_error());
        assert!(!SyncError::AlreadyRunning.is_config_error());
    }

    #[test]
    fn test_domain_errors_are_transparent() {
        let err: SyncError = CoreError::Validation(ValidationError::Required {
            field: "name".into(),
        })
        .into();
        assert!(err.to_string().contains("name is required"));
    }
}
