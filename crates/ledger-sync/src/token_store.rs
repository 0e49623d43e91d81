//! # Session Token Store
//!
//! Short-lived tax-service session tokens, cached per tenant.
//!
//! ## Token Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  get_token(tenant)                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  cached && now < expires_at ──yes──► return cached token               │
//! │       │ no                                                              │
//! │       ▼                                                                 │
//! │  take handshake lock (one login per process at a time)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  re-check cache (another caller may have logged in meanwhile)          │
//! │       │ still missing                                                   │
//! │       ▼                                                                 │
//! │  handshake ──► cache {token, expires_at = now + lifetime}              │
//! │                                                                         │
//! │  invalidate(tenant) drops the entry unconditionally (401/403 path).    │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The cache itself sits behind [`TokenStore`] so it is injected, not global.
//! One store is built per process and shared by every client.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Session Token
// =============================================================================

/// A token handed out by the login handshake.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    pub tenant_id: String,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

impl SessionToken {
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("tenant_id", &self.tenant_id)
            .field("token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

// =============================================================================
// Token Store
// =============================================================================

/// Process-wide token cache keyed by tenant.
pub trait TokenStore: Send + Sync {
    fn get(&self, tenant_id: &str) -> Option<SessionToken>;

    fn set(&self, token: SessionToken);

    fn invalidate(&self, tenant_id: &str);
}

/// Lock-protected in-memory [`TokenStore`].
#[derive(Debug, Default)]
pub struct InMemoryTokenStore {
    tokens: RwLock<HashMap<String, SessionToken>>,
}

impl InMemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TokenStore for InMemoryTokenStore {
    fn get(&self, tenant_id: &str) -> Option<SessionToken> {
        let tokens = match self.tokens.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tokens.get(tenant_id).cloned()
    }

    fn set(&self, token: SessionToken) {
        let mut tokens = match self.tokens.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tokens.insert(token.tenant_id.clone(), token);
    }

    fn invalidate(&self, tenant_id: &str) {
        let mut tokens = match self.tokens.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        tokens.remove(tenant_id);
    }
}

// =============================================================================
// Token Manager
// =============================================================================

/// Hands out valid tokens, running the handshake when the cache is stale.
pub struct TokenManager {
    store: Arc<dyn TokenStore>,
    lifetime: Duration,
    handshake_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(store: Arc<dyn TokenStore>, lifetime: Duration) -> Self {
        TokenManager {
            store,
            lifetime,
            handshake_lock: Mutex::new(()),
        }
    }

    /// Returns a token for `tenant_id`, running `handshake` if none is valid.
    ///
    /// Handshake errors are returned as-is; nothing is retried here.
    pub async fn get_token<F, Fut>(&self, tenant_id: &str, handshake: F) -> SyncResult<String>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = SyncResult<String>>,
    {
        if let Some(token) = self.valid_token(tenant_id, Utc::now()) {
            return Ok(token);
        }

        let _guard = self.handshake_lock.lock().await;

        // Double-check after acquiring the lock
        if let Some(token) = self.valid_token(tenant_id, Utc::now()) {
            return Ok(token);
        }

        let token = handshake().await?;
        if token.is_empty() {
            return Err(SyncError::AuthFailed("handshake returned an empty token".into()));
        }

        let expires_at = Utc::now() + self.lifetime;
        self.store.set(SessionToken {
            tenant_id: tenant_id.to_string(),
            token: token.clone(),
            expires_at,
        });

        info!(tenant_id = %tenant_id, %expires_at, "Authenticated with tax service");
        Ok(token)
    }

    /// Cached token if still valid at `now`.
    pub fn valid_token(&self, tenant_id: &str, now: DateTime<Utc>) -> Option<String> {
        let cached = self.store.get(tenant_id)?;
        if cached.is_valid_at(now) {
            debug!(
                tenant_id = %tenant_id,
                remaining_secs = (cached.expires_at - now).num_seconds(),
                "Using cached token"
            );
            Some(cached.token)
        } else {
            None
        }
    }

    pub fn invalidate(&self, tenant_id: &str) {
        debug!(tenant_id = %tenant_id, "Invalidating session token");
        self.store.invalidate(tenant_id);
    }
}
