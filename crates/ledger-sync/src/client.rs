//! # Tax Service Client
//!
//! Authenticated HTTP access to the tax service.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  fetch_*()                                                             │
//! │     │                                                                   │
//! │     ├─► TokenManager::get_token ──(stale)──► POST /auth/login          │
//! │     │                                                                   │
//! │     ├─► request + Bearer token                                         │
//! │     │        │                                                          │
//! │     │        ├── 2xx ──────────► decode                                │
//! │     │        ├── 401/403 ──────► invalidate, login, send once more     │
//! │     │        │                     └── 401/403 again → Unauthorized    │
//! │     │        └── other ────────► ServiceStatus                         │
//! │                                                                         │
//! │  Network errors propagate immediately; there is no other retry.        │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, warn};
use url::Url;

use ledger_core::SyncPrincipal;

use crate::config::ServiceSettings;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{
    CountRequest, CountResponse, DocType, LineDetailReply, ListRequest, ListResponse,
    ListedInvoice, LoginRequest, LoginResponse, SearchCondition, SortSpec,
};
use crate::token_store::{TokenManager, TokenStore};

// =============================================================================
// Tax Service Trait
// =============================================================================

/// Read access to the tax service, bound to one principal.
#[async_trait]
pub trait TaxService: Send + Sync {
    /// Number of invoices matching `condition`.
    async fn fetch_count(&self, condition: &SearchCondition) -> SyncResult<u64>;

    /// One page of invoices, oldest first.
    ///
    /// A row that does not decode is returned as `ListedInvoice::Malformed`
    /// instead of failing the page.
    async fn fetch_page(
        &self,
        condition: &SearchCondition,
        offset: u64,
        limit: u64,
    ) -> SyncResult<Vec<ListedInvoice>>;

    /// Lines (and, when available, the document header) of one invoice.
    async fn fetch_line_items(
        &self,
        invoice_id: &str,
        doc_type: DocType,
    ) -> SyncResult<LineDetailReply>;
}

// =============================================================================
// HTTP Client
// =============================================================================

/// reqwest-backed [`TaxService`].
pub struct TaxServiceClient {
    http: reqwest::Client,
    base_url: Url,
    principal: SyncPrincipal,
    tokens: TokenManager,
}

impl TaxServiceClient {
    /// Builds a client for `principal`; `store` is the process-wide token cache.
    pub fn new(
        settings: &ServiceSettings,
        principal: SyncPrincipal,
        store: Arc<dyn TokenStore>,
    ) -> SyncResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(format!(
                "{} cannot be used as a base URL",
                settings.base_url
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(settings.request_timeout())
            .build()?;

        Ok(TaxServiceClient {
            http,
            base_url,
            principal,
            tokens: TokenManager::new(store, settings.token_lifetime()),
        })
    }

    pub fn principal(&self) -> &SyncPrincipal {
        &self.principal
    }

    /// Base URL with `segments` appended, each percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Runs the login handshake.
    async fn login(&self) -> SyncResult<String> {
        debug!(tenant_id = %self.principal.tenant_id, username = %self.principal.username, "Logging in to tax service");

        let response = self
            .http
            .post(self.endpoint(&["auth", "login"])?)
            .json(&LoginRequest {
                tin: &self.principal.tenant_id,
                username: &self.principal.username,
                password: &self.principal.secret,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::AuthFailed(format!("HTTP {}: {}", status, body)));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| SyncError::AuthFailed(format!("unreadable login reply: {}", e)))?;

        Ok(login.token)
    }

    async fn token(&self) -> SyncResult<String> {
        self.tokens
            .get_token(&self.principal.tenant_id, || self.login())
            .await
    }

    async fn send(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&serde_json::Value>,
        token: &str,
    ) -> SyncResult<reqwest::Response> {
        let mut request = self
            .http
            .request(method.clone(), url.clone())
            .bearer_auth(token);
        if let Some(body) = body {
            request = request.json(body);
        }
        Ok(request.send().await?)
    }

    /// Sends an authorized request, re-authenticating once on 401/403.
    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        url: Url,
        body: Option<serde_json::Value>,
    ) -> SyncResult<T> {
        let path = url.path().to_string();
        let token = self.token().await?;
        let mut response = self.send(&method, &url, body.as_ref(), &token).await?;

        if is_auth_rejection(response.status()) {
            warn!(
                tenant_id = %self.principal.tenant_id,
                path = %path,
                status = %response.status(),
                "Token rejected, re-authenticating"
            );
            self.tokens.invalidate(&self.principal.tenant_id);

            let token = self.token().await?;
            response = self.send(&method, &url, body.as_ref(), &token).await?;

            if is_auth_rejection(response.status()) {
                return Err(SyncError::Unauthorized {
                    path,
                    status: response.status().as_u16(),
                });
            }
        }

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SyncError::ServiceStatus {
                path,
                status: status.as_u16(),
                body,
            });
        }

        response
            .json::<T>()
            .await
            .map_err(|e| SyncError::DeserializationFailed(format!("{}: {}", path, e)))
    }
}

fn is_auth_rejection(status: StatusCode) -> bool {
    status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN
}

#[async_trait]
impl TaxService for TaxServiceClient {
    async fn fetch_count(&self, condition: &SearchCondition) -> SyncResult<u64> {
        let body = serde_json::to_value(CountRequest { condition })?;
        let reply: CountResponse = self
            .call(Method::POST, self.endpoint(&["invoices", "count"])?, Some(body))
            .await?;

        debug!(role = %condition.role, count = reply.count, "Fetched invoice count");
        Ok(reply.count)
    }

    async fn fetch_page(
        &self,
        condition: &SearchCondition,
        offset: u64,
        limit: u64,
    ) -> SyncResult<Vec<ListedInvoice>> {
        let body = serde_json::to_value(ListRequest {
            condition,
            offset,
            limit,
            sort: SortSpec::CREATED_ASC,
        })?;
        let reply: ListResponse = self
            .call(Method::POST, self.endpoint(&["invoices", "list"])?, Some(body))
            .await?;

        debug!(role = %condition.role, offset, received = reply.items.len(), "Fetched invoice page");
        Ok(reply.items.into_iter().map(ListedInvoice::from_row).collect())
    }

    async fn fetch_line_items(
        &self,
        invoice_id: &str,
        doc_type: DocType,
    ) -> SyncResult<LineDetailReply> {
        let url = self.endpoint(&["invoices", doc_type.path_segment(), invoice_id])?;
        let value: serde_json::Value = self.call(Method::GET, url, None).await?;
        LineDetailReply::from_json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::SearchRole;
    use crate::token_store::InMemoryTokenStore;
    use chrono::{TimeZone, Utc};
    use ledger_core::SyncWindow;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> TaxServiceClient {
        let settings = ServiceSettings {
            base_url: server.uri(),
            ..ServiceSettings::default()
        };
        TaxServiceClient::new(
            &settings,
            SyncPrincipal::new("302563778", "operator", "pw"),
            Arc::new(InMemoryTokenStore::new()),
        )
        .unwrap()
    }

    fn condition() -> SearchCondition {
        let window = SyncWindow::open(
            Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap(),
        );
        SearchCondition::new(SearchRole::Buyer, "302563778", &window)
    }

    async fn mount_login(server: &MockServer, token: &str, times: u64) {
        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .and(body_partial_json(json!({"tin": "302563778", "username": "operator"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": token})))
            .up_to_n_times(times)
            .mount(server)
            .await;
    }

    #[tokio::test]
    async fn test_login_once_for_many_calls() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-1"})))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/invoices/count"))
            .and(header("authorization", "Bearer tok-1"))
            .and(body_partial_json(json!({"condition": {"role": "buyer", "tin": "302563778"}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 3})))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.fetch_count(&condition()).await.unwrap(), 3);
        assert_eq!(client.fetch_count(&condition()).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_unauthorized_reauthenticates_once() {
        let server = MockServer::start().await;
        mount_login(&server, "tok-1", 1).await;
        mount_login(&server, "tok-2", 1).await;

        Mock::given(method("POST"))
            .and(path("/invoices/count"))
            .and(header("authorization", "Bearer tok-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/invoices/count"))
            .and(header("authorization", "Bearer tok-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 7})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        assert_eq!(client.fetch_count(&condition()).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_second_rejection_is_terminal() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok"})))
            .expect(2)
            .mount(&server)
            .await;

        Mock::given(method("POST"))
            .and(path("/invoices/list"))
            .respond_with(ResponseTemplate::new(403))
            .expect(2)
            .mount(&server)
            .await;

        let err = client(&server)
            .fetch_page(&condition(), 0, 100)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Unauthorized { status: 403, .. }));
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;

        Mock::given(method("POST"))
            .and(path("/auth/login"))
            .respond_with(ResponseTemplate::new(401).set_body_string("bad credentials"))
            .mount(&server)
            .await;

        let err = client(&server).fetch_count(&condition()).await.unwrap_err();
        assert!(matches!(err, SyncError::AuthFailed(ref msg) if msg.contains("bad credentials")));
    }

    #[tokio::test]
    async fn test_server_error_is_not_retried() {
        let server = MockServer::start().await;
        mount_login(&server, "tok-1", 1).await;

        Mock::given(method("POST"))
            .and(path("/invoices/count"))
            .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
            .expect(1)
            .mount(&server)
            .await;

        let err = client(&server).fetch_count(&condition()).await.unwrap_err();
        assert!(err.is_retryable());
        assert!(matches!(err, SyncError::ServiceStatus { status: 503, .. }));
    }

    #[tokio::test]
    async fn test_page_request_body() {
        let server = MockServer::start().await;
        mount_login(&server, "tok-1", 1).await;

        Mock::given(method("POST"))
            .and(path("/invoices/list"))
            .and(body_partial_json(json!({
                "offset": 200,
                "limit": 100,
                "sort": {"column": "createdAt", "direction": "asc"}
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [
                    {
                        "id": "INV-1",
                        "docType": "goods",
                        "supplierTin": "111",
                        "buyerTin": "302563778",
                        "createdAt": "2024-01-01T10:00:00Z"
                    },
                    {
                        "id": "INV-2",
                        "docType": "goods",
                        "supplierTin": "111",
                        "createdAt": "2024-01-01T11:00:00Z"
                    }
                ]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client(&server)
            .fetch_page(&condition(), 200, 100)
            .await
            .unwrap();
        assert_eq!(page.len(), 2);
        assert!(matches!(&page[0], ListedInvoice::Valid(raw) if raw.id == "INV-1"));
        assert!(matches!(
            &page[1],
            ListedInvoice::Malformed { id: Some(id), reason } if id == "INV-2" && reason.contains("buyerTin")
        ));
    }

    #[tokio::test]
    async fn test_invoice_id_is_path_encoded() {
        let server = MockServer::start().await;
        mount_login(&server, "tok-1", 1).await;

        Mock::given(method("GET"))
            .and(path("/invoices/goods/INV%2F7%3Fx"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"name": "Cement"}])))
            .expect(1)
            .mount(&server)
            .await;

        let reply = client(&server)
            .fetch_line_items("INV/7?x", DocType::Goods)
            .await
            .unwrap();
        assert_eq!(reply.items().len(), 1);
    }

    #[test]
    fn test_base_url_path_is_kept() {
        let settings = ServiceSettings {
            base_url: "https://tax.example.gov/api/".into(),
            ..ServiceSettings::default()
        };
        let client = TaxServiceClient::new(
            &settings,
            SyncPrincipal::new("302563778", "operator", "pw"),
            Arc::new(InMemoryTokenStore::new()),
        )
        .unwrap();

        let url = client.endpoint(&["invoices", "goods", "A B#1"]).unwrap();
        assert_eq!(url.as_str(), "https://tax.example.gov/api/invoices/goods/A%20B%231");
    }

    #[tokio::test]
    async fn test_line_detail_paths_and_shapes() {
        let server = MockServer::start().await;
        mount_login(&server, "tok-1", 1).await;

        Mock::given(method("GET"))
            .and(path("/invoices/goods/INV-1"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!([{"name": "Cement"}])),
            )
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/invoices/act-completion/INV-2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "ok": true,
                "items": [{"name": "Installation"}],
                "detail": {"supplier": {"name": "Builder LLC"}}
            })))
            .mount(&server)
            .await;

        Mock::given(method("GET"))
            .and(path("/invoices/services/INV-3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": false})))
            .mount(&server)
            .await;

        let client = client(&server);

        let reply = client.fetch_line_items("INV-1", DocType::Goods).await.unwrap();
        assert!(matches!(reply, LineDetailReply::Degraded(ref items) if items.len() == 1));

        let reply = client
            .fetch_line_items("INV-2", DocType::ActCompletion)
            .await
            .unwrap();
        assert_eq!(
            reply.detail().and_then(|d| d.supplier.as_ref()).and_then(|s| s.name.as_deref()),
            Some("Builder LLC")
        );

        let err = client
            .fetch_line_items("INV-3", DocType::Services)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::ServiceRejected(_)));
    }
}
