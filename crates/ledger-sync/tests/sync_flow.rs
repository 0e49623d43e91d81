//! End-to-end sync passes against a mock tax service and an in-memory ledger.

use chrono::{TimeZone, Utc};
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ledger_core::{InvoiceDirection, NewPartner, SyncPrincipal};
use ledger_db::{Database, DbConfig};
use ledger_sync::{
    InMemoryTokenStore, LedgerStore, OrchestratorOptions, ServiceSettings, SyncError,
    SyncOrchestrator, TaxServiceClient,
};

const TENANT: &str = "302563778";

async fn memory_db() -> Database {
    Database::new(DbConfig::in_memory()).await.unwrap()
}

fn orchestrator(server: &MockServer, db: &Database) -> SyncOrchestrator {
    let settings = ServiceSettings {
        base_url: server.uri(),
        ..ServiceSettings::default()
    };
    let principal = SyncPrincipal::new(TENANT, "operator", "pw");
    let client = TaxServiceClient::new(
        &settings,
        principal.clone(),
        Arc::new(InMemoryTokenStore::new()),
    )
    .unwrap();

    let store: Arc<dyn LedgerStore> = Arc::new(db.clone());
    SyncOrchestrator::new(
        Arc::new(client),
        store,
        &principal,
        OrchestratorOptions::default(),
    )
}

fn invoice_row(id: &str, supplier_tin: &str, buyer_tin: &str) -> serde_json::Value {
    json!({
        "id": id,
        "docType": "goods",
        "number": format!("No-{}", id),
        "supplierTin": supplier_tin,
        "supplierName": format!("Supplier {}", supplier_tin),
        "buyerTin": buyer_tin,
        "createdAt": "2024-01-05T09:00:00Z",
        "totalSum": 300.0,
        "vatSum": 36.0,
        "signedBy": "director"
    })
}

/// One incoming invoice from supplier 111 and one outgoing invoice to 222.
async fn mount_invoices(server: &MockServer, token: &str) {
    let bearer = format!("Bearer {}", token);

    for role in ["buyer", "supplier"] {
        Mock::given(method("POST"))
            .and(path("/invoices/count"))
            .and(header("authorization", bearer.as_str()))
            .and(body_partial_json(json!({"condition": {"role": role, "tin": TENANT}})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"count": 1})))
            .mount(server)
            .await;
    }

    Mock::given(method("POST"))
        .and(path("/invoices/list"))
        .and(header("authorization", bearer.as_str()))
        .and(body_partial_json(json!({"condition": {"role": "buyer"}, "offset": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [invoice_row("INV-IN", "111", TENANT)]
        })))
        .mount(server)
        .await;

    Mock::given(method("POST"))
        .and(path("/invoices/list"))
        .and(header("authorization", bearer.as_str()))
        .and(body_partial_json(json!({"condition": {"role": "supplier"}, "offset": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [invoice_row("INV-OUT", TENANT, "222")]
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/invoices/goods/INV-IN"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "ok": true,
            "items": [
                {"name": "Cement", "unit": "bag", "quantity": 2.0, "price": 100.0, "total": 200.0},
                {"name": "cement ", "unit": "bag", "quantity": 1.0, "price": 100.0, "total": 100.0}
            ],
            "detail": {"supplier": {"tin": "111", "name": "Stone Works LLC"}}
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/invoices/goods/INV-OUT"))
        .and(header("authorization", bearer.as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"name": "Cement", "unit": "bag", "quantity": 5.0, "price": 120.0}
        ])))
        .mount(server)
        .await;
}

async fn mount_login(server: &MockServer, token: &str) {
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": token})))
        .up_to_n_times(1)
        .mount(server)
        .await;
}

async fn supplier_with_warehouse(db: &Database) {
    let partner = db
        .partners()
        .create(&NewPartner {
            tin: "111".into(),
            name: "Stone Works LLC".into(),
            address: None,
            bank_account: None,
            bank_code: None,
            director: None,
        })
        .await
        .unwrap();
    db.partners()
        .set_warehouse(&partner.id, Some("WH-111"))
        .await
        .unwrap();
}

#[tokio::test]
async fn test_first_pass_builds_ledger() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    mount_invoices(&server, "tok-1").await;

    let db = memory_db().await;
    supplier_with_warehouse(&db).await;

    let sync = orchestrator(&server, &db);
    sync.seed_watermark(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .await
        .unwrap();

    let report = sync.run_sync().await.unwrap();
    assert_eq!(report.record_count, 2);
    assert_eq!(report.created, 2);
    assert!(report.failed.is_empty());
    assert_eq!(report.transfers_created, 1);
    assert_eq!(report.summary().to_string(), "total 2, new 2, updated 0, failed 0");

    assert_eq!(db.partners().count().await.unwrap(), 1);
    assert_eq!(db.catalog().count().await.unwrap(), 1);
    assert_eq!(db.invoices().count().await.unwrap(), 2);

    let incoming = db.invoices().get_by_id("INV-IN").await.unwrap().unwrap();
    assert_eq!(incoming.direction, InvoiceDirection::Incoming);
    assert!(incoming.raw_payload.contains("signedBy"));
    let outgoing = db.invoices().get_by_id("INV-OUT").await.unwrap().unwrap();
    assert_eq!(outgoing.direction, InvoiceDirection::Outgoing);

    let transfers = db.transfers().for_invoice("INV-IN").await.unwrap();
    assert_eq!(transfers.len(), 1);
    assert_eq!(transfers[0].source_warehouse_id, "WH-111");
    assert_eq!(transfers[0].dest_warehouse_id, "WH-MAIN");

    let lines = db.transfers().lines(&transfers[0].id).await.unwrap();
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].catalog_item_id, lines[1].catalog_item_id);
    assert!(db.transfers().for_invoice("INV-OUT").await.unwrap().is_empty());

    let state = sync.sync_state().await.unwrap().unwrap();
    assert_eq!(state.watermark, report.anchor);
    assert_eq!(state.last_run_at, Some(report.finished_at));
}

#[tokio::test]
async fn test_second_pass_is_idempotent() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    mount_invoices(&server, "tok-1").await;

    let db = memory_db().await;
    supplier_with_warehouse(&db).await;

    let sync = orchestrator(&server, &db);
    sync.seed_watermark(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .await
        .unwrap();

    let first = sync.run_sync().await.unwrap();
    let second = sync.run_sync().await.unwrap();

    assert_eq!(second.window.start, first.anchor);
    assert_eq!(second.created, 0);
    assert_eq!(second.updated, 2);
    assert_eq!(second.transfers_created, 0);

    assert_eq!(db.partners().count().await.unwrap(), 1);
    assert_eq!(db.catalog().count().await.unwrap(), 1);
    assert_eq!(db.invoices().count().await.unwrap(), 2);
    assert_eq!(db.transfers().for_invoice("INV-IN").await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_expired_token_reauthenticates_mid_pass() {
    let server = MockServer::start().await;
    mount_login(&server, "tok-1").await;
    mount_login(&server, "tok-2").await;
    mount_invoices(&server, "tok-2").await;

    // Anything still carrying the first token is rejected
    Mock::given(header("authorization", "Bearer tok-1"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let db = memory_db().await;
    let sync = orchestrator(&server, &db);
    sync.seed_watermark(Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap())
        .await
        .unwrap();

    let report = sync.run_sync().await.unwrap();
    assert_eq!(report.created, 2);
    assert!(report.failed.is_empty());

    let logins = server
        .received_requests()
        .await
        .unwrap()
        .into_iter()
        .filter(|r| r.url.path() == "/auth/login")
        .count();
    assert_eq!(logins, 2);
}

#[tokio::test]
async fn test_no_watermark_makes_no_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/auth/login"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "tok-1"})))
        .expect(0)
        .mount(&server)
        .await;

    let db = memory_db().await;
    let sync = orchestrator(&server, &db);

    let result = sync.run_sync().await;
    assert!(matches!(result, Err(SyncError::NoWatermark { .. })));
    assert!(sync.sync_state().await.unwrap().is_none());
}
