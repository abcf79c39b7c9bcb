//! HTTP integration tests for the tax engine API.
//!
//! Each test builds a fresh router over the baseline rule set and drives
//! it with `oneshot` requests.

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use tower::ServiceExt;

use tax_engine::api;
use tax_engine::engine::TaxService;
use tax_engine::tax::{TaxLaw, TaxLawBook};

fn test_app() -> axum::Router {
    let laws = TaxLawBook::from_laws([TaxLaw::baseline(2026)]).unwrap();
    api::router(TaxService::new(laws)).0
}

async fn send(app: &axum::Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn amount(value: &Value) -> Decimal {
    match value {
        Value::String(s) => s.parse().unwrap(),
        other => other.to_string().parse().unwrap(),
    }
}

fn period() -> Value {
    json!({ "account_id": "acct-1", "tax_year": 2026 })
}

fn employee_inputs() -> Value {
    json!({
        "account_kind": "individual",
        "income": [{ "source": "employment", "amount": "5000000" }],
        "deductions": [
            { "kind": "pension", "amount": "400000" },
            { "kind": "national_housing_fund", "amount": "125000" }
        ]
    })
}

async fn recompute(app: &axum::Router) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/summaries",
        Some(json!({ "period": period(), "inputs": employee_inputs() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body
}

async fn pay(app: &axum::Router, amount: &str, reference: &str) -> Value {
    let (status, body) = send(
        app,
        "POST",
        "/api/remittances",
        Some(json!({
            "period": period(),
            "kind": "pit",
            "paid_on": "2027-03-01",
            "amount": amount,
            "reference": reference
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body
}

#[tokio::test]
async fn calculate_returns_bracket_breakdown() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/calculate",
        Some(json!({ "taxable_income": "4475000", "tax_year": 2026 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // 2.2M at 15% plus 1.475M at 18%
    assert_eq!(amount(&body["total"]), dec!(595500));
    assert_eq!(body["slices"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn calculate_rejects_years_before_the_cutoff() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/calculate",
        Some(json!({ "taxable_income": "1000000", "tax_year": 2025 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn summary_is_computed_then_read_back() {
    let app = test_app();
    let computed = recompute(&app).await;
    assert_eq!(amount(&computed["taxable_income"]), dec!(4475000));
    assert_eq!(amount(&computed["tax_after_credits"]), dec!(595500));

    let (status, stored) = send(&app, "GET", "/api/summaries?account_id=acct-1&tax_year=2026", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stored, computed);
}

#[tokio::test]
async fn missing_summary_is_not_found() {
    let app = test_app();
    let (status, body) = send(&app, "GET", "/api/summaries?account_id=nobody&tax_year=2026", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "NOT_FOUND");
}

#[tokio::test]
async fn empty_income_requires_input() {
    let app = test_app();
    let (status, body) = send(
        &app,
        "POST",
        "/api/summaries",
        Some(json!({ "period": period(), "inputs": { "account_kind": "individual" } })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INPUT_REQUIRED");
}

#[tokio::test]
async fn remittances_reduce_pending_after_refresh() {
    let app = test_app();
    recompute(&app).await;
    pay(&app, "300000", "RRR-1").await;
    pay(&app, "295500", "RRR-2").await;

    let (status, refreshed) = send(&app, "POST", "/api/summaries/refresh", Some(period())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(amount(&refreshed["remitted"]), dec!(595500));
    assert_eq!(amount(&refreshed["pending_balance"]), Decimal::ZERO);
}

#[tokio::test]
async fn stale_edit_is_a_conflict_and_verified_entries_are_frozen() {
    let app = test_app();
    let created = pay(&app, "100000", "RRR-1").await;
    let id = created["id"].as_str().unwrap().to_string();
    let uri = format!("/api/remittances/{id}");

    let edit = |version: u64| {
        json!({
            "expected_version": version,
            "paid_on": "2027-03-02",
            "amount": "120000",
            "reference": "RRR-1A"
        })
    };

    let (status, edited) = send(&app, "PUT", &uri, Some(edit(1))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(edited["version"], 2);

    let (status, body) = send(&app, "PUT", &uri, Some(edit(1))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "VERSION_CONFLICT");

    let (status, verified) = send(
        &app,
        "POST",
        &format!("{uri}/verify"),
        Some(json!({ "expected_version": 2 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(verified["status"], "verified");

    let (status, body) = send(&app, "PUT", &uri, Some(edit(3))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ALREADY_VERIFIED");
}

#[tokio::test]
async fn delete_requires_confirmation() {
    let app = test_app();
    let created = pay(&app, "100000", "RRR-1").await;
    let uri = format!("/api/remittances/{}", created["id"].as_str().unwrap());

    let (status, body) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::PRECONDITION_REQUIRED);
    assert_eq!(body["error"]["code"], "CONFIRMATION_REQUIRED");

    let (status, _) = send(&app, "DELETE", &format!("{uri}?confirm=true"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn compliance_scores_the_stored_summary() {
    let app = test_app();
    recompute(&app).await;
    let (status, report) = send(
        &app,
        "POST",
        "/api/compliance",
        Some(json!({
            "period": period(),
            "signals": {
                "as_of": "2027-07-01",
                "missing_tax_identifier": true,
                "filing_deadline": "2027-06-30"
            }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    // missing TIN, overdue filing and an unpaid balance past the deadline
    assert_eq!(report["score"], 40);
    assert_eq!(report["risk"], "high");
    assert_eq!(report["alerts"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn vat_balance_needs_a_vat_position() {
    let app = test_app();
    recompute(&app).await;
    let (status, body) = send(&app, "GET", "/api/vat?account_id=acct-1&tax_year=2026", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"]["code"], "INPUT_REQUIRED");
}
