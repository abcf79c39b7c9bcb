//! HTTP API for the tax engine.
//!
//! This module exposes a REST API around [`TaxService`] using the
//! [`axum`](https://crates.io/crates/axum) framework.  Clients submit a
//! period's inputs and receive the computed summary, manage the
//! remittance ledger for a period and ask for a compliance score.  All
//! state lives in the service; the handlers only translate between JSON
//! and service calls.

use crate::brackets::BracketTax;
use crate::compliance::{ComplianceReport, ComplianceSignals};
use crate::config::Config;
use crate::engine::TaxService;
use crate::error::TaxError;
use crate::ledger::{LedgerBalance, NewRemittance, Remittance, RemittanceEdit};
use crate::models::{PeriodInputs, TaxPeriod, TaxSummary, MIN_SUPPORTED_TAX_YEAR};
use crate::tax::{load_tax_laws_from_dir, TaxLaw, TaxLawBook};
use anyhow::Result;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::path::Path as FsPath;
use std::sync::Arc;
use uuid::Uuid;

/// Application state shared across requests.
pub struct AppState {
    pub service: TaxService,
}

/// JSON error body: `{"error": {"code": ..., "message": ...}}`.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

/// A [`TaxError`] on its way out of a handler.
#[derive(Debug)]
pub struct ApiError(pub TaxError);

impl From<TaxError> for ApiError {
    fn from(err: TaxError) -> Self {
        ApiError(err)
    }
}

impl ApiError {
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match &self.0 {
            TaxError::SummaryNotFound(_) | TaxError::RemittanceNotFound(_) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND")
            }
            TaxError::Conflict { .. } => (StatusCode::CONFLICT, "VERSION_CONFLICT"),
            TaxError::AlreadyVerified(_) => (StatusCode::CONFLICT, "ALREADY_VERIFIED"),
            TaxError::ConfirmationRequired(_) => {
                (StatusCode::PRECONDITION_REQUIRED, "CONFIRMATION_REQUIRED")
            }
            TaxError::InputRequired(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INPUT_REQUIRED"),
            TaxError::InputUnavailable(_) => (StatusCode::BAD_GATEWAY, "INPUT_UNAVAILABLE"),
            TaxError::NoRulesForYear(_) => (StatusCode::UNPROCESSABLE_ENTITY, "NO_RULES"),
            err if err.is_validation() => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        } else {
            tracing::debug!(error = %self.0, code, "request rejected");
        }
        let body = ErrorBody {
            error: ErrorDetail {
                code: code.to_string(),
                message: self.0.to_string(),
            },
        };
        (status, Json(body)).into_response()
    }
}

type ApiResult<T> = std::result::Result<Json<T>, ApiError>;

/// Body of `POST /api/calculate`.
#[derive(Debug, Deserialize)]
pub struct CalculateRequest {
    pub taxable_income: Decimal,
    pub tax_year: i32,
    /// When set, the bracket table is scaled to one month.
    #[serde(default)]
    pub month: Option<u8>,
}

/// Body of `POST /api/summaries`.
#[derive(Debug, Deserialize)]
pub struct SummaryRequest {
    pub period: TaxPeriod,
    pub inputs: PeriodInputs,
}

#[derive(Debug, Deserialize)]
pub struct EditRequest {
    pub expected_version: u64,
    pub paid_on: NaiveDate,
    pub amount: Decimal,
    pub reference: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyRequest {
    pub expected_version: u64,
}

#[derive(Debug, Deserialize)]
pub struct DeleteParams {
    #[serde(default)]
    pub confirm: bool,
}

#[derive(Debug, Deserialize)]
pub struct ComplianceRequest {
    pub period: TaxPeriod,
    pub signals: ComplianceSignals,
}

/// Load the rule sets under `tax_law_dir`, falling back to the built-in
/// baseline when none are usable.
pub fn load_law_book(tax_law_dir: &FsPath) -> Result<TaxLawBook> {
    let laws = load_tax_laws_from_dir(tax_law_dir)?;
    if laws.is_empty() {
        tracing::warn!(
            dir = %tax_law_dir.display(),
            year = MIN_SUPPORTED_TAX_YEAR,
            "no tax laws found, using the built-in baseline"
        );
        return Ok(TaxLawBook::from_laws([TaxLaw::baseline(MIN_SUPPORTED_TAX_YEAR)])?);
    }
    let book = TaxLawBook::from_laws(laws)?;
    tracing::info!(years = ?book.years().collect::<Vec<_>>(), "tax laws loaded");
    Ok(book)
}

/// Build the API router around an existing service.
pub fn router(service: TaxService) -> (Router, Arc<AppState>) {
    let state = Arc::new(AppState { service });
    let router = Router::new()
        .route("/api/calculate", post(calculate_handler))
        .route("/api/summaries", post(recompute_handler).get(summary_handler))
        .route("/api/summaries/refresh", post(refresh_handler))
        .route("/api/vat", get(vat_balance_handler))
        .route("/api/remittances", post(record_handler))
        .route(
            "/api/remittances/:id",
            put(edit_handler).get(remittance_handler).delete(delete_handler),
        )
        .route("/api/remittances/:id/verify", post(verify_handler))
        .route("/api/compliance", post(compliance_handler))
        .with_state(state.clone());
    (router, state)
}

/// Build the API router and initialise the rule sets from the given
/// directory.  Returns the router and a handle to the state.
pub fn build_router(tax_law_dir: &FsPath) -> Result<(Router, Arc<AppState>)> {
    let laws = load_law_book(tax_law_dir)?;
    Ok(router(TaxService::new(laws)))
}

/// Handler for POST /api/calculate
async fn calculate_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CalculateRequest>,
) -> ApiResult<BracketTax> {
    let law = state.service.laws().law_for(req.tax_year)?;
    let table = match req.month {
        None => law.brackets.clone(),
        Some(month) if (1..=12).contains(&month) => law.brackets.scaled(12),
        Some(month) => {
            return Err(TaxError::InvalidPeriod(format!("month {month} is outside 1-12")).into())
        }
    };
    Ok(Json(table.compute(req.taxable_income)?))
}

/// Handler for POST /api/summaries
async fn recompute_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SummaryRequest>,
) -> ApiResult<TaxSummary> {
    Ok(Json(state.service.recompute(&req.period, &req.inputs)?))
}

/// Handler for GET /api/summaries
async fn summary_handler(
    State(state): State<Arc<AppState>>,
    Query(period): Query<TaxPeriod>,
) -> ApiResult<TaxSummary> {
    Ok(Json(state.service.summary(&period)?))
}

async fn refresh_handler(
    State(state): State<Arc<AppState>>,
    Json(period): Json<TaxPeriod>,
) -> ApiResult<TaxSummary> {
    Ok(Json(state.service.refresh_ledger(&period)?))
}

async fn vat_balance_handler(
    State(state): State<Arc<AppState>>,
    Query(period): Query<TaxPeriod>,
) -> ApiResult<LedgerBalance> {
    Ok(Json(state.service.vat_balance(&period)?))
}

async fn record_handler(
    State(state): State<Arc<AppState>>,
    Json(new): Json<NewRemittance>,
) -> std::result::Result<(StatusCode, Json<Remittance>), ApiError> {
    let remittance = state.service.ledger().record(new)?;
    Ok((StatusCode::CREATED, Json(remittance)))
}

async fn remittance_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> ApiResult<Remittance> {
    Ok(Json(state.service.ledger().get(id)?))
}

async fn edit_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<EditRequest>,
) -> ApiResult<Remittance> {
    let edit = RemittanceEdit {
        paid_on: req.paid_on,
        amount: req.amount,
        reference: req.reference,
    };
    Ok(Json(state.service.ledger().edit(id, req.expected_version, edit)?))
}

async fn verify_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(req): Json<VerifyRequest>,
) -> ApiResult<Remittance> {
    Ok(Json(state.service.ledger().verify(id, req.expected_version)?))
}

/// Handler for DELETE /api/remittances/:id?confirm=true
async fn delete_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Query(params): Query<DeleteParams>,
) -> ApiResult<Remittance> {
    Ok(Json(state.service.ledger().delete(id, params.confirm.into())?))
}

async fn compliance_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ComplianceRequest>,
) -> ApiResult<ComplianceReport> {
    Ok(Json(state.service.evaluate_compliance(&req.period, &req.signals)?))
}

/// Launch the API server.  This function builds the router from the
/// configured tax law directory and binds to the configured address.
/// It blocks until the server terminates.
pub async fn serve(config: &Config) -> Result<()> {
    let (router, _state) = build_router(&config.tax_law_dir)?;
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    tracing::info!(addr = %config.bind_addr, "tax engine listening");
    axum::serve(listener, router.into_make_service()).await?;
    Ok(())
}
