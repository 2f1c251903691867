use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use super::domain::{Candidate, DecisionReport, RoundNo, SeatCategoryKey};
use super::eligibility::Eligibility;
use super::repository::AllocationRepository;
use super::service::{RoundError, RoundOrchestrator};

type Orchestrator<R> = Arc<RoundOrchestrator<R>>;

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub reports: Vec<DecisionReport>,
}

#[derive(Debug, Deserialize)]
pub struct QuotaUpdate {
    pub total_seats: u32,
}

/// Router exposing round execution, decision ingestion and quota editing.
pub fn round_router<R>(orchestrator: Orchestrator<R>) -> Router
where
    R: AllocationRepository + 'static,
{
    Router::new()
        .route("/api/v1/roster", post(roster_handler::<R>))
        .route("/api/v1/rounds/status", get(status_handler::<R>))
        .route("/api/v1/rounds/:round/run", post(run_handler::<R>))
        .route("/api/v1/rounds/:round/reset", post(reset_handler::<R>))
        .route("/api/v1/rounds/:round/decisions", post(decisions_handler::<R>))
        .route("/api/v1/rounds/:round/eligible", get(eligible_handler::<R>))
        .route("/api/v1/rounds/:round/offers", get(offers_handler::<R>))
        .route("/api/v1/rounds/:round/export", get(export_handler::<R>))
        .route("/api/v1/quota", get(quota_handler::<R>))
        .route("/api/v1/quota/:category", put(set_quota_handler::<R>))
        .with_state(orchestrator)
}

fn error_response(error: RoundError) -> Response {
    let (status, payload) = match &error {
        RoundError::Validation(_) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            json!({ "error": error.to_string() }),
        ),
        RoundError::MissingDecisions { round, missing } => (
            StatusCode::CONFLICT,
            json!({
                "error": error.to_string(),
                "round": round,
                "missing": missing,
            }),
        ),
        RoundError::RoundInProgress | RoundError::RoundSuperseded { .. } => {
            (StatusCode::CONFLICT, json!({ "error": error.to_string() }))
        }
        RoundError::InvalidRound { .. } | RoundError::ResetRejected { .. } => {
            (StatusCode::BAD_REQUEST, json!({ "error": error.to_string() }))
        }
        RoundError::NotGenerated { .. } => {
            (StatusCode::NOT_FOUND, json!({ "error": error.to_string() }))
        }
        RoundError::Persistence(_) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            json!({ "error": error.to_string() }),
        ),
    };
    (status, Json(payload)).into_response()
}

pub(crate) async fn roster_handler<R>(
    State(orchestrator): State<Orchestrator<R>>,
    Json(candidates): Json<Vec<Candidate>>,
) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.load_roster(candidates) {
        Ok(added) => (StatusCode::OK, Json(json!({ "added": added }))).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn status_handler<R>(State(orchestrator): State<Orchestrator<R>>) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.status() {
        Ok(phase) => (StatusCode::OK, Json(phase)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn run_handler<R>(
    State(orchestrator): State<Orchestrator<R>>,
    Path(round): Path<RoundNo>,
) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.run(round) {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reset_handler<R>(
    State(orchestrator): State<Orchestrator<R>>,
    Path(round): Path<RoundNo>,
) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.reset(round) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn decisions_handler<R>(
    State(orchestrator): State<Orchestrator<R>>,
    Path(round): Path<RoundNo>,
    Json(request): Json<IngestRequest>,
) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.ingest(round, request.reports) {
        Ok(summary) => (StatusCode::ACCEPTED, Json(summary)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn eligible_handler<R>(
    State(orchestrator): State<Orchestrator<R>>,
    Path(round): Path<RoundNo>,
) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.eligible(round) {
        Ok(eligibility) => {
            let ids: Vec<&str> = match &eligibility {
                Eligibility::Eligible(ids) => ids.iter().map(|id| id.as_str()).collect(),
                Eligibility::RoundComplete => Vec::new(),
            };
            let payload = json!({
                "round": round,
                "eligible": ids,
                "round_complete": eligibility.is_empty(),
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn offers_handler<R>(
    State(orchestrator): State<Orchestrator<R>>,
    Path(round): Path<RoundNo>,
) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.offers(round) {
        Ok(offers) => (StatusCode::OK, Json(offers)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn export_handler<R>(
    State(orchestrator): State<Orchestrator<R>>,
    Path(round): Path<RoundNo>,
) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.export(round) {
        Ok(export) => (StatusCode::OK, Json(export)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn quota_handler<R>(State(orchestrator): State<Orchestrator<R>>) -> Response
where
    R: AllocationRepository + 'static,
{
    match orchestrator.quota() {
        Ok(lines) => (StatusCode::OK, Json(lines)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn set_quota_handler<R>(
    State(orchestrator): State<Orchestrator<R>>,
    Path(category): Path<String>,
    Json(update): Json<QuotaUpdate>,
) -> Response
where
    R: AllocationRepository + 'static,
{
    let key: SeatCategoryKey = match category.parse() {
        Ok(key) => key,
        Err(error) => {
            let payload = json!({ "error": format!("{error}") });
            return (StatusCode::UNPROCESSABLE_ENTITY, Json(payload)).into_response();
        }
    };

    match orchestrator.set_quota(key, update.total_seats) {
        Ok(()) => {
            let payload = json!({
                "category": key,
                "total_seats": update.total_seats,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}
