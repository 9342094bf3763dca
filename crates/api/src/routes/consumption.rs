//! Consumption endpoints. Writes run through the reconciliation saga.

use std::future::Future;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ConsumptionId, MealId};
use domain::{ConsumptionDraft, ConsumptionRecord};
use saga::SagaError;
use serde::Serialize;

use super::{AppLedger, AppState, parse_id};
use crate::auth::Caller;
use crate::error::ApiError;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumptionListResponse {
    pub meal_id: MealId,
    pub items: Vec<ConsumptionRecord>,
    pub total_kcal: f64,
    pub total_cost: f64,
}

/// Runs a saga on its own task; a dropped connection does not cancel it.
async fn run_detached<T, F>(run: F) -> Result<T, ApiError>
where
    F: Future<Output = Result<T, SagaError>> + Send + 'static,
    T: Send + 'static,
{
    tokio::spawn(run)
        .await
        .map_err(|e| ApiError::Internal(format!("saga task failed: {e}")))?
        .map_err(ApiError::from)
}

/// GET /api/meal/{meal_id}/consumption
#[tracing::instrument(skip(state))]
pub async fn list<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    Path(meal_id): Path<String>,
) -> Result<Json<ConsumptionListResponse>, ApiError> {
    let meal_id: MealId = parse_id(&meal_id)?;
    state.ledger.get_meal(meal_id).await?;

    let items = state.ledger.list_for_meal(meal_id).await?;
    let total_kcal = state.ledger.sum_calories(meal_id).await?;
    let total_cost = state.ledger.sum_cost(meal_id).await?;

    Ok(Json(ConsumptionListResponse {
        meal_id,
        items,
        total_kcal,
        total_cost,
    }))
}

/// POST /api/meal/{meal_id}/consumption
#[tracing::instrument(skip(state, caller, draft))]
pub async fn create<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    Path(meal_id): Path<String>,
    Caller(caller): Caller,
    Json(draft): Json<ConsumptionDraft>,
) -> Result<(StatusCode, Json<ConsumptionRecord>), ApiError> {
    let meal_id: MealId = parse_id(&meal_id)?;
    state.ledger.get_meal(meal_id).await?;

    let saga = state.saga.clone();
    let ctx = state.saga_context(caller);
    let record = run_detached(async move { saga.create(meal_id, draft, &ctx).await }).await?;

    Ok((StatusCode::CREATED, Json(record)))
}

/// PATCH /api/meal/{meal_id}/consumption/{id}
#[tracing::instrument(skip(state, caller, draft))]
pub async fn update<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    Path((meal_id, id)): Path<(String, String)>,
    Caller(caller): Caller,
    Json(draft): Json<ConsumptionDraft>,
) -> Result<Json<ConsumptionRecord>, ApiError> {
    let meal_id: MealId = parse_id(&meal_id)?;
    let id: ConsumptionId = parse_id(&id)?;
    let draft = draft.with_id(id);

    let saga = state.saga.clone();
    let ctx = state.saga_context(caller);
    let record = run_detached(async move { saga.update(meal_id, draft, &ctx).await }).await?;

    Ok(Json(record))
}

/// DELETE /api/meal/{meal_id}/consumption/{id}
#[tracing::instrument(skip(state, caller))]
pub async fn delete<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    Path((meal_id, id)): Path<(String, String)>,
    Caller(caller): Caller,
) -> Result<StatusCode, ApiError> {
    let meal_id: MealId = parse_id(&meal_id)?;
    let id: ConsumptionId = parse_id(&id)?;

    let saga = state.saga.clone();
    let ctx = state.saga_context(caller);
    run_detached(async move { saga.delete(meal_id, id, &ctx).await }).await?;

    Ok(StatusCode::NO_CONTENT)
}
