//! Meal endpoints and statistics. Every meal is scoped to the `iv-user` caller.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, NaiveDate, Utc};
use common::{MealId, UserId};
use domain::{Meal, MealType};
use ledger::{DateRange, LedgerError};
use serde::{Deserialize, Serialize};

use super::{AppLedger, AppState, parse_id};
use crate::auth::CallerId;
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateMealRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub meal_type: MealType,
    pub date: Option<DateTime<Utc>>,
}

/// Partial meal update; absent fields keep their value.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMealRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub meal_type: Option<MealType>,
    pub date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct RangeQuery {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

/// A meal with the totals of its consumption.
#[derive(Serialize)]
pub struct MealSummary {
    #[serde(flatten)]
    pub meal: Meal,
    pub kcal: f64,
    pub cost: f64,
}

fn days(start: NaiveDate, end: NaiveDate) -> Result<DateRange, ApiError> {
    if start > end {
        return Err(ApiError::BadRequest(format!(
            "start {start} is after end {end}"
        )));
    }
    Ok(DateRange::days(start, end))
}

fn meal_name(name: &str) -> Result<&str, ApiError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Meal name must not be empty".to_string()));
    }
    Ok(name)
}

/// Loads a meal owned by `user_id`. Someone else's meal reads as missing.
async fn owned_meal<L: AppLedger>(
    state: &AppState<L>,
    meal_id: MealId,
    user_id: &UserId,
) -> Result<Meal, ApiError> {
    let meal = state.ledger.get_meal(meal_id).await?;
    if &meal.user_id != user_id {
        return Err(LedgerError::MealNotFound(meal_id).into());
    }
    Ok(meal)
}

async fn summarize<L: AppLedger>(state: &AppState<L>, meal: Meal) -> Result<MealSummary, ApiError> {
    let kcal = state.ledger.sum_calories(meal.id).await?;
    let cost = state.ledger.sum_cost(meal.id).await?;
    Ok(MealSummary { meal, kcal, cost })
}

/// POST /api/meal: register a meal for the calling user.
#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn create<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    CallerId(user_id): CallerId,
    Json(req): Json<CreateMealRequest>,
) -> Result<(StatusCode, Json<Meal>), ApiError> {
    let name = meal_name(&req.name)?;

    let mut meal = Meal::new(
        user_id,
        name,
        req.meal_type,
        req.date.unwrap_or_else(Utc::now),
    );
    meal.description = req.description;
    state.ledger.save_meal(&meal).await?;

    metrics::counter!("meals_registered_total").increment(1);
    tracing::info!(meal_id = %meal.id, "meal registered");
    Ok((StatusCode::CREATED, Json(meal)))
}

/// GET /api/meal?start=YYYY-MM-DD&end=YYYY-MM-DD
///
/// Both bounds are optional; a lone `start` lists that day only.
#[tracing::instrument(skip_all, fields(user_id = %user_id))]
pub async fn list<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    CallerId(user_id): CallerId,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<MealSummary>>, ApiError> {
    let range = match (query.start, query.end) {
        (Some(start), end) => Some(days(start, end.unwrap_or(start))?),
        (None, Some(_)) => {
            return Err(ApiError::BadRequest("end requires start".to_string()));
        }
        (None, None) => None,
    };

    let meals = state.ledger.list_meals(&user_id, range).await?;
    let mut summaries = Vec::with_capacity(meals.len());
    for meal in meals {
        summaries.push(summarize(&state, meal).await?);
    }
    Ok(Json(summaries))
}

/// GET /api/meal/{meal_id}
#[tracing::instrument(skip(state, user_id))]
pub async fn get<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    CallerId(user_id): CallerId,
    Path(meal_id): Path<String>,
) -> Result<Json<MealSummary>, ApiError> {
    let meal = owned_meal(&state, parse_id(&meal_id)?, &user_id).await?;
    Ok(Json(summarize(&state, meal).await?))
}

/// PATCH /api/meal/{meal_id}
#[tracing::instrument(skip(state, user_id, req))]
pub async fn update<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    CallerId(user_id): CallerId,
    Path(meal_id): Path<String>,
    Json(req): Json<UpdateMealRequest>,
) -> Result<Json<MealSummary>, ApiError> {
    let mut meal = owned_meal(&state, parse_id(&meal_id)?, &user_id).await?;

    if let Some(name) = &req.name {
        meal.name = meal_name(name)?.to_string();
    }
    if let Some(description) = req.description {
        meal.description = description;
    }
    if let Some(meal_type) = req.meal_type {
        meal.meal_type = meal_type;
    }
    if let Some(date) = req.date {
        meal.date = date;
    }
    state.ledger.save_meal(&meal).await?;

    Ok(Json(summarize(&state, meal).await?))
}

/// DELETE /api/meal/{meal_id}
///
/// Removes the meal and its consumption records from the ledger only; lot
/// quantities on the grocery service are left as they are.
#[tracing::instrument(skip(state, user_id))]
pub async fn delete<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    CallerId(user_id): CallerId,
    Path(meal_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let meal = owned_meal(&state, parse_id(&meal_id)?, &user_id).await?;
    state.ledger.delete_meal(meal.id).await?;

    tracing::info!(meal_id = %meal.id, "meal deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// GET /api/meal/statistics/most-consumed?start=YYYY-MM-DD&end=YYYY-MM-DD
///
/// Answers 204 when the user consumed nothing from inventory in the range.
#[tracing::instrument(skip_all, fields(user_id = %user_id, start = %range.start, end = %range.end))]
pub async fn most_consumed<L: AppLedger>(
    State(state): State<Arc<AppState<L>>>,
    CallerId(user_id): CallerId,
    Query(range): Query<RangeQuery>,
) -> Result<Response, ApiError> {
    let range = days(range.start, range.end)?;
    match state.ledger.most_consumed_in_range(range, &user_id).await {
        Ok(food) => Ok(Json(food).into_response()),
        Err(LedgerError::NoConsumptionInRange { .. }) => Ok(StatusCode::NO_CONTENT.into_response()),
        Err(e) => Err(e.into()),
    }
}
