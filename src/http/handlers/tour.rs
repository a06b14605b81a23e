use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    auth::AuthClaims,
    db::tour::{
        create_tour, delete_tour, get_monthly_plan, get_tour, get_tour_stats, get_tours,
        update_tour,
    },
    errors::AppError,
    http::extract::{ApiJson, ApiPath, ApiQuery},
    models::{
        Role,
        tour::{NewTour, TourPatch},
    },
    query::QueryRequest,
    state::AppState,
};

const TOUR_EDITORS: [Role; 2] = [Role::Admin, Role::LeadGuide];
const TOUR_PLANNERS: [Role; 3] = [Role::Admin, Role::LeadGuide, Role::Guide];

pub async fn get_all_tours_handler(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Value>, AppError> {
    let request = QueryRequest::from_pairs(params);
    let tours = get_tours(&request, state.config.max_page_limit, state.store.clone()).await?;

    Ok(Json(json!({
        "status": "success",
        "results": tours.len(),
        "data": { "tours": tours },
    })))
}

// Preset for the five best rated, cheapest tours
pub async fn get_top_tours_handler(
    State(state): State<AppState>,
    ApiQuery(params): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Value>, AppError> {
    let request = QueryRequest::from_pairs(params)
        .set("limit", "5")
        .set("sort", "-ratingsAverage,price")
        .set("fields", "name,price,ratingsAverage,summary,difficulty");
    let tours = get_tours(&request, state.config.max_page_limit, state.store.clone()).await?;

    Ok(Json(json!({
        "status": "success",
        "results": tours.len(),
        "data": { "tours": tours },
    })))
}

pub async fn get_tour_stats_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let stats = get_tour_stats(state.store.clone()).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "stats": stats },
    })))
}

pub async fn get_monthly_plan_handler(
    ApiPath(year): ApiPath<i32>,
    State(state): State<AppState>,
    claims: AuthClaims,
) -> Result<Json<Value>, AppError> {
    claims.actor()?.restrict_to(&TOUR_PLANNERS)?;

    let plan = get_monthly_plan(year, state.store.clone()).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "plan": plan },
    })))
}

pub async fn get_tour_handler(
    ApiPath(tour_id): ApiPath<Uuid>,
    State(state): State<AppState>,
) -> Result<Json<Value>, AppError> {
    let tour = get_tour(tour_id, state.store.clone()).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "tour": tour },
    })))
}

pub async fn create_tour_handler(
    State(state): State<AppState>,
    claims: AuthClaims,
    ApiJson(payload): ApiJson<NewTour>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    claims.actor()?.restrict_to(&TOUR_EDITORS)?;

    let tour = create_tour(payload, state.store.clone()).await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": { "tour": tour },
        })),
    ))
}

pub async fn update_tour_handler(
    ApiPath(tour_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    claims: AuthClaims,
    ApiJson(payload): ApiJson<TourPatch>,
) -> Result<Json<Value>, AppError> {
    claims.actor()?.restrict_to(&TOUR_EDITORS)?;

    let tour = update_tour(tour_id, payload, state.store.clone()).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "tour": tour },
    })))
}

pub async fn delete_tour_handler(
    ApiPath(tour_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    claims: AuthClaims,
) -> Result<StatusCode, AppError> {
    claims.actor()?.restrict_to(&TOUR_EDITORS)?;

    delete_tour(tour_id, state.store.clone(), state.ratings.clone()).await?;
    Ok(StatusCode::NO_CONTENT)
}
