use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{
    auth::AuthClaims,
    db::review::{create_review, delete_review, get_review, get_reviews, update_review},
    errors::AppError,
    http::extract::{ApiJson, ApiPath, ApiQuery},
    models::{
        Role,
        review::{NewReview, ReviewPatch},
    },
    query::QueryRequest,
    state::AppState,
};

const REVIEW_EDITORS: [Role; 2] = [Role::User, Role::Admin];

pub async fn get_all_reviews_handler(
    State(state): State<AppState>,
    _claims: AuthClaims,
    ApiQuery(params): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Value>, AppError> {
    let request = QueryRequest::from_pairs(params);
    let reviews = get_reviews(
        &request,
        None,
        state.config.max_page_limit,
        state.store.clone(),
    )
    .await?;

    Ok(Json(json!({
        "status": "success",
        "results": reviews.len(),
        "data": { "reviews": reviews },
    })))
}

pub async fn get_tour_reviews_handler(
    ApiPath(tour_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    _claims: AuthClaims,
    ApiQuery(params): ApiQuery<Vec<(String, String)>>,
) -> Result<Json<Value>, AppError> {
    let request = QueryRequest::from_pairs(params);
    let reviews = get_reviews(
        &request,
        Some(tour_id),
        state.config.max_page_limit,
        state.store.clone(),
    )
    .await?;

    Ok(Json(json!({
        "status": "success",
        "results": reviews.len(),
        "data": { "reviews": reviews },
    })))
}

pub async fn get_review_handler(
    ApiPath(review_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    _claims: AuthClaims,
) -> Result<Json<Value>, AppError> {
    let review = get_review(review_id, state.store.clone()).await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "review": review },
    })))
}

async fn create(
    state: AppState,
    claims: AuthClaims,
    tour_id: Uuid,
    payload: NewReview,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let actor = claims.actor()?;
    actor.restrict_to(&[Role::User])?;

    let (review, tour_ratings) = create_review(
        actor.user_id,
        tour_id,
        payload,
        state.store.clone(),
        state.ratings.clone(),
    )
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "status": "success",
            "data": { "review": review, "tourRatings": tour_ratings },
        })),
    ))
}

pub async fn create_tour_review_handler(
    ApiPath(tour_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    claims: AuthClaims,
    ApiJson(payload): ApiJson<NewReview>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    create(state, claims, tour_id, payload).await
}

pub async fn create_review_handler(
    State(state): State<AppState>,
    claims: AuthClaims,
    ApiJson(payload): ApiJson<NewReview>,
) -> Result<(StatusCode, Json<Value>), AppError> {
    let tour_id = payload
        .tour
        .ok_or_else(|| AppError::BadRequest("Review must belong to a tour".into()))?;

    create(state, claims, tour_id, payload).await
}

pub async fn update_review_handler(
    ApiPath(review_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    claims: AuthClaims,
    ApiJson(payload): ApiJson<ReviewPatch>,
) -> Result<Json<Value>, AppError> {
    let actor = claims.actor()?;
    actor.restrict_to(&REVIEW_EDITORS)?;

    let (review, tour_ratings) = update_review(
        review_id,
        actor,
        payload,
        state.store.clone(),
        state.ratings.clone(),
    )
    .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "review": review, "tourRatings": tour_ratings },
    })))
}

pub async fn delete_review_handler(
    ApiPath(review_id): ApiPath<Uuid>,
    State(state): State<AppState>,
    claims: AuthClaims,
) -> Result<Json<Value>, AppError> {
    let actor = claims.actor()?;
    actor.restrict_to(&REVIEW_EDITORS)?;

    let (tour_id, tour_ratings) = delete_review(
        review_id,
        actor,
        state.store.clone(),
        state.ratings.clone(),
    )
    .await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "tour": tour_id, "tourRatings": tour_ratings },
    })))
}
