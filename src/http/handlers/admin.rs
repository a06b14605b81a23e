use axum::{Json, extract::State};
use serde_json::{Value, json};

use crate::{auth::AuthClaims, errors::AppError, models::Role, state::AppState};

pub async fn recompute_ratings_handler(
    State(state): State<AppState>,
    claims: AuthClaims,
) -> Result<Json<Value>, AppError> {
    claims.actor()?.restrict_to(&[Role::Admin])?;

    let tours = state.ratings.recompute_all().await?;

    Ok(Json(json!({
        "status": "success",
        "data": { "toursRecomputed": tours },
    })))
}
