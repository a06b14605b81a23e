use uuid::Uuid;

use crate::{
    errors::AppError,
    models::{
        Review,
        review::TOUR_FIELD,
        tour::REPEATABLE_FILTER_FIELDS,
    },
    query::{ApiFeatures, Filter, FindQuery, QueryRequest},
    store::{Collection, Document, SharedStore},
};

pub async fn get_review(review_id: Uuid, store: SharedStore) -> Result<Review, AppError> {
    let doc = store
        .find_by_id(Collection::Reviews, review_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".into()))?;

    Review::from_document(doc)
}

// `tour_id` scopes the listing for the nested /tours/{id}/reviews route
pub async fn get_reviews(
    request: &QueryRequest,
    tour_id: Option<Uuid>,
    max_limit: u64,
    store: SharedStore,
) -> Result<Vec<Document>, AppError> {
    let mut base = FindQuery::new(Collection::Reviews);
    if let Some(tour_id) = tour_id {
        base = base.find(Filter::new().eq(TOUR_FIELD, tour_id.to_string()));
    }

    let query = ApiFeatures::new(base, request)
        .with_max_limit(max_limit)
        .with_repeatable(&REPEATABLE_FILTER_FIELDS)
        .translate();

    store.execute(&query).await
}
