use uuid::Uuid;

use crate::{
    db::ratings::AggregateSync,
    errors::AppError,
    models::{RatingsSummary, Review, review::NewReview},
    store::{Collection, SharedStore},
};

pub async fn create_review(
    author: Uuid,
    tour_id: Uuid,
    input: NewReview,
    store: SharedStore,
    ratings: AggregateSync,
) -> Result<(Review, RatingsSummary), AppError> {
    input.validate()?;

    // Checked under the lock so a concurrent tour delete cannot orphan the review
    let _guard = ratings.lock_tour(tour_id).await;
    if store.find_by_id(Collection::Tours, tour_id).await?.is_none() {
        return Err(AppError::NotFound("No tour found with that ID".into()));
    }

    let review = input.into_review(tour_id, author);

    // A duplicate (tour, user) pair fails here, before any recompute
    let stored = store
        .insert(Collection::Reviews, review.to_document()?)
        .await?;
    let review = Review::from_document(stored)?;

    let summary = ratings.on_created(&review).await?;

    tracing::info!(
        "Review {} created for tour {} by user {}",
        review.id,
        tour_id,
        author
    );
    Ok((review, summary))
}
