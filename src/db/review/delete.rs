use uuid::Uuid;

use crate::{
    db::{ratings::AggregateSync, review::ensure_can_modify, review::get::get_review},
    errors::AppError,
    models::{Actor, RatingsSummary},
    store::{Collection, SharedStore},
};

// Returns the owning tour's summary after the review is gone
pub async fn delete_review(
    review_id: Uuid,
    actor: Actor,
    store: SharedStore,
    ratings: AggregateSync,
) -> Result<(Uuid, RatingsSummary), AppError> {
    ensure_can_modify(&get_review(review_id, store.clone()).await?, &actor)?;

    // After the delete the review, and its tour reference, are gone
    let (captured_tour, _guard) = ratings.lock_review_tour(review_id).await?;

    store
        .delete_by_id(Collection::Reviews, review_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".into()))?;

    let summary = ratings.on_mutated(captured_tour).await?;

    tracing::info!("Review {} deleted by user {}", review_id, actor.user_id);
    Ok((captured_tour, summary))
}
