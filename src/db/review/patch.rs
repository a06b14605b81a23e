use uuid::Uuid;

use crate::{
    db::{ratings::AggregateSync, review::ensure_can_modify, review::get::get_review},
    errors::AppError,
    models::{Actor, RatingsSummary, Review, review::ReviewPatch},
    store::{Collection, SharedStore},
};

pub async fn update_review(
    review_id: Uuid,
    actor: Actor,
    patch: ReviewPatch,
    store: SharedStore,
    ratings: AggregateSync,
) -> Result<(Review, RatingsSummary), AppError> {
    patch.validate()?;
    ensure_can_modify(&get_review(review_id, store.clone()).await?, &actor)?;

    // Capture the owner before the write can change it
    let (captured_tour, _guard) = ratings.lock_review_tour(review_id).await?;

    let updated = store
        .update_by_id(Collection::Reviews, review_id, patch.to_document()?)
        .await?
        .ok_or_else(|| AppError::NotFound("No review found with that ID".into()))?;
    let review = Review::from_document(updated)?;

    let mut summary = ratings.on_mutated(captured_tour).await?;
    if review.tour != captured_tour {
        // The review moved: the new owner needs its own recompute
        summary = ratings.recompute(review.tour).await?;
    }

    tracing::info!("Review {} updated by user {}", review_id, actor.user_id);
    Ok((review, summary))
}
