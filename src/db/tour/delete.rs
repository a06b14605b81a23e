use futures::future::try_join_all;
use uuid::Uuid;

use crate::{
    db::ratings::AggregateSync,
    errors::AppError,
    models::review::TOUR_FIELD,
    query::{Filter, FindQuery, Projection},
    store::{Collection, SharedStore, document_id},
};

// Reviews go with their tour; there is no parent left to recompute.
// The tour lock keeps review creation from slipping in between the two deletes.
pub async fn delete_tour(
    tour_id: Uuid,
    store: SharedStore,
    ratings: AggregateSync,
) -> Result<usize, AppError> {
    let _guard = ratings.lock_tour(tour_id).await;

    store
        .delete_by_id(Collection::Tours, tour_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that ID".into()))?;

    let reviews = store
        .execute(
            &FindQuery::new(Collection::Reviews)
                .find(Filter::new().eq(TOUR_FIELD, tour_id.to_string()))
                .select(Projection::Include(vec!["id".to_string()])),
        )
        .await?;

    let removed = try_join_all(
        reviews
            .iter()
            .filter_map(document_id)
            .map(|review_id| store.delete_by_id(Collection::Reviews, review_id)),
    )
    .await?;
    let removed = removed.iter().flatten().count();

    tracing::info!("Tour {} deleted along with {} reviews", tour_id, removed);
    Ok(removed)
}
