use uuid::Uuid;

use crate::{
    db::tour::get::get_tour,
    errors::AppError,
    models::{Tour, tour::TourPatch},
    store::{Collection, SharedStore},
};

// Ratings fields cannot reach this path: `TourPatch` has no slot for them
pub async fn update_tour(
    tour_id: Uuid,
    patch: TourPatch,
    store: SharedStore,
) -> Result<Tour, AppError> {
    if patch.is_empty() {
        return Err(AppError::BadRequest("Nothing to update".into()));
    }

    let current = get_tour(tour_id, store.clone()).await?;
    patch.validate(&current)?;

    let updated = store
        .update_by_id(Collection::Tours, tour_id, patch.to_document()?)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that ID".into()))?;

    tracing::info!("Tour {} updated", tour_id);
    Tour::from_document(updated)
}
