use crate::{
    errors::AppError,
    models::{Tour, tour::NewTour},
    store::{Collection, SharedStore},
};

pub async fn create_tour(input: NewTour, store: SharedStore) -> Result<Tour, AppError> {
    input.validate()?;

    let tour = input.into_tour();
    let stored = store
        .insert(Collection::Tours, tour.to_document()?)
        .await?;

    let tour = Tour::from_document(stored)?;
    tracing::info!("Tour created with ID: {}", tour.id);
    Ok(tour)
}
