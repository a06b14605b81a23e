use std::{collections::HashMap, sync::Arc};

use serde_json::Value;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

use crate::{
    errors::AppError,
    models::{
        RatingsSummary, Review,
        review::{RATING_FIELD, TOUR_FIELD},
    },
    query::{Filter, FindQuery, Projection},
    store::{
        Accumulator, Collection, Document, GroupKey, Pipeline, SharedStore, document_id, uuid_field,
    },
};

pub type TourLocks = Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>;

const COUNT_FIELD: &str = "nRating";
const AVERAGE_FIELD: &str = "avgRating";

/// Keeps `ratingsCount` / `ratingsAverage` on every tour equal to what its
/// reviews say.
///
/// Review operations call one trigger per lifecycle event:
/// - create: [`AggregateSync::on_created`] once the review is stored;
/// - update / delete by id: [`AggregateSync::lock_review_tour`] before the
///   write to capture the owning tour under its lock, then
///   [`AggregateSync::on_mutated`] with that capture afterwards.
///
/// Every trigger ends in [`AggregateSync::recompute`], which re-derives both
/// fields from the full review set, so repeating it is always safe.
#[derive(Clone)]
pub struct AggregateSync {
    store: SharedStore,
    locks: TourLocks,
}

impl AggregateSync {
    pub fn new(store: SharedStore) -> Self {
        Self {
            store,
            locks: Default::default(),
        }
    }

    // Serialises "mutate review + recompute" for one tour
    pub async fn lock_tour(&self, tour_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            // Drop entries nobody holds or waits on
            locks.retain(|id, lock| *id == tour_id || Arc::strong_count(lock) > 1);
            locks.entry(tour_id).or_default().clone()
        };
        lock.lock_owned().await
    }

    pub async fn on_created(&self, review: &Review) -> Result<RatingsSummary, AppError> {
        self.recompute(review.tour).await
    }

    pub async fn on_will_mutate_by_id(&self, review_id: Uuid) -> Result<Uuid, AppError> {
        let review = self
            .store
            .find_by_id(Collection::Reviews, review_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No review found with that ID".into()))?;

        uuid_field(&review, TOUR_FIELD).ok_or_else(|| {
            AppError::Deserialization(format!("Review {} has no tour reference", review_id))
        })
    }

    /// Captures the tour owning a review and locks it.
    ///
    /// The capture is repeated once the lock is held; if the review moved to
    /// another tour in between, the lock is released and the new owner is
    /// locked instead, so the returned tour is the one the review belongs to
    /// while the guard lives.
    pub async fn lock_review_tour(
        &self,
        review_id: Uuid,
    ) -> Result<(Uuid, OwnedMutexGuard<()>), AppError> {
        let mut tour_id = self.on_will_mutate_by_id(review_id).await?;
        loop {
            let guard = self.lock_tour(tour_id).await;
            let current = self.on_will_mutate_by_id(review_id).await?;
            if current == tour_id {
                return Ok((tour_id, guard));
            }
            tracing::debug!(
                "Review {} moved from tour {} to {} before lock",
                review_id,
                tour_id,
                current
            );
            drop(guard);
            tour_id = current;
        }
    }

    pub async fn on_mutated(&self, captured_tour: Uuid) -> Result<RatingsSummary, AppError> {
        self.recompute(captured_tour).await
    }

    pub async fn recompute(&self, tour_id: Uuid) -> Result<RatingsSummary, AppError> {
        let stats = self
            .store
            .aggregate(Collection::Reviews, &ratings_pipeline(tour_id))
            .await
            .map_err(|e| {
                tracing::error!("Ratings aggregation failed for tour {}: {}", tour_id, e);
                AppError::AggregationFailure(e.to_string())
            })?;

        let summary = summarize(stats.first())?;

        let updated = self
            .store
            .update_by_id(Collection::Tours, tour_id, summary.to_document())
            .await
            .map_err(|e| {
                tracing::error!("Ratings write failed for tour {}: {}", tour_id, e);
                AppError::WriteFailure(e.to_string())
            })?;

        if updated.is_none() {
            return Err(AppError::WriteFailure(format!(
                "Tour {} no longer exists",
                tour_id
            )));
        }

        tracing::debug!(
            "Recomputed ratings for tour {}: count={}, average={}",
            tour_id,
            summary.ratings_count,
            summary.ratings_average
        );
        Ok(summary)
    }

    // Re-derives every tour, repairing drift from writes made outside the API
    pub async fn recompute_all(&self) -> Result<usize, AppError> {
        let tours = self
            .store
            .execute(
                &FindQuery::new(Collection::Tours)
                    .select(Projection::Include(vec!["id".to_string()])),
            )
            .await?;

        let mut recomputed = 0;
        for tour_id in tours.iter().filter_map(document_id) {
            let _guard = self.lock_tour(tour_id).await;
            self.recompute(tour_id).await?;
            recomputed += 1;
        }

        tracing::info!("Recomputed ratings for {} tours", recomputed);
        Ok(recomputed)
    }
}

pub fn ratings_pipeline(tour_id: Uuid) -> Pipeline {
    Pipeline::new()
        .matching(Filter::new().eq(TOUR_FIELD, tour_id.to_string()))
        .group(
            GroupKey::Field(TOUR_FIELD.to_string()),
            vec![
                (COUNT_FIELD, Accumulator::Count),
                (AVERAGE_FIELD, Accumulator::Avg(RATING_FIELD.to_string())),
            ],
        )
}

// No group, or an empty one, means the tour has no reviews left
fn summarize(group: Option<&Document>) -> Result<RatingsSummary, AppError> {
    let Some(group) = group else {
        return Ok(RatingsSummary::unrated());
    };

    let count = group.get(COUNT_FIELD).and_then(Value::as_u64).unwrap_or(0);
    if count == 0 {
        return Ok(RatingsSummary::unrated());
    }

    let average = group
        .get(AVERAGE_FIELD)
        .and_then(Value::as_f64)
        .ok_or_else(|| {
            AppError::AggregationFailure(format!("Group of {} reviews has no average", count))
        })?;

    Ok(RatingsSummary {
        ratings_count: count,
        ratings_average: average,
    })
}
