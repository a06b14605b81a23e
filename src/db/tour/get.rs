use uuid::Uuid;

use crate::{
    errors::AppError,
    models::{
        Tour,
        tour::{
            DEFAULT_RATINGS_AVERAGE, RATINGS_AVERAGE_FIELD, RATINGS_COUNT_FIELD,
            REPEATABLE_FILTER_FIELDS, START_DATES_FIELD,
        },
    },
    query::{ApiFeatures, Filter, FindQuery, QueryRequest, RangeOp, SortKey},
    store::{Accumulator, Collection, Document, GROUP_KEY_FIELD, GroupKey, Pipeline, SharedStore},
};

pub async fn get_tour(tour_id: Uuid, store: SharedStore) -> Result<Tour, AppError> {
    let doc = store
        .find_by_id(Collection::Tours, tour_id)
        .await?
        .ok_or_else(|| AppError::NotFound("No tour found with that ID".into()))?;

    Tour::from_document(doc)
}

pub async fn get_tours(
    request: &QueryRequest,
    max_limit: u64,
    store: SharedStore,
) -> Result<Vec<Document>, AppError> {
    let query = ApiFeatures::new(FindQuery::new(Collection::Tours), request)
        .with_max_limit(max_limit)
        .with_repeatable(&REPEATABLE_FILTER_FIELDS)
        .translate();

    store.execute(&query).await
}

// Per-difficulty figures over well-rated tours, cheapest group first
pub async fn get_tour_stats(store: SharedStore) -> Result<Vec<Document>, AppError> {
    let pipeline = Pipeline::new()
        .matching(Filter::new().range(
            RATINGS_AVERAGE_FIELD,
            RangeOp::Gte,
            DEFAULT_RATINGS_AVERAGE,
        ))
        .group(
            GroupKey::Field("difficulty".into()),
            vec![
                ("numTours", Accumulator::Count),
                ("numRatings", Accumulator::Sum(RATINGS_COUNT_FIELD.into())),
                ("avgRating", Accumulator::Avg(RATINGS_AVERAGE_FIELD.into())),
                ("avgPrice", Accumulator::Avg("price".into())),
                ("minPrice", Accumulator::Min("price".into())),
                ("maxPrice", Accumulator::Max("price".into())),
            ],
        )
        .sort(vec![SortKey::asc("avgPrice")]);

    store.aggregate(Collection::Tours, &pipeline).await
}

// Tour starts per calendar month of `year`, busiest month first
pub async fn get_monthly_plan(year: i32, store: SharedStore) -> Result<Vec<Document>, AppError> {
    if !(1..=9998).contains(&year) {
        return Err(AppError::BadRequest(format!("Invalid year: {}", year)));
    }

    let pipeline = Pipeline::new()
        .unwind(START_DATES_FIELD)
        .matching(
            Filter::new()
                .range(START_DATES_FIELD, RangeOp::Gte, format!("{:04}-01-01", year))
                .range(START_DATES_FIELD, RangeOp::Lt, format!("{:04}-01-01", year + 1)),
        )
        .group(
            GroupKey::Month(START_DATES_FIELD.into()),
            vec![
                ("numTourStarts", Accumulator::Count),
                ("tours", Accumulator::Push("name".into())),
            ],
        )
        .sort(vec![SortKey::desc("numTourStarts"), SortKey::asc(GROUP_KEY_FIELD)])
        .limit(12);

    let months = store.aggregate(Collection::Tours, &pipeline).await?;

    Ok(months
        .into_iter()
        .map(|mut month| {
            if let Some(key) = month.remove(GROUP_KEY_FIELD) {
                month.insert("month".to_string(), key);
            }
            month
        })
        .collect())
}
