mod common;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use tours_be::{
    db::{
        AggregateSync,
        review::{create_review, delete_review, update_review},
        tour::{delete_tour, get_tour},
    },
    errors::AppError,
    models::{
        Actor, RatingsSummary, Role,
        review::{NewReview, ReviewPatch},
        tour::Difficulty,
    },
    query::{Filter, FindQuery},
    store::{Collection, Document, DocumentStore, MemoryStore, Pipeline, SharedStore},
};
use tokio::sync::Notify;
use uuid::Uuid;

use common::{memory_store, new_review, seed_tour};

fn user() -> Actor {
    Actor {
        user_id: Uuid::new_v4(),
        role: Role::User,
    }
}

async fn ratings_of(store: &SharedStore, tour_id: Uuid) -> RatingsSummary {
    get_tour(tour_id, store.clone())
        .await
        .expect("tour should exist")
        .ratings()
}

#[tokio::test]
async fn test_ratings_follow_created_reviews() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;

    for rating in [3, 4, 5] {
        create_review(user().user_id, tour.id, new_review(rating), store.clone(), sync.clone())
            .await
            .unwrap();
    }

    assert_eq!(
        ratings_of(&store, tour.id).await,
        RatingsSummary {
            ratings_count: 3,
            ratings_average: 4.0,
        }
    );
}

#[tokio::test]
async fn test_create_returns_the_stored_summary() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;

    let (review, summary) =
        create_review(user().user_id, tour.id, new_review(2), store.clone(), sync.clone())
            .await
            .unwrap();

    assert_eq!(review.tour, tour.id);
    assert_eq!(summary.ratings_count, 1);
    assert_eq!(summary.ratings_average, 2.0);
    assert_eq!(ratings_of(&store, tour.id).await, summary);
}

#[tokio::test]
async fn test_deleting_last_review_resets_to_defaults() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let author = user();

    let (review, _) = create_review(author.user_id, tour.id, new_review(1), store.clone(), sync.clone())
        .await
        .unwrap();
    assert_eq!(ratings_of(&store, tour.id).await.ratings_average, 1.0);

    let (owner, summary) = delete_review(review.id, author, store.clone(), sync.clone())
        .await
        .unwrap();

    assert_eq!(owner, tour.id);
    assert_eq!(summary, RatingsSummary::unrated());
    assert_eq!(
        ratings_of(&store, tour.id).await,
        RatingsSummary {
            ratings_count: 0,
            ratings_average: 4.5,
        }
    );
}

#[tokio::test]
async fn test_delete_recomputes_only_the_owning_tour() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let forest = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let sea = seed_tour(&store, "The Sea Explorer", 497.0, Difficulty::Medium).await;

    let author = user();
    let (doomed, _) = create_review(author.user_id, forest.id, new_review(5), store.clone(), sync.clone())
        .await
        .unwrap();
    create_review(user().user_id, forest.id, new_review(3), store.clone(), sync.clone())
        .await
        .unwrap();
    create_review(user().user_id, sea.id, new_review(2), store.clone(), sync.clone())
        .await
        .unwrap();
    let sea_before = ratings_of(&store, sea.id).await;

    delete_review(doomed.id, author, store.clone(), sync.clone())
        .await
        .unwrap();

    assert_eq!(
        ratings_of(&store, forest.id).await,
        RatingsSummary {
            ratings_count: 1,
            ratings_average: 3.0,
        }
    );
    assert_eq!(ratings_of(&store, sea.id).await, sea_before);
}

#[tokio::test]
async fn test_capture_happens_before_the_mutation() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let forest = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let sea = seed_tour(&store, "The Sea Explorer", 497.0, Difficulty::Medium).await;

    let (review, _) = create_review(user().user_id, forest.id, new_review(4), store.clone(), sync.clone())
        .await
        .unwrap();

    let captured = sync.on_will_mutate_by_id(review.id).await.unwrap();
    assert_eq!(captured, forest.id);

    let mut moved = Document::new();
    moved.insert("tour".into(), json!(sea.id.to_string()));
    store
        .update_by_id(Collection::Reviews, review.id, moved)
        .await
        .unwrap();

    sync.on_mutated(captured).await.unwrap();
    sync.recompute(sea.id).await.unwrap();

    assert_eq!(ratings_of(&store, forest.id).await, RatingsSummary::unrated());
    assert_eq!(ratings_of(&store, sea.id).await.ratings_count, 1);
}

#[tokio::test]
async fn test_capture_of_missing_review_is_not_found() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());

    let err = sync.on_will_mutate_by_id(Uuid::new_v4()).await.unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn test_update_rating_recomputes_average() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let author = user();

    let (review, _) = create_review(author.user_id, tour.id, new_review(2), store.clone(), sync.clone())
        .await
        .unwrap();
    create_review(user().user_id, tour.id, new_review(4), store.clone(), sync.clone())
        .await
        .unwrap();

    let patch = ReviewPatch {
        review: None,
        rating: Some(5),
    };
    let (updated, summary) = update_review(review.id, author, patch, store.clone(), sync.clone())
        .await
        .unwrap();

    assert_eq!(updated.rating, 5);
    assert_eq!(updated.version, 1);
    assert_eq!(
        summary,
        RatingsSummary {
            ratings_count: 2,
            ratings_average: 4.5,
        }
    );
    assert_eq!(ratings_of(&store, tour.id).await, summary);
}

#[tokio::test]
async fn test_recompute_is_idempotent() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    for rating in [1, 2, 4, 5, 5] {
        create_review(user().user_id, tour.id, new_review(rating), store.clone(), sync.clone())
            .await
            .unwrap();
    }

    let first = sync.recompute(tour.id).await.unwrap();
    let second = sync.recompute(tour.id).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(first.ratings_count, 5);
    assert!((first.ratings_average - 3.4).abs() < 1e-9);
    assert_eq!(ratings_of(&store, tour.id).await, second);
}

#[tokio::test]
async fn test_duplicate_review_is_rejected_without_recompute() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let author = user();

    create_review(author.user_id, tour.id, new_review(5), store.clone(), sync.clone())
        .await
        .unwrap();

    // Drift the stored summary; a recompute would repair it
    let drift = RatingsSummary {
        ratings_count: 99,
        ratings_average: 1.0,
    };
    store
        .update_by_id(Collection::Tours, tour.id, drift.to_document())
        .await
        .unwrap();

    let err = create_review(author.user_id, tour.id, new_review(1), store.clone(), sync.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Conflict(_)));
    assert_eq!(ratings_of(&store, tour.id).await, drift);
    assert_eq!(
        store
            .execute(
                &FindQuery::new(Collection::Reviews)
                    .find(Filter::new().eq("tour", tour.id.to_string()))
            )
            .await
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_same_user_may_review_different_tours() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let forest = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let sea = seed_tour(&store, "The Sea Explorer", 497.0, Difficulty::Medium).await;
    let author = user();

    create_review(author.user_id, forest.id, new_review(5), store.clone(), sync.clone())
        .await
        .unwrap();
    create_review(author.user_id, sea.id, new_review(3), store.clone(), sync.clone())
        .await
        .unwrap();

    assert_eq!(ratings_of(&store, forest.id).await.ratings_count, 1);
    assert_eq!(ratings_of(&store, sea.id).await.ratings_count, 1);
}

#[tokio::test]
async fn test_invalid_reviews_never_reach_the_store() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;

    for input in [
        new_review(0),
        new_review(6),
        NewReview {
            review: "   ".into(),
            rating: 3,
            tour: None,
        },
    ] {
        let err = create_review(user().user_id, tour.id, input, store.clone(), sync.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    let missing_tour = create_review(user().user_id, Uuid::new_v4(), new_review(3), store.clone(), sync.clone())
        .await
        .unwrap_err();
    assert!(matches!(missing_tour, AppError::NotFound(_)));

    assert!(store.execute(&FindQuery::new(Collection::Reviews)).await.unwrap().is_empty());
    assert_eq!(ratings_of(&store, tour.id).await, RatingsSummary::unrated());
}

#[tokio::test]
async fn test_review_text_is_escaped() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;

    let input = NewReview {
        review: "<script>alert(1)</script> great".into(),
        rating: 4,
        tour: None,
    };
    let (review, _) = create_review(user().user_id, tour.id, input, store.clone(), sync.clone())
        .await
        .unwrap();

    assert!(!review.text.contains('<'));
    assert!(review.text.contains("&lt;script&gt;"));
}

#[tokio::test]
async fn test_only_author_or_admin_may_modify() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let author = user();

    let (review, _) = create_review(author.user_id, tour.id, new_review(4), store.clone(), sync.clone())
        .await
        .unwrap();

    let stranger = user();
    let patch = ReviewPatch {
        review: Some("Edited by someone else".into()),
        rating: None,
    };
    let err = update_review(review.id, stranger, patch, store.clone(), sync.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));

    let err = delete_review(review.id, stranger, store.clone(), sync.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden(_)));
    assert_eq!(ratings_of(&store, tour.id).await.ratings_count, 1);

    let admin = Actor {
        user_id: Uuid::new_v4(),
        role: Role::Admin,
    };
    delete_review(review.id, admin, store.clone(), sync.clone())
        .await
        .unwrap();
    assert_eq!(ratings_of(&store, tour.id).await, RatingsSummary::unrated());
}

#[tokio::test]
async fn test_concurrent_creates_converge() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;

    let ratings: Vec<u8> = (0..20).map(|i| (i % 5) as u8 + 1).collect();
    let results = join_all(ratings.iter().map(|&rating| {
        let store = store.clone();
        let sync = sync.clone();
        tokio::spawn(async move {
            create_review(Uuid::new_v4(), tour.id, new_review(rating), store, sync).await
        })
    }))
    .await;

    for result in results {
        result.expect("task should not panic").expect("review should be created");
    }

    assert_eq!(
        ratings_of(&store, tour.id).await,
        RatingsSummary {
            ratings_count: 20,
            ratings_average: 3.0,
        }
    );
}

#[tokio::test]
async fn test_recompute_all_repairs_drift() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let forest = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let sea = seed_tour(&store, "The Sea Explorer", 497.0, Difficulty::Medium).await;
    create_review(user().user_id, forest.id, new_review(4), store.clone(), sync.clone())
        .await
        .unwrap();

    for tour_id in [forest.id, sea.id] {
        let drift = RatingsSummary {
            ratings_count: 7,
            ratings_average: 2.2,
        };
        store
            .update_by_id(Collection::Tours, tour_id, drift.to_document())
            .await
            .unwrap();
    }

    assert_eq!(sync.recompute_all().await.unwrap(), 2);
    assert_eq!(
        ratings_of(&store, forest.id).await,
        RatingsSummary {
            ratings_count: 1,
            ratings_average: 4.0,
        }
    );
    assert_eq!(ratings_of(&store, sea.id).await, RatingsSummary::unrated());
}

#[tokio::test]
async fn test_recompute_for_missing_tour_is_a_write_failure() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());

    let err = sync.recompute(Uuid::new_v4()).await.unwrap_err();

    assert!(matches!(err, AppError::WriteFailure(_)));
}

// Wraps the memory store and fails selected operations on demand
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_aggregate: AtomicBool,
    fail_tour_writes: AtomicBool,
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn execute(&self, query: &FindQuery) -> Result<Vec<Document>, AppError> {
        self.inner.execute(query).await
    }

    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, AppError> {
        if self.fail_aggregate.load(Ordering::SeqCst) {
            return Err(AppError::Timeout("aggregate timed out".into()));
        }
        self.inner.aggregate(collection, pipeline).await
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        self.inner.find_by_id(collection, id).await
    }

    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, AppError> {
        self.inner.insert(collection, doc).await
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<Option<Document>, AppError> {
        if collection == Collection::Tours && self.fail_tour_writes.load(Ordering::SeqCst) {
            return Err(AppError::Timeout("write timed out".into()));
        }
        self.inner.update_by_id(collection, id, fields).await
    }

    async fn delete_by_id(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        self.inner.delete_by_id(collection, id).await
    }
}

#[tokio::test]
async fn test_aggregation_failure_leaves_fields_untouched() {
    let flaky = Arc::new(FlakyStore::default());
    let store: SharedStore = flaky.clone();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    create_review(user().user_id, tour.id, new_review(5), store.clone(), sync.clone())
        .await
        .unwrap();

    flaky.fail_aggregate.store(true, Ordering::SeqCst);
    let err = create_review(user().user_id, tour.id, new_review(1), store.clone(), sync.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::AggregationFailure(_)));
    assert_eq!(
        ratings_of(&store, tour.id).await,
        RatingsSummary {
            ratings_count: 1,
            ratings_average: 5.0,
        }
    );

    // The review itself was stored; a later recompute catches up
    flaky.fail_aggregate.store(false, Ordering::SeqCst);
    let repaired = sync.recompute(tour.id).await.unwrap();
    assert_eq!(repaired.ratings_count, 2);
    assert_eq!(repaired.ratings_average, 3.0);
}

#[tokio::test]
async fn test_write_failure_is_reported_and_retry_succeeds() {
    let flaky = Arc::new(FlakyStore::default());
    let store: SharedStore = flaky.clone();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;

    flaky.fail_tour_writes.store(true, Ordering::SeqCst);
    let err = create_review(user().user_id, tour.id, new_review(2), store.clone(), sync.clone())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::WriteFailure(_)));
    assert_eq!(ratings_of(&store, tour.id).await, RatingsSummary::unrated());

    flaky.fail_tour_writes.store(false, Ordering::SeqCst);
    let summary = sync.recompute(tour.id).await.unwrap();
    assert_eq!(summary.ratings_count, 1);
    assert_eq!(summary.ratings_average, 2.0);
}

// Parks the first review insert after it is armed until the test releases it
#[derive(Default)]
struct GatedStore {
    inner: MemoryStore,
    armed: AtomicBool,
    entered: Notify,
    release: Notify,
}

#[async_trait]
impl DocumentStore for GatedStore {
    async fn execute(&self, query: &FindQuery) -> Result<Vec<Document>, AppError> {
        self.inner.execute(query).await
    }

    async fn aggregate(
        &self,
        collection: Collection,
        pipeline: &Pipeline,
    ) -> Result<Vec<Document>, AppError> {
        self.inner.aggregate(collection, pipeline).await
    }

    async fn find_by_id(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        self.inner.find_by_id(collection, id).await
    }

    async fn insert(&self, collection: Collection, doc: Document) -> Result<Document, AppError> {
        if collection == Collection::Reviews && self.armed.swap(false, Ordering::SeqCst) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.insert(collection, doc).await
    }

    async fn update_by_id(
        &self,
        collection: Collection,
        id: Uuid,
        fields: Document,
    ) -> Result<Option<Document>, AppError> {
        self.inner.update_by_id(collection, id, fields).await
    }

    async fn delete_by_id(
        &self,
        collection: Collection,
        id: Uuid,
    ) -> Result<Option<Document>, AppError> {
        self.inner.delete_by_id(collection, id).await
    }
}

#[tokio::test]
async fn test_tour_delete_waits_for_in_flight_review() {
    let gated = Arc::new(GatedStore::default());
    let store: SharedStore = gated.clone();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;

    gated.armed.store(true, Ordering::SeqCst);
    let create = tokio::spawn(create_review(
        user().user_id,
        tour.id,
        new_review(4),
        store.clone(),
        sync.clone(),
    ));
    gated.entered.notified().await;

    let delete = tokio::spawn(delete_tour(tour.id, store.clone(), sync.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!delete.is_finished());

    gated.release.notify_one();
    let (review, summary) = create.await.unwrap().unwrap();
    assert_eq!(review.tour, tour.id);
    assert_eq!(summary.ratings_count, 1);

    assert_eq!(delete.await.unwrap().unwrap(), 1);
    assert!(
        store
            .execute(&FindQuery::new(Collection::Reviews))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_review_created_after_tour_delete_is_not_found() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;

    delete_tour(tour.id, store.clone(), sync.clone()).await.unwrap();
    let err = create_review(user().user_id, tour.id, new_review(4), store.clone(), sync.clone())
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::NotFound(_)));
    assert!(
        store
            .execute(&FindQuery::new(Collection::Reviews))
            .await
            .unwrap()
            .is_empty()
    );
}

#[tokio::test]
async fn test_owner_is_recaptured_once_the_lock_is_held() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let forest = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let sea = seed_tour(&store, "The Sea Explorer", 497.0, Difficulty::Medium).await;
    let author = user();
    let (review, _) = create_review(author.user_id, forest.id, new_review(5), store.clone(), sync.clone())
        .await
        .unwrap();

    let held = sync.lock_tour(forest.id).await;
    let delete = tokio::spawn(delete_review(review.id, author, store.clone(), sync.clone()));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!delete.is_finished());

    // Moved behind the API's back while the delete waits on the old owner
    let mut moved = Document::new();
    moved.insert("tour".into(), json!(sea.id.to_string()));
    store
        .update_by_id(Collection::Reviews, review.id, moved)
        .await
        .unwrap();
    drop(held);

    let (owner, summary) = delete.await.unwrap().unwrap();
    assert_eq!(owner, sea.id);
    assert_eq!(summary, RatingsSummary::unrated());
}

#[tokio::test]
async fn test_lock_review_tour_returns_current_owner() {
    let store = memory_store();
    let sync = AggregateSync::new(store.clone());
    let tour = seed_tour(&store, "The Forest Hiker", 397.0, Difficulty::Easy).await;
    let (review, _) = create_review(user().user_id, tour.id, new_review(3), store.clone(), sync.clone())
        .await
        .unwrap();

    let (owner, _guard) = sync.lock_review_tour(review.id).await.unwrap();
    assert_eq!(owner, tour.id);

    let missing = sync.lock_review_tour(Uuid::new_v4()).await;
    assert!(matches!(missing, Err(AppError::NotFound(_))));
}
