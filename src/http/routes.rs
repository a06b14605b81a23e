use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    http::handlers::{
        create_review_handler, create_tour_handler, create_tour_review_handler,
        delete_review_handler, delete_tour_handler, get_all_reviews_handler,
        get_all_tours_handler, get_monthly_plan_handler, get_review_handler,
        get_top_tours_handler, get_tour_handler,
        get_tour_reviews_handler, get_tour_stats_handler, recompute_ratings_handler,
        update_review_handler, update_tour_handler,
    },
    state::AppState,
};

pub fn create_http_routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/v1/tours",
            get(get_all_tours_handler).post(create_tour_handler),
        )
        .route("/api/v1/tours/top-5-cheap", get(get_top_tours_handler))
        .route("/api/v1/tours/tour-stats", get(get_tour_stats_handler))
        .route(
            "/api/v1/tours/monthly-plan/{year}",
            get(get_monthly_plan_handler),
        )
        .route(
            "/api/v1/tours/{id}",
            get(get_tour_handler)
                .patch(update_tour_handler)
                .delete(delete_tour_handler),
        )
        .route(
            "/api/v1/tours/{id}/reviews",
            get(get_tour_reviews_handler).post(create_tour_review_handler),
        )
        .route(
            "/api/v1/reviews",
            get(get_all_reviews_handler).post(create_review_handler),
        )
        .route(
            "/api/v1/reviews/{id}",
            get(get_review_handler)
                .patch(update_review_handler)
                .delete(delete_review_handler),
        )
        .route(
            "/api/v1/admin/recompute-ratings",
            post(recompute_ratings_handler),
        )
        .with_state(state)
}
