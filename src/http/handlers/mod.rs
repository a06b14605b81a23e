pub mod admin;
pub mod review;
pub mod tour;

pub use admin::recompute_ratings_handler;
pub use review::{
    create_review_handler, create_tour_review_handler, delete_review_handler,
    get_all_reviews_handler, get_review_handler, get_tour_reviews_handler, update_review_handler,
};
pub use tour::{
    create_tour_handler, delete_tour_handler, get_all_tours_handler, get_monthly_plan_handler,
    get_top_tours_handler, get_tour_handler, get_tour_stats_handler, update_tour_handler,
};
