pub mod delete;
pub mod get;
pub mod patch;
pub mod post;

pub use delete::delete_tour;
pub use get::{get_monthly_plan, get_tour, get_tour_stats, get_tours};
pub use patch::update_tour;
pub use post::create_tour;
