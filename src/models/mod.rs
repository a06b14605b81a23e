pub mod redis;
pub mod review;
pub mod tour;
pub mod user;

pub use review::Review;
pub use tour::{RatingsSummary, Tour};
pub use user::{Actor, Claims, Role};
