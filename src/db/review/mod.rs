pub mod delete;
pub mod get;
pub mod patch;
pub mod post;

pub use delete::delete_review;
pub use get::{get_review, get_reviews};
pub use patch::update_review;
pub use post::create_review;

use crate::{errors::AppError, models::{Actor, Review}};

// Authors manage their own reviews; admins manage any
pub(crate) fn ensure_can_modify(review: &Review, actor: &Actor) -> Result<(), AppError> {
    if actor.is_admin() || review.user == actor.user_id {
        Ok(())
    } else {
        Err(AppError::Forbidden(
            "You can only change your own reviews".into(),
        ))
    }
}
